use tracing::debug;

use super::RecordExecutor;
use super::options::ResolvedOptions;
use crate::core::{Mode, Result};
use crate::facade::RequestContext;
use crate::query::UpdateBuilder;
use crate::record::Record;

impl<R: Record> RecordExecutor<R> {
    /// Update `record` by primary key.
    ///
    /// With `previous`, only columns that differ from it are written, and an
    /// unchanged record issues no statement and returns 0.
    pub async fn update(&self, ctx: &mut RequestContext, record: &R, previous: Option<&R>) -> Result<u64> {
        let schema = R::schema();
        let values = record.values();
        let assignments = match previous {
            Some(previous) => schema.changed_pairs(&values, &previous.values())?,
            None => schema.updatable_pairs(&values)?,
        };
        if assignments.is_empty() {
            debug!(table = schema.table(), "update skipped; nothing changed");
            return Ok(0);
        }

        let meta = self.metadata(ctx).await?;
        let shard = self
            .route_record(ctx, &meta, &ResolvedOptions::write(), &values)
            .await?;
        let statement = UpdateBuilder::new(schema.table())
            .set_all(assignments)
            .where_eq(schema.primary_key_pairs(&values)?)
            .build()?;

        let tx = ctx.transaction(Mode::Write, shard).await?;
        tx.execute(&statement).await
    }
}
