use super::RecordExecutor;
use super::options::ResolvedOptions;
use crate::core::{Mode, Result};
use crate::facade::RequestContext;
use crate::query::DeleteBuilder;
use crate::record::Record;

impl<R: Record> RecordExecutor<R> {
    /// Delete by primary key; returns the affected row count.
    pub async fn delete(&self, ctx: &mut RequestContext, record: &R) -> Result<u64> {
        let meta = self.metadata(ctx).await?;
        let schema = R::schema();
        let values = record.values();
        let shard = self
            .route_record(ctx, &meta, &ResolvedOptions::write(), &values)
            .await?;
        let statement = DeleteBuilder::new(schema.table())
            .where_eq(schema.primary_key_pairs(&values)?)
            .build()?;

        let tx = ctx.transaction(Mode::Write, shard).await?;
        tx.execute(&statement).await
    }
}
