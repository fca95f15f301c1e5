use tracing::debug;

use super::{Options, RecordExecutor};
use crate::core::{DbError, FromValue, Result, Value};
use crate::facade::RequestContext;
use crate::query::{Condition, SelectBuilder};
use crate::record::Record;

impl<R: Record> RecordExecutor<R> {
    /// Load the row matching `record`'s primary key into `record`.
    ///
    /// Missing rows are reported as [`DbError::NotFound`].
    pub async fn find(&self, ctx: &mut RequestContext, record: &mut R, options: &Options) -> Result<()> {
        let resolved = options.resolve(ctx.shard_count())?;
        let meta = self.metadata(ctx).await?;
        let schema = R::schema();
        let values = record.values();
        let shard = self.route_record(ctx, &meta, &resolved, &values).await?;

        let primary_key = schema.primary_key_pairs(&values)?;
        let describe = describe_key(&primary_key);
        let statement = SelectBuilder::new(schema.table())
            .columns(schema.column_names())
            .where_eq(primary_key)
            .for_update(resolved.for_update)
            .build()?;

        let tx = ctx.transaction(resolved.mode, shard).await?;
        let rows = tx.fetch_all(&statement).await?;
        match rows.as_slice() {
            [] => Err(DbError::NotFound(format!("{} {}", schema.table(), describe))),
            [row] => {
                *record = R::from_row(row)?;
                Ok(())
            }
            many => Err(DbError::execution(format!(
                "{} {} matched {} rows",
                schema.table(),
                describe,
                many.len()
            ))),
        }
    }

    /// All rows matching `condition`, in the condition's order.
    pub async fn finds(&self, ctx: &mut RequestContext, condition: &Condition, options: &Options) -> Result<Vec<R>> {
        let resolved = options.resolve(ctx.shard_count())?;
        let meta = self.metadata(ctx).await?;
        let shard = self.route(ctx, &meta, &resolved.route, None).await?;

        let schema = R::schema();
        let statement = SelectBuilder::new(schema.table())
            .columns(schema.column_names())
            .filter(&condition.filter)
            .order_by(&condition.order)
            .for_update(resolved.for_update)
            .build()?;

        let tx = ctx.transaction(resolved.mode, shard).await?;
        let rows = tx.fetch_all(&statement).await?;
        debug!(table = self.table(), rows = rows.len(), "finds");
        rows.iter().map(R::from_row).collect()
    }

    /// `SELECT COUNT(1)` over rows matching `condition`.
    pub async fn count(&self, ctx: &mut RequestContext, condition: &Condition, options: &Options) -> Result<u64> {
        let resolved = options.resolve(ctx.shard_count())?;
        let meta = self.metadata(ctx).await?;
        let shard = self.route(ctx, &meta, &resolved.route, None).await?;

        let statement = SelectBuilder::new(self.table())
            .count()
            .filter(&condition.filter)
            .order_by(&condition.order)
            .build()?;

        let tx = ctx.transaction(resolved.mode, shard).await?;
        let rows = tx.fetch_all(&statement).await?;
        match rows.first().and_then(|row| row.get_index(0)) {
            Some(value) => u64::from_value(value),
            None => Ok(0),
        }
    }
}

fn describe_key(pairs: &[(String, Value)]) -> String {
    let parts: Vec<String> = pairs
        .iter()
        .map(|(column, value)| format!("{}={}", column, value))
        .collect();
    format!("[{}]", parts.join(", "))
}
