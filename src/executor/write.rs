use tracing::debug;

use super::options::ResolvedOptions;
use super::{RecordExecutor, next_sequence_ids};
use crate::core::{DbError, Mode, Result, ShardId};
use crate::facade::RequestContext;
use crate::query::InsertBuilder;
use crate::record::Record;

impl<R: Record> RecordExecutor<R> {
    /// `INSERT IGNORE` one record, allocating its sequence id when unset.
    /// Returns the affected row count; 0 means the key already existed.
    pub async fn create(&self, ctx: &mut RequestContext, record: &mut R) -> Result<u64> {
        self.create_multi(ctx, std::slice::from_mut(record)).await
    }

    /// `INSERT IGNORE` a batch in one statement.
    ///
    /// All records must route to the same shard; a mixed batch fails before
    /// any sequence id is reserved or any row written.
    pub async fn create_multi(&self, ctx: &mut RequestContext, records: &mut [R]) -> Result<u64> {
        if records.is_empty() {
            return Err(DbError::InvalidOption(format!(
                "create_multi on '{}' needs at least one record",
                self.table()
            )));
        }
        let meta = self.metadata(ctx).await?;
        let write = ResolvedOptions::write();

        let mut shard: Option<Option<ShardId>> = None;
        for record in records.iter() {
            let resolved = self.route_record(ctx, &meta, &write, &record.values()).await?;
            match shard {
                None => shard = Some(resolved),
                Some(first) if first != resolved => {
                    return Err(DbError::InvalidOption(format!(
                        "create_multi on '{}' spans shards {} and {}",
                        self.table(),
                        display_shard(first),
                        display_shard(resolved)
                    )));
                }
                Some(_) => {}
            }
        }
        let shard = shard.flatten();

        self.fill_sequences(ctx, records).await?;

        let schema = R::schema();
        let mut builder = InsertBuilder::new(schema.table()).ignore();
        for record in records.iter() {
            let (columns, values) = schema.insertable(&record.values())?;
            builder = builder.columns(columns).values(values);
        }
        let statement = builder.build()?;

        let tx = ctx.transaction(Mode::Write, shard).await?;
        let affected = tx.execute(&statement).await?;
        debug!(table = schema.table(), records = records.len(), affected, "created");
        Ok(affected)
    }

    /// Upsert: `INSERT ... ON DUPLICATE KEY UPDATE` over the non-key columns.
    pub async fn save(&self, ctx: &mut RequestContext, record: &mut R) -> Result<u64> {
        let meta = self.metadata(ctx).await?;
        let shard = self
            .route_record(ctx, &meta, &ResolvedOptions::write(), &record.values())
            .await?;
        self.fill_sequences(ctx, std::slice::from_mut(record)).await?;

        let schema = R::schema();
        let values = record.values();
        let (columns, inserted) = schema.insertable(&values)?;
        let updates = schema.updatable_pairs(&values)?;
        let builder = InsertBuilder::new(schema.table()).columns(columns).values(inserted);
        let statement = if updates.is_empty() {
            builder.ignore().build()?
        } else {
            builder.on_duplicate_update(updates).build()?
        };

        let tx = ctx.transaction(Mode::Write, shard).await?;
        tx.execute(&statement).await
    }

    async fn fill_sequences(&self, ctx: &mut RequestContext, records: &mut [R]) -> Result<()> {
        let missing = records.iter().filter(|r| r.needs_sequence()).count() as u64;
        if missing == 0 {
            return Ok(());
        }
        let ids = next_sequence_ids(ctx, self.table(), missing).await?;
        for (record, id) in records.iter_mut().filter(|r| r.needs_sequence()).zip(ids) {
            record.set_sequence(id);
        }
        Ok(())
    }
}

fn display_shard(shard: Option<ShardId>) -> String {
    shard.map_or_else(|| "master".to_string(), |s| s.to_string())
}
