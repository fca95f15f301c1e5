use tracing::{debug, info};

use super::WeightTable;
use crate::cache::{Expiry, LocalCache};
use crate::core::{DbError, Mode, Result, Row, ShardId, Statement, Value};
use crate::facade::RequestContext;
use crate::metadata::{ShardType, TableMetadata};
use crate::query::{InsertBuilder, SelectBuilder};

pub const USER_SHARD_TABLE: &str = "user_shard";

/// Maps partition keys to shard ids through the `user_shard` table.
pub struct ShardResolver {
    cache: LocalCache<ShardId>,
    weights: WeightTable<ShardId>,
}

impl ShardResolver {
    pub fn new(weights: WeightTable<ShardId>) -> Self {
        Self {
            cache: LocalCache::with_default_expiry(Expiry::Never),
            weights,
        }
    }

    /// Weighted draw of a shard for a new key.
    pub fn choose_shard(&self) -> ShardId {
        self.weights.pick()
    }

    /// Seed the cache with a known assignment.
    pub fn remember(&self, key: &Value, shard: ShardId) -> Result<()> {
        self.cache.set(shard, USER_SHARD_TABLE, &[&key.to_key()])
    }

    pub fn cached(&self, key: &Value) -> Result<Option<ShardId>> {
        self.cache.get(USER_SHARD_TABLE, &[&key.to_key()])
    }

    /// Shard holding `key` for the given table; `None` for unsharded tables.
    pub async fn resolve(
        &self,
        ctx: &mut RequestContext,
        meta: &TableMetadata,
        key: &Value,
    ) -> Result<Option<ShardId>> {
        if !meta.is_sharded() {
            return Ok(None);
        }
        match meta.shard_type {
            ShardType::User => self.resolve_user(ctx, key).await.map(Some),
            ShardType::Group => Err(DbError::NotConfigured(format!(
                "group sharding is not supported for '{}'",
                meta.table_name
            ))),
            ShardType::None => Err(DbError::NotConfigured(format!(
                "sharded table '{}' has no shard_type",
                meta.table_name
            ))),
        }
    }

    async fn resolve_user(&self, ctx: &mut RequestContext, key: &Value) -> Result<ShardId> {
        if let Some(shard) = ctx.pending_assignment(key) {
            return Ok(shard);
        }
        if let Some(shard) = self.cached(key)? {
            return Ok(shard);
        }

        let statement = lookup_statement(key, false)?;
        let rows = ctx.connection(Mode::Read, None)?.fetch_all(&statement).await?;
        let shard = shard_from_rows(&rows, key)?;
        self.remember(key, shard)?;
        debug!(key = %key, %shard, "shard assignment loaded");
        Ok(shard)
    }

    /// Persist a fresh assignment for `key` in the request's master write
    /// transaction and return the stored shard. A concurrent assignment of
    /// the same key wins over the drawn shard.
    ///
    /// The cache sees the assignment only after the master write commits.
    pub async fn assign(&self, ctx: &mut RequestContext, key: &Value) -> Result<ShardId> {
        if let Some(shard) = ctx.pending_assignment(key) {
            return Ok(shard);
        }

        let drawn = self.choose_shard();
        let insert = InsertBuilder::new(USER_SHARD_TABLE)
            .ignore()
            .columns(["id", "shard_id"])
            .values(vec![key.clone(), drawn.into()])
            .build()?;
        // A locking read sees the latest committed row even when the
        // transaction already holds a read view.
        let lookup = lookup_statement(key, true)?;

        let tx = ctx.transaction(Mode::Write, None).await?;
        tx.execute(&insert).await?;
        let rows = tx.fetch_all(&lookup).await?;
        let shard = shard_from_rows(&rows, key)?;

        if shard != drawn {
            info!(key = %key, drawn = %drawn, stored = %shard, "key already assigned");
        }
        ctx.record_assignment(key, shard);
        Ok(shard)
    }

    /// Move committed assignments into the shared cache.
    pub(crate) fn publish(&self, assignments: impl IntoIterator<Item = (String, ShardId)>) -> Result<()> {
        for (key, shard) in assignments {
            self.cache.set(shard, USER_SHARD_TABLE, &[&key])?;
        }
        Ok(())
    }
}

fn lookup_statement(key: &Value, for_update: bool) -> Result<Statement> {
    SelectBuilder::new(USER_SHARD_TABLE)
        .columns(["id", "shard_id"])
        .where_eq(vec![("id".to_string(), key.clone())])
        .for_update(for_update)
        .build()
}

fn shard_from_rows(rows: &[Row], key: &Value) -> Result<ShardId> {
    let row = rows
        .first()
        .ok_or_else(|| DbError::NotAssigned(key.to_key()))?;
    let stored: Option<i64> = row.get_as("shard_id")?;
    stored
        .and_then(ShardId::from_stored)
        .ok_or_else(|| DbError::NotAssigned(key.to_key()))
}
