//! Generic CRUD over [`Record`] types.
//!
//! Every operation looks up the table's metadata, resolves the shard for
//! sharded tables, builds its statement and runs it in the request's
//! transaction for the resolved mode.

mod delete;
mod find;
mod options;
mod sequence;
mod update;
mod write;

use std::marker::PhantomData;

pub use options::Options;
pub use sequence::{SEQUENCE_TABLE_PREFIX, next_sequence_ids, sequence_table};

use options::{ResolvedOptions, Route};

use crate::core::{DbError, Result, ShardId, Value};
use crate::facade::RequestContext;
use crate::metadata::TableMetadata;
use crate::record::{Record, RecordSchema};

pub struct RecordExecutor<R: Record> {
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Default for RecordExecutor<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> RecordExecutor<R> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }

    pub fn schema(&self) -> &'static RecordSchema {
        R::schema()
    }

    fn table(&self) -> &'static str {
        R::schema().table()
    }

    async fn metadata(&self, ctx: &mut RequestContext) -> Result<TableMetadata> {
        let schema = R::schema();
        schema.validate()?;
        ctx.table_metadata(schema.table()).await
    }

    /// Shard for one operation. `record_key` is the shard key value carried by
    /// the record, when there is one.
    async fn route(
        &self,
        ctx: &mut RequestContext,
        meta: &TableMetadata,
        route: &Route,
        record_key: Option<Value>,
    ) -> Result<Option<ShardId>> {
        if !meta.is_sharded() {
            return Ok(None);
        }
        match route {
            Route::Shard(shard) => Ok(Some(*shard)),
            Route::Key(key) => ctx.resolve_shard(meta, key).await,
            Route::Record => match record_key {
                Some(key) if !key.is_null() => ctx.resolve_shard(meta, &key).await,
                _ => Err(DbError::InvalidOption(format!(
                    "'{}' is sharded; a shard key or shard id is required",
                    meta.table_name
                ))),
            },
        }
    }

    async fn route_record(
        &self,
        ctx: &mut RequestContext,
        meta: &TableMetadata,
        options: &ResolvedOptions,
        values: &[Value],
    ) -> Result<Option<ShardId>> {
        let key = R::schema().shard_key_value(values)?;
        self.route(ctx, meta, &options.route, key).await
    }
}
