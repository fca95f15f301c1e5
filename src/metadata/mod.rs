use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::cache::{Expiry, LocalCache};
use crate::core::{DbError, Mode, Result, Row, Statement};
use crate::facade::RequestContext;

pub const TABLE_CONF_TABLE: &str = "db_table_conf";

/// Where a logical table lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseType {
    Master,
    Shard,
}

impl UseType {
    fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(UseType::Master),
            2 => Ok(UseType::Shard),
            other => Err(DbError::ConfigError(format!("unknown use_type {}", other))),
        }
    }
}

/// Partition-key scheme of a sharded table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardType {
    None,
    User,
    /// Recognized but not routable.
    Group,
}

impl ShardType {
    fn from_code(code: Option<i64>) -> Result<Self> {
        match code {
            None | Some(0) => Ok(ShardType::None),
            Some(1) => Ok(ShardType::User),
            Some(2) => Ok(ShardType::Group),
            Some(other) => Err(DbError::ConfigError(format!("unknown shard_type {}", other))),
        }
    }
}

/// One `db_table_conf` row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub id: i64,
    pub table_name: String,
    pub use_type: UseType,
    pub shard_type: ShardType,
}

impl TableMetadata {
    pub fn master(table_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            table_name: table_name.into(),
            use_type: UseType::Master,
            shard_type: ShardType::None,
        }
    }

    pub fn sharded_by_user(table_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            table_name: table_name.into(),
            use_type: UseType::Shard,
            shard_type: ShardType::User,
        }
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_as("id")?,
            table_name: row.get_as("table_name")?,
            use_type: UseType::from_code(row.get_as("use_type")?)?,
            shard_type: ShardType::from_code(row.get_as("shard_type")?)?,
        })
    }

    pub fn is_sharded(&self) -> bool {
        self.use_type == UseType::Shard
    }
}

type TableMap = Arc<HashMap<String, TableMetadata>>;

/// Process-wide table metadata, loaded on first use and never invalidated.
pub struct MetadataRegistry {
    cache: LocalCache<TableMap>,
}

impl Default for MetadataRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self {
            cache: LocalCache::with_default_expiry(Expiry::Never),
        }
    }

    /// Seed the registry so no `db_table_conf` query is needed.
    pub fn preload(&self, tables: impl IntoIterator<Item = TableMetadata>) -> Result<()> {
        let map = tables
            .into_iter()
            .map(|meta| (meta.table_name.clone(), meta))
            .collect::<HashMap<_, _>>();
        self.cache.set(Arc::new(map), TABLE_CONF_TABLE, &["all"])
    }

    pub fn is_loaded(&self) -> Result<bool> {
        Ok(self.cache.get(TABLE_CONF_TABLE, &["all"])?.is_some())
    }

    pub async fn find(&self, ctx: &mut RequestContext, table: &str) -> Result<TableMetadata> {
        let tables = self
            .cache
            .get_with_setter(move || Self::load_all(ctx), TABLE_CONF_TABLE, &["all"])
            .await?;
        tables.get(table).cloned().ok_or_else(|| {
            DbError::NotConfigured(format!("not found db_table_conf record for '{}'", table))
        })
    }

    async fn load_all(ctx: &mut RequestContext) -> Result<TableMap> {
        let statement = Statement::raw(format!(
            "SELECT id, table_name, use_type, shard_type FROM {}",
            TABLE_CONF_TABLE
        ));
        let rows = ctx
            .transaction(Mode::Read, None)
            .await?
            .fetch_all(&statement)
            .await?;
        if rows.is_empty() {
            return Err(DbError::NotConfigured(format!("{} is empty", TABLE_CONF_TABLE)));
        }
        let map = rows
            .iter()
            .map(|row| TableMetadata::from_row(row).map(|meta| (meta.table_name.clone(), meta)))
            .collect::<Result<HashMap<_, _>>>()?;
        info!(tables = map.len(), "table metadata loaded");
        Ok(Arc::new(map))
    }
}
