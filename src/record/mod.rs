//! Table-mapped record types.
//!
//! A record describes its table once through a [`RecordSchema`], usually
//! generated with `#[derive(Record)]`:
//!
//! ```ignore
//! #[derive(Record, Clone, Debug, PartialEq)]
//! #[record(table = "user_item")]
//! struct UserItem {
//!     #[sql(pk, seq)]
//!     id: u64,
//!     #[sql(shard_key)]
//!     user_id: u64,
//!     item_id: u32,
//!     created_at: Option<NaiveDateTime>,
//! }
//! ```
//!
//! A `#[sql(seq)]` field must be a `u64`; zero means "allocate on insert".

use crate::core::{DbError, Result, Row, Value};
use crate::query::validate_identifier;

/// Columns filled by the store; never written by inserts or updates.
pub const AUDIT_COLUMNS: [&str; 2] = ["created_at", "updated_at"];

pub fn is_audit_column(name: &str) -> bool {
    AUDIT_COLUMNS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub primary_key: bool,
    pub shard_key: bool,
    pub sequence: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: false,
            shard_key: false,
            sequence: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn shard_key(mut self) -> Self {
        self.shard_key = true;
        self
    }

    pub fn sequence(mut self) -> Self {
        self.sequence = true;
        self
    }

    pub fn is_audit(&self) -> bool {
        is_audit_column(&self.name)
    }
}

/// Column layout of a record type, in field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    table: String,
    columns: Vec<ColumnDef>,
}

impl RecordSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)
            .map_err(|err| DbError::SchemaError(format!("table name: {}", err)))?;
        for column in &self.columns {
            validate_identifier(&column.name)
                .map_err(|err| DbError::SchemaError(format!("{}: {}", self.table, err)))?;
        }
        if !self.columns.iter().any(|c| c.primary_key) {
            return Err(DbError::SchemaError(format!(
                "{}: must be set pks",
                self.table
            )));
        }
        if self.columns.iter().filter(|c| c.shard_key).count() > 1 {
            return Err(DbError::SchemaError(format!(
                "{}: multiple shard key",
                self.table
            )));
        }
        if self.columns.iter().filter(|c| c.sequence).count() > 1 {
            return Err(DbError::SchemaError(format!(
                "{}: multiple sequence columns",
                self.table
            )));
        }
        Ok(())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn check_arity(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(DbError::SchemaError(format!(
                "{}: expected {} values, got {}",
                self.table,
                self.columns.len(),
                values.len()
            )));
        }
        Ok(())
    }

    fn pairs_where<'a>(
        &'a self,
        values: &'a [Value],
        keep: impl Fn(&ColumnDef) -> bool + 'a,
    ) -> impl Iterator<Item = (String, Value)> + 'a {
        self.columns
            .iter()
            .zip(values)
            .filter(move |(column, _)| keep(column))
            .map(|(column, value)| (column.name.clone(), value.clone()))
    }

    /// `(column, value)` pairs of the primary key.
    pub fn primary_key_pairs(&self, values: &[Value]) -> Result<Vec<(String, Value)>> {
        self.check_arity(values)?;
        Ok(self.pairs_where(values, |c| c.primary_key).collect())
    }

    pub fn shard_key_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.shard_key)
    }

    /// Value of the shard key column, if the record has one.
    pub fn shard_key_value(&self, values: &[Value]) -> Result<Option<Value>> {
        self.check_arity(values)?;
        Ok(self
            .columns
            .iter()
            .position(|c| c.shard_key)
            .map(|index| values[index].clone()))
    }

    pub fn sequence_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.sequence)
    }

    /// Columns and values written by INSERT: everything except audit columns.
    pub fn insertable(&self, values: &[Value]) -> Result<(Vec<String>, Vec<Value>)> {
        self.check_arity(values)?;
        Ok(self.pairs_where(values, |c| !c.is_audit()).unzip())
    }

    /// Non-key, non-audit `(column, value)` pairs.
    pub fn updatable_pairs(&self, values: &[Value]) -> Result<Vec<(String, Value)>> {
        self.check_arity(values)?;
        Ok(self
            .pairs_where(values, |c| !c.primary_key && !c.is_audit())
            .collect())
    }

    /// Updatable pairs whose value differs from `previous`.
    pub fn changed_pairs(&self, values: &[Value], previous: &[Value]) -> Result<Vec<(String, Value)>> {
        self.check_arity(values)?;
        self.check_arity(previous)?;
        Ok(self
            .columns
            .iter()
            .zip(values.iter().zip(previous))
            .filter(|(column, (new, old))| !column.primary_key && !column.is_audit() && new != old)
            .map(|(column, (new, _))| (column.name.clone(), new.clone()))
            .collect())
    }
}

/// A struct mapped to one table.
pub trait Record: Sized + Send + Sync + 'static {
    fn schema() -> &'static RecordSchema;

    /// Field values in schema column order.
    fn values(&self) -> Vec<Value>;

    fn from_row(row: &Row) -> Result<Self>;

    /// Current value of the `#[sql(seq)]` field.
    fn sequence(&self) -> Option<u64> {
        None
    }

    fn set_sequence(&mut self, _value: u64) {}

    /// True when the record has a sequence field that is still zero.
    fn needs_sequence(&self) -> bool {
        self.sequence() == Some(0)
    }
}
