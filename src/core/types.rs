use std::fmt;
use std::str::FromStr;

use super::{DbError, FromValue, Result, Value};

/// A result row: column names in select order with their cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|name| name == column)
            .map(|idx| &self.values[idx])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_as<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self.get(column).ok_or_else(|| {
            DbError::SchemaError(format!("column '{}' missing from result row", column))
        })?;
        T::from_value(value)
            .map_err(|err| DbError::TypeMismatch(format!("column '{}': {}", column, err)))
    }
}

/// Parameterized SQL plus its positional arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(|v| v.to_string()).collect();
            write!(f, " [{}]", args.join(", "))?;
        }
        Ok(())
    }
}

/// Identifier of a shard database. Zero and negatives never denote a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(u32);

impl ShardId {
    pub fn new(id: u32) -> Result<Self> {
        if id == 0 {
            return Err(DbError::InvalidOption("shard id must be >= 1".into()));
        }
        Ok(Self(id))
    }

    /// Interpret a stored shard id; values <= 0 yield `None`.
    pub fn from_stored(id: i64) -> Option<Self> {
        u32::try_from(id).ok().filter(|id| *id > 0).map(Self)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ShardId> for Value {
    fn from(id: ShardId) -> Self {
        Value::Integer(i64::from(id.0))
    }
}

/// Which physical target serves an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    Write,
    #[default]
    Read,
    Backup,
}

impl Mode {
    pub fn is_write(&self) -> bool {
        matches!(self, Mode::Write)
    }
}

impl FromStr for Mode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "W" => Ok(Mode::Write),
            "R" => Ok(Mode::Read),
            "BAK" => Ok(Mode::Backup),
            other => Err(DbError::InvalidOption(format!(
                "invalid mode '{}', expected W, R or BAK",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Write => write!(f, "W"),
            Mode::Read => write!(f, "R"),
            Mode::Backup => write!(f, "BAK"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("W".parse::<Mode>().unwrap(), Mode::Write);
        assert_eq!("R".parse::<Mode>().unwrap(), Mode::Read);
        assert_eq!("BAK".parse::<Mode>().unwrap(), Mode::Backup);
        assert!(matches!(
            "w".parse::<Mode>(),
            Err(DbError::InvalidOption(_))
        ));
        assert_eq!(Mode::default(), Mode::Read);
    }

    #[test]
    fn test_shard_id_rejects_zero() {
        assert!(ShardId::new(0).is_err());
        assert_eq!(ShardId::new(2).unwrap().get(), 2);
        assert_eq!(ShardId::from_stored(0), None);
        assert_eq!(ShardId::from_stored(-3), None);
        assert_eq!(ShardId::from_stored(1).map(|s| s.get()), Some(1));
    }

    #[test]
    fn test_row_lookup() {
        let row = Row::from_pairs([("id", Value::Integer(5)), ("name", Value::from("bob"))]);
        assert_eq!(row.get_as::<u64>("id").unwrap(), 5);
        assert_eq!(row.get_as::<String>("name").unwrap(), "bob");
        assert!(matches!(
            row.get_as::<i64>("missing"),
            Err(DbError::SchemaError(_))
        ));
        assert!(matches!(
            row.get_as::<i64>("name"),
            Err(DbError::TypeMismatch(_))
        ));
    }
}
