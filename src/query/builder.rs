use super::{OrderByCondition, WhereCondition, validate_identifier};
use crate::core::{DbError, Result, Statement, Value};

/// Accumulated WHERE clause: rendered SQL fragments joined with AND.
#[derive(Debug, Clone, Default)]
struct Filter {
    parts: Vec<String>,
    args: Vec<Value>,
}

impl Filter {
    fn push_eq(&mut self, pairs: Vec<(String, Value)>) {
        for (column, value) in pairs {
            self.parts.push(format!("{} = ?", column));
            self.args.push(value);
        }
    }

    fn push_condition(&mut self, condition: &WhereCondition) -> Result<()> {
        if condition.is_empty() {
            return Ok(());
        }
        let (sql, args) = condition.to_sql()?;
        if self.parts.is_empty() {
            self.parts.push(sql);
        } else {
            self.parts.push(format!("({})", sql));
        }
        self.args.extend(args);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn write(&self, sql: &mut String, args: &mut Vec<Value>) {
        if self.is_empty() {
            return;
        }
        sql.push_str(" WHERE ");
        sql.push_str(&self.parts.join(" AND "));
        args.extend(self.args.iter().cloned());
    }
}

fn validate_columns<'a>(columns: impl IntoIterator<Item = &'a String>) -> Result<()> {
    for column in columns {
        validate_identifier(column)?;
    }
    Ok(())
}

fn placeholders(count: usize) -> String {
    format!("({})", vec!["?"; count].join(", "))
}

#[derive(Debug, Clone)]
pub struct SelectBuilder {
    table: String,
    columns: Vec<String>,
    count: bool,
    filter: Filter,
    pending_condition: Option<WhereCondition>,
    order: OrderByCondition,
    for_update: bool,
}

impl SelectBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            count: false,
            filter: Filter::default(),
            pending_condition: None,
            order: OrderByCondition::default(),
            for_update: false,
        }
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Select `COUNT(1)` instead of columns.
    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn where_eq(mut self, pairs: Vec<(String, Value)>) -> Self {
        self.filter.push_eq(pairs);
        self
    }

    pub fn filter(mut self, condition: &WhereCondition) -> Self {
        self.pending_condition = Some(condition.clone());
        self
    }

    pub fn order_by(mut self, order: &OrderByCondition) -> Self {
        self.order = order.clone();
        self
    }

    pub fn for_update(mut self, for_update: bool) -> Self {
        self.for_update = for_update;
        self
    }

    pub fn build(mut self) -> Result<Statement> {
        validate_identifier(&self.table)?;
        if let Some(condition) = self.pending_condition.take() {
            self.filter.push_condition(&condition)?;
        }

        let projection = if self.count {
            "COUNT(1)".to_string()
        } else {
            if self.columns.is_empty() {
                return Err(DbError::SchemaError(format!(
                    "SELECT on '{}' has no columns",
                    self.table
                )));
            }
            validate_columns(&self.columns)?;
            self.columns.join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", projection, self.table);
        let mut args = Vec::new();
        self.filter.write(&mut sql, &mut args);
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.to_sql()?);
        }
        if self.for_update {
            sql.push_str(" FOR UPDATE");
        }
        Ok(Statement::new(sql, args))
    }
}

#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    ignore: bool,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    on_duplicate: Vec<(String, Value)>,
}

impl InsertBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ignore: false,
            columns: Vec::new(),
            rows: Vec::new(),
            on_duplicate: Vec::new(),
        }
    }

    /// `INSERT IGNORE`: duplicate keys are skipped without error.
    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append one row of values.
    pub fn values(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    /// `ON DUPLICATE KEY UPDATE col = ?, ...`
    pub fn on_duplicate_update(mut self, assignments: Vec<(String, Value)>) -> Self {
        self.on_duplicate = assignments;
        self
    }

    pub fn build(self) -> Result<Statement> {
        validate_identifier(&self.table)?;
        validate_columns(&self.columns)?;
        validate_columns(self.on_duplicate.iter().map(|(column, _)| column))?;
        if self.columns.is_empty() || self.rows.is_empty() {
            return Err(DbError::SchemaError(format!(
                "INSERT into '{}' needs columns and at least one row",
                self.table
            )));
        }
        if let Some(row) = self.rows.iter().find(|row| row.len() != self.columns.len()) {
            return Err(DbError::SchemaError(format!(
                "INSERT into '{}' has {} columns but a row with {} values",
                self.table,
                self.columns.len(),
                row.len()
            )));
        }

        let row_placeholders = placeholders(self.columns.len());
        let mut sql = format!(
            "INSERT {}INTO {} ({}) VALUES {}",
            if self.ignore { "IGNORE " } else { "" },
            self.table,
            self.columns.join(", "),
            vec![row_placeholders.as_str(); self.rows.len()].join(", ")
        );
        let mut args: Vec<Value> = self.rows.into_iter().flatten().collect();

        if !self.on_duplicate.is_empty() {
            let assignments: Vec<String> = self
                .on_duplicate
                .iter()
                .map(|(column, _)| format!("{} = ?", column))
                .collect();
            sql.push_str(" ON DUPLICATE KEY UPDATE ");
            sql.push_str(&assignments.join(", "));
            args.extend(self.on_duplicate.into_iter().map(|(_, value)| value));
        }
        Ok(Statement::new(sql, args))
    }
}

#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    assignments: Vec<(String, Value)>,
    filter: Filter,
}

impl UpdateBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            filter: Filter::default(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: Value) -> Self {
        self.assignments.push((column.into(), value));
        self
    }

    pub fn set_all(mut self, assignments: Vec<(String, Value)>) -> Self {
        self.assignments.extend(assignments);
        self
    }

    pub fn where_eq(mut self, pairs: Vec<(String, Value)>) -> Self {
        self.filter.push_eq(pairs);
        self
    }

    pub fn build(self) -> Result<Statement> {
        validate_identifier(&self.table)?;
        validate_columns(self.assignments.iter().map(|(column, _)| column))?;
        if self.assignments.is_empty() {
            return Err(DbError::SchemaError(format!(
                "UPDATE on '{}' has nothing to set",
                self.table
            )));
        }
        if self.filter.is_empty() {
            return Err(DbError::SchemaError(format!(
                "UPDATE on '{}' requires a WHERE clause",
                self.table
            )));
        }

        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect();
        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        let mut args: Vec<Value> = self.assignments.into_iter().map(|(_, value)| value).collect();
        self.filter.write(&mut sql, &mut args);
        Ok(Statement::new(sql, args))
    }
}

#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    filter: Filter,
}

impl DeleteBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: Filter::default(),
        }
    }

    pub fn where_eq(mut self, pairs: Vec<(String, Value)>) -> Self {
        self.filter.push_eq(pairs);
        self
    }

    pub fn build(self) -> Result<Statement> {
        validate_identifier(&self.table)?;
        if self.filter.is_empty() {
            return Err(DbError::SchemaError(format!(
                "DELETE on '{}' requires a WHERE clause",
                self.table
            )));
        }
        let mut sql = format!("DELETE FROM {}", self.table);
        let mut args = Vec::new();
        self.filter.write(&mut sql, &mut args);
        Ok(Statement::new(sql, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderBy, Predicate};

    fn pk(id: i64) -> Vec<(String, Value)> {
        vec![("id".to_string(), Value::Integer(id))]
    }

    #[test]
    fn test_select_by_primary_key_for_update() {
        let statement = SelectBuilder::new("user")
            .columns(["id", "name"])
            .where_eq(pk(7))
            .for_update(true)
            .build()
            .unwrap();
        assert_eq!(statement.sql, "SELECT id, name FROM user WHERE id = ? FOR UPDATE");
        assert_eq!(statement.args, vec![Value::Integer(7)]);
    }

    #[test]
    fn test_select_with_condition_and_order() {
        let condition = WhereCondition::new()
            .with(Predicate::equals("user_id", 1).or())
            .with(Predicate::equals("user_id", 2));
        let statement = SelectBuilder::new("user_item")
            .columns(["id"])
            .where_eq(vec![("kind".to_string(), Value::Integer(3))])
            .filter(&condition)
            .order_by(&OrderByCondition::new().with(OrderBy::desc("id")))
            .build()
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT id FROM user_item WHERE kind = ? AND (user_id = ? OR user_id = ?) ORDER BY id DESC"
        );
        assert_eq!(statement.args.len(), 3);
    }

    #[test]
    fn test_count() {
        let statement = SelectBuilder::new("user_item")
            .count()
            .filter(&WhereCondition::new().with(Predicate::equals("user_id", 5)))
            .build()
            .unwrap();
        assert_eq!(statement.sql, "SELECT COUNT(1) FROM user_item WHERE user_id = ?");
    }

    #[test]
    fn test_insert_ignore_multi_row() {
        let statement = InsertBuilder::new("user_item")
            .ignore()
            .columns(["id", "user_id"])
            .values(vec![Value::Integer(1), Value::Integer(9)])
            .values(vec![Value::Integer(2), Value::Integer(9)])
            .build()
            .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT IGNORE INTO user_item (id, user_id) VALUES (?, ?), (?, ?)"
        );
        assert_eq!(statement.args.len(), 4);
    }

    #[test]
    fn test_insert_on_duplicate() {
        let statement = InsertBuilder::new("user")
            .columns(["id", "name"])
            .values(vec![Value::Integer(1), Value::from("a")])
            .on_duplicate_update(vec![("name".to_string(), Value::from("a"))])
            .build()
            .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO user (id, name) VALUES (?, ?) ON DUPLICATE KEY UPDATE name = ?"
        );
        assert_eq!(statement.args.len(), 3);
    }

    #[test]
    fn test_insert_rejects_ragged_rows() {
        let result = InsertBuilder::new("t")
            .columns(["a", "b"])
            .values(vec![Value::Integer(1)])
            .build();
        assert!(matches!(result, Err(DbError::SchemaError(_))));
    }

    #[test]
    fn test_update_and_delete_require_where() {
        let update = UpdateBuilder::new("user")
            .set("name", Value::from("b"))
            .where_eq(pk(1))
            .build()
            .unwrap();
        assert_eq!(update.sql, "UPDATE user SET name = ? WHERE id = ?");
        assert_eq!(update.args, vec![Value::from("b"), Value::Integer(1)]);

        assert!(UpdateBuilder::new("user").set("name", Value::Null).build().is_err());
        assert!(DeleteBuilder::new("user").build().is_err());

        let delete = DeleteBuilder::new("user").where_eq(pk(4)).build().unwrap();
        assert_eq!(delete.sql, "DELETE FROM user WHERE id = ?");
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        assert!(SelectBuilder::new("user; DROP TABLE x").columns(["id"]).build().is_err());
        assert!(SelectBuilder::new("user").columns(["id,name"]).build().is_err());
    }
}
