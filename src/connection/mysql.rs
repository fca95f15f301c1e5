use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Executor, MySql, QueryBuilder, Row as _, TypeInfo, ValueRef};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{Connector, Database, Target, Transaction};
use crate::core::{DbError, Result, Row, Statement, Value};

/// Opens one `MySqlPool` per target.
#[derive(Debug, Clone, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, target: &Target) -> Result<Arc<dyn Database>> {
        target
            .validate()
            .map_err(|message| DbError::connect(target.label(), message))?;

        let options = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.username)
            .password(&target.password)
            .database(&target.database);

        let mut pool_options = MySqlPoolOptions::new()
            .max_connections(target.max_connections)
            .min_connections(target.min_connections)
            .acquire_timeout(target.connect_timeout)
            .idle_timeout(target.idle_timeout)
            .max_lifetime(target.max_lifetime);

        let directives = Arc::new(target.session_directives());
        if !directives.is_empty() {
            pool_options = pool_options.after_connect(move |conn, _meta| {
                let directives = Arc::clone(&directives);
                Box::pin(async move {
                    for directive in directives.iter() {
                        (&mut *conn).execute(directive.as_str()).await?;
                    }
                    Ok(())
                })
            });
        }

        let pool = pool_options.connect_with(options).await.map_err(|err| {
            error!(db = %target.label(), url = %target.to_url(), "connect failed: {}", err);
            DbError::connect(target.label(), err.to_string())
        })?;

        info!(db = %target.label(), read_only = target.read_only, "connected");

        Ok(Arc::new(MySqlDatabase {
            target: target.clone(),
            pool,
        }))
    }
}

pub struct MySqlDatabase {
    target: Target,
    pool: MySqlPool,
}

#[async_trait]
impl Database for MySqlDatabase {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| DbError::transaction(format!("{}: begin: {}", self.target.label(), err)))?;
        Ok(Box::new(MySqlTransaction {
            target: self.target.clone(),
            tx,
        }))
    }

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>> {
        debug!(db = %self.target.label(), sql = %statement, "fetch");
        let mut builder = render(statement)?;
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|err| DbError::execution(format!("{}: {}", self.target.label(), err)))?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        debug!(db = %self.target.label(), sql = %statement, "execute");
        let mut builder = render(statement)?;
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|err| DbError::execution(format!("{}: {}", self.target.label(), err)))?;
        Ok(result.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

pub struct MySqlTransaction {
    target: Target,
    tx: sqlx::Transaction<'static, MySql>,
}

#[async_trait]
impl Transaction for MySqlTransaction {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        debug!(db = %self.target.label(), sql = %statement, "fetch in transaction");
        let mut builder = render(statement)?;
        let rows = builder
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| DbError::execution(format!("{}: {}", self.target.label(), err)))?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        debug!(db = %self.target.label(), sql = %statement, "execute in transaction");
        let mut builder = render(statement)?;
        let result = builder
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|err| DbError::execution(format!("{}: {}", self.target.label(), err)))?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let label = self.target.label();
        self.tx
            .commit()
            .await
            .map_err(|err| DbError::transaction(format!("{}: commit: {}", label, err)))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let label = self.target.label();
        self.tx
            .rollback()
            .await
            .map_err(|err| DbError::transaction(format!("{}: rollback: {}", label, err)))
    }
}

/// Render a `Statement` into a `QueryBuilder`, binding one argument per
/// `?` placeholder. Placeholders inside quoted text are left alone.
fn render(statement: &Statement) -> Result<QueryBuilder<'static, MySql>> {
    let fragments = split_placeholders(&statement.sql);
    if fragments.len() != statement.args.len() + 1 {
        return Err(DbError::execution(format!(
            "statement has {} placeholders but {} arguments: {}",
            fragments.len() - 1,
            statement.args.len(),
            statement.sql
        )));
    }

    let mut builder = QueryBuilder::new(fragments[0]);
    for (arg, fragment) in statement.args.iter().zip(&fragments[1..]) {
        push_value(&mut builder, arg);
        builder.push(*fragment);
    }
    Ok(builder)
}

fn push_value(builder: &mut QueryBuilder<'static, MySql>, value: &Value) {
    match value {
        Value::Null => builder.push_bind(None::<String>),
        Value::Integer(v) => builder.push_bind(*v),
        Value::Unsigned(v) => builder.push_bind(*v),
        Value::Float(v) => builder.push_bind(*v),
        Value::Text(v) => builder.push_bind(v.clone()),
        Value::Boolean(v) => builder.push_bind(*v),
        Value::Timestamp(v) => builder.push_bind(*v),
    };
}

fn split_placeholders(sql: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut quote = None;
    let mut start = 0;
    for (index, ch) in sql.char_indices() {
        match (quote, ch) {
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (Some(open), _) if open == ch => quote = None,
            (None, '?') => {
                fragments.push(&sql[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    fragments.push(&sql[start..]);
    fragments
}

fn decode_row(row: &MySqlRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for column in row.columns() {
        let index = column.ordinal();
        let value = decode_column(row, index, column.type_info().name()).map_err(|err| {
            DbError::TypeMismatch(format!("column '{}': {}", column.name(), err))
        })?;
        columns.push(column.name().to_string());
        values.push(value);
    }
    Ok(Row::new(columns, values))
}

fn decode_column(
    row: &MySqlRow,
    index: usize,
    type_name: &str,
) -> std::result::Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name {
        "BOOLEAN" => Value::Boolean(row.try_get(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            Value::Integer(row.try_get::<i64, _>(index)?)
        }
        name if name.ends_with("UNSIGNED") => Value::Unsigned(row.try_get::<u64, _>(index)?),
        "FLOAT" => Value::Float(f64::from(row.try_get::<f32, _>(index)?)),
        "DOUBLE" => Value::Float(row.try_get::<f64, _>(index)?),
        "DATETIME" | "TIMESTAMP" => Value::Timestamp(row.try_get(index)?),
        "DATE" => {
            let date: chrono::NaiveDate = row.try_get(index)?;
            Value::Timestamp(date.and_time(chrono::NaiveTime::MIN))
        }
        _ => Value::Text(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_binds_each_placeholder() {
        let statement = Statement::new(
            "SELECT id FROM user_item WHERE user_id = ? AND item_id IN (?, ?)",
            vec![Value::from(42u64), Value::from(1u32), Value::from(2u32)],
        );
        let builder = render(&statement).unwrap();
        assert_eq!(builder.sql(), statement.sql);
    }

    #[test]
    fn test_render_skips_quoted_question_marks() {
        let statement = Statement::new(
            "UPDATE user SET name = ? WHERE note = 'why?'",
            vec![Value::from("knight")],
        );
        let builder = render(&statement).unwrap();
        assert_eq!(builder.sql(), statement.sql);
    }

    #[test]
    fn test_render_rejects_argument_count_mismatch() {
        let statement = Statement::new("DELETE FROM user WHERE id = ?", vec![]);
        let err = render(&statement).err().unwrap();
        assert!(err.to_string().contains("1 placeholders but 0 arguments"));
    }
}
