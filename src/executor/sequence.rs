use tracing::debug;

use crate::core::{DbError, Mode, Result, Statement, Value};
use crate::facade::RequestContext;
use crate::query::validate_identifier;

/// Prefix of the per-table sequence tables on the master database.
pub const SEQUENCE_TABLE_PREFIX: &str = "seq_";

pub fn sequence_table(table: &str) -> String {
    format!("{}{}", SEQUENCE_TABLE_PREFIX, table)
}

/// Reserve `count` consecutive ids for `table`, in ascending order.
///
/// Runs inside the request's master write transaction. The UPDATE holds the
/// sequence row lock until that transaction ends, so concurrent writers to
/// the same table queue behind it.
pub async fn next_sequence_ids(ctx: &mut RequestContext, table: &str, count: u64) -> Result<Vec<u64>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let seq_table = sequence_table(table);
    validate_identifier(&seq_table)?;

    let bump = Statement::new(
        format!("UPDATE {} SET id = id + ?", seq_table),
        vec![Value::Unsigned(count)],
    );
    let read = Statement::raw(format!("SELECT MAX(id) AS id FROM {}", seq_table));

    let tx = ctx.transaction(Mode::Write, None).await?;
    if tx.execute(&bump).await? == 0 {
        return Err(DbError::NotConfigured(format!(
            "sequence table '{}' has no row",
            seq_table
        )));
    }
    let rows = tx.fetch_all(&read).await?;
    let last: Option<u64> = match rows.first() {
        Some(row) => row.get_as("id")?,
        None => None,
    };
    let last = last.ok_or_else(|| {
        DbError::NotConfigured(format!("sequence table '{}' is empty", seq_table))
    })?;
    if last < count {
        return Err(DbError::execution(format!(
            "sequence '{}' returned {} after reserving {}",
            seq_table, last, count
        )));
    }

    debug!(table, first = last + 1 - count, last, "sequence ids reserved");
    Ok((last + 1 - count..=last).collect())
}
