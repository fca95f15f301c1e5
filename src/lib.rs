// ============================================================================
// gameshard: data access for a sharded MySQL game backend
// ============================================================================
//
// A process-wide `Coordinator` owns the connection topology (master, shards,
// weighted replicas) and the shared caches. Each inbound request takes a
// `RequestContext`, which lazily opens up to four transactions (master or
// shards, write or read) and commits or rolls them back together.
//
// ```ignore
// let coordinator = Coordinator::connect(GameConfig::load()?).await?;
// let mut ctx = coordinator.begin_request()?;
// let users = RecordExecutor::<UserItem>::new();
// let result = users.create(&mut ctx, &mut item).await;
// if result.is_ok() {
//     ctx.commit().await?;
// }
// ctx.rollback().await?;
// ```

extern crate self as gameshard;

pub mod cache;
pub mod config;
pub mod connection;
pub mod core;
pub mod executor;
pub mod facade;
pub mod metadata;
pub mod query;
pub mod record;
pub mod routing;
pub mod topology;
pub mod transaction;

// Re-export main types for convenience
pub use config::GameConfig;
pub use core::{DbError, ErrorKind, FromValue, Mode, Result, Row, ShardId, Statement, Value};
pub use executor::{Options, RecordExecutor};
pub use facade::{Coordinator, RequestContext};
pub use query::{Condition, Conjunction, Operand, Operator, OrderBy, Predicate, WhereCondition};
pub use record::{ColumnDef, Record, RecordSchema};
pub use transaction::{CommitReport, ShardTxPolicy, TxTarget};

pub use gameshard_derive::Record;
