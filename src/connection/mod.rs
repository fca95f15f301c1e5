pub mod config;
pub mod mock;
pub mod mysql;

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{Result, Row, Statement};

pub use config::{Role, Target};
pub use mock::{MockConnector, MockEvent, MockReply, MockStatement};
pub use mysql::MySqlConnector;

/// A pooled, non-transactional handle to one target.
///
/// Implementations must be cheap to share: the topology hands out
/// `Arc<dyn Database>` to every request.
#[async_trait]
pub trait Database: Send + Sync {
    fn target(&self) -> &Target;

    /// Open a transaction on a connection drawn from the pool.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>>;

    /// Run a statement and return the affected row count.
    async fn execute(&self, statement: &Statement) -> Result<u64>;

    async fn close(&self) -> Result<()>;
}

/// A live transaction on a single target.
#[async_trait]
pub trait Transaction: Send {
    fn target(&self) -> &Target;

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>>;

    async fn execute(&mut self, statement: &Statement) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Opens databases for targets.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &Target) -> Result<Arc<dyn Database>>;
}
