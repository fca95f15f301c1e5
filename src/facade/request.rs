use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Coordinator;
use crate::connection::{Database, Transaction};
use crate::core::{DbError, Mode, Result, ShardId, Value};
use crate::metadata::TableMetadata;
use crate::transaction::{CommitReport, SlotState, TransactionSet, TxTarget};

/// State owned by one inbound request.
///
/// Holds the replica drawn at request start and the request's transactions.
/// Handlers call `rollback` unconditionally at the end and `commit` only on
/// success.
pub struct RequestContext {
    coordinator: Arc<Coordinator>,
    replica: usize,
    transactions: TransactionSet,
    pending_assignments: HashMap<String, ShardId>,
}

impl RequestContext {
    pub(crate) fn new(coordinator: Arc<Coordinator>, replica: usize) -> Self {
        let transactions = TransactionSet::new(coordinator.policy());
        debug!(replica, "request started");
        Self {
            coordinator,
            replica,
            transactions,
            pending_assignments: HashMap::new(),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn replica(&self) -> usize {
        self.replica
    }

    pub fn transactions(&self) -> &TransactionSet {
        &self.transactions
    }

    pub fn state(&self, target: TxTarget) -> SlotState {
        self.transactions.state(target)
    }

    pub fn shard_count(&self) -> u32 {
        self.coordinator.shard_count()
    }

    /// Start the master or all-shards slot for `mode` ahead of use.
    pub async fn start(&mut self, mode: Mode, sharded: bool) -> Result<()> {
        let target = TxTarget::for_mode(mode, sharded)?;
        self.transactions
            .start(target, self.coordinator.topology(), self.replica)
            .await
    }

    /// Transaction for `mode` on the master (`None`) or on a shard.
    pub async fn transaction(&mut self, mode: Mode, shard: Option<ShardId>) -> Result<&mut dyn Transaction> {
        let target = TxTarget::for_mode(mode, shard.is_some())?;
        self.transactions
            .get_or_start(target, shard, self.coordinator.topology(), self.replica)
            .await
    }

    /// Non-transactional handle for `mode` on the master or a shard.
    pub fn connection(&self, mode: Mode, shard: Option<ShardId>) -> Result<Arc<dyn Database>> {
        let topology = self.coordinator.topology();
        let db = match shard {
            None => topology.master(mode, self.replica)?,
            Some(shard) => topology.shard(mode, self.replica, shard)?,
        };
        Ok(Arc::clone(db))
    }

    /// Commit write transactions and close read ones.
    ///
    /// Shard assignments made in this request become visible to other
    /// requests once the master write transaction has committed.
    pub async fn commit(&mut self) -> Result<CommitReport> {
        let result = self.transactions.commit().await;
        let report = match &result {
            Ok(report) => Some(report),
            Err(DbError::PartialCommit(report)) => Some(report),
            Err(_) => None,
        };
        let pending = std::mem::take(&mut self.pending_assignments);
        if report.is_some_and(CommitReport::master_committed) {
            self.coordinator.shards().publish(pending)?;
        } else if !pending.is_empty() {
            warn!(count = pending.len(), "shard assignments discarded; master write not committed");
        }
        result
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.pending_assignments.clear();
        self.transactions.rollback().await
    }

    pub async fn table_metadata(&mut self, table: &str) -> Result<TableMetadata> {
        let coordinator = Arc::clone(&self.coordinator);
        coordinator.metadata().find(self, table).await
    }

    pub async fn resolve_shard(&mut self, meta: &TableMetadata, key: &Value) -> Result<Option<ShardId>> {
        let coordinator = Arc::clone(&self.coordinator);
        coordinator.shards().resolve(self, meta, key).await
    }

    pub async fn assign_shard(&mut self, key: &Value) -> Result<ShardId> {
        let coordinator = Arc::clone(&self.coordinator);
        coordinator.shards().assign(self, key).await
    }

    pub(crate) fn pending_assignment(&self, key: &Value) -> Option<ShardId> {
        self.pending_assignments.get(&key.to_key()).copied()
    }

    pub(crate) fn record_assignment(&mut self, key: &Value, shard: ShardId) {
        self.pending_assignments.insert(key.to_key(), shard);
    }
}
