use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{CommitOutcome, CommitReport, SlotState, TxTarget};
use crate::connection::Transaction;
use crate::core::{DbError, Result, ShardId};
use crate::topology::Topology;

/// How a shard slot opens its transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardTxPolicy {
    /// Starting a shard slot opens a transaction on every shard.
    #[default]
    AllShards,
    /// Shard transactions open on first use of each shard.
    Lazy,
}

#[derive(Default)]
struct Slot {
    state: SlotState,
    master: Option<Box<dyn Transaction>>,
    shards: BTreeMap<ShardId, Box<dyn Transaction>>,
}

impl Slot {
    fn open_count(&self) -> usize {
        usize::from(self.master.is_some()) + self.shards.len()
    }

    /// Take every live transaction out of the slot, master first.
    fn drain(&mut self) -> Vec<(Option<ShardId>, Box<dyn Transaction>)> {
        let mut drained = Vec::with_capacity(self.open_count());
        if let Some(tx) = self.master.take() {
            drained.push((None, tx));
        }
        drained.extend(
            std::mem::take(&mut self.shards)
                .into_iter()
                .map(|(id, tx)| (Some(id), tx)),
        );
        drained
    }
}

/// The transactions held by one request.
///
/// Slots start lazily and are closed by `commit` or `rollback`. A closed
/// slot may be started again within the same request.
pub struct TransactionSet {
    policy: ShardTxPolicy,
    master_write: Slot,
    master_read: Slot,
    shard_write: Slot,
    shard_read: Slot,
}

impl TransactionSet {
    pub fn new(policy: ShardTxPolicy) -> Self {
        Self {
            policy,
            master_write: Slot::default(),
            master_read: Slot::default(),
            shard_write: Slot::default(),
            shard_read: Slot::default(),
        }
    }

    pub fn policy(&self) -> ShardTxPolicy {
        self.policy
    }

    fn slot(&self, target: TxTarget) -> &Slot {
        match target {
            TxTarget::MasterWrite => &self.master_write,
            TxTarget::MasterRead => &self.master_read,
            TxTarget::ShardWrite => &self.shard_write,
            TxTarget::ShardRead => &self.shard_read,
        }
    }

    fn slot_mut(&mut self, target: TxTarget) -> &mut Slot {
        match target {
            TxTarget::MasterWrite => &mut self.master_write,
            TxTarget::MasterRead => &mut self.master_read,
            TxTarget::ShardWrite => &mut self.shard_write,
            TxTarget::ShardRead => &mut self.shard_read,
        }
    }

    pub fn state(&self, target: TxTarget) -> SlotState {
        self.slot(target).state
    }

    /// Number of live transactions across all slots.
    pub fn open_count(&self) -> usize {
        TxTarget::ALL
            .iter()
            .map(|target| self.slot(*target).open_count())
            .sum()
    }

    /// Shards with a live transaction in the given slot.
    pub fn open_shards(&self, target: TxTarget) -> Vec<ShardId> {
        self.slot(target).shards.keys().copied().collect()
    }

    /// Start a slot. Does nothing when it is already started.
    pub async fn start(&mut self, target: TxTarget, topology: &Topology, replica: usize) -> Result<()> {
        if self.slot(target).state.is_started() {
            return Ok(());
        }

        let mode = target.mode();
        if !target.is_shard() {
            let tx = topology.master(mode, replica)?.begin().await?;
            let slot = self.slot_mut(target);
            slot.master = Some(tx);
            slot.state = SlotState::Started;
            debug!(slot = %target, "transaction started");
            return Ok(());
        }

        if self.policy == ShardTxPolicy::AllShards {
            let mut opened = BTreeMap::new();
            for (shard, db) in topology.shards(mode, replica)? {
                match db.begin().await {
                    Ok(tx) => {
                        opened.insert(*shard, tx);
                    }
                    Err(err) => {
                        for (_, tx) in opened {
                            if let Err(rollback_err) = tx.rollback().await {
                                warn!(slot = %target, "rollback after failed start: {}", rollback_err);
                            }
                        }
                        return Err(err);
                    }
                }
            }
            self.slot_mut(target).shards = opened;
        }

        self.slot_mut(target).state = SlotState::Started;
        debug!(slot = %target, policy = ?self.policy, "shard transactions started");
        Ok(())
    }

    /// Start the slot if needed and return its transaction for `shard`.
    pub async fn get_or_start(
        &mut self,
        target: TxTarget,
        shard: Option<ShardId>,
        topology: &Topology,
        replica: usize,
    ) -> Result<&mut dyn Transaction> {
        self.start(target, topology, replica).await?;

        if !target.is_shard() {
            return match self.slot_mut(target).master.as_deref_mut() {
                Some(tx) => Ok(tx),
                None => Err(DbError::transaction(format!(
                    "not found transaction for {}",
                    target
                ))),
            };
        }

        let shard = shard.ok_or_else(|| {
            DbError::InvalidOption(format!("{} requires a shard id", target))
        })?;

        if self.policy == ShardTxPolicy::Lazy && !self.slot(target).shards.contains_key(&shard) {
            let tx = topology.shard(target.mode(), replica, shard)?.begin().await?;
            self.slot_mut(target).shards.insert(shard, tx);
        }

        match self.slot_mut(target).shards.get_mut(&shard) {
            Some(tx) => Ok(tx.as_mut()),
            None => Err(DbError::transaction(format!(
                "not found transaction for {} shard {}",
                target, shard
            ))),
        }
    }

    /// Commit the write slots, then roll back the read slots.
    ///
    /// Every started shard is committed even when an earlier commit failed.
    /// Any failure turns the result into `DbError::PartialCommit` carrying the
    /// full report.
    pub async fn commit(&mut self) -> Result<CommitReport> {
        let mut report = CommitReport::default();

        for target in [TxTarget::MasterWrite, TxTarget::ShardWrite] {
            let slot = self.slot_mut(target);
            if !slot.state.is_started() {
                continue;
            }
            let drained = slot.drain();
            slot.state = SlotState::Closed;

            for (shard, tx) in drained {
                let error = tx.commit().await.err().map(|err| err.to_string());
                if let Some(error) = &error {
                    warn!(slot = %target, shard = ?shard, "commit failed: {}", error);
                }
                report.push(CommitOutcome { target, shard, error });
            }
        }

        for target in [TxTarget::MasterRead, TxTarget::ShardRead] {
            if let Err(err) = self.rollback_slot(target).await {
                warn!(slot = %target, "read rollback after commit failed: {}", err);
            }
        }

        if report.is_success() {
            debug!("{}", report);
            Ok(report)
        } else {
            warn!("partial commit: {}", report);
            Err(DbError::PartialCommit(report))
        }
    }

    /// Roll back every slot and leave all of them closed.
    ///
    /// Slots that never started perform no I/O. Safe to call repeatedly.
    pub async fn rollback(&mut self) -> Result<()> {
        let mut last_error = None;
        for target in TxTarget::ALL {
            if let Err(err) = self.rollback_slot(target).await {
                warn!(slot = %target, "rollback failed: {}", err);
                last_error = Some(err);
            }
            self.slot_mut(target).state = SlotState::Closed;
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Roll back a started slot. Unstarted slots keep their state.
    async fn rollback_slot(&mut self, target: TxTarget) -> Result<()> {
        let slot = self.slot_mut(target);
        if !slot.state.is_started() {
            return Ok(());
        }
        let drained = slot.drain();
        slot.state = SlotState::Closed;

        let mut last_error = None;
        for (_, tx) in drained {
            if let Err(err) = tx.rollback().await {
                last_error = Some(err);
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for TransactionSet {
    fn drop(&mut self) {
        let open = self.open_count();
        if open > 0 {
            warn!(open, "transaction set dropped with live transactions; they will be rolled back");
        }
    }
}
