// ============================================================================
// Transaction Slot State
// ============================================================================
//
// A request owns four slots, one per target group. Each slot follows
//
//   NotStarted ──start──> Started ──commit/rollback──> Closed
//                            ^                            │
//                            └───────────start────────────┘
//
// ============================================================================

use std::fmt;

use crate::core::{DbError, Mode, Result};

/// One of the four transaction groups a request may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TxTarget {
    MasterWrite,
    MasterRead,
    ShardWrite,
    ShardRead,
}

impl TxTarget {
    pub const ALL: [TxTarget; 4] = [
        TxTarget::MasterWrite,
        TxTarget::MasterRead,
        TxTarget::ShardWrite,
        TxTarget::ShardRead,
    ];

    /// Map a mode and table kind to a slot. Backup targets are not wired.
    pub fn for_mode(mode: Mode, sharded: bool) -> Result<Self> {
        match (mode, sharded) {
            (Mode::Write, false) => Ok(TxTarget::MasterWrite),
            (Mode::Read, false) => Ok(TxTarget::MasterRead),
            (Mode::Write, true) => Ok(TxTarget::ShardWrite),
            (Mode::Read, true) => Ok(TxTarget::ShardRead),
            (Mode::Backup, _) => Err(DbError::NotConfigured(
                "backup mode has no configured targets".into(),
            )),
        }
    }

    pub fn is_shard(&self) -> bool {
        matches!(self, TxTarget::ShardWrite | TxTarget::ShardRead)
    }

    pub fn is_write(&self) -> bool {
        matches!(self, TxTarget::MasterWrite | TxTarget::ShardWrite)
    }

    pub fn mode(&self) -> Mode {
        if self.is_write() { Mode::Write } else { Mode::Read }
    }
}

impl fmt::Display for TxTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxTarget::MasterWrite => write!(f, "master_write"),
            TxTarget::MasterRead => write!(f, "master_read"),
            TxTarget::ShardWrite => write!(f, "shard_write"),
            TxTarget::ShardRead => write!(f, "shard_read"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    NotStarted,
    Started,
    Closed,
}

impl SlotState {
    pub fn is_started(&self) -> bool {
        matches!(self, SlotState::Started)
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::NotStarted => write!(f, "NOT_STARTED"),
            SlotState::Started => write!(f, "STARTED"),
            SlotState::Closed => write!(f, "CLOSED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_for_mode() {
        assert_eq!(TxTarget::for_mode(Mode::Write, false).unwrap(), TxTarget::MasterWrite);
        assert_eq!(TxTarget::for_mode(Mode::Read, true).unwrap(), TxTarget::ShardRead);
        assert!(matches!(
            TxTarget::for_mode(Mode::Backup, true),
            Err(DbError::NotConfigured(_))
        ));
        assert_eq!(TxTarget::ShardWrite.mode(), Mode::Write);
        assert_eq!(TxTarget::MasterRead.to_string(), "master_read");
    }
}
