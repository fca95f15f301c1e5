use std::fmt;

use super::TxTarget;
use crate::core::ShardId;

/// Result of committing one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub target: TxTarget,
    pub shard: Option<ShardId>,
    pub error: Option<String>,
}

impl CommitOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for CommitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shard {
            Some(shard) => write!(f, "{}:{}", self.target, shard)?,
            None => write!(f, "{}", self.target)?,
        }
        match &self.error {
            Some(error) => write!(f, " failed ({})", error),
            None => write!(f, " committed"),
        }
    }
}

/// Per-target outcomes of `TransactionSet::commit`, in commit order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    outcomes: Vec<CommitOutcome>,
}

impl CommitReport {
    pub(crate) fn push(&mut self, outcome: CommitOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[CommitOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommitOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(CommitOutcome::is_success)
    }

    pub fn committed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// The error of the last failed commit.
    pub fn last_error(&self) -> Option<&str> {
        self.outcomes.iter().rev().find_map(|o| o.error.as_deref())
    }

    /// Whether the master write transaction was committed successfully.
    pub fn master_committed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.target == TxTarget::MasterWrite && o.is_success())
    }
}

impl fmt::Display for CommitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} transactions committed",
            self.committed_count(),
            self.outcomes.len()
        )?;
        if let Some(error) = self.last_error() {
            write!(f, "; last error: {}", error)?;
        }
        Ok(())
    }
}
