use std::panic::Location;
use thiserror::Error;

use crate::transaction::CommitReport;

/// Coarse classification of every [`DbError`].
///
/// Configuration errors are raised before any I/O. Resolution errors mean the
/// routing data for a key or table is missing. Infrastructure errors come from
/// the store itself, and partial commits carry the per-target outcome report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Resolution,
    Infrastructure,
    PartialCommit,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Partition key '{0}' is not assigned to a shard")]
    NotAssigned(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Failed to connect to '{target}': {message}")]
    ConnectError { target: String, message: String },

    #[error("Execution error: {message} (at {location})")]
    ExecutionError {
        message: String,
        location: &'static Location<'static>,
    },

    #[error("Transaction error: {message} (at {location})")]
    TransactionError {
        message: String,
        location: &'static Location<'static>,
    },

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Partial commit: {0}")]
    PartialCommit(CommitReport),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Infrastructure failure while running a statement, tagged with the caller.
    #[track_caller]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::ExecutionError {
            message: message.into(),
            location: Location::caller(),
        }
    }

    /// Infrastructure failure while opening or finishing a transaction.
    #[track_caller]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::TransactionError {
            message: message.into(),
            location: Location::caller(),
        }
    }

    pub fn connect(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectError {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOption(_)
            | Self::SchemaError(_)
            | Self::InvalidCondition(_)
            | Self::ConfigError(_)
            | Self::TypeMismatch(_) => ErrorKind::Configuration,
            Self::NotFound(_) | Self::NotAssigned(_) | Self::NotConfigured(_) => {
                ErrorKind::Resolution
            }
            Self::ConnectError { .. }
            | Self::ExecutionError { .. }
            | Self::TransactionError { .. }
            | Self::LockError(_)
            | Self::IoError(_) => ErrorKind::Infrastructure,
            Self::PartialCommit(_) => ErrorKind::PartialCommit,
        }
    }

    /// True when a lookup completed but no row matched.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_not_assigned(&self) -> bool {
        matches!(self, Self::NotAssigned(_))
    }

    /// Source location recorded for infrastructure errors.
    pub fn location(&self) -> Option<&'static Location<'static>> {
        match self {
            Self::ExecutionError { location, .. } | Self::TransactionError { location, .. } => {
                Some(location)
            }
            _ => None,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            DbError::InvalidOption("mode".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            DbError::NotAssigned("42".into()).kind(),
            ErrorKind::Resolution
        );
        assert_eq!(
            DbError::NotConfigured("replicas".into()).kind(),
            ErrorKind::Resolution
        );
        assert_eq!(
            DbError::connect("primary:game_master", "refused").kind(),
            ErrorKind::Infrastructure
        );
        assert_eq!(
            DbError::PartialCommit(CommitReport::default()).kind(),
            ErrorKind::PartialCommit
        );
    }

    #[test]
    fn test_execution_error_records_caller() {
        let err = DbError::execution("boom");
        let location = err.location().unwrap();
        assert!(location.file().ends_with("error.rs"));
        assert!(err.to_string().contains("boom"));
        assert!(err.to_string().contains("error.rs"));
    }

    #[test]
    fn test_not_found_is_distinct_from_infrastructure() {
        let err = DbError::NotFound("user".into());
        assert!(err.is_not_found());
        assert!(!DbError::execution("lost connection").is_not_found());
    }
}
