//! Error types for the share processor.
//!
//! - `StoreError` - failures reported by a [`crate::store::StoreClient`] backend
//! - `ProcessError` - the single failure outcome of one `handle_share` call,
//!   tagged with the stage that failed
//! - `Error` - binary level errors (configuration, I/O)

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend-specific error (connection, protocol, script failure)
    #[error("Backend error: {0}")]
    BackendError(String),

    /// A stored value could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A required key was absent when the batch executed
    #[error("No such key: {0}")]
    NoSuchKey(String),

    /// The batch guard marker was already set, nothing was applied
    #[error("Guard already set: {key} {field}")]
    GuardTripped { key: String, field: String },

    /// Store backend not available
    #[error("Store backend unavailable")]
    BackendUnavailable,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure outcome of a single `handle_share` invocation.
///
/// Whatever the variant, no command staged by the failing call was applied.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Share difficulty was negative or not finite
    #[error("Invalid share difficulty: {0}")]
    InvalidDifficulty(f64),

    /// Block target difficulty was zero, negative or not finite
    #[error("Invalid block target difficulty: {0}")]
    InvalidBlockTarget(f64),

    /// Reading the current round failed, the round was not rotated
    #[error("Round aggregation failed: {0}")]
    Aggregation(#[source] StoreError),

    /// The round at this height was already finalized
    #[error("Round at height {height} already finalized")]
    AlreadyFinalized { height: u64 },

    /// The staged batch was rejected by the store
    #[error("Batch execution failed: {0}")]
    Execution(#[source] StoreError),
}

impl ProcessError {
    /// Short name of the stage that failed, used in log lines.
    pub fn stage(&self) -> &'static str {
        match self {
            ProcessError::InvalidDifficulty(_) | ProcessError::InvalidBlockTarget(_) => {
                "validation"
            }
            ProcessError::Aggregation(_) => "aggregation",
            ProcessError::AlreadyFinalized { .. } => "finalize-guard",
            ProcessError::Execution(_) => "execution",
        }
    }
}

/// Errors surfaced by the `share-processor` binary.
#[derive(Debug, Error)]
pub enum Error {
    /// Errors on bad CLI argument input
    #[error("Bad CLI arg input: {0}")]
    BadCliArgs(String),

    /// Errors on bad `config` TOML deserialize
    #[error("Bad config: {0}")]
    BadConfig(#[from] ext_config::ConfigError),

    /// Requested backend is not compiled in
    #[error("Backend `{0}` not available in this build")]
    BackendNotCompiled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NoSuchKey("ravencoin:shares:roundCurrent".to_string());
        assert_eq!(err.to_string(), "No such key: ravencoin:shares:roundCurrent");

        let err = StoreError::GuardTripped {
            key: "ravencoin:roundsFinalized".to_string(),
            field: "100".to_string(),
        };
        assert_eq!(err.to_string(), "Guard already set: ravencoin:roundsFinalized 100");
    }

    #[test]
    fn test_process_error_stage() {
        assert_eq!(ProcessError::InvalidBlockTarget(0.0).stage(), "validation");
        assert_eq!(
            ProcessError::Aggregation(StoreError::BackendUnavailable).stage(),
            "aggregation"
        );
        assert_eq!(
            ProcessError::AlreadyFinalized { height: 7 }.stage(),
            "finalize-guard"
        );
        assert_eq!(
            ProcessError::Execution(StoreError::BackendError("down".into())).stage(),
            "execution"
        );
    }

    #[test]
    fn test_process_error_display() {
        let err = ProcessError::AlreadyFinalized { height: 42 };
        assert_eq!(err.to_string(), "Round at height 42 already finalized");
    }
}
