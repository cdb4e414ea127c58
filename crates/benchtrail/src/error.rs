//! Error types for benchtrail
//!
//! Regressions are not errors. A detected regression is an ordinary
//! [`EmitOutcome`](crate::emitter::EmitOutcome); everything here means the
//! pipeline itself could not do its job.

use std::path::PathBuf;

use thiserror::Error;

use crate::history::RevisionToken;

/// Failure to turn raw tool output into a batch
#[derive(Error, Debug)]
pub enum ParseError {
    /// Expected structural markers are missing
    #[error("Malformed {tool} output: {message}")]
    Malformed { tool: String, message: String },

    /// A value was NaN or infinite
    #[error("Non-finite value for benchmark '{name}' in {tool} output")]
    NonFinite { tool: String, name: String },

    /// No adapter is registered for the tool name
    #[error("Unknown benchmark tool '{0}'")]
    UnknownTool(String),
}

impl ParseError {
    pub fn malformed(tool: &str, message: impl Into<String>) -> Self {
        ParseError::Malformed {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    pub fn non_finite(tool: &str, name: impl Into<String>) -> Self {
        ParseError::NonFinite {
            tool: tool.to_string(),
            name: name.into(),
        }
    }
}

/// Rejection of a batch by the history document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppendError {
    /// The commit is already recorded for this suite; the document is unchanged
    #[error("Commit {commit} is already recorded for '{suite}'")]
    DuplicateCommit { suite: String, commit: String },

    /// The batch predates the newest recorded entry
    #[error("Batch dated {date} is not after the last entry ({last_date}) for '{suite}'")]
    OutOfOrder {
        suite: String,
        date: i64,
        last_date: i64,
    },
}

/// Storage backend failures (I/O, permissions, undecodable content)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode history document: {0}")]
    Decode(String),

    #[error("Failed to encode history document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Storage task failed: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// The stored document moved on since it was loaded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("History changed concurrently: expected revision {expected}, found {actual}")]
pub struct ConflictError {
    pub expected: RevisionToken,
    pub actual: RevisionToken,
}

/// Outcome of a failed compare-and-swap write
#[derive(Error, Debug)]
pub enum PersistError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Invalid or unreadable configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Fatal pipeline failures
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Append(#[from] AppendError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Giving up after {attempts} attempts: {last}")]
    ConflictExhausted { attempts: u32, last: ConflictError },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read {path}: {source}")]
    Input {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid commit metadata in {path}: {source}")]
    CommitMetadata {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl PipelineError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::non_finite("cargo", "Node set");
        assert!(err.to_string().contains("Node set"));
        assert!(err.to_string().contains("cargo"));
    }

    #[test]
    fn test_conflict_display() {
        let err = ConflictError {
            expected: RevisionToken::new("aaa"),
            actual: RevisionToken::new("bbb"),
        };
        let message = err.to_string();
        assert!(message.contains("aaa"));
        assert!(message.contains("bbb"));
    }

    #[test]
    fn test_persist_error_from_conflict() {
        let err: PersistError = ConflictError {
            expected: RevisionToken::absent(),
            actual: RevisionToken::new("1"),
        }
        .into();
        assert!(matches!(err, PersistError::Conflict(_)));
    }
}
