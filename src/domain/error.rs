//! Domain error types.

use chrono::{DateTime, Utc};

/// Top-level error type for scalpwatch.
#[derive(Debug, thiserror::Error)]
pub enum ScalpwatchError {
    #[error("out-of-order tick at {received}: last accepted tick was at {last}")]
    OutOfOrderTick {
        last: DateTime<Utc>,
        received: DateTime<Utc>,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("history write failed after {attempts} attempts: {reason}")]
    PersistenceFailure { attempts: u32, reason: String },

    #[error("tick feed error: {reason}")]
    Feed { reason: String },

    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScalpwatchError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        ScalpwatchError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&ScalpwatchError> for std::process::ExitCode {
    fn from(err: &ScalpwatchError) -> Self {
        let code: u8 = match err {
            ScalpwatchError::Io(_) => 1,
            ScalpwatchError::ConfigParse { .. } | ScalpwatchError::ConfigInvalid { .. } => 2,
            ScalpwatchError::Database { .. }
            | ScalpwatchError::DatabaseQuery { .. }
            | ScalpwatchError::PersistenceFailure { .. } => 3,
            ScalpwatchError::OutOfOrderTick { .. } | ScalpwatchError::Feed { .. } => 4,
            ScalpwatchError::InvalidCommand { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
