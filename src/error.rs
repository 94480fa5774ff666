use thiserror::Error;

/// Error taxonomy shared by the engine components.
///
/// Only `BadPassword` and `CorruptStore` are fatal, and only at startup. Every
/// other variant is reported to the active screen as a notice.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("incorrect vault password")]
    BadPassword,

    #[error("vault is corrupt: {0}")]
    CorruptStore(String),

    #[error("no active session (select a context first)")]
    NoActiveSession,

    #[error("{kind} `{id}` not found")]
    NotFound { kind: String, id: String },

    #[error("remote temporarily unavailable: {0}")]
    TransientRemoteFailure(String),

    #[error("{action} failed: {reason}")]
    RemoteActionFailure { action: String, reason: String },

    #[error("cannot {action}: {reason}")]
    PreconditionFailed { action: String, reason: String },

    #[error("{0}")]
    Io(String),
}

impl CoreError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn precondition(action: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::PreconditionFailed {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn action_failed(action: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::RemoteActionFailure {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Conditions that leave the process without a usable vault.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::BadPassword | CoreError::CorruptStore(_))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Io(format!("{:#}", err))
    }
}
