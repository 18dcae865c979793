use crate::model::InstanceId;

/// Failures surfaced by edit sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a request is already in progress")]
    RequestInFlight,
    #[error("there are unsaved changes; revert or persist before reloading")]
    UnsavedChanges,
    #[error("servant instance {0} does not exist")]
    UnknownInstance(InstanceId),
    #[error("request failed: {0:#}")]
    Request(#[from] anyhow::Error),
    #[error("invalid input: {0}")]
    Validation(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
