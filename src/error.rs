//! Error types shared by every backend.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, NotificationError>;

/// The single error surfaced to callers of producers, consumers and backends.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The payload serialized to `null`.
    #[error("payload is null")]
    NullPayload,

    /// The resource, session or connection behind an adapter is missing or closed.
    #[error("not provisioned: {0}")]
    NotProvisioned(String),

    /// The codec could not encode or decode a payload.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// A backend call failed (network, permission, protocol).
    #[error("transport failed: {0}")]
    Transport(String),

    /// The backend resource does not exist and this application may not create it.
    #[error("the application is not allowed to create a new {resource} ({name})")]
    CreationNotPermitted { resource: &'static str, name: String },

    /// A configuration value is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `on_read_start` or `start` was called on an instance that already ran.
    #[error("already started: {0}")]
    AlreadyStarted(String),

    /// The backend does not offer this operation.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Errors reported by backend clients.
///
/// The provisioning protocol needs to tell an idempotent "already exists"
/// answer apart from a real failure, so clients speak this richer type and
/// adapters fold it into [`NotificationError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} does not exist")]
    NotFound(String),

    #[error("{0} is closed")]
    Closed(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("i/o failure: {0}")]
    Io(String),
}

impl From<TransportError> for NotificationError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed(what) => {
                NotificationError::NotProvisioned(format!("{} is closed", what))
            }
            other => NotificationError::Transport(other.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for TransportError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        TransportError::Io(format!("lock poisoned: {}", err))
    }
}
