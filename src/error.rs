//! Error types for the AMI client

use thiserror::Error;

/// Result alias used throughout the crate.
pub type AmiResult<T> = Result<T, AmiError>;

/// Errors surfaced by the AMI client.
///
/// Unknown packets are not errors: the engine logs and skips them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AmiError {
    /// Socket could not be opened, or the manager greeting never arrived.
    #[error("connect failed: {message}")]
    Connect { message: String },

    /// Connect or greeting read did not finish in time.
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Login response was not `Success`.
    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    /// The manager closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Socket reset or other transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No live session to send on.
    #[error("not connected")]
    NotConnected,

    /// Action name or field would break the line-oriented framing.
    #[error("invalid field: {message}")]
    InvalidField { message: String },
}

impl AmiError {
    pub(crate) fn connect_failed(message: impl Into<String>) -> Self {
        AmiError::Connect {
            message: message.into(),
        }
    }

    pub(crate) fn auth_failed(message: impl Into<String>) -> Self {
        AmiError::AuthFailed {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_field(message: impl Into<String>) -> Self {
        AmiError::InvalidField {
            message: message.into(),
        }
    }

    /// `true` if the session is gone and the caller must reconnect.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            AmiError::ConnectionClosed | AmiError::Io(_) | AmiError::NotConnected
        )
    }
}
