//! Error types for the job client.

use thiserror::Error;

/// Errors returned by [`JobClient`](crate::JobClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected non-success response.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The host rejected the invocation (4xx); `message` is the server's text.
    #[error("invocation rejected (status {status}): {message}")]
    Invocation { status: u16, message: String },

    /// The job ran and failed remotely. Both fields are carried verbatim.
    #[error("job failed with {exception_type}: {message}")]
    JobFailed {
        exception_type: String,
        message: String,
    },

    /// The server reported a status that can never be a valid outcome.
    #[error("job {id} reported invalid status '{status}'")]
    InvalidStatus { id: String, status: String },

    /// The short name did not resolve to a registered function.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// Rejected client settings (e.g. a poll policy with a zero delay).
    #[error(transparent)]
    Config(#[from] weft_core::ConfigError),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// The wait was cancelled before the job reached a terminal status.
    #[error("wait cancelled")]
    Cancelled,
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
