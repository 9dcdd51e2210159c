//! Error types for the station client.

use thiserror::Error;

/// Result type alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to the station.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure: timeout, refused connection, TLS failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The scrape ran out of time before this request could complete.
    #[error("Scrape deadline exceeded")]
    DeadlineExceeded,

    /// The station no longer accepts the session.
    #[error("Session expired or rejected by the station")]
    AuthExpired,

    /// The login handshake failed.
    #[error("Login failed: {0}")]
    Auth(String),

    /// The station answered with an error or an unexpected payload.
    #[error("Station error: {0}")]
    Device(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Create a login error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a device error.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }

    /// Whether a fresh login may recover from this error.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {}", err))
        } else {
            Self::Network(err.to_string())
        }
    }
}
