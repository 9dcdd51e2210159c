use thiserror::Error;

/// Common error type for station exporter components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
