use thiserror::Error;

use crate::providers::ProviderInitError;

/// The unified error type for the `trend_pipeline` crate.
///
/// Environmental failures (timeouts, HTTP errors, rate limits) never show up
/// here: the pipeline absorbs them and degrades to zero or synthetic data.
/// What remains is caller error and setup failure.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller passed something malformed (bad date, unknown instrument code).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An error related to configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An aggregate value could not be encoded for the aggregate cache.
    #[error("Aggregate serialization failed")]
    Serialization(#[from] serde_json::Error),

    /// The upstream provider client could not be constructed.
    #[error("Provider initialization failed")]
    ProviderInit(#[from] ProviderInitError),

    /// A generic I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }
}
