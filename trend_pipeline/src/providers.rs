//! Provider abstraction for upstream calendar and market-data sources.
//!
//! This module defines the [`CalendarProvider`] and [`MarketDataProvider`]
//! traits, the two seams through which the pipeline talks to the outside world.
//! Each concrete upstream (such as the Tushare-compatible RPC client in
//! [`tushare`]) implements them and maps its own failure modes onto
//! [`ProviderError`].
//!
//! The traits are async and object safe, so the pipeline holds them as
//! `Arc<dyn ... + Send + Sync>` and tests can swap in in-memory fakes.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use chrono::NaiveDate;
//! use trend_pipeline::models::CalendarRequest;
//! use trend_pipeline::providers::{CalendarProvider, ProviderError};
//!
//! struct WeekdaysOnly;
//!
//! #[async_trait]
//! impl CalendarProvider for WeekdaysOnly {
//!     async fn open_days(
//!         &self,
//!         _request: &CalendarRequest,
//!     ) -> Result<Vec<NaiveDate>, ProviderError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod tushare;

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::{BatchRequest, CalendarRequest, ChangeRow, SingleRequest};

/// Fragments that upstream quota messages contain.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "每分钟最多访问",
    "每小时最多访问",
    "rate limit",
    "too many requests",
];

/// Source of authoritative exchange open days.
#[async_trait]
pub trait CalendarProvider {
    /// Returns the open days within `request.start..=request.end`.
    ///
    /// An empty vector is a valid answer; the resolver treats it the same way
    /// as an unavailable provider.
    async fn open_days(&self, request: &CalendarRequest) -> Result<Vec<NaiveDate>, ProviderError>;
}

/// Source of daily percentage-change data.
#[async_trait]
pub trait MarketDataProvider {
    /// One call covering every instrument over the whole date range.
    async fn daily_changes(&self, request: &BatchRequest) -> Result<Vec<ChangeRow>, ProviderError>;

    /// One (instrument, day) pair. `Ok(None)` means the provider has no row.
    async fn daily_change(&self, request: &SingleRequest)
    -> Result<Option<ChangeRow>, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a provider implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// An error during an API request (e.g., network failure, connection reset).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The call did not finish within its deadline.
    #[snafu(display("Provider call timed out after {after:?}"))]
    Timeout {
        after: Duration,
        backtrace: Backtrace,
    },

    /// The provider answered with a non-zero status code.
    #[snafu(display("API error {code}: {message}"))]
    Api {
        code: i64,
        message: String,
        backtrace: Backtrace,
    },

    /// The provider refused the call because a request quota was exhausted.
    #[snafu(display("Rate limited by provider: {message}"))]
    RateLimited {
        message: String,
        backtrace: Backtrace,
    },

    /// The response could not be decoded into the expected shape.
    #[snafu(display("Malformed provider response: {message}"))]
    Malformed {
        message: String,
        backtrace: Backtrace,
    },
}

impl ProviderError {
    /// `true` for the one failure that changes which degrade path is taken.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Runs one provider call under a deadline.
///
/// An elapsed deadline becomes [`ProviderError::Timeout`]; the call is dropped.
pub async fn with_deadline<T, F>(after: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => TimeoutSnafu { after }.fail(),
    }
}

/// Recognizes a provider's "quota exhausted" message.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}
