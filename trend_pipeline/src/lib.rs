//! Trading-day-aware, rate-limited market-trend acquisition.
//!
//! Start with [`pipeline::PipelineOrchestrator`]; everything else is a part it
//! composes and can be used on its own.

#[cfg(feature = "cli")]
pub mod cli;

pub mod cache;
pub mod calendar;
pub mod config;
pub mod dates;
pub mod errors;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod rate_limit;
pub mod synthetic;

pub use errors::{Error, Result};
pub use pipeline::{PipelineOrchestrator, TrendMatrix};
