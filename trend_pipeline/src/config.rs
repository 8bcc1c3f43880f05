//! Pipeline configuration: TOML model, defaults, and loading.
//!
//! Every section is optional; an empty file yields the reference settings
//! (60 calendar calls/min, 700 market-data calls/min, 4h calendar TTL, 24h
//! performance TTL, 2h aggregate TTL). Secrets never live in the file: the
//! provider token is read from the environment variable named by
//! `provider.token_env`.
//!
//! ```toml
//! [provider]
//! base_url = "http://api.tushare.pro"
//! token_env = "TUSHARE_TOKEN"
//!
//! [market_data]
//! max_per_minute = 500
//!
//! [synthetic]
//! restricted = ["600200"]
//! ```

use std::{collections::HashSet, path::Path, time::Duration};

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    pub provider: ProviderConfig,
    pub calendar: CalendarConfig,
    pub market_data: MarketDataConfig,
    pub cache: CacheConfig,
    pub synthetic: SyntheticConfig,
    pub pipeline: PipelineOptions,
}

/// Upstream endpoint settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProviderConfig {
    /// RPC endpoint that accepts `{ api_name, token, params, fields }` posts.
    pub base_url: String,
    /// Name of the environment variable that holds the API token.
    pub token_env: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://api.tushare.pro".to_string(),
            token_env: "TUSHARE_TOKEN".to_string(),
        }
    }
}

/// Trading-calendar client settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct CalendarConfig {
    /// Exchange identifier sent with calendar requests.
    pub exchange: String,
    pub max_per_minute: u32,
    pub timeout_secs: u64,
    /// Lifetime of a resolved calendar range.
    pub ttl_secs: u64,
    /// Extra wait added when the limiter has to delay.
    pub margin_ms: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            exchange: "SSE".to_string(),
            max_per_minute: 60,
            timeout_secs: 15,
            ttl_secs: 4 * 60 * 60,
            margin_ms: 100,
        }
    }
}

impl CalendarConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn margin(&self) -> Duration {
        Duration::from_millis(self.margin_ms)
    }
}

/// Market-data client settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct MarketDataConfig {
    pub max_per_minute: u32,
    /// Deadline for a single (instrument, day) call.
    pub timeout_secs: u64,
    /// Deadline for a batched call.
    pub batch_timeout_secs: u64,
    /// Retries after the first rate-limited single call.
    pub max_retries: u32,
    /// Backoff base; attempt `n` waits `base_delay_ms * 2^n`.
    pub base_delay_ms: u64,
    /// Pause between calls of the sequential fallback loop.
    pub inter_call_delay_ms: u64,
    pub margin_ms: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 700,
            timeout_secs: 15,
            batch_timeout_secs: 45,
            max_retries: 3,
            base_delay_ms: 1000,
            inter_call_delay_ms: 100,
            margin_ms: 100,
        }
    }
}

impl MarketDataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn inter_call_delay(&self) -> Duration {
        Duration::from_millis(self.inter_call_delay_ms)
    }

    pub fn margin(&self) -> Duration {
        Duration::from_millis(self.margin_ms)
    }
}

/// Cache lifetimes.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    pub performance_ttl_secs: u64,
    pub aggregate_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            performance_ttl_secs: 24 * 60 * 60,
            aggregate_ttl_secs: 2 * 60 * 60,
        }
    }
}

impl CacheConfig {
    pub fn performance_ttl(&self) -> Duration {
        Duration::from_secs(self.performance_ttl_secs)
    }

    pub fn aggregate_ttl(&self) -> Duration {
        Duration::from_secs(self.aggregate_ttl_secs)
    }
}

/// Synthetic fallback settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct SyntheticConfig {
    /// IANA zone whose calendar date counts as "today" for future-date zeroing.
    pub timezone: String,
    /// Bare codes that get the narrow restricted band.
    pub restricted: Vec<String>,
    /// Pins "today" instead of reading the wall clock.
    pub today: Option<NaiveDate>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Shanghai".to_string(),
            restricted: Vec::new(),
            today: None,
        }
    }
}

impl SyntheticConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| Error::Config(format!("unknown timezone '{}'", self.timezone)))
    }

    pub fn restricted_set(&self) -> HashSet<String> {
        self.restricted.iter().map(|s| s.trim().to_string()).collect()
    }
}

/// Orchestrator behavior switches.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineOptions {
    /// Replace an all-`NoData` record with synthetic values before caching.
    pub synthesize_on_total_failure: bool,
    /// Horizon used by the CLI when `--horizon` is omitted.
    pub default_horizon_days: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            synthesize_on_total_failure: true,
            default_horizon_days: 5,
        }
    }
}

impl PipelineConfig {
    /// Rejects settings that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.calendar.max_per_minute == 0, "calendar.max_per_minute must be > 0"),
            (self.market_data.max_per_minute == 0, "market_data.max_per_minute must be > 0"),
            (self.calendar.timeout_secs == 0, "calendar.timeout_secs must be > 0"),
            (self.market_data.timeout_secs == 0, "market_data.timeout_secs must be > 0"),
            (self.market_data.batch_timeout_secs == 0, "market_data.batch_timeout_secs must be > 0"),
            (self.calendar.ttl_secs == 0, "calendar.ttl_secs must be > 0"),
            (self.cache.performance_ttl_secs == 0, "cache.performance_ttl_secs must be > 0"),
            (self.cache.aggregate_ttl_secs == 0, "cache.aggregate_ttl_secs must be > 0"),
            (self.calendar.exchange.trim().is_empty(), "calendar.exchange cannot be empty"),
            (self.provider.base_url.trim().is_empty(), "provider.base_url cannot be empty"),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(Error::Config((*message).to_string()));
        }
        self.synthetic.tz()?;
        Ok(())
    }
}

/// Parse and validate a configuration from a TOML string.
pub fn load_config_str(toml_str: &str) -> Result<PipelineConfig> {
    let cfg: PipelineConfig = toml::from_str(toml_str)
        .map_err(|e| Error::Config(format!("failed to parse config TOML: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Read a configuration file from disk, parse, and validate it.
pub fn load_config_path(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let text = std::fs::read_to_string(path.as_ref())?;
    load_config_str(&text)
}
