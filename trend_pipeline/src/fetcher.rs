//! Percentage-change retrieval with graceful degradation.
//!
//! The policy, cheapest path first:
//! 1. one batched call for every instrument over the whole date range;
//! 2. for each instrument the batch left incomplete, one call per missing day,
//!    retrying rate-limited calls with exponential backoff;
//! 3. once the rate limit outlasts the retries, stop calling and fill the
//!    remaining days from the [`SyntheticDataGenerator`].
//!
//! Every upstream call first passes the market-data [`SlidingWindowLimiter`]
//! and runs under its own deadline. Apart from [`RateLimited`], which steers
//! the policy, upstream failures turn into [`DataPoint::no_data`] values and
//! never reach the caller.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::MarketDataConfig,
    models::{BatchRequest, DataPoint, InstrumentCode, PerformanceRecord, SingleRequest},
    providers::{MarketDataProvider, with_deadline},
    rate_limit::SlidingWindowLimiter,
    synthetic::SyntheticDataGenerator,
};

/// The upstream kept refusing calls for quota reasons.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("upstream rate limit persisted after retries")]
pub struct RateLimited;

/// Deadlines and retry pacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub batch_timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub inter_call_delay: Duration,
}

impl From<&MarketDataConfig> for FetchSettings {
    fn from(config: &MarketDataConfig) -> Self {
        Self {
            timeout: config.timeout(),
            batch_timeout: config.batch_timeout(),
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            inter_call_delay: config.inter_call_delay(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from(&MarketDataConfig::default())
    }
}

impl FetchSettings {
    /// Delay before retry number `attempt + 1`: `base_delay * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

fn empty_records(ids: &[InstrumentCode], dates: &[NaiveDate]) -> HashMap<String, PerformanceRecord> {
    ids.iter()
        .map(|id| {
            let mut record = PerformanceRecord::new(id.code());
            for &date in dates {
                record.insert(date, DataPoint::no_data());
            }
            (id.code().to_string(), record)
        })
        .collect()
}

/// Requested dates without a real value, de-duplicated, in supplied order.
fn missing_dates(record: &PerformanceRecord, dates: &[NaiveDate]) -> Vec<NaiveDate> {
    let mut seen = HashSet::new();
    dates
        .iter()
        .copied()
        .filter(|d| seen.insert(*d))
        .filter(|d| !record.point(*d).is_some_and(DataPoint::is_real))
        .collect()
}

pub struct MarketDataFetcher {
    provider: Arc<dyn MarketDataProvider + Send + Sync>,
    limiter: SlidingWindowLimiter,
    synthetic: Arc<SyntheticDataGenerator>,
    settings: FetchSettings,
}

impl MarketDataFetcher {
    pub fn new(
        provider: Arc<dyn MarketDataProvider + Send + Sync>,
        limiter: SlidingWindowLimiter,
        synthetic: Arc<SyntheticDataGenerator>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            provider,
            limiter,
            synthetic,
            settings,
        }
    }

    pub fn from_config(
        provider: Arc<dyn MarketDataProvider + Send + Sync>,
        synthetic: Arc<SyntheticDataGenerator>,
        config: &MarketDataConfig,
    ) -> Self {
        let limiter =
            SlidingWindowLimiter::per_minute("market_data", config.max_per_minute, config.margin());
        Self::new(provider, limiter, synthetic, FetchSettings::from(config))
    }

    /// One upstream call for every `(id, date)` pair.
    ///
    /// Records are keyed by bare code and hold a point for every requested
    /// date; pairs the provider did not return are `NoData`. Failures other
    /// than rate limiting yield an all-`NoData` map.
    pub async fn fetch_batch(
        &self,
        ids: &[InstrumentCode],
        dates: &[NaiveDate],
    ) -> Result<HashMap<String, PerformanceRecord>, RateLimited> {
        let mut records = empty_records(ids, dates);
        let (Some(&start), Some(&end)) = (dates.iter().min(), dates.iter().max()) else {
            return Ok(records);
        };
        if ids.is_empty() {
            return Ok(records);
        }

        let request = BatchRequest {
            ts_codes: ids.iter().map(InstrumentCode::ts_code).collect(),
            start,
            end,
        };
        self.limiter.admit().await;
        let rows = match with_deadline(
            self.settings.batch_timeout,
            self.provider.daily_changes(&request),
        )
        .await
        {
            Ok(rows) => rows,
            Err(e) if e.is_rate_limited() => {
                warn!(instruments = ids.len(), error = %e, "batch request rate limited");
                return Err(RateLimited);
            }
            Err(e) => {
                warn!(instruments = ids.len(), error = %e, "batch request failed");
                return Ok(records);
            }
        };

        let by_ts_code: HashMap<String, &str> = ids
            .iter()
            .map(|id| (id.ts_code(), id.code()))
            .collect();
        let wanted: HashSet<NaiveDate> = dates.iter().copied().collect();
        for row in rows {
            let Some(code) = by_ts_code.get(&row.ts_code) else {
                continue;
            };
            if !wanted.contains(&row.trade_date) {
                continue;
            }
            if let Some(record) = records.get_mut(*code) {
                record.insert(row.trade_date, DataPoint::real(row.pct_chg));
            }
        }
        debug!(instruments = ids.len(), days = dates.len(), "batch request complete");
        Ok(records)
    }

    /// One `(id, date)` call, retrying while the upstream reports rate limiting.
    ///
    /// `attempt` is the number of tries already spent; each rate-limited try
    /// waits `base_delay * 2^attempt` before the next. After `max_retries`
    /// retries the condition is returned as [`RateLimited`]. Every other
    /// failure, and a missing row, is `NoData`.
    pub async fn fetch_one(
        &self,
        id: &InstrumentCode,
        date: NaiveDate,
        attempt: u32,
    ) -> Result<DataPoint, RateLimited> {
        let request = SingleRequest {
            ts_code: id.ts_code(),
            date,
        };
        let mut attempt = attempt;
        loop {
            self.limiter.admit().await;
            match with_deadline(self.settings.timeout, self.provider.daily_change(&request)).await {
                Ok(Some(row)) => return Ok(DataPoint::real(row.pct_chg)),
                Ok(None) => {
                    debug!(instrument = %request.ts_code, %date, "no row for day");
                    return Ok(DataPoint::no_data());
                }
                Err(e) if e.is_rate_limited() => {
                    if attempt >= self.settings.max_retries {
                        warn!(instrument = %request.ts_code, %date, attempts = attempt + 1, "rate limit persisted, giving up");
                        return Err(RateLimited);
                    }
                    let delay = self.settings.backoff(attempt);
                    info!(
                        instrument = %request.ts_code,
                        %date,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(instrument = %request.ts_code, %date, error = %e, "single request failed");
                    return Ok(DataPoint::no_data());
                }
            }
        }
    }

    /// Fetches `dates` for `id` with the full degrade policy.
    ///
    /// The result holds a point for every requested date and may mix real,
    /// `NoData` and synthetic values.
    pub async fn fetch_with_fallback(
        &self,
        id: &InstrumentCode,
        dates: &[NaiveDate],
    ) -> PerformanceRecord {
        if dates.is_empty() {
            return PerformanceRecord::new(id.code());
        }
        let record = match self.fetch_batch(std::slice::from_ref(id), dates).await {
            Ok(mut records) => records
                .remove(id.code())
                .unwrap_or_else(|| PerformanceRecord::new(id.code())),
            Err(RateLimited) => PerformanceRecord::new(id.code()),
        };
        if record.covers_with_real(dates) {
            return record;
        }
        self.fill_sequentially(id, dates, record).await.0
    }

    /// [`fetch_with_fallback`](Self::fetch_with_fallback) for several
    /// instruments sharing one batched call.
    ///
    /// Once one instrument exhausts its retries, the instruments after it go
    /// straight to synthetic fill.
    pub async fn fetch_many_with_fallback(
        &self,
        ids: &[InstrumentCode],
        dates: &[NaiveDate],
    ) -> HashMap<String, PerformanceRecord> {
        let mut seen = HashSet::new();
        let ids: Vec<InstrumentCode> = ids
            .iter()
            .filter(|id| seen.insert(id.code().to_string()))
            .cloned()
            .collect();

        let mut batch = self.fetch_batch(&ids, dates).await.unwrap_or_default();
        let mut throttled = false;
        let mut out = HashMap::with_capacity(ids.len());
        for id in &ids {
            let record = batch
                .remove(id.code())
                .unwrap_or_else(|| PerformanceRecord::new(id.code()));
            let record = if record.covers_with_real(dates) {
                record
            } else if throttled {
                self.fill_synthetic(id, dates, record)
            } else {
                let (record, hit_limit) = self.fill_sequentially(id, dates, record).await;
                throttled = hit_limit;
                record
            };
            out.insert(id.code().to_string(), record);
        }
        out
    }

    /// Per-day calls for the dates `record` lacks; returns whether the rate
    /// limit cut the loop short.
    async fn fill_sequentially(
        &self,
        id: &InstrumentCode,
        dates: &[NaiveDate],
        mut record: PerformanceRecord,
    ) -> (PerformanceRecord, bool) {
        let missing = missing_dates(&record, dates);
        debug!(instrument = id.code(), missing = missing.len(), "falling back to per-day requests");
        for (i, &date) in missing.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.inter_call_delay).await;
            }
            match self.fetch_one(id, date, 0).await {
                Ok(point) => record.insert(date, point),
                Err(RateLimited) => {
                    let abandoned = &missing[i..];
                    warn!(
                        instrument = id.code(),
                        abandoned = abandoned.len(),
                        "sustained rate limiting, filling remaining days synthetically"
                    );
                    record.merge(self.synthetic.generate(id, abandoned));
                    return (record, true);
                }
            }
        }
        (record, false)
    }

    fn fill_synthetic(
        &self,
        id: &InstrumentCode,
        dates: &[NaiveDate],
        mut record: PerformanceRecord,
    ) -> PerformanceRecord {
        let missing = missing_dates(&record, dates);
        record.merge(self.synthetic.generate(id, &missing));
        record
    }
}
