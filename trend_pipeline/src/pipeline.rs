//! The caller-facing pipeline.
//!
//! [`PipelineOrchestrator`] ties the pieces together:
//!
//! ```text
//! caller -> calendar -> performance cache -> fetcher -> synthetic fill -> cache write -> caller
//! ```
//!
//! Callers pass dates as `YYYY-MM-DD` strings and instruments as bare or
//! suffixed codes; those are the only inputs that can fail. Upstream trouble is
//! absorbed below this layer and shows up as `NoData` or synthetic values.
//!
//! Concurrent requests for the same key are not coalesced: both run the full
//! path and the later cache write wins.

use std::{collections::BTreeMap, future::Future, sync::Arc};

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info};

use crate::{
    cache::{CacheStats, TrendDataCache},
    calendar::TradingCalendarResolver,
    config::{PipelineConfig, PipelineOptions},
    dates::{parse_trade_date, parse_trade_dates, to_compact},
    errors::{Error, Result},
    fetcher::MarketDataFetcher,
    models::{Direction, InstrumentCode, PerformanceRecord},
    providers::{CalendarProvider, MarketDataProvider, tushare::TushareProvider},
    synthetic::SyntheticDataGenerator,
};

/// Trading days in a trailing week.
pub const TRAILING_WEEK_DAYS: usize = 5;

/// Several instruments over the same trading days.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendMatrix {
    pub base_date: NaiveDate,
    pub days: Vec<NaiveDate>,
    /// Bare code → record, in the order the caller listed the instruments.
    /// The aggregate cache key carries that order too.
    pub rows: IndexMap<String, PerformanceRecord>,
}

impl TrendMatrix {
    /// Code → (date → percent), provenance dropped.
    pub fn values(&self) -> IndexMap<String, BTreeMap<NaiveDate, f64>> {
        self.rows
            .iter()
            .map(|(code, record)| (code.clone(), record.values()))
            .collect()
    }
}

pub struct PipelineOrchestrator {
    calendar: Arc<TradingCalendarResolver>,
    fetcher: Arc<MarketDataFetcher>,
    cache: Arc<TrendDataCache>,
    synthetic: Arc<SyntheticDataGenerator>,
    options: PipelineOptions,
}

impl PipelineOrchestrator {
    pub fn new(
        calendar: Arc<TradingCalendarResolver>,
        fetcher: Arc<MarketDataFetcher>,
        cache: Arc<TrendDataCache>,
        synthetic: Arc<SyntheticDataGenerator>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            calendar,
            fetcher,
            cache,
            synthetic,
            options,
        }
    }

    /// Builds the pipeline against the Tushare-compatible endpoint in `config`.
    ///
    /// One client serves both the calendar and the market-data side; each
    /// side still gets its own rate limiter.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let provider = Arc::new(TushareProvider::new(&config.provider)?);
        Self::with_providers(provider.clone(), provider, config)
    }

    /// Builds the pipeline around caller-supplied providers.
    pub fn with_providers(
        calendar_provider: Arc<dyn CalendarProvider + Send + Sync>,
        market_provider: Arc<dyn MarketDataProvider + Send + Sync>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let synthetic = Arc::new(SyntheticDataGenerator::from_config(&config.synthetic)?);
        let calendar = Arc::new(TradingCalendarResolver::new(
            calendar_provider,
            &config.calendar,
        ));
        let fetcher = Arc::new(MarketDataFetcher::from_config(
            market_provider,
            synthetic.clone(),
            &config.market_data,
        ));
        let cache = Arc::new(TrendDataCache::from_config(&config.cache));
        Ok(Self::new(
            calendar,
            fetcher,
            cache,
            synthetic,
            config.pipeline.clone(),
        ))
    }

    /// `count` trading days from `date` in `direction`, oldest first.
    pub async fn resolve_trading_days(
        &self,
        date: &str,
        count: usize,
        direction: Direction,
    ) -> Result<Vec<NaiveDate>> {
        let anchor = parse_trade_date(date)?;
        Ok(self.calendar.resolve(anchor, count, direction).await)
    }

    /// Whether the exchange is open on `date`.
    pub async fn is_trading_day(&self, date: &str) -> Result<bool> {
        let date = parse_trade_date(date)?;
        Ok(self.calendar.is_trading_day(date).await)
    }

    /// Daily changes of `id` over the `horizon_days` trading days after `base_date`.
    pub async fn get_performance(
        &self,
        id: &str,
        base_date: &str,
        horizon_days: usize,
    ) -> Result<PerformanceRecord> {
        let code = InstrumentCode::parse(id)?;
        let base = parse_trade_date(base_date)?;
        if horizon_days == 0 {
            return Err(Error::invalid("horizon_days must be at least 1"));
        }
        let days = self.calendar.next_trading_days(base, horizon_days).await;
        Ok(self.performance_for(&code, &days).await)
    }

    /// Daily changes of `id` over the five trading days ending on `date`.
    pub async fn get_trailing_week(&self, id: &str, date: &str) -> Result<PerformanceRecord> {
        let code = InstrumentCode::parse(id)?;
        let anchor = parse_trade_date(date)?;
        let days = self
            .calendar
            .prior_trading_days(anchor, TRAILING_WEEK_DAYS)
            .await;
        Ok(self.performance_for(&code, &days).await)
    }

    /// Daily changes of `id` for exactly `dates`.
    pub async fn get_instrument_performance<S: AsRef<str>>(
        &self,
        id: &str,
        dates: &[S],
    ) -> Result<PerformanceRecord> {
        let code = InstrumentCode::parse(id)?;
        let dates = parse_trade_dates(dates)?;
        Ok(self.performance_for(&code, &dates).await)
    }

    /// Several instruments over the `horizon_days` trading days after
    /// `base_date`, cached as one aggregate.
    ///
    /// The aggregate is keyed by the resolved days, so a matrix built on the
    /// weekday fallback is not served once the calendar answers again.
    pub async fn get_trend_matrix<S: AsRef<str>>(
        &self,
        ids: &[S],
        base_date: &str,
        horizon_days: usize,
    ) -> Result<TrendMatrix> {
        let mut codes = Vec::with_capacity(ids.len());
        for id in ids {
            let code = InstrumentCode::parse(id.as_ref())?;
            // Rows are keyed by bare code; the first listing wins.
            if !codes.iter().any(|c: &InstrumentCode| c.code() == code.code()) {
                codes.push(code);
            }
        }
        let base = parse_trade_date(base_date)?;
        if horizon_days == 0 {
            return Err(Error::invalid("horizon_days must be at least 1"));
        }

        let days = self.calendar.next_trading_days(base, horizon_days).await;
        let key = matrix_key(&codes, base, &days);
        self.get_or_refresh_aggregate(&key, || self.build_matrix(&codes, base, days))
            .await
    }

    /// Returns the cached aggregate under `key`, or runs `producer` and
    /// caches its output.
    pub async fn get_or_refresh_aggregate<T, F, Fut>(&self, key: &str, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.cache.get_aggregate(key) {
            debug!(key, "aggregate cache hit");
            return Ok(cached);
        }
        let value = producer().await?;
        self.cache.put_aggregate(key, &value)?;
        Ok(value)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drops every cached performance record of `id`.
    pub fn invalidate_instrument(&self, id: &str) -> Result<usize> {
        let code = InstrumentCode::parse(id)?;
        Ok(self.cache.invalidate_instrument(&code.ts_code()))
    }

    /// Sweeps expired entries from the performance and aggregate tiers.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Empties every cache, calendar ranges included.
    pub fn clear_caches(&self) {
        self.cache.clear();
        self.calendar.clear();
    }

    async fn performance_for(&self, code: &InstrumentCode, days: &[NaiveDate]) -> PerformanceRecord {
        if days.is_empty() {
            return PerformanceRecord::new(code.code());
        }
        if let Some(record) = self.cache.get_performance(&code.ts_code(), days) {
            return record;
        }
        let record = self.fetcher.fetch_with_fallback(code, days).await;
        self.finish(code, days, record)
    }

    async fn build_matrix(
        &self,
        codes: &[InstrumentCode],
        base: NaiveDate,
        days: Vec<NaiveDate>,
    ) -> Result<TrendMatrix> {
        let mut rows = IndexMap::with_capacity(codes.len());
        let mut missing = Vec::new();
        for code in codes {
            match self.cache.get_performance(&code.ts_code(), &days) {
                Some(record) => {
                    rows.insert(code.code().to_string(), record);
                }
                None => missing.push(code.clone()),
            }
        }

        if !missing.is_empty() && !days.is_empty() {
            let mut fetched = self.fetcher.fetch_many_with_fallback(&missing, &days).await;
            for code in &missing {
                let record = fetched
                    .remove(code.code())
                    .unwrap_or_else(|| PerformanceRecord::new(code.code()));
                rows.insert(code.code().to_string(), self.finish(code, &days, record));
            }
        }

        // Restore caller order; cache hits were inserted first.
        let mut ordered = IndexMap::with_capacity(codes.len());
        for code in codes {
            let record = rows
                .swap_remove(code.code())
                .unwrap_or_else(|| PerformanceRecord::new(code.code()));
            ordered.insert(code.code().to_string(), record);
        }
        Ok(TrendMatrix {
            base_date: base,
            days,
            rows: ordered,
        })
    }

    /// Applies total-failure synthesis and writes the record to the cache.
    fn finish(
        &self,
        code: &InstrumentCode,
        days: &[NaiveDate],
        mut record: PerformanceRecord,
    ) -> PerformanceRecord {
        if record.real_count() == 0 && self.options.synthesize_on_total_failure {
            let no_data = record.no_data_dates();
            if !no_data.is_empty() {
                info!(
                    instrument = code.code(),
                    days = no_data.len(),
                    "no real data, using synthetic values"
                );
                record.merge(self.synthetic.generate(code, &no_data));
            }
        }
        self.cache.put_performance(&code.ts_code(), days, record.clone());
        record
    }
}

fn matrix_key(codes: &[InstrumentCode], base: NaiveDate, days: &[NaiveDate]) -> String {
    let codes: Vec<String> = codes.iter().map(InstrumentCode::ts_code).collect();
    let days: Vec<String> = days.iter().map(|d| to_compact(*d)).collect();
    format!("trend_matrix:{}:{base}:{}", codes.join(","), days.join(","))
}
