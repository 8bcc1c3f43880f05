//! Trading-day resolution.
//!
//! [`TradingCalendarResolver`] asks the calendar provider for the open days of
//! a date range and caches the answer per `(start, end)`. When the provider is
//! unreachable, slow, throttled, or simply returns nothing, the resolved set is
//! empty and every walk falls back to "Monday to Friday is open". That
//! heuristic is wrong on exchange holidays, which is why a non-empty provider
//! answer always wins.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    cache::TtlMap,
    config::CalendarConfig,
    dates::{add_days, is_weekday, sub_days},
    models::{CalendarRequest, Direction},
    providers::{CalendarProvider, with_deadline},
    rate_limit::SlidingWindowLimiter,
};

/// Walk length never drops below this many calendar days. Longer than any
/// exchange closure, so a healthy provider always has an open day to report.
const MIN_HORIZON_DAYS: u64 = 30;
/// Walk length never exceeds one year.
const MAX_HORIZON_DAYS: u64 = 366;
/// Half-width of the window resolved by [`TradingCalendarResolver::is_trading_day`].
const MEMBERSHIP_WINDOW_DAYS: u64 = 10;

/// The open days of one inclusive date range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub open_days: BTreeSet<NaiveDate>,
}

/// Calendar days scanned to find `count` trading days.
pub fn horizon(count: usize) -> u64 {
    let wanted = (count as u64).saturating_mul(3);
    wanted.clamp(MIN_HORIZON_DAYS, MAX_HORIZON_DAYS)
}

fn is_open(open_days: &BTreeSet<NaiveDate>, date: NaiveDate) -> bool {
    if open_days.is_empty() {
        is_weekday(date)
    } else {
        open_days.contains(&date)
    }
}

pub struct TradingCalendarResolver {
    provider: Arc<dyn CalendarProvider + Send + Sync>,
    limiter: SlidingWindowLimiter,
    exchange: String,
    timeout: Duration,
    ranges: TtlMap<(NaiveDate, NaiveDate), CalendarRange>,
}

impl TradingCalendarResolver {
    pub fn new(provider: Arc<dyn CalendarProvider + Send + Sync>, config: &CalendarConfig) -> Self {
        Self {
            provider,
            limiter: SlidingWindowLimiter::per_minute(
                "calendar",
                config.max_per_minute,
                config.margin(),
            ),
            exchange: config.exchange.clone(),
            timeout: config.timeout(),
            ranges: TtlMap::new(config.ttl()),
        }
    }

    /// Open days within `start..=end`.
    ///
    /// An empty set means "unknown": the provider failed or had nothing for
    /// the range. Empty answers are not cached.
    pub async fn resolve_range(&self, start: NaiveDate, end: NaiveDate) -> BTreeSet<NaiveDate> {
        if start > end {
            return BTreeSet::new();
        }
        if let Some(range) = self.ranges.get(&(start, end)) {
            return range.open_days;
        }

        self.limiter.admit().await;
        let request = CalendarRequest {
            exchange: self.exchange.clone(),
            start,
            end,
        };
        let open_days: BTreeSet<NaiveDate> =
            match with_deadline(self.timeout, self.provider.open_days(&request)).await {
                Ok(days) => days
                    .into_iter()
                    .filter(|d| (start..=end).contains(d))
                    .collect(),
                Err(e) => {
                    warn!(%start, %end, error = %e, "calendar lookup failed, using weekdays");
                    return BTreeSet::new();
                }
            };

        if open_days.is_empty() {
            debug!(%start, %end, "calendar returned no open days, using weekdays");
            return open_days;
        }

        self.ranges.put(
            (start, end),
            CalendarRange {
                start,
                end,
                open_days: open_days.clone(),
            },
        );
        open_days
    }

    /// Up to `count` trading days strictly after `after`, oldest first.
    pub async fn next_trading_days(&self, after: NaiveDate, count: usize) -> Vec<NaiveDate> {
        if count == 0 {
            return Vec::new();
        }
        let Some(start) = add_days(after, 1) else {
            return Vec::new();
        };
        let end = add_days(after, horizon(count)).unwrap_or(NaiveDate::MAX);
        let open_days = self.resolve_range(start, end).await;

        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| is_open(&open_days, *d))
            .take(count)
            .collect()
    }

    /// Up to `count` trading days on or before `on_or_before`, oldest first.
    pub async fn prior_trading_days(&self, on_or_before: NaiveDate, count: usize) -> Vec<NaiveDate> {
        if count == 0 {
            return Vec::new();
        }
        let start = sub_days(on_or_before, horizon(count) - 1).unwrap_or(NaiveDate::MIN);
        let open_days = self.resolve_range(start, on_or_before).await;

        let mut days: Vec<NaiveDate> = std::iter::successors(Some(on_or_before), |d| d.pred_opt())
            .take_while(|d| *d >= start)
            .filter(|d| is_open(&open_days, *d))
            .take(count)
            .collect();
        days.reverse();
        days
    }

    /// Walks `count` trading days from `anchor` in `direction`.
    pub async fn resolve(
        &self,
        anchor: NaiveDate,
        count: usize,
        direction: Direction,
    ) -> Vec<NaiveDate> {
        match direction {
            Direction::Forward => self.next_trading_days(anchor, count).await,
            Direction::Backward => self.prior_trading_days(anchor, count).await,
        }
    }

    /// Whether `date` is an open day.
    ///
    /// Resolves a small window around the date so holidays are seen by the
    /// provider even though the day itself has no entry.
    pub async fn is_trading_day(&self, date: NaiveDate) -> bool {
        let start = sub_days(date, MEMBERSHIP_WINDOW_DAYS).unwrap_or(NaiveDate::MIN);
        let end = add_days(date, MEMBERSHIP_WINDOW_DAYS).unwrap_or(NaiveDate::MAX);
        let open_days = self.resolve_range(start, end).await;
        is_open(&open_days, date)
    }

    /// Drops every cached range.
    pub fn clear(&self) {
        self.ranges.clear();
    }

    /// Number of cached ranges.
    pub fn cached_ranges(&self) -> usize {
        self.ranges.len()
    }
}
