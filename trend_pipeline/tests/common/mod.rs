//! In-memory providers shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::NaiveDate;
use trend_pipeline::{
    config::PipelineConfig,
    dates::is_weekday,
    models::{BatchRequest, CalendarRequest, ChangeRow, SingleRequest},
    providers::{
        ApiSnafu, CalendarProvider, MarketDataProvider, ProviderError, RateLimitedSnafu,
    },
};

pub const QUOTA_MESSAGE: &str = "抱歉，您每分钟最多访问该接口500次";

pub fn d(m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, day).unwrap()
}

/// Default config with "today" pinned well after the test dates.
pub fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.synthetic.today = Some(d(12, 31));
    config
}

/// Weekdays minus `closed`; an empty answer when `empty` is set and an error
/// while `down`.
pub struct MockCalendar {
    closed: Vec<NaiveDate>,
    empty: bool,
    down: AtomicBool,
    pub calls: AtomicUsize,
}

impl MockCalendar {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            closed: Vec::new(),
            empty: true,
            down: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_holidays(closed: Vec<NaiveDate>) -> Arc<Self> {
        Arc::new(Self {
            closed,
            empty: false,
            down: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl CalendarProvider for MockCalendar {
    async fn open_days(&self, request: &CalendarRequest) -> Result<Vec<NaiveDate>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return ApiSnafu {
                code: 503,
                message: "calendar unavailable",
            }
            .fail();
        }
        if self.empty {
            return Ok(Vec::new());
        }
        Ok(request
            .start
            .iter_days()
            .take_while(|d| *d <= request.end)
            .filter(|d| is_weekday(*d) && !self.closed.contains(d))
            .collect())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchMode {
    /// Answer from the stored rows.
    Serve,
    Throttled,
    Broken,
}

#[derive(Clone, Copy, Debug)]
pub enum SingleMode {
    /// Answer from the stored rows.
    Serve,
    Throttled,
    Broken,
}

/// Market data served from a fixed table, with scripted failures.
pub struct MockMarket {
    rows: HashMap<(String, NaiveDate), f64>,
    batch: BatchMode,
    /// Consumed front to back; `fallback` applies once empty.
    singles: Mutex<VecDeque<SingleMode>>,
    fallback: SingleMode,
    pub batch_calls: AtomicUsize,
    pub single_calls: AtomicUsize,
    pub batch_requests: Mutex<Vec<BatchRequest>>,
}

impl MockMarket {
    pub fn new(batch: BatchMode, fallback: SingleMode) -> Self {
        Self {
            rows: HashMap::new(),
            batch,
            singles: Mutex::new(VecDeque::new()),
            fallback,
            batch_calls: AtomicUsize::new(0),
            single_calls: AtomicUsize::new(0),
            batch_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn row(mut self, ts_code: &str, date: NaiveDate, pct_chg: f64) -> Self {
        self.rows.insert((ts_code.to_string(), date), pct_chg);
        self
    }

    pub fn script(self, singles: Vec<SingleMode>) -> Self {
        *self.singles.lock().unwrap() = singles.into();
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    fn throttled<T>() -> Result<T, ProviderError> {
        RateLimitedSnafu {
            message: QUOTA_MESSAGE,
        }
        .fail()
    }

    fn broken<T>() -> Result<T, ProviderError> {
        ApiSnafu {
            code: -1,
            message: "internal error",
        }
        .fail()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarket {
    async fn daily_changes(&self, request: &BatchRequest) -> Result<Vec<ChangeRow>, ProviderError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_requests.lock().unwrap().push(request.clone());
        match self.batch {
            BatchMode::Throttled => Self::throttled(),
            BatchMode::Broken => Self::broken(),
            BatchMode::Serve => Ok(self
                .rows
                .iter()
                .filter(|((ts_code, date), _)| {
                    request.ts_codes.contains(ts_code) && (request.start..=request.end).contains(date)
                })
                .map(|((ts_code, date), pct_chg)| ChangeRow {
                    ts_code: ts_code.clone(),
                    trade_date: *date,
                    pct_chg: *pct_chg,
                })
                .collect()),
        }
    }

    async fn daily_change(&self, request: &SingleRequest) -> Result<Option<ChangeRow>, ProviderError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        let mode = self.singles.lock().unwrap().pop_front().unwrap_or(self.fallback);
        match mode {
            SingleMode::Throttled => Self::throttled(),
            SingleMode::Broken => Self::broken(),
            SingleMode::Serve => Ok(self
                .rows
                .get(&(request.ts_code.clone(), request.date))
                .map(|pct_chg| ChangeRow {
                    ts_code: request.ts_code.clone(),
                    trade_date: request.date,
                    pct_chg: *pct_chg,
                })),
        }
    }
}
