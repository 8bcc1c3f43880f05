use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Parameters for an open-days calendar lookup.
///
/// Both bounds are inclusive. Providers return only days flagged as open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRequest {
    /// Exchange identifier understood by the provider (e.g. `SSE`).
    pub exchange: String,
    /// First day of the range (inclusive).
    pub start: NaiveDate,
    /// Last day of the range (inclusive).
    pub end: NaiveDate,
}

/// A batched percentage-change request covering several instruments.
///
/// The provider is asked for the whole `start..=end` range; callers pick out
/// the days they care about when demultiplexing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Provider-qualified codes (`600519.SH`).
    pub ts_codes: Vec<String>,
    /// First day of the range (inclusive).
    pub start: NaiveDate,
    /// Last day of the range (inclusive).
    pub end: NaiveDate,
}

/// A single (instrument, day) percentage-change request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleRequest {
    /// Provider-qualified code (`600519.SH`).
    pub ts_code: String,
    /// The trading day.
    pub date: NaiveDate,
}

/// One row of upstream percentage-change data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeRow {
    /// Provider-qualified code the row belongs to.
    pub ts_code: String,
    /// The trading day.
    pub trade_date: NaiveDate,
    /// Close-over-previous-close change, in percent.
    pub pct_chg: f64,
}
