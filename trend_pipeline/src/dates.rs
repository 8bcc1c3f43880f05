//! Date parsing and calendar helpers.
//!
//! Callers hand dates around as `YYYY-MM-DD`; the upstream provider speaks
//! compact `YYYYMMDD`. Both forms are accepted on input.

use chrono::{Datelike, Days, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use crate::errors::{Error, Result};

const ISO_FORMAT: &str = "%Y-%m-%d";
const COMPACT_FORMAT: &str = "%Y%m%d";

/// Parses a trade date in `YYYY-MM-DD` or `YYYYMMDD` form.
pub fn parse_trade_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, ISO_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, COMPACT_FORMAT))
        .map_err(|_| Error::invalid(format!("malformed date '{s}', expected YYYY-MM-DD")))
}

/// Parses every entry with [`parse_trade_date`], failing on the first bad one.
pub fn parse_trade_dates<S: AsRef<str>>(items: &[S]) -> Result<Vec<NaiveDate>> {
    items.iter().map(|s| parse_trade_date(s.as_ref())).collect()
}

/// Formats a date the way the upstream provider expects it (`20251010`).
pub fn to_compact(date: NaiveDate) -> String {
    date.format(COMPACT_FORMAT).to_string()
}

/// Mon–Fri check used when no authoritative calendar is available.
pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The closest weekday strictly before `date`.
pub fn previous_weekday(date: NaiveDate) -> Option<NaiveDate> {
    let mut d = date.pred_opt()?;
    while !is_weekday(d) {
        d = d.pred_opt()?;
    }
    Some(d)
}

/// `date + days`, or `None` when it would leave chrono's representable range.
pub fn add_days(date: NaiveDate, days: u64) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(days))
}

/// `date - days`, or `None` when it would leave chrono's representable range.
pub fn sub_days(date: NaiveDate, days: u64) -> Option<NaiveDate> {
    date.checked_sub_days(Days::new(days))
}

/// Today's calendar date on the exchange's wall clock.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}
