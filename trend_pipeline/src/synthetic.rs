//! Deterministic fallback values.
//!
//! When the upstream provider cannot supply a day, the pipeline fills it with
//! a plausible percentage change derived from nothing but the instrument code
//! and the date. The same `(code, date)` always yields the same value, whatever
//! other dates are requested alongside it, so a record assembled from partial
//! real data plus synthetic fill matches a fully synthetic one on the filled
//! days.
//!
//! Shape of a value:
//! - a per-day draw in `[-1, 1]` from a hash of `"{code}|{yyyymmdd}|{ordinal}"`;
//! - 30% momentum carried over from the previous weekday's draw;
//! - a per-instrument bias of up to ±20% so some names run "strong" and
//!   others "weak";
//! - scaled by the class half-width, clamped and rounded to 2 decimals.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;

use crate::{
    config::SyntheticConfig,
    dates::{previous_weekday, to_compact, today_in},
    errors::Result,
    models::{DataPoint, InstrumentClass, InstrumentCode, PerformanceRecord},
};

const MOMENTUM: f64 = 0.3;
const BIAS: f64 = 0.2;

/// Largest absolute synthetic change for a class, in percent.
pub fn half_width(class: InstrumentClass) -> f64 {
    match class {
        InstrumentClass::Growth => 8.0,
        InstrumentClass::Standard => 5.0,
        InstrumentClass::Restricted => 2.5,
    }
}

/// Polynomial rolling hash, `h = h * 31 + byte` with wrapping.
fn rolling_hash(s: &str) -> u32 {
    s.bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

// murmur3 finalizer; spreads the low-entropy rolling hash over all bits.
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// Maps a hash onto `[-1, 1]`.
fn unit(h: u32) -> f64 {
    f64::from(fmix32(h)) / f64::from(u32::MAX) * 2.0 - 1.0
}

fn daily_draw(code: &str, date: NaiveDate) -> f64 {
    unit(rolling_hash(&format!(
        "{code}|{}|{}",
        to_compact(date),
        date.ordinal()
    )))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Clone, Debug)]
pub struct SyntheticDataGenerator {
    restricted: HashSet<String>,
    tz: Tz,
    pinned_today: Option<NaiveDate>,
}

impl SyntheticDataGenerator {
    /// `restricted` holds bare codes; `tz` decides which calendar date is "today".
    pub fn new(restricted: HashSet<String>, tz: Tz) -> Self {
        Self {
            restricted,
            tz,
            pinned_today: None,
        }
    }

    pub fn from_config(config: &SyntheticConfig) -> Result<Self> {
        let generator = Self::new(config.restricted_set(), config.tz()?);
        Ok(match config.today {
            Some(today) => generator.with_today(today),
            None => generator,
        })
    }

    /// Freezes "today", for reproducible runs and tests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.pinned_today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.pinned_today.unwrap_or_else(|| today_in(self.tz))
    }

    pub fn class_of(&self, id: &InstrumentCode) -> InstrumentClass {
        id.class(&self.restricted)
    }

    /// The synthetic value for one day, ignoring "today".
    pub fn value_for(&self, id: &InstrumentCode, date: NaiveDate) -> f64 {
        let width = half_width(self.class_of(id));
        let code = id.code();
        let momentum = previous_weekday(date)
            .map(|prev| daily_draw(code, prev))
            .unwrap_or(0.0);
        let blended = (1.0 - MOMENTUM) * daily_draw(code, date) + MOMENTUM * momentum;
        let bias = unit(rolling_hash(code)) * BIAS;
        round2(((blended + bias) * width).clamp(-width, width))
    }

    /// One point per date; dates after today are [`DataPoint::no_data`].
    pub fn generate(&self, id: &InstrumentCode, dates: &[NaiveDate]) -> PerformanceRecord {
        let today = self.today();
        let mut record = PerformanceRecord::new(id.code());
        for &date in dates {
            let point = if date > today {
                DataPoint::no_data()
            } else {
                DataPoint::synthetic(self.value_for(id, date))
            };
            record.insert(date, point);
        }
        record
    }
}
