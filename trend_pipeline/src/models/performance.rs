//! Per-instrument daily percentage-change records.
//!
//! Every value carries a [`Provenance`] so callers and tests can tell real
//! upstream data from "the provider had nothing" zeros and synthetic fill,
//! even though the external view ([`PerformanceRecord::values`]) is a plain
//! date → percent map.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Where a single value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Returned by the upstream provider.
    Real,
    /// The provider answered without a value, failed, or the date is in the future.
    NoData,
    /// Filled in by the synthetic generator.
    Synthetic,
}

/// One percentage-change value plus its provenance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Signed percentage change for the day.
    pub value: f64,
    /// Where the value came from.
    pub provenance: Provenance,
}

impl DataPoint {
    pub fn real(value: f64) -> Self {
        Self {
            value,
            provenance: Provenance::Real,
        }
    }

    pub fn no_data() -> Self {
        Self {
            value: 0.0,
            provenance: Provenance::NoData,
        }
    }

    pub fn synthetic(value: f64) -> Self {
        Self {
            value,
            provenance: Provenance::Synthetic,
        }
    }

    pub fn is_real(&self) -> bool {
        self.provenance == Provenance::Real
    }
}

/// Trading day → [`DataPoint`] for a single instrument.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Bare instrument code the record belongs to.
    pub instrument: String,
    points: BTreeMap<NaiveDate, DataPoint>,
}

impl PerformanceRecord {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            points: BTreeMap::new(),
        }
    }

    /// Sets (or replaces) the point for `date`.
    pub fn insert(&mut self, date: NaiveDate, point: DataPoint) {
        self.points.insert(date, point);
    }

    /// Copies every point of `other` into `self`, overwriting shared dates.
    pub fn merge(&mut self, other: PerformanceRecord) {
        self.points.extend(other.points);
    }

    pub fn point(&self, date: NaiveDate) -> Option<&DataPoint> {
        self.points.get(&date)
    }

    pub fn value(&self, date: NaiveDate) -> Option<f64> {
        self.points.get(&date).map(|p| p.value)
    }

    pub fn provenance(&self, date: NaiveDate) -> Option<Provenance> {
        self.points.get(&date).map(|p| p.provenance)
    }

    /// The caller-facing view: date → percentage, provenance dropped.
    pub fn values(&self) -> BTreeMap<NaiveDate, f64> {
        self.points.iter().map(|(d, p)| (*d, p.value)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &DataPoint)> {
        self.points.iter()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `true` when every one of `dates` has a real upstream value.
    pub fn covers_with_real(&self, dates: &[NaiveDate]) -> bool {
        dates
            .iter()
            .all(|d| self.points.get(d).is_some_and(DataPoint::is_real))
    }

    /// Non-empty and every point is [`Provenance::Real`].
    pub fn is_complete_real(&self) -> bool {
        !self.points.is_empty() && self.points.values().all(DataPoint::is_real)
    }

    pub fn count(&self, provenance: Provenance) -> usize {
        self.points
            .values()
            .filter(|p| p.provenance == provenance)
            .count()
    }

    pub fn real_count(&self) -> usize {
        self.count(Provenance::Real)
    }

    pub fn synthetic_count(&self) -> usize {
        self.count(Provenance::Synthetic)
    }

    /// Mixes real and synthetic values.
    pub fn is_hybrid(&self) -> bool {
        self.real_count() > 0 && self.synthetic_count() > 0
    }

    /// Dates whose point is [`Provenance::NoData`].
    pub fn no_data_dates(&self) -> Vec<NaiveDate> {
        self.points
            .iter()
            .filter(|(_, p)| p.provenance == Provenance::NoData)
            .map(|(d, _)| *d)
            .collect()
    }
}
