//! In-process TTL caches.
//!
//! [`TrendDataCache`] holds two independent tiers:
//! - performance records per (instrument, sorted day set), long lived;
//! - aggregate query results keyed by caller-built strings, shorter lived.
//!
//! Each entry carries its own `expires_at`. A lookup at or past that instant
//! counts as a miss and removes the entry; nothing sweeps in the background.
//! There is no size bound, so a stream of unique keys grows memory until the
//! entries are looked up again or [`TrendDataCache::purge_expired`] runs.
//!
//! Locks are plain `std::sync::Mutex`es held only for the map operation,
//! never across an `.await`.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::NaiveDate;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{config::CacheConfig, errors::Result, models::PerformanceRecord};

/// A cached value with its lifetime.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        let created_at = Instant::now();
        Self {
            value,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counters for one cache tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
}

impl TierStats {
    /// Hits over lookups, `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Snapshot of both tiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub performance: TierStats,
    pub aggregate: TierStats,
}

/// A key → [`CacheEntry`] map with one TTL and lazy eviction.
#[derive(Debug)]
pub(crate) struct TtlMap<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Eq + Hash, V: Clone> TtlMap<K, V> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let now = Instant::now();
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub(crate) fn put(&self, key: K, value: V) {
        self.lock().insert(key, CacheEntry::new(value, self.ttl));
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remove(&self, key: &K) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drops every entry whose key matches; returns how many went.
    pub(crate) fn remove_where(&self, mut pred: impl FnMut(&K) -> bool) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| !pred(k));
        before - entries.len()
    }

    pub(crate) fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired_at(now));
        let purged = before - entries.len();
        self.evictions.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn stats(&self) -> TierStats {
        TierStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Performance-tier key: provider-qualified code (`600519.SH`) plus its
/// sorted, de-duplicated day set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PerformanceKey {
    instrument: String,
    dates: Vec<NaiveDate>,
}

impl PerformanceKey {
    pub fn new(instrument: &str, dates: &[NaiveDate]) -> Self {
        let mut dates = dates.to_vec();
        dates.sort_unstable();
        dates.dedup();
        Self {
            instrument: instrument.to_string(),
            dates,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }
}

/// The pipeline's shared two-tier cache.
#[derive(Debug)]
pub struct TrendDataCache {
    performance: TtlMap<PerformanceKey, PerformanceRecord>,
    aggregate: TtlMap<String, Value>,
}

impl TrendDataCache {
    pub fn new(performance_ttl: Duration, aggregate_ttl: Duration) -> Self {
        Self {
            performance: TtlMap::new(performance_ttl),
            aggregate: TtlMap::new(aggregate_ttl),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.performance_ttl(), config.aggregate_ttl())
    }

    pub fn get_performance(&self, instrument: &str, dates: &[NaiveDate]) -> Option<PerformanceRecord> {
        let hit = self.performance.get(&PerformanceKey::new(instrument, dates));
        debug!(instrument, days = dates.len(), hit = hit.is_some(), "performance cache lookup");
        hit
    }

    /// Stores a complete record; replaces any previous record for the same key.
    pub fn put_performance(&self, instrument: &str, dates: &[NaiveDate], record: PerformanceRecord) {
        self.performance
            .put(PerformanceKey::new(instrument, dates), record);
    }

    /// Looks up and decodes an aggregate.
    ///
    /// An entry that no longer decodes as `T` is dropped and reported as a miss.
    pub fn get_aggregate<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let key = key.to_string();
        let value = self.aggregate.get(&key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key = %key, error = %e, "cached aggregate has an unexpected shape, dropping it");
                self.aggregate.remove(&key);
                None
            }
        }
    }

    pub fn put_aggregate<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value)?;
        self.aggregate.put(key.to_string(), encoded);
        Ok(())
    }

    /// Removes every performance record of `instrument`; returns the count.
    pub fn invalidate_instrument(&self, instrument: &str) -> usize {
        self.performance.remove_where(|k| k.instrument() == instrument)
    }

    pub fn invalidate_aggregate(&self, key: &str) -> bool {
        self.aggregate.remove(&key.to_string())
    }

    /// Sweeps expired entries from both tiers.
    pub fn purge_expired(&self) -> usize {
        self.performance.purge_expired() + self.aggregate.purge_expired()
    }

    pub fn clear(&self) {
        self.performance.clear();
        self.aggregate.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            performance: self.performance.stats(),
            aggregate: self.aggregate.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataPoint;

    const HOUR: Duration = Duration::from_secs(3600);

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
    }

    fn record() -> PerformanceRecord {
        let mut r = PerformanceRecord::new("600519");
        r.insert(d(1), DataPoint::real(1.0));
        r.insert(d(2), DataPoint::real(-2.0));
        r
    }

    #[tokio::test(start_paused = true)]
    async fn hit_before_expiry_miss_at_expiry() {
        let cache = TrendDataCache::new(24 * HOUR, 2 * HOUR);
        cache.put_performance("600519", &[d(1), d(2)], record());

        tokio::time::advance(24 * HOUR - Duration::from_millis(1)).await;
        assert_eq!(cache.get_performance("600519", &[d(1), d(2)]), Some(record()));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get_performance("600519", &[d(1), d(2)]), None);

        let stats = cache.stats().performance;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entries, 0, "expired entry is evicted on lookup");
    }

    #[tokio::test(start_paused = true)]
    async fn key_ignores_date_order_and_duplicates() {
        let cache = TrendDataCache::new(HOUR, HOUR);
        cache.put_performance("600519", &[d(2), d(1)], record());
        assert!(cache.get_performance("600519", &[d(1), d(2), d(2)]).is_some());
        assert!(cache.get_performance("600519", &[d(1)]).is_none());
        assert!(cache.get_performance("000001", &[d(1), d(2)]).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tiers_expire_independently() {
        let cache = TrendDataCache::new(24 * HOUR, 2 * HOUR);
        cache.put_performance("600519", &[d(1), d(2)], record());
        cache.put_aggregate("trend:2025-10-01", &vec![1, 2, 3]).unwrap();

        tokio::time::advance(2 * HOUR).await;
        assert_eq!(cache.get_aggregate::<Vec<i32>>("trend:2025-10-01"), None);
        assert!(cache.get_performance("600519", &[d(1), d(2)]).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn aggregate_with_wrong_shape_is_a_miss() {
        let cache = TrendDataCache::new(HOUR, HOUR);
        cache.put_aggregate("k", &"not a number").unwrap();
        assert_eq!(cache.get_aggregate::<u32>("k"), None);
        assert_eq!(cache.stats().aggregate.entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_and_purge() {
        let cache = TrendDataCache::new(HOUR, 2 * HOUR);
        cache.put_performance("600519", &[d(1)], record());
        cache.put_performance("600519", &[d(1), d(2)], record());
        cache.put_performance("000001", &[d(1)], record());
        cache.put_aggregate("a", &1).unwrap();

        assert_eq!(cache.invalidate_instrument("600519"), 2);
        assert_eq!(cache.stats().performance.entries, 1);

        tokio::time::advance(HOUR).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().aggregate.entries, 1);

        assert!(cache.invalidate_aggregate("a"));
        assert!(!cache.invalidate_aggregate("a"));

        cache.put_aggregate("b", &2).unwrap();
        cache.clear();
        assert_eq!(cache.stats().aggregate.entries, 0);
    }

    #[test]
    fn hit_rate() {
        let s = TierStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(s.hit_rate(), 0.75);
        assert_eq!(TierStats::default().hit_rate(), 0.0);
    }
}
