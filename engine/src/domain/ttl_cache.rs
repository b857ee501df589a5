//! Capacity- and time-bounded in-memory cache with bulk eviction.
//!
//! Entries expire once `now - created_at > ttl`. When an insert would push the
//! table past its cleanup threshold, expired entries are purged first and the
//! oldest survivors are evicted until the table is back at
//! `cleanup_entry_count`. Nothing is persisted.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tracing::debug;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Sizing and expiry policy for a [`BoundedTtlCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfiguration {
    /// Hard upper bound on stored entries.
    pub max_entries: usize,
    /// Age after which an entry is treated as a miss.
    pub ttl: Duration,
    /// Fraction of `max_entries` above which bulk eviction triggers.
    pub cleanup_threshold: f64,
    /// Target table size after a bulk eviction.
    pub cleanup_entry_count: usize,
}

impl CacheConfiguration {
    /// Preset for panorama availability and scene results (30 days).
    pub fn panorama() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(30 * SECONDS_PER_DAY),
            cleanup_threshold: 0.9,
            cleanup_entry_count: 700,
        }
    }

    /// Preset for coordinate-to-address lookups (7 days).
    pub fn address() -> Self {
        Self {
            max_entries: 500,
            ttl: Duration::from_secs(7 * SECONDS_PER_DAY),
            cleanup_threshold: 0.9,
            cleanup_entry_count: 350,
        }
    }

    fn needs_cleanup(&self, len: usize) -> bool {
        len >= self.max_entries || len as f64 > self.max_entries as f64 * self.cleanup_threshold
    }

    fn cleanup_target(&self) -> usize {
        self.cleanup_entry_count
            .min(self.max_entries.saturating_sub(1))
    }

    fn ttl_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX)
    }
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self::panorama()
    }
}

/// Point-in-time occupancy figures for a cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatistics {
    /// Entries currently stored, expired or not.
    pub entry_count: usize,
    /// Configured capacity.
    pub max_entries: usize,
    /// `entry_count / max_entries`, or zero for a zero-capacity cache.
    pub usage: f64,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    created_at: DateTime<Utc>,
    sequence: u64,
    value: V,
}

#[derive(Debug)]
struct CacheTable<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    next_sequence: u64,
}

/// Generic TTL cache guarded by a mutex.
///
/// # Examples
/// ```
/// use std::sync::Arc;
///
/// use mockable::DefaultClock;
/// use route_panorama::domain::{BoundedTtlCache, CacheConfiguration};
///
/// let cache = BoundedTtlCache::new(CacheConfiguration::address(), Arc::new(DefaultClock));
/// cache.put("home", "1 Royal Mile".to_owned());
/// assert_eq!(cache.get(&"home").as_deref(), Some("1 Royal Mile"));
/// assert_eq!(cache.statistics().entry_count, 1);
/// ```
pub struct BoundedTtlCache<K, V> {
    config: CacheConfiguration,
    clock: Arc<dyn Clock>,
    table: Mutex<CacheTable<K, V>>,
}

impl<K, V> BoundedTtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Build an empty cache reading time from `clock`.
    pub fn new(config: CacheConfiguration, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            table: Mutex::new(CacheTable {
                entries: HashMap::new(),
                next_sequence: 0,
            }),
        }
    }

    /// Configured sizing policy.
    pub fn config(&self) -> &CacheConfiguration {
        &self.config
    }

    /// Return a clone of the value for `key` unless it is missing or expired.
    ///
    /// Expired entries are removed on access.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.utc();
        let ttl = self.config.ttl_delta();
        let mut table = self.lock();
        match table.entries.get(key) {
            Some(entry) if !is_expired(entry, now, ttl) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        table.entries.remove(key);
        None
    }

    /// Store `value` under `key`, evicting in bulk first when the table is
    /// above its cleanup threshold.
    ///
    /// Replacing an existing key refreshes its timestamp without eviction.
    pub fn put(&self, key: K, value: V) {
        if self.config.max_entries == 0 {
            return;
        }
        let now = self.clock.utc();
        let mut table = self.lock();
        if !table.entries.contains_key(&key) && self.config.needs_cleanup(table.entries.len()) {
            self.evict(&mut table, now);
        }
        let sequence = table.next_sequence;
        table.next_sequence = sequence.wrapping_add(1);
        table.entries.insert(
            key,
            CacheEntry {
                created_at: now,
                sequence,
                value,
            },
        );
    }

    /// Remove `key`, returning its value when present and unexpired.
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = self.clock.utc();
        let ttl = self.config.ttl_delta();
        self.lock()
            .entries
            .remove(key)
            .filter(|entry| !is_expired(entry, now, ttl))
            .map(|entry| entry.value)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.utc();
        let mut table = self.lock();
        self.purge_locked(&mut table, now)
    }

    /// Number of stored entries, including any not yet purged after expiry.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupancy figures for diagnostics.
    pub fn statistics(&self) -> CacheStatistics {
        let entry_count = self.len();
        let max_entries = self.config.max_entries;
        let usage = if max_entries == 0 {
            0.0
        } else {
            entry_count as f64 / max_entries as f64
        };
        CacheStatistics {
            entry_count,
            max_entries,
            usage,
        }
    }

    fn evict(&self, table: &mut CacheTable<K, V>, now: DateTime<Utc>) {
        let purged = self.purge_locked(table, now);
        let target = self.config.cleanup_target();
        let excess = table.entries.len().saturating_sub(target);
        if excess > 0 {
            let mut by_age: Vec<(DateTime<Utc>, u64, K)> = table
                .entries
                .iter()
                .map(|(key, entry)| (entry.created_at, entry.sequence, key.clone()))
                .collect();
            by_age.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
            for (_, _, key) in by_age.into_iter().take(excess) {
                table.entries.remove(&key);
            }
        }
        debug!(
            purged,
            evicted = excess,
            remaining = table.entries.len(),
            "cache cleanup ran"
        );
    }

    fn purge_locked(&self, table: &mut CacheTable<K, V>, now: DateTime<Utc>) -> usize {
        let ttl = self.config.ttl_delta();
        let before = table.entries.len();
        table.entries.retain(|_, entry| !is_expired(entry, now, ttl));
        before - table.entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, CacheTable<K, V>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_expired<V>(entry: &CacheEntry<V>, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
    now.signed_duration_since(entry.created_at) > ttl
}

#[cfg(test)]
mod tests {
    //! Expiry, eviction, and statistics coverage.
    use super::*;
    use crate::test_support::MutableClock;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    #[fixture]
    fn clock() -> Arc<MutableClock> {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid time");
        Arc::new(MutableClock::new(now))
    }

    fn small_config() -> CacheConfiguration {
        CacheConfiguration {
            max_entries: 10,
            ttl: Duration::from_secs(60),
            cleanup_threshold: 0.8,
            cleanup_entry_count: 5,
        }
    }

    #[rstest]
    fn get_returns_value_until_ttl_elapses(clock: Arc<MutableClock>) {
        let cache = BoundedTtlCache::new(small_config(), clock.clone());
        cache.put(1_u32, "scene");

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get(&1), Some("scene"), "exactly ttl old is still fresh");

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty(), "expired entry is removed on access");
    }

    #[rstest]
    fn overwrite_refreshes_timestamp(clock: Arc<MutableClock>) {
        let cache = BoundedTtlCache::new(small_config(), clock.clone());
        cache.put(1_u32, "old");
        clock.advance(Duration::from_secs(50));
        cache.put(1_u32, "new");
        clock.advance(Duration::from_secs(50));
        assert_eq!(cache.get(&1), Some("new"));
    }

    #[rstest]
    fn crossing_threshold_evicts_oldest_first(clock: Arc<MutableClock>) {
        let cache = BoundedTtlCache::new(small_config(), clock.clone());
        for key in 0..9_u32 {
            cache.put(key, key);
            clock.advance(Duration::from_secs(1));
        }
        // 9 > 10 * 0.8, so this insert trims to 5 before adding.
        cache.put(100, 100);

        assert_eq!(cache.len(), 6);
        for evicted in 0..4_u32 {
            assert_eq!(cache.get(&evicted), None, "key {evicted} should be evicted");
        }
        for kept in 4..9_u32 {
            assert_eq!(cache.get(&kept), Some(kept));
        }
        assert_eq!(cache.get(&100), Some(100));
    }

    #[rstest]
    fn insertion_order_breaks_timestamp_ties(clock: Arc<MutableClock>) {
        let cache = BoundedTtlCache::new(small_config(), clock);
        for key in 0..9_u32 {
            cache.put(key, key);
        }
        cache.put(100, 100);
        assert_eq!(cache.get(&3), None);
        assert_eq!(cache.get(&4), Some(4));
    }

    #[rstest]
    fn cleanup_purges_expired_before_evicting_fresh(clock: Arc<MutableClock>) {
        let cache = BoundedTtlCache::new(small_config(), clock.clone());
        for key in 0..6_u32 {
            cache.put(key, key);
        }
        clock.advance(Duration::from_secs(120));
        for key in 6..9_u32 {
            cache.put(key, key);
        }
        cache.put(100, 100);

        assert_eq!(cache.len(), 4);
        for kept in [6_u32, 7, 8, 100] {
            assert_eq!(cache.get(&kept), Some(kept));
        }
    }

    #[rstest]
    fn never_exceeds_max_entries(clock: Arc<MutableClock>) {
        let config = CacheConfiguration {
            max_entries: 4,
            ttl: Duration::from_secs(60),
            cleanup_threshold: 1.5,
            cleanup_entry_count: 10,
        };
        let cache = BoundedTtlCache::new(config, clock);
        for key in 0..20_u32 {
            cache.put(key, key);
            assert!(cache.len() <= 4);
        }
    }

    #[rstest]
    fn zero_capacity_stores_nothing(clock: Arc<MutableClock>) {
        let config = CacheConfiguration {
            max_entries: 0,
            ..small_config()
        };
        let cache = BoundedTtlCache::new(config, clock);
        cache.put(1_u32, 1_u32);
        assert!(cache.is_empty());
        assert_eq!(cache.statistics().usage, 0.0);
    }

    #[rstest]
    fn statistics_report_usage(clock: Arc<MutableClock>) {
        let cache = BoundedTtlCache::new(small_config(), clock);
        cache.put(1_u32, 1_u32);
        cache.put(2_u32, 2_u32);
        let stats = cache.statistics();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.max_entries, 10);
        assert!((stats.usage - 0.2).abs() < f64::EPSILON);
    }

    #[rstest]
    fn clear_and_remove(clock: Arc<MutableClock>) {
        let cache = BoundedTtlCache::new(small_config(), clock);
        cache.put(1_u32, 1_u32);
        cache.put(2_u32, 2_u32);
        assert_eq!(cache.remove(&1), Some(1));
        assert_eq!(cache.remove(&1), None);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[rstest]
    fn purge_expired_counts_removed_entries(clock: Arc<MutableClock>) {
        let cache = BoundedTtlCache::new(small_config(), clock.clone());
        cache.put(1_u32, 1_u32);
        clock.advance(Duration::from_secs(61));
        cache.put(2_u32, 2_u32);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[rstest]
    fn presets_match_documented_sizes() {
        let panorama = CacheConfiguration::panorama();
        assert_eq!(panorama.max_entries, 1_000);
        assert_eq!(panorama.ttl, Duration::from_secs(30 * SECONDS_PER_DAY));
        let address = CacheConfiguration::address();
        assert_eq!(address.max_entries, 500);
        assert_eq!(address.ttl, Duration::from_secs(7 * SECONDS_PER_DAY));
    }
}
