//! Time-bounded result cache in front of a [`StationSource`].
//!
//! Identical queries within the staleness window are answered from memory.
//! Failures are never stored, so the next call after an error goes back to
//! the network. Concurrent misses for the same key each fetch.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use radiowave_proto::config::CacheConfig;
use radiowave_proto::protocol::{Country, Station, StationQuery, Tag};

use crate::client::StationSource;
use crate::error::DirectoryError;

struct CacheEntry<V> {
    value: V,
    inserted: Instant,
    fetched_at: DateTime<Utc>,
}

/// In-memory map with a fixed time-to-live and an entry cap.
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: usize,
    store: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            store: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.duration_since(entry.inserted) < self.ttl
    }

    /// Fresh value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let store = self.lock();
        store
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.value.clone())
    }

    /// Wall-clock time the fresh value for `key` was fetched.
    pub fn fetched_at(&self, key: &K) -> Option<DateTime<Utc>> {
        let now = Instant::now();
        let store = self.lock();
        store
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.fetched_at)
    }

    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        let mut store = self.lock();
        store.retain(|_, entry| now.duration_since(entry.inserted) < self.ttl);
        while store.len() >= self.max_entries && !store.contains_key(&key) {
            let oldest = store
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    store.remove(&k);
                }
                None => break,
            }
        }
        store.insert(
            key,
            CacheEntry {
                value,
                inserted: now,
                fetched_at: Utc::now(),
            },
        );
    }

    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const COUNTRIES_KEY: &str = "countries";
const TAGS_KEY: &str = "tags";

/// A [`StationSource`] with per-query result caching.
pub struct CachedDirectory<S> {
    source: S,
    searches: TtlCache<StationQuery, Vec<Station>>,
    countries: TtlCache<&'static str, Vec<Country>>,
    tags: TtlCache<&'static str, Vec<Tag>>,
}

impl<S: StationSource> CachedDirectory<S> {
    pub fn new(source: S, config: &CacheConfig) -> Self {
        Self {
            source,
            searches: TtlCache::new(config.search_ttl(), config.max_entries),
            countries: TtlCache::new(config.lookup_ttl(), 1),
            tags: TtlCache::new(config.lookup_ttl(), 1),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// When the cached result for `query` was fetched, if one is fresh.
    pub fn fetched_at(&self, query: &StationQuery) -> Option<DateTime<Utc>> {
        self.searches.fetched_at(query)
    }

    /// Drop every cached result; the next call of each kind refetches.
    pub fn invalidate_all(&self) {
        self.searches.invalidate_all();
        self.countries.invalidate_all();
        self.tags.invalidate_all();
        debug!("cache: invalidated");
    }
}

impl<S: StationSource> StationSource for CachedDirectory<S> {
    async fn search(&self, query: &StationQuery) -> Result<Vec<Station>, DirectoryError> {
        if let Some(hit) = self.searches.get(query) {
            debug!("cache: search hit ({} stations)", hit.len());
            return Ok(hit);
        }
        debug!("cache: search miss");
        let stations = self.source.search(query).await?;
        self.searches.insert(query.clone(), stations.clone());
        Ok(stations)
    }

    async fn list_countries(&self) -> Result<Vec<Country>, DirectoryError> {
        if let Some(hit) = self.countries.get(&COUNTRIES_KEY) {
            return Ok(hit);
        }
        let countries = self.source.list_countries().await?;
        self.countries.insert(COUNTRIES_KEY, countries.clone());
        Ok(countries)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, DirectoryError> {
        if let Some(hit) = self.tags.get(&TAGS_KEY) {
            return Ok(hit);
        }
        let tags = self.source.list_tags().await?;
        self.tags.insert(TAGS_KEY, tags.clone());
        Ok(tags)
    }

    async fn report_click(&self, station_id: &str) -> Result<(), DirectoryError> {
        self.source.report_click(station_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        searches: AtomicUsize,
        countries: AtomicUsize,
        fail: AtomicBool,
    }

    impl StationSource for CountingSource {
        async fn search(&self, query: &StationQuery) -> Result<Vec<Station>, DirectoryError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            if query.search_text == "slow" {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(DirectoryError::NoMirrors);
            }
            Ok(vec![Station {
                id: format!("{}-{}", query.search_text, query.offset),
                ..Station::default()
            }])
        }

        async fn list_countries(&self) -> Result<Vec<Country>, DirectoryError> {
            self.countries.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Country {
                name: "Israel".into(),
                iso_3166_1: "IL".into(),
                stationcount: 180,
            }])
        }

        async fn list_tags(&self) -> Result<Vec<Tag>, DirectoryError> {
            Ok(vec![])
        }
    }

    fn cached() -> CachedDirectory<CountingSource> {
        CachedDirectory::new(CountingSource::default(), &CacheConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_queries_hit_cache() {
        let dir = cached();
        let query = StationQuery::search("kan", 10);
        let first = dir.search(&query).await.unwrap();
        let second = dir.search(&query).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(dir.source().searches.load(Ordering::SeqCst), 1);
        assert!(dir.fetched_at(&query).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_queries_cached_separately() {
        let dir = cached();
        dir.search(&StationQuery::search("kan", 10)).await.unwrap();
        dir.search(&StationQuery::search("kan", 10).with_offset(10)).await.unwrap();
        dir.search(&StationQuery::search("kan", 10).with_tag("news")).await.unwrap();
        assert_eq!(dir.source().searches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_entries_expire() {
        let dir = cached();
        let query = StationQuery::default();
        dir.search(&query).await.unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        dir.search(&query).await.unwrap();
        assert_eq!(dir.source().searches.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(dir.fetched_at(&query).is_none());
        dir.search(&query).await.unwrap();
        assert_eq!(dir.source().searches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_use_longer_window() {
        let dir = cached();
        dir.list_countries().await.unwrap();
        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        dir.list_countries().await.unwrap();
        assert_eq!(dir.source().countries.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(11 * 60)).await;
        dir.list_countries().await.unwrap();
        assert_eq!(dir.source().countries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_not_cached() {
        let dir = cached();
        let query = StationQuery::default();
        dir.source().fail.store(true, Ordering::SeqCst);
        assert!(dir.search(&query).await.is_err());

        dir.source().fail.store(false, Ordering::SeqCst);
        assert_eq!(dir.search(&query).await.unwrap().len(), 1);
        assert_eq!(dir.source().searches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_each_fetch() {
        let dir = cached();
        let query = StationQuery::search("slow", 10);
        let (first, second) = tokio::join!(dir.search(&query), dir.search(&query));
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(dir.source().searches.load(Ordering::SeqCst), 2);

        dir.search(&query).await.unwrap();
        assert_eq!(dir.source().searches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_all_forces_refetch() {
        let dir = cached();
        let query = StationQuery::default();
        dir.search(&query).await.unwrap();
        dir.list_countries().await.unwrap();
        dir.invalidate_all();
        dir.search(&query).await.unwrap();
        dir.list_countries().await.unwrap();
        assert_eq!(dir.source().searches.load(Ordering::SeqCst), 2);
        assert_eq!(dir.source().countries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_entry_evicted_at_capacity() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert(1, 10);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert(2, 20);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert(3, 30);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
        assert_eq!(cache.get(&3), Some(30));
    }
}
