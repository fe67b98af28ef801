use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use canary_core::config::CacheConfig;
use canary_core::CanaryError;
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// TTL class of a cached response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    /// Tag properties: change rarely.
    Metadata,
    /// Data reads: change continuously.
    Timeseries,
    /// Browse results.
    Namespace,
}

impl CacheCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheCategory::Metadata => "metadata",
            CacheCategory::Timeseries => "timeseries",
            CacheCategory::Namespace => "namespace",
        }
    }
}

/// Stable key for an operation and its parameters.
///
/// `serde_json` maps serialize with sorted keys, so equal parameters always
/// produce the same key regardless of how the caller built them.
pub fn cache_key(operation: &str, params: &Value) -> String {
    format!("{}:{}", operation, params)
}

/// One cached response, stored serialized so its size is known exactly.
struct CacheEntry {
    value: Vec<u8>,
    category: CacheCategory,
    created_at: Instant,
    expires_at: Instant,
    access_count: u64,
}

impl CacheEntry {
    fn size_bytes(&self, key: &str) -> usize {
        self.value.len() + key.len()
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

enum Lookup {
    Hit(Vec<u8>),
    Expired,
    Miss,
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes(key));
        Some(entry)
    }
}

/// Counters and occupancy for health reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}

/// In-memory response cache with per-category TTLs and a total byte cap.
///
/// Expired entries are dropped lazily when read; the least recently used
/// entries are evicted whenever an insert would exceed the cap.
pub struct ResponseCache {
    inner: Mutex<Inner>,
    metadata_ttl: Duration,
    timeseries_ttl: Duration,
    namespace_ttl: Duration,
    max_bytes: usize,
}

impl ResponseCache {
    pub fn new(
        metadata_ttl: Duration,
        timeseries_ttl: Duration,
        namespace_ttl: Duration,
        max_bytes: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            metadata_ttl,
            timeseries_ttl,
            namespace_ttl,
            max_bytes,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.metadata_ttl_secs),
            Duration::from_secs(config.timeseries_ttl_secs),
            Duration::from_secs(config.namespace_ttl_secs),
            config.max_bytes(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ttl(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::Metadata => self.metadata_ttl,
            CacheCategory::Timeseries => self.timeseries_ttl,
            CacheCategory::Namespace => self.namespace_ttl,
        }
    }

    /// Serialized bytes for a live entry, refreshing its recency.
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut inner = self.lock();
        let lookup = match inner.entries.get_mut(key) {
            None => Lookup::Miss,
            Some(entry) if entry.is_expired(now) => Lookup::Expired,
            Some(entry) => {
                entry.access_count += 1;
                Lookup::Hit(entry.value.clone())
            }
        };
        match lookup {
            Lookup::Hit(bytes) => {
                inner.hits += 1;
                Some(bytes)
            }
            Lookup::Expired => {
                inner.remove(key);
                inner.expirations += 1;
                inner.misses += 1;
                debug!(key = %key, "Cache entry expired");
                None
            }
            Lookup::Miss => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store serialized bytes, evicting least recently used entries to fit.
    ///
    /// Values larger than the whole cap are not stored.
    pub fn put_raw(&self, key: &str, category: CacheCategory, value: Vec<u8>) {
        let size = value.len() + key.len();
        if size > self.max_bytes {
            debug!(key = %key, size_bytes = size, "Value larger than cache, not storing");
            return;
        }
        let now = Instant::now();
        let mut inner = self.lock();
        inner.remove(key);
        while inner.total_bytes + size > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    debug!(key = %evicted_key, "Evicting cache entry");
                    inner.total_bytes = inner
                        .total_bytes
                        .saturating_sub(evicted.size_bytes(&evicted_key));
                    inner.evictions += 1;
                }
                None => break,
            }
        }
        inner.entries.put(
            key.to_string(),
            CacheEntry {
                value,
                category,
                created_at: now,
                expires_at: now + self.ttl(category),
                access_count: 0,
            },
        );
        inner.total_bytes += size;
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// `bypass` skips both the read and the write. Failed computations are
    /// never cached. Concurrent misses on one key may each compute.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        category: CacheCategory,
        bypass: bool,
        compute: F,
    ) -> Result<T, CanaryError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CanaryError>>,
    {
        self.get_or_compute_if(key, category, bypass, compute, |_| true)
            .await
    }

    /// Like [`get_or_compute`](Self::get_or_compute), storing the computed
    /// value only when `cacheable` accepts it.
    pub async fn get_or_compute_if<T, F, Fut, P>(
        &self,
        key: &str,
        category: CacheCategory,
        bypass: bool,
        compute: F,
        cacheable: P,
    ) -> Result<T, CanaryError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CanaryError>>,
        P: FnOnce(&T) -> bool,
    {
        if !bypass {
            if let Some(bytes) = self.get_raw(key) {
                match serde_json::from_slice::<T>(&bytes) {
                    Ok(value) => {
                        debug!(key = %key, "Cache hit");
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Cached value unreadable, recomputing");
                        self.lock().remove(key);
                    }
                }
            }
        }

        let value = compute().await?;
        if !bypass && cacheable(&value) {
            let bytes = serde_json::to_vec(&value)?;
            self.put_raw(key, category, bytes);
        }
        Ok(value)
    }

    /// Remove entries whose key matches `pattern`; returns how many.
    ///
    /// Empty or `*` clears everything. Otherwise the pattern matches anywhere
    /// in the key, with `*`/`%` standing for any run of characters.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let mut inner = self.lock();
        let keys: Vec<String> = if pattern.is_empty() || pattern == "*" {
            inner.entries.iter().map(|(k, _)| k.clone()).collect()
        } else if pattern.contains(['*', '%']) {
            let pat: Vec<char> = format!("*{}*", pattern).chars().collect();
            inner
                .entries
                .iter()
                .filter(|(k, _)| wildcard_match(&pat, &k.chars().collect::<Vec<_>>()))
                .map(|(k, _)| k.clone())
                .collect()
        } else {
            inner
                .entries
                .iter()
                .filter(|(k, _)| k.contains(pattern))
                .map(|(k, _)| k.clone())
                .collect()
        };
        for key in &keys {
            inner.remove(key);
        }
        if !keys.is_empty() {
            info!(pattern = %pattern, removed = keys.len(), "Cache invalidated");
        }
        keys.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            entries: inner.entries.len(),
            total_bytes: inner.total_bytes,
            max_bytes: self.max_bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
        }
    }

    /// Entries per category, for health output.
    pub fn category_counts(&self) -> [(CacheCategory, usize); 3] {
        let inner = self.lock();
        let mut counts = [
            (CacheCategory::Metadata, 0),
            (CacheCategory::Timeseries, 0),
            (CacheCategory::Namespace, 0),
        ];
        for (_, entry) in inner.entries.iter() {
            for (category, n) in counts.iter_mut() {
                if *category == entry.category {
                    *n += 1;
                }
            }
        }
        counts
    }

    /// Age of the oldest live entry, if any.
    pub fn oldest_entry_age(&self) -> Option<Duration> {
        let inner = self.lock();
        inner
            .entries
            .iter()
            .map(|(_, e)| e.created_at.elapsed())
            .max()
    }

    /// Hit count of one entry; `None` when absent.
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.lock().entries.peek(key).map(|e| e.access_count)
    }
}

/// Anchored glob match with `*`/`%` for any run of characters.
fn wildcard_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && matches!(pattern[p], '*' | '%') {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| matches!(c, '*' | '%'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(max_bytes: usize) -> ResponseCache {
        ResponseCache::new(
            Duration::from_secs(3600),
            Duration::from_secs(300),
            Duration::from_secs(3600),
            max_bytes,
        )
    }

    #[test]
    fn keys_are_canonical() {
        let a = cache_key("getTagData", &json!({"tags": ["A"], "endTime": "x"}));
        let mut params = serde_json::Map::new();
        params.insert("endTime".into(), json!("x"));
        params.insert("tags".into(), json!(["A"]));
        assert_eq!(a, cache_key("getTagData", &Value::Object(params)));
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let c = cache(10_000);
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let v: Vec<String> = c
                .get_or_compute("k", CacheCategory::Namespace, false, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["A.B".to_string()])
                })
                .await
                .unwrap();
            assert_eq!(v, vec!["A.B"]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = c.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(c.access_count("k"), Some(1));
    }

    #[tokio::test]
    async fn bypass_skips_read_and_write() {
        let c = cache(10_000);
        let _: u32 = c
            .get_or_compute("k", CacheCategory::Metadata, true, || async { Ok(1) })
            .await
            .unwrap();
        assert!(c.get_raw("k").is_none());
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let c = cache(10_000);
        let r: Result<u32, _> = c
            .get_or_compute("k", CacheCategory::Metadata, false, || async {
                Err(CanaryError::Internal("boom".into()))
            })
            .await;
        assert!(r.is_err());
        assert_eq!(c.stats().entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_per_category() {
        let c = cache(10_000);
        c.put_raw("ts", CacheCategory::Timeseries, b"1".to_vec());
        c.put_raw("meta", CacheCategory::Metadata, b"2".to_vec());

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(c.get_raw("ts").is_none());
        assert_eq!(c.get_raw("meta"), Some(b"2".to_vec()));
        assert_eq!(c.stats().expirations, 1);
    }

    #[test]
    fn lru_eviction_keeps_total_under_cap() {
        let c = cache(30);
        c.put_raw("a", CacheCategory::Metadata, vec![0; 9]);
        c.put_raw("b", CacheCategory::Metadata, vec![0; 9]);
        c.put_raw("c", CacheCategory::Metadata, vec![0; 9]);
        assert!(c.get_raw("a").is_some());
        c.put_raw("d", CacheCategory::Metadata, vec![0; 9]);

        let stats = c.stats();
        assert!(stats.total_bytes <= 30);
        assert_eq!(stats.evictions, 1);
        assert!(c.get_raw("b").is_none());
        assert!(c.get_raw("a").is_some());
    }

    #[test]
    fn oversized_values_are_not_stored() {
        let c = cache(10);
        c.put_raw("k", CacheCategory::Metadata, vec![0; 50]);
        assert_eq!(c.stats().entries, 0);
    }

    #[test]
    fn invalidate_patterns() {
        let c = cache(10_000);
        for key in ["getTagData:{A}", "getTagData:{B}", "browseTags:{A}"] {
            c.put_raw(key, CacheCategory::Timeseries, b"x".to_vec());
        }
        assert_eq!(c.invalidate("getTagData*"), 2);
        assert_eq!(c.invalidate("{A}"), 1);
        assert_eq!(c.stats().entries, 0);

        c.put_raw("k", CacheCategory::Metadata, b"x".to_vec());
        assert_eq!(c.invalidate(""), 1);
        assert_eq!(c.invalidate(""), 0);
        assert_eq!(c.stats().total_bytes, 0);
    }

    #[test]
    fn underscores_in_patterns_are_literal() {
        let c = cache(10_000);
        for key in [
            r#"getTagData:{"tags":["Plant.Kiln_6.ShellTemp"]}"#,
            r#"getTagData:{"tags":["Plant.Kiln6.ShellTemp"]}"#,
            r#"browseTags:{"path":"Plant.Kiln_6"}"#,
        ] {
            c.put_raw(key, CacheCategory::Metadata, b"x".to_vec());
        }
        assert_eq!(c.invalidate("Kiln_6"), 2);
        assert_eq!(c.invalidate("getTagData*Kiln6"), 1);
        assert_eq!(c.stats().entries, 0);
    }

    #[test]
    fn wildcards() {
        let m = |p: &str, t: &str| {
            wildcard_match(&p.chars().collect::<Vec<_>>(), &t.chars().collect::<Vec<_>>())
        };
        assert!(m("get*", "getTagData"));
        assert!(m("%Data", "getTagData"));
        assert!(m("get*Data", "getTagData"));
        assert!(!m("get_agData", "getTagData"));
        assert!(!m("browse*", "getTagData"));
        assert!(m("*", ""));
    }
}
