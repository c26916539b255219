use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::entities::prediction::PredictionResult;

/// Snapshot of cache state and performance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub default_ttl: Duration,
    /// Entries past their TTL that no `get` or sweep has removed yet.
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    value: PredictionResult,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) <= self.ttl
    }
}

/// Fingerprint of a prediction request: SHA-256 hex of the symbol followed
/// by every price formatted with two decimals.
pub fn cache_key(symbol: &str, prices: &[f64]) -> String {
    let mut material = String::with_capacity(symbol.len() + prices.len() * 8);
    material.push_str(symbol);
    for price in prices {
        let _ = write!(material, "{:.2}", price);
    }
    hex::encode(Sha256::digest(material.as_bytes()))
}

/// TTL cache of prediction results shared by concurrent callers.
///
/// Readers proceed in parallel; inserts, removals and sweeps take the write
/// lock. Expired entries are never returned, whether or not the sweeper runs.
pub struct PredictionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PredictionCache {
    pub fn new(default_ttl: Duration) -> Self {
        PredictionCache {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300))
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Live prediction for `symbol` over `prices`. An expired entry is
    /// removed and reported as a miss.
    pub async fn get(&self, symbol: &str, prices: &[f64]) -> Option<PredictionResult> {
        let key = cache_key(symbol, prices);
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.is_live(Instant::now()) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(cache_key = %key, symbol = %entry.value.symbol, "Cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // expired: re-check under the write lock, a writer may have refreshed it
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(&key) {
            if entry.is_live(Instant::now()) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            entries.remove(&key);
            debug!(cache_key = %key, "Evicted expired cache entry");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub async fn set(&self, symbol: &str, prices: &[f64], value: PredictionResult) {
        self.set_with_ttl(symbol, prices, value, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, symbol: &str, prices: &[f64], value: PredictionResult, ttl: Duration) {
        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
            ttl,
        };
        self.entries
            .write()
            .await
            .insert(cache_key(symbol, prices), entry);
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let cleared = entries.len();
        entries.clear();
        debug!(cleared_entries = cleared, "Prediction cache cleared");
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub async fn size(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let now = Instant::now();
        CacheStats {
            size: entries.len(),
            default_ttl: self.default_ttl,
            expired_entries: entries.values().filter(|e| !e.is_live(now)).count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Removes every expired entry, returning how many were dropped.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Starts a background task sweeping expired entries every `interval`.
    ///
    /// The task holds only a weak reference and ends on its own once the
    /// cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> CacheSweeper {
        let cache: Weak<PredictionCache> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!("Prediction cache dropped, sweeper exiting");
                    break;
                };
                let removed = cache.sweep().await;
                if removed > 0 {
                    let remaining = cache.size().await;
                    debug!(removed, remaining, "Swept expired cache entries");
                }
            }
        });
        CacheSweeper { handle }
    }
}

/// Handle to the background sweep task. Dropping it stops the task.
pub struct CacheSweeper {
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::prediction::TradingSignal;
    use chrono::Utc;

    fn result(symbol: &str) -> PredictionResult {
        PredictionResult {
            symbol: symbol.to_string(),
            current_price: 100.0,
            predicted_price: 102.0,
            trading_signal: TradingSignal::Buy,
            confidence: 0.7,
            prediction_time: Utc::now(),
            model_version: "test".to_string(),
        }
    }

    #[test]
    fn test_cache_key_is_deterministic_and_sensitive() {
        let a = cache_key("AAPL", &[100.0, 101.0]);
        assert_eq!(a, cache_key("AAPL", &[100.0, 101.0]));
        assert_eq!(a.len(), 64);
        assert_ne!(a, cache_key("AAPL", &[100.0, 101.01]));
        assert_ne!(a, cache_key("MSFT", &[100.0, 101.0]));
        // rounding to cents collapses sub-cent noise
        assert_eq!(a, cache_key("AAPL", &[100.001, 101.0]));
    }

    const PRICES: [f64; 3] = [100.0, 101.0, 102.0];

    #[tokio::test]
    async fn test_get_set_and_stats() {
        let cache = PredictionCache::with_default_ttl();
        assert!(cache.get("AAPL", &PRICES).await.is_none());

        cache.set("AAPL", &PRICES, result("AAPL")).await;
        assert_eq!(cache.get("AAPL", &PRICES).await.unwrap().symbol, "AAPL");

        let stats = cache.stats().await;
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 50.0);
        assert_eq!(stats.default_ttl, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_lookup_is_keyed_by_symbol_and_rounded_series() {
        let cache = PredictionCache::with_default_ttl();
        cache.set("AAPL", &PRICES, result("AAPL")).await;

        // sub-cent noise lands on the same entry
        assert!(cache.get("AAPL", &[100.001, 101.0, 101.999]).await.is_some());
        assert!(cache.get("MSFT", &PRICES).await.is_none());
        assert!(cache.get("AAPL", &[100.0, 101.0]).await.is_none());
        assert!(cache.get("AAPL", &[100.0, 101.0, 102.01]).await.is_none());

        cache.set("AAPL", &[100.004, 101.0, 102.0], result("AAPL")).await;
        assert_eq!(cache.size().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent_and_removed() {
        let cache = PredictionCache::with_default_ttl();
        cache
            .set_with_ttl("AAPL", &PRICES, result("AAPL"), Duration::from_millis(20))
            .await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.stats().await.expired_entries, 1);
        assert!(cache.get("AAPL", &PRICES).await.is_none());
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn test_clear_and_sweep() {
        let cache = PredictionCache::with_default_ttl();
        cache.set("AAPL", &PRICES, result("AAPL")).await;
        cache
            .set_with_ttl("MSFT", &PRICES, result("MSFT"), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.size().await, 1);

        cache.clear().await;
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let cache = Arc::new(PredictionCache::with_default_ttl());
        let sweeper = cache.spawn_sweeper(Duration::from_millis(20));
        cache
            .set_with_ttl("AAPL", &PRICES, result("AAPL"), Duration::from_millis(5))
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.size().await, 0);
        sweeper.stop();
    }

    #[tokio::test]
    async fn test_sweeper_exits_when_cache_dropped() {
        let cache = Arc::new(PredictionCache::with_default_ttl());
        let sweeper = cache.spawn_sweeper(Duration::from_millis(10));
        drop(cache);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(sweeper.is_finished());
    }

    #[tokio::test]
    async fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(PredictionCache::with_default_ttl());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let prices = [100.0 + (i % 4) as f64];
                cache.set("AAPL", &prices, result("AAPL")).await;
                cache.get("AAPL", &prices).await.is_some()
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(cache.size().await, 4);
    }
}
