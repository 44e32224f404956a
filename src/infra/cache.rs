//! In-memory TTL cache for quote queries.
//!
//! Entries expire lazily: a stale entry is only noticed, and evicted, on the
//! next lookup of its key. Nothing is written to disk.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{Location, Quality, QuoteSet};

/// Quote cache TTL: 5 minutes.
pub const QUOTE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Time source for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Order-normalized query signature: the same items, hubs and qualities
/// produce the same key however the caller ordered or repeated them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    items: BTreeSet<String>,
    locations: BTreeSet<Location>,
    qualities: BTreeSet<Quality>,
}

impl CacheKey {
    pub fn new<I, S>(items: I, locations: &[Location], qualities: &[Quality]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            items: items
                .into_iter()
                .map(|id| id.as_ref().trim().to_string())
                .collect(),
            locations: locations.iter().copied().collect(),
            qualities: qualities.iter().copied().collect(),
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &str> + '_ {
        self.items.iter().map(String::as_str)
    }

    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.locations.iter().copied()
    }

    pub fn qualities(&self) -> impl Iterator<Item = Quality> + '_ {
        self.qualities.iter().copied()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<&str> = self.items().collect();
        let locations: Vec<&str> = self.locations().map(|loc| loc.name()).collect();
        let qualities: Vec<String> = self.qualities().map(|q| q.to_string()).collect();
        write!(
            f,
            "prices-{}-{}-{}",
            items.join(","),
            locations.join(","),
            qualities.join(",")
        )
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    quotes: QuoteSet,
    fetched_at: Instant,
}

/// Shared quote cache. Construct once and hand the same `Arc` to every fetcher.
pub struct QuoteCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh quotes for `key`; a stale entry is evicted and reported as absent.
    pub async fn get(&self, key: &CacheKey) -> Option<QuoteSet> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let entry = entries.get(key)?;

        if now.saturating_duration_since(entry.fetched_at) < self.ttl {
            return Some(entry.quotes.clone());
        }

        debug!(key = %key, "evicting expired quotes");
        entries.remove(key);
        None
    }

    /// Store quotes under `key`. The last write for a key wins.
    pub async fn put(&self, key: CacheKey, quotes: QuoteSet) {
        let fetched_at = self.clock.now();
        self.entries
            .lock()
            .await
            .insert(key, CacheEntry { quotes, fetched_at });
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Entries currently held, stale ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new(QUOTE_CACHE_TTL)
    }
}

impl fmt::Debug for QuoteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteCache").field("ttl", &self.ttl).finish()
    }
}
