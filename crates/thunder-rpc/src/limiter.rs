// crates/thunder-rpc/src/limiter.rs
//
// Per-client token buckets and the bounded registry that owns them.
//
// The registry is an LRU map behind a single lock. Entries expire a fixed TTL
// after creation; expiry is observed lazily on lookup and by a periodic purge
// task, so an expired bucket is replaced by a fresh full one on the next call.
// Token consumption happens on the bucket's own lock, outside the registry
// lock.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::identity::{default_trusted_proxies, parse_trusted_proxies, ClientKey};

/// Slack for durations truncated to whole nanoseconds.
const REFILL_EPSILON: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic time source for buckets and registry expiry.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

// ---------------------------------------------------------------------------
// TokenBucket
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket: refills continuously at `rate` tokens/s up to `burst`.
///
/// A new bucket starts full. `allow` is atomic with respect to concurrent
/// callers on the same bucket.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: u32,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: u32, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            rate: rate.max(0.0),
            burst,
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: now,
            }),
            clock,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Consume one token if available.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        if state.tokens + REFILL_EPSILON >= 1.0 {
            state.tokens = (state.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }

    /// Tokens currently available, after refill.
    pub fn available(&self) -> f64 {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed.is_zero() {
            return;
        }
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate).min(f64::from(self.burst));
        state.last_refill = now;
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

fn default_enabled() -> bool {
    true
}

fn default_rate() -> f64 {
    5.0
}

fn default_burst() -> u32 {
    10
}

fn default_max_entries() -> usize {
    10_000
}

fn default_ttl_secs() -> u64 {
    600
}

/// `[rate_limit]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Whether the rate-limit stage is installed at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Sustained tokens per second per client.
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Bucket capacity (maximum burst).
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Maximum number of tracked clients.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Seconds after creation at which a client's bucket is discarded.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Peers whose forwarding headers are honored.
    #[serde(default = "default_trusted_proxies")]
    pub trusted_proxies: Vec<String>,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            rate: default_rate(),
            burst: default_burst(),
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
            trusted_proxies: default_trusted_proxies(),
        }
    }
}

// ---------------------------------------------------------------------------
// LimiterRegistry
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Entry {
    bucket: Arc<TokenBucket>,
    created_at: Instant,
}

/// Bounded map from [`ClientKey`] to its [`TokenBucket`].
pub struct LimiterRegistry {
    entries: Mutex<LruCache<ClientKey, Entry>>,
    rate: f64,
    burst: u32,
    ttl: Duration,
    trusted_proxies: HashSet<IpAddr>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for LimiterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimiterRegistry")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries())
            .field("len", &self.len())
            .finish()
    }
}

fn capacity(max_entries: usize) -> NonZeroUsize {
    NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)
}

impl LimiterRegistry {
    pub fn new(rate: f64, burst: u32, trusted_proxies: HashSet<IpAddr>) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity(default_max_entries()))),
            rate,
            burst,
            ttl: Duration::from_secs(default_ttl_secs()),
            trusted_proxies,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_settings(settings: &LimiterSettings) -> Self {
        Self::new(
            settings.rate,
            settings.burst,
            parse_trusted_proxies(&settings.trusted_proxies),
        )
        .with_max_entries(settings.max_entries)
        .with_ttl(Duration::from_secs(settings.ttl_secs))
    }

    /// Set the registry bound. Existing entries are discarded.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.entries = Mutex::new(LruCache::new(capacity(max_entries)));
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn trusted_proxies(&self) -> &HashSet<IpAddr> {
        &self.trusted_proxies
    }

    pub fn max_entries(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, key: &ClientKey) -> bool {
        self.entries.lock().contains(key)
    }

    /// Bucket for `key`, creating a full one if the key is absent or expired.
    ///
    /// Inserting into a full registry evicts the least-recently-used client.
    pub fn get_or_create(&self, key: &ClientKey) -> Arc<TokenBucket> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let live = entries
            .get(key)
            .filter(|entry| now.saturating_duration_since(entry.created_at) < self.ttl)
            .map(|entry| Arc::clone(&entry.bucket));
        if let Some(bucket) = live {
            return bucket;
        }

        if entries.pop(key).is_some() {
            tracing::debug!(client = %key, "limiter expired, recreating");
        } else if entries.len() >= entries.cap().get() {
            if let Some((evicted, _)) = entries.pop_lru() {
                tracing::debug!(client = %evicted, "limiter registry full, evicted least recent client");
            }
        }

        let bucket = Arc::new(TokenBucket::new(self.rate, self.burst, Arc::clone(&self.clock)));
        entries.put(
            key.clone(),
            Entry {
                bucket: Arc::clone(&bucket),
                created_at: now,
            },
        );
        bucket
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let expired: Vec<ClientKey> = entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.created_at) >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Spawn a background task that purges expired entries every `interval`.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = registry.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, remaining = registry.len(), "purged expired limiters");
                }
            }
        })
    }
}
