//! Memory tier implementation

use moka::Expiry;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::directive::VerifyFn;
use crate::entry::Entry;

/// Cached entry together with the TTL it was stored under
#[derive(Clone)]
struct Slot {
    entry: Arc<Entry>,
    ttl: Duration,
}

/// Per-entry expiry: every store, including an overwrite, restarts the
/// clock with the TTL of that store
struct SlotExpiry;

impl Expiry<String, Slot> for SlotExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        slot: &Slot,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(slot.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        slot: &Slot,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(slot.ttl)
    }
}

/// Process-local TTL-bearing key/entry map
///
/// Safe to share across tasks; overlapping stores to one key are
/// last-write-wins.
pub struct MemoryTier {
    cache: Cache<String, Slot>,
}

impl MemoryTier {
    /// Create a tier holding at most `max_entries` entries
    pub fn new(max_entries: u64) -> Self {
        info!("Initializing memory tier (max_entries: {})", max_entries);

        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(SlotExpiry)
            .build();

        Self { cache }
    }

    /// Look up a live entry
    ///
    /// When `verify` rejects the entry the lookup is a miss, but the entry
    /// stays cached.
    pub fn lookup(&self, key: &str, verify: Option<&VerifyFn>) -> Option<Entry> {
        let Some(slot) = self.cache.get(key) else {
            metrics::counter!("tiercache_memory_misses_total").increment(1);
            return None;
        };

        if let Some(verify) = verify
            && !verify(slot.entry.as_ref())
        {
            debug!("Memory entry for {} rejected by verifier", key);
            metrics::counter!("tiercache_memory_misses_total").increment(1);
            return None;
        }

        metrics::counter!("tiercache_memory_hits_total").increment(1);
        Some(Entry::clone(&slot.entry))
    }

    /// Store an entry for `ttl` seconds; a zero TTL stores nothing
    pub fn store(&self, key: &str, entry: Entry, ttl: u64) {
        if ttl == 0 {
            debug!("Not caching {} in memory: zero ttl", key);
            return;
        }

        self.cache.insert(
            key.to_string(),
            Slot {
                entry: Arc::new(entry),
                ttl: Duration::from_secs(ttl),
            },
        );
    }

    /// Drop an entry
    pub fn remove(&self, key: &str) {
        self.cache.invalidate(key);
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new(10_000)
    }
}
