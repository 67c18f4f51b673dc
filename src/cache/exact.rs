//! Exact-match tier: fingerprint to full response

use crate::cache::{CacheEntry, CacheStats, Fingerprint, SweepTimer, TierCounters};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

enum Lookup<T> {
    Missing,
    Expired,
    Found(crate::error::Result<T>),
}

/// Capacity-bounded exact cache evicting the oldest fraction when full
pub struct ExactCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
    eviction_fraction: f64,
    sweep: SweepTimer,
    counters: TierCounters,
}

impl ExactCache {
    pub fn new(
        ttl: Duration,
        capacity: usize,
        eviction_fraction: f64,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
            eviction_fraction,
            sweep: SweepTimer::new(sweep_interval),
            counters: TierCounters::default(),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &Fingerprint) -> Option<T> {
        if self.sweep.due() {
            self.sweep_expired();
        }

        let now = Instant::now();
        let lookup = {
            let entries = self.entries.read();
            match entries.get(key) {
                None => Lookup::Missing,
                Some(entry) if entry.is_expired(now) => Lookup::Expired,
                Some(entry) => Lookup::Found(entry.decode::<T>()),
            }
        };

        match lookup {
            Lookup::Found(Ok(value)) => {
                self.counters.hit();
                Some(value)
            }
            Lookup::Found(Err(e)) => {
                tracing::warn!(fingerprint = %key, "Dropping undecodable exact cache entry: {}", e);
                self.entries.write().remove(key);
                self.counters.miss();
                None
            }
            Lookup::Expired => {
                let mut entries = self.entries.write();
                if entries.get(key).is_some_and(|e| e.is_expired(Instant::now())) {
                    entries.remove(key);
                    self.counters.evicted(1);
                }
                self.counters.miss();
                None
            }
            Lookup::Missing => {
                self.counters.miss();
                None
            }
        }
    }

    pub fn insert<T: Serialize>(&self, key: Fingerprint, value: &T) {
        let entry = match CacheEntry::encode(key.clone(), value, self.ttl) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(fingerprint = %key, "Skipping exact cache write: {}", e);
                return;
            }
        };

        let mut entries = self.entries.write();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let evicted = self.evict_oldest(&mut entries);
            self.counters.evicted(evicted);
        }
        entries.insert(key, entry);
    }

    fn evict_oldest(&self, entries: &mut HashMap<Fingerprint, CacheEntry>) -> usize {
        let count = ((self.capacity as f64 * self.eviction_fraction).ceil() as usize)
            .clamp(1, entries.len());

        let mut by_age: Vec<(Instant, Fingerprint)> = entries
            .iter()
            .map(|(key, entry)| (entry.created_at, key.clone()))
            .collect();
        by_age.sort_by_key(|(created_at, _)| *created_at);

        for (_, key) in by_age.into_iter().take(count) {
            entries.remove(&key);
        }

        tracing::debug!(evicted = count, "Exact cache at capacity");
        count
    }

    /// Remove every expired entry
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        self.counters.evicted(removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }
}
