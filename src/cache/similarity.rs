//! Similarity tier: reuse results of recent queries with near-identical wording
//!
//! Queries are compared as token sets using Jaccard similarity. Tokens that
//! carry a concrete value (IP addresses, ports, counts) must agree exactly, so
//! "flows from 10.0.0.1" never matches "flows from 10.0.0.2".

use crate::cache::{CacheEntry, CacheStats, Fingerprint, SweepTimer, TierCounters};
use ahash::{AHashSet, HashMap, HashMapExt};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct RecentQuery {
    fingerprint: Fingerprint,
    scope: String,
    tokens: AHashSet<String>,
    created_at: Instant,
}

/// A similarity hit together with its score
#[derive(Debug, Clone)]
pub struct SimilarMatch<T> {
    pub value: T,
    pub similarity: f64,
    pub matched: Fingerprint,
}

/// Jaccard-matched cache over recent queries
pub struct SimilarityCache {
    primary: RwLock<HashMap<Fingerprint, CacheEntry>>,
    recent: RwLock<VecDeque<RecentQuery>>,
    threshold: f64,
    ttl: Duration,
    capacity: usize,
    stop_words: AHashSet<String>,
    sweep: SweepTimer,
    counters: TierCounters,
}

impl SimilarityCache {
    pub fn new(threshold: f64, ttl: Duration, capacity: usize, sweep_interval: Duration) -> Self {
        Self {
            primary: RwLock::new(HashMap::new()),
            recent: RwLock::new(VecDeque::new()),
            threshold,
            ttl,
            capacity: capacity.max(1),
            stop_words: AHashSet::new(),
            sweep: SweepTimer::new(sweep_interval),
            counters: TierCounters::default(),
        }
    }

    /// Words dropped before comparison
    pub fn with_stop_words(mut self, words: &[String]) -> Self {
        self.stop_words = words.iter().map(|w| w.to_lowercase()).collect();
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Find the best stored match at or above the threshold
    pub fn lookup<T: DeserializeOwned>(&self, query: &str, scope: &str) -> Option<SimilarMatch<T>> {
        if self.sweep.due() {
            self.sweep_expired();
        }

        let tokens = tokenize(query, &self.stop_words);
        if tokens.is_empty() {
            self.counters.miss();
            return None;
        }

        let now = Instant::now();
        let best = {
            let recent = self.recent.read();
            recent
                .iter()
                .filter(|r| r.scope == scope && now.duration_since(r.created_at) < self.ttl)
                .map(|r| (jaccard_similarity(&tokens, &r.tokens), r.fingerprint.clone()))
                .filter(|(score, _)| *score >= self.threshold)
                .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        };

        let Some((similarity, fingerprint)) = best else {
            self.counters.miss();
            return None;
        };

        let decoded = {
            let primary = self.primary.read();
            primary
                .get(&fingerprint)
                .filter(|entry| !entry.is_expired(now))
                .map(|entry| entry.decode::<T>())
        };

        match decoded {
            Some(Ok(value)) => {
                self.counters.hit();
                tracing::debug!(matched = %fingerprint, similarity, "Similarity cache hit");
                Some(SimilarMatch {
                    value,
                    similarity,
                    matched: fingerprint,
                })
            }
            Some(Err(e)) => {
                tracing::warn!(fingerprint = %fingerprint, "Dropping undecodable similarity entry: {}", e);
                self.remove(&fingerprint);
                self.counters.miss();
                None
            }
            None => {
                self.counters.miss();
                None
            }
        }
    }

    pub fn insert<T: Serialize>(&self, fingerprint: Fingerprint, query: &str, scope: &str, value: &T) {
        let tokens = tokenize(query, &self.stop_words);
        if tokens.is_empty() {
            return;
        }

        let entry = match CacheEntry::encode(fingerprint.clone(), value, self.ttl) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, "Skipping similarity cache write: {}", e);
                return;
            }
        };

        // Lock order: primary before recent
        let mut primary = self.primary.write();
        let mut recent = self.recent.write();

        recent.retain(|r| r.fingerprint != fingerprint);
        recent.push_back(RecentQuery {
            fingerprint: fingerprint.clone(),
            scope: scope.to_string(),
            tokens,
            created_at: entry.created_at,
        });
        primary.insert(fingerprint, entry);

        let mut evicted = 0;
        while recent.len() > self.capacity {
            if let Some(oldest) = recent.pop_front() {
                primary.remove(&oldest.fingerprint);
                evicted += 1;
            }
        }
        if primary.len() > self.capacity {
            let mut by_age: Vec<(Instant, Fingerprint)> = primary
                .iter()
                .map(|(k, e)| (e.created_at, k.clone()))
                .collect();
            by_age.sort_by_key(|(created_at, _)| *created_at);
            let excess = primary.len() - self.capacity;
            for (_, key) in by_age.into_iter().take(excess) {
                primary.remove(&key);
                evicted += 1;
            }
        }
        self.counters.evicted(evicted);
    }

    fn remove(&self, fingerprint: &Fingerprint) {
        let mut primary = self.primary.write();
        let mut recent = self.recent.write();
        primary.remove(fingerprint);
        recent.retain(|r| &r.fingerprint != fingerprint);
    }

    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut primary = self.primary.write();
        let mut recent = self.recent.write();

        let before = primary.len();
        primary.retain(|_, entry| !entry.is_expired(now));
        recent.retain(|r| now.duration_since(r.created_at) < self.ttl);

        let removed = before - primary.len();
        self.counters.evicted(removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.primary.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut primary = self.primary.write();
        let mut recent = self.recent.write();
        primary.clear();
        recent.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }
}

/// Split a query into comparable tokens
pub fn tokenize(query: &str, stop_words: &AHashSet<String>) -> AHashSet<String> {
    query
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| !word.is_empty() && !stop_words.contains(word))
        .collect()
}

/// |A ∩ B| / |A ∪ B|, with value-bearing tokens required to match exactly
pub fn jaccard_similarity(a: &AHashSet<String>, b: &AHashSet<String>) -> f64 {
    let has_digit = |t: &&String| t.chars().any(|c| c.is_ascii_digit());
    let values_a: AHashSet<&String> = a.iter().filter(has_digit).collect();
    let values_b: AHashSet<&String> = b.iter().filter(has_digit).collect();
    if values_a != values_b {
        return 0.0;
    }

    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
