//! Cache hierarchy and request deduplication
//!
//! Four independent layers keyed by the request [`Fingerprint`]:
//! - in-flight registry (at most one backend execution per fingerprint)
//! - exact-match cache (short TTL, oldest-fraction eviction)
//! - pattern cache (regex keys to canned answers)
//! - similarity cache (Jaccard match over recent queries, long TTL)
//!
//! Every lookup degrades to a miss on failure; caching is never a source of
//! request failure.

mod exact;
mod fingerprint;
mod inflight;
mod similarity;

pub use exact::ExactCache;
pub use fingerprint::{normalize_query, Fingerprint, RequestKey};
pub use inflight::{InFlightGuard, InFlightRegistry};
pub use similarity::{jaccard_similarity, tokenize, SimilarMatch, SimilarityCache};

use crate::assembler::AnalysisResponse;
use crate::config::{parse_duration, CacheConfig};
use crate::error::{FlowscopeError, Result};
use crate::patterns::{CannedAnswer, PatternTable};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Immutable cached payload; replacement is whole-entry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: Fingerprint,
    payload: Vec<u8>,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn encode<T: Serialize>(key: Fingerprint, value: &T, ttl: Duration) -> Result<Self> {
        let payload = serde_json::to_vec(value).map_err(|e| FlowscopeError::Json {
            source: e,
            context: "Failed to encode cache payload".to_string(),
        })?;

        Ok(Self {
            key,
            payload,
            created_at: Instant::now(),
            ttl,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| FlowscopeError::Cache(format!("corrupt entry {}: {}", self.key, e)))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// Rate-limits opportunistic sweeps on the access path
pub(crate) struct SweepTimer {
    last: Mutex<Instant>,
    interval: Duration,
}

impl SweepTimer {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            last: Mutex::new(Instant::now()),
            interval,
        }
    }

    /// True at most once per interval; contended callers skip the sweep
    pub(crate) fn due(&self) -> bool {
        let Some(mut last) = self.last.try_lock() else {
            return false;
        };
        if last.elapsed() >= self.interval {
            *last = Instant::now();
            true
        } else {
            false
        }
    }
}

#[derive(Default)]
pub(crate) struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TierCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn evicted(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
        }
    }
}

/// Per-tier counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Snapshot of the whole hierarchy
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyStats {
    pub exact: CacheStats,
    pub pattern: CacheStats,
    pub similarity: CacheStats,
    pub in_flight: usize,
}

/// Which tier answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Exact,
    Pattern,
    Similarity,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Pattern => "pattern",
            Self::Similarity => "similarity",
        }
    }
}

/// Result of consulting the read tiers
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Exact(AnalysisResponse),
    Pattern(CannedAnswer),
    Similar(SimilarMatch<AnalysisResponse>),
    Miss,
}

/// Tier durations and sizes resolved from configuration
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub exact_ttl: Duration,
    pub exact_capacity: usize,
    pub eviction_fraction: f64,
    pub similarity_ttl: Duration,
    pub similarity_threshold: f64,
    pub similarity_capacity: usize,
    pub inflight_stale_after: Duration,
    pub inflight_wait: Duration,
    pub inflight_poll_interval: Duration,
    pub sweep_interval: Duration,
    pub stop_words: Vec<String>,
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        let duration = |value: &str, fallback: Duration| parse_duration(value).unwrap_or(fallback);

        Self {
            enabled: config.enabled,
            exact_ttl: duration(&config.exact_ttl, Duration::from_secs(1800)),
            exact_capacity: config.exact_capacity,
            eviction_fraction: config.eviction_fraction,
            similarity_ttl: duration(&config.similarity_ttl, Duration::from_secs(86_400)),
            similarity_threshold: config.similarity_threshold,
            similarity_capacity: config.similarity_capacity,
            inflight_stale_after: duration(&config.inflight_stale_after, Duration::from_secs(120)),
            inflight_wait: duration(&config.inflight_wait, Duration::from_secs(2)),
            inflight_poll_interval: duration(
                &config.inflight_poll_interval,
                Duration::from_millis(100),
            ),
            sweep_interval: duration(&config.sweep_interval, Duration::from_secs(60)),
            stop_words: config.similarity_stop_words.clone(),
        }
    }
}

/// Owned facade over every cache tier and the dedup registry
pub struct CacheHierarchy {
    settings: CacheSettings,
    exact: ExactCache,
    patterns: Arc<PatternTable>,
    pattern_counters: TierCounters,
    similarity: SimilarityCache,
    in_flight: Arc<InFlightRegistry>,
}

impl CacheHierarchy {
    pub fn new(settings: CacheSettings, patterns: Arc<PatternTable>) -> Self {
        Self {
            exact: ExactCache::new(
                settings.exact_ttl,
                settings.exact_capacity,
                settings.eviction_fraction,
                settings.sweep_interval,
            ),
            similarity: SimilarityCache::new(
                settings.similarity_threshold,
                settings.similarity_ttl,
                settings.similarity_capacity,
                settings.sweep_interval,
            )
            .with_stop_words(&settings.stop_words),
            in_flight: InFlightRegistry::new(settings.inflight_stale_after),
            pattern_counters: TierCounters::default(),
            patterns,
            settings,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Consult exact, pattern and similarity tiers in order
    pub fn lookup(&self, key: &RequestKey) -> CacheLookup {
        if !self.settings.enabled {
            return CacheLookup::Miss;
        }

        if let Some(response) = self.exact.get::<AnalysisResponse>(&key.fingerprint) {
            tracing::debug!(fingerprint = %key.fingerprint, "Exact cache hit");
            return CacheLookup::Exact(response);
        }

        if let Some(canned) = self.lookup_pattern(key) {
            return CacheLookup::Pattern(canned);
        }

        match self
            .similarity
            .lookup::<AnalysisResponse>(&key.normalized, &key.scope)
        {
            Some(found) => CacheLookup::Similar(found),
            None => CacheLookup::Miss,
        }
    }

    /// Pattern tier alone; stored responses carry no sources, so callers
    /// asking for sources skip the other tiers
    pub fn lookup_pattern(&self, key: &RequestKey) -> Option<CannedAnswer> {
        if !self.settings.enabled {
            return None;
        }

        let found = self.patterns.match_query(&key.normalized);
        match &found {
            Some(canned) => {
                self.pattern_counters.hit();
                tracing::debug!(pattern = %canned.name, "Pattern cache hit");
            }
            None => self.pattern_counters.miss(),
        }
        found
    }

    /// Claim the fingerprint for this caller
    pub fn try_begin(&self, key: &RequestKey) -> Option<InFlightGuard> {
        self.in_flight.try_mark(&key.fingerprint)
    }

    /// Wait a bounded interval for another caller's result to land
    pub async fn await_in_flight(&self, key: &RequestKey) -> Option<AnalysisResponse> {
        let deadline = Instant::now() + self.settings.inflight_wait;

        loop {
            if let Some(response) = self.exact.get::<AnalysisResponse>(&key.fingerprint) {
                return Some(response);
            }
            if !self.in_flight.is_in_flight(&key.fingerprint) || Instant::now() >= deadline {
                // One last look: the owner may have written just before unmarking
                return self.exact.get::<AnalysisResponse>(&key.fingerprint);
            }
            tokio::time::sleep(self.settings.inflight_poll_interval).await;
        }
    }

    /// Write a finished response to the exact and similarity tiers
    pub fn store(&self, key: &RequestKey, response: &AnalysisResponse) {
        if !self.settings.enabled {
            return;
        }
        self.exact.insert(key.fingerprint.clone(), response);
        self.similarity
            .insert(key.fingerprint.clone(), &key.normalized, &key.scope, response);
    }

    pub fn stats(&self) -> HierarchyStats {
        HierarchyStats {
            exact: self.exact.stats(),
            pattern: self.pattern_counters.snapshot(self.patterns.len()),
            similarity: self.similarity.stats(),
            in_flight: self.in_flight.len(),
        }
    }

    /// Drop every cached entry and in-flight marker
    pub fn clear(&self) {
        self.exact.clear();
        self.similarity.clear();
        self.in_flight.clear();
    }
}
