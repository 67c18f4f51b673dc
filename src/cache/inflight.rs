//! In-flight registry preventing duplicate concurrent work per fingerprint

use crate::cache::Fingerprint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Marks fingerprints that are currently being serviced
pub struct InFlightRegistry {
    markers: Mutex<HashMap<Fingerprint, Instant>>,
    stale_after: Duration,
}

impl InFlightRegistry {
    pub fn new(stale_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            markers: Mutex::new(HashMap::new()),
            stale_after,
        })
    }

    /// Atomically claim a fingerprint; `None` if another caller holds it
    pub fn try_mark(self: &Arc<Self>, fingerprint: &Fingerprint) -> Option<InFlightGuard> {
        let now = Instant::now();
        let mut markers = self.markers.lock();

        let purged = Self::purge_locked(&mut markers, now, self.stale_after);
        if purged > 0 {
            tracing::warn!(purged, "Purged stale in-flight markers");
        }

        if markers.contains_key(fingerprint) {
            return None;
        }

        markers.insert(fingerprint.clone(), now);
        Some(InFlightGuard {
            registry: Arc::clone(self),
            fingerprint: fingerprint.clone(),
            started_at: now,
        })
    }

    pub fn is_in_flight(&self, fingerprint: &Fingerprint) -> bool {
        let markers = self.markers.lock();
        markers
            .get(fingerprint)
            .is_some_and(|started| started.elapsed() < self.stale_after)
    }

    /// Drop markers older than the staleness bound
    pub fn purge_stale(&self) -> usize {
        let mut markers = self.markers.lock();
        Self::purge_locked(&mut markers, Instant::now(), self.stale_after)
    }

    fn purge_locked(
        markers: &mut HashMap<Fingerprint, Instant>,
        now: Instant,
        stale_after: Duration,
    ) -> usize {
        let before = markers.len();
        markers.retain(|_, started| now.duration_since(*started) < stale_after);
        before - markers.len()
    }

    pub fn len(&self) -> usize {
        self.markers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.markers.lock().clear();
    }

    fn unmark(&self, fingerprint: &Fingerprint, started_at: Instant) {
        let mut markers = self.markers.lock();
        // A stale marker may have been purged and re-claimed by someone else
        if markers.get(fingerprint) == Some(&started_at) {
            markers.remove(fingerprint);
        }
    }
}

/// Holds a fingerprint in flight until dropped
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    fingerprint: Fingerprint,
    started_at: Instant,
}

impl InFlightGuard {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.unmark(&self.fingerprint, self.started_at);
    }
}
