//! Bounded graph session pool with temporary overflow
//!
//! Leases are RAII guards: a lease dropped on any exit path, including the
//! owning task being aborted mid-query, hands its session and permit back.

use crate::backends::{GraphConnector, GraphSession, Params, Record};
use crate::config::{parse_duration, PoolConfig};
use crate::error::{FlowscopeError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pool sizing and acquisition policy
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_size: usize,
    pub max_overflow: usize,
    pub acquire_wait: Duration,
    pub acquire_retries: u32,
}

impl From<&PoolConfig> for PoolSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            max_size: config.max_size,
            max_overflow: config.max_overflow,
            acquire_wait: parse_duration(&config.acquire_wait)
                .unwrap_or(Duration::from_millis(250)),
            acquire_retries: config.acquire_retries,
        }
    }
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub in_use: usize,
    pub overflow: usize,
}

struct PoolInner {
    connector: Arc<dyn GraphConnector>,
    idle: Mutex<Vec<Box<dyn GraphSession>>>,
    permits: Arc<Semaphore>,
    overflow: AtomicUsize,
    settings: PoolSettings,
}

/// Fixed-size pool of graph sessions
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    pub fn new(connector: Arc<dyn GraphConnector>, settings: PoolSettings) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(settings.max_size)),
                overflow: AtomicUsize::new(0),
                settings,
            }),
        }
    }

    /// Check out a session, waiting briefly before falling back to overflow
    pub async fn acquire(&self) -> Result<SessionLease> {
        let settings = &self.inner.settings;

        for attempt in 0..=settings.acquire_retries {
            let permit = tokio::time::timeout(
                settings.acquire_wait,
                self.inner.permits.clone().acquire_owned(),
            )
            .await;

            match permit {
                Ok(Ok(permit)) => {
                    let reused = self.inner.idle.lock().pop();
                    // A failed connect drops the permit and frees the slot
                    let session = match reused {
                        Some(session) => session,
                        None => self.inner.connector.connect().await?,
                    };
                    return Ok(SessionLease {
                        session: Some(session),
                        slot: LeaseSlot::Pooled(permit),
                        broken: false,
                        pool: self.inner.clone(),
                    });
                }
                Ok(Err(_)) => {
                    return Err(FlowscopeError::AdapterUnavailable(
                        "graph session pool is closed".to_string(),
                    ));
                }
                Err(_) => {
                    tracing::debug!(attempt, "Graph session pool exhausted, retrying");
                }
            }
        }

        let slot = OverflowSlot::claim(self.inner.clone()).ok_or_else(|| {
            FlowscopeError::AdapterUnavailable(format!(
                "graph session pool exhausted ({} pooled, {} overflow)",
                settings.max_size, settings.max_overflow
            ))
        })?;

        tracing::warn!("Graph session pool exhausted, opening overflow session");
        let session = self.inner.connector.connect().await?;

        Ok(SessionLease {
            session: Some(session),
            slot: LeaseSlot::Overflow(slot),
            broken: false,
            pool: self.inner.clone(),
        })
    }

    /// Return a lease to the pool
    pub fn release(&self, lease: SessionLease) {
        drop(lease);
    }

    pub fn status(&self) -> PoolStatus {
        let settings = &self.inner.settings;
        PoolStatus {
            idle: self.inner.idle.lock().len(),
            in_use: settings
                .max_size
                .saturating_sub(self.inner.permits.available_permits()),
            overflow: self.inner.overflow.load(Ordering::SeqCst),
        }
    }
}

/// Counts an overflow session for as long as it lives
struct OverflowSlot {
    pool: Arc<PoolInner>,
}

impl OverflowSlot {
    fn claim(pool: Arc<PoolInner>) -> Option<Self> {
        let max = pool.settings.max_overflow;
        pool.overflow
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()
            .map(|_| Self { pool })
    }
}

impl Drop for OverflowSlot {
    fn drop(&mut self) {
        self.pool.overflow.fetch_sub(1, Ordering::SeqCst);
    }
}

enum LeaseSlot {
    Pooled(OwnedSemaphorePermit),
    Overflow(OverflowSlot),
}

/// Exclusive handle to a graph session
pub struct SessionLease {
    session: Option<Box<dyn GraphSession>>,
    slot: LeaseSlot,
    broken: bool,
    pool: Arc<PoolInner>,
}

impl SessionLease {
    /// Run a parameterized query on the leased session
    pub async fn run(&mut self, query: &str, params: &Params) -> Result<Vec<Record>> {
        let session = self.session.as_mut().ok_or_else(|| {
            FlowscopeError::AdapterUnavailable("lease has already been released".to_string())
        })?;
        session.run(query, params).await
    }

    /// Mark the session as unusable so it is closed instead of reused
    pub fn discard(&mut self) {
        self.broken = true;
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self.slot, LeaseSlot::Overflow(_))
    }

    /// Explicitly hand the lease back
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let (LeaseSlot::Pooled(_), Some(session)) = (&self.slot, self.session.take()) {
            if !self.broken {
                self.pool.idle.lock().push(session);
            }
        }
        // slot (permit or overflow counter) is released when the fields drop
    }
}
