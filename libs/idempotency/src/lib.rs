//! Deduplication stores keyed by Slack event id.
//!
//! The broker consults an [`EventStore`] before running the receiver chain so a
//! redelivered event is dispatched at most once. Two in-process backends ship
//! here: [`InMemoryEventStore`] never forgets an id, [`TtlEventStore`] forgets
//! ids after a configurable time-to-live.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashSet;
use time::{Date, Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Contract implemented by event deduplication stores.
///
/// Implementations must be safe to share across concurrently handled
/// deliveries.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Returns `true` when `event_id` was marked as seen.
    async fn exists(&self, event_id: &str) -> Result<bool>;

    /// Marks `event_id` as seen. Marking an id twice is a no-op.
    async fn put(&self, event_id: &str) -> Result<()>;

    /// Marks `event_id` as seen and returns `Ok(true)` if it was not seen before,
    /// `Ok(false)` for a duplicate.
    ///
    /// The default combines [`exists`](Self::exists) and [`put`](Self::put) and is
    /// therefore racy under concurrent deliveries of the same id. Backends that
    /// can do better override it with an atomic check-and-set.
    async fn put_if_absent(&self, event_id: &str) -> Result<bool> {
        if self.exists(event_id).await? {
            return Ok(false);
        }
        self.put(event_id).await?;
        Ok(true)
    }
}

/// Shared trait object wrapper.
pub type SharedEventStore = Arc<dyn EventStore>;

/// Unbounded in-memory store. Every id ever marked stays in memory, so this is
/// meant for tests and short-lived processes.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    seen: Arc<DashSet<String>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn exists(&self, event_id: &str) -> Result<bool> {
        Ok(self.seen.contains(event_id))
    }

    async fn put(&self, event_id: &str) -> Result<()> {
        self.seen.insert(event_id.to_string());
        Ok(())
    }

    async fn put_if_absent(&self, event_id: &str) -> Result<bool> {
        Ok(self.seen.insert(event_id.to_string()))
    }
}

/// Upper bound accepted for `EVENT_DEDUP_TTL_HOURS` (100 years).
pub const MAX_TTL_HOURS: u64 = 24 * 365 * 100;

/// Number of new ids written between two sweeps of expired entries.
pub const DEFAULT_SWEEP_EVERY: usize = 1024;

/// In-memory store that forgets ids once their TTL elapsed.
///
/// Expired ids are swept on the write path every
/// [`DEFAULT_SWEEP_EVERY`] insertions, so memory stays bounded by the number
/// of ids seen within one TTL window.
#[derive(Clone)]
pub struct TtlEventStore {
    inner: Arc<RwLock<HashMap<String, OffsetDateTime>>>,
    ttl: Duration,
    writes: Arc<AtomicUsize>,
    sweep_every: usize,
}

impl TtlEventStore {
    pub fn new(ttl: std::time::Duration) -> Self {
        let secs = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        Self {
            inner: Arc::default(),
            ttl: Duration::seconds(secs),
            writes: Arc::default(),
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }

    /// Sweeps expired ids after every `writes` insertions instead of the default.
    pub fn with_sweep_every(mut self, writes: usize) -> Self {
        self.sweep_every = writes.max(1);
        self
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    fn expiry_from(&self, now: OffsetDateTime) -> OffsetDateTime {
        now.checked_add(self.ttl)
            .unwrap_or_else(|| Date::MAX.midnight().assume_utc())
    }

    /// Drops every entry that expired at `now`. Returns how many were removed.
    pub async fn purge_expired(&self, now: OffsetDateTime) -> usize {
        sweep(&mut *self.inner.write().await, now)
    }
}

fn sweep(entries: &mut HashMap<String, OffsetDateTime>, now: OffsetDateTime) -> usize {
    let before = entries.len();
    entries.retain(|_, expires| *expires > now);
    let purged = before - entries.len();
    if purged > 0 {
        debug!(purged, "purged expired event ids");
    }
    purged
}

#[async_trait]
impl EventStore for TtlEventStore {
    async fn exists(&self, event_id: &str) -> Result<bool> {
        let now = OffsetDateTime::now_utc();
        let guard = self.inner.read().await;
        Ok(matches!(guard.get(event_id), Some(expires) if *expires > now))
    }

    async fn put(&self, event_id: &str) -> Result<()> {
        self.put_if_absent(event_id).await.map(|_| ())
    }

    async fn put_if_absent(&self, event_id: &str) -> Result<bool> {
        let now = OffsetDateTime::now_utc();
        let mut guard = self.inner.write().await;
        if matches!(guard.get(event_id), Some(expires) if *expires > now) {
            return Ok(false);
        }
        guard.insert(event_id.to_string(), self.expiry_from(now));

        let writes = self.writes.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if writes % self.sweep_every == 0 {
            sweep(&mut guard, now);
        }
        Ok(true)
    }
}

/// Configuration derived at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStoreConfig {
    /// `None` selects the unbounded store.
    pub ttl_hours: Option<u64>,
}

impl EventStoreConfig {
    pub fn from_env() -> Self {
        let ttl_hours = std::env::var("EVENT_DEDUP_TTL_HOURS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|hours| *hours > 0)
            .map(|hours| hours.min(MAX_TTL_HOURS));
        Self { ttl_hours }
    }

    pub fn build(&self) -> SharedEventStore {
        match self.ttl_hours {
            Some(hours) => {
                let hours = hours.min(MAX_TTL_HOURS);
                info!(ttl_hours = hours, "using ttl event store");
                Arc::new(TtlEventStore::new(std::time::Duration::from_secs(
                    hours.saturating_mul(3600),
                )))
            }
            None => {
                info!("using unbounded in-memory event store");
                Arc::new(InMemoryEventStore::new())
            }
        }
    }
}
