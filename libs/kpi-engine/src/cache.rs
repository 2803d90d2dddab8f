//! Time-bounded value cache
//!
//! Values stay usable for the configured TTL measured from their own
//! timestamp. Error-quality values are never stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use kpi_model::{MetricId, MetricValue, DEFAULT_VALIDITY_SECS};
use serde::Serialize;
use tracing::trace;

/// Cache counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct ValueCache {
    entries: DashMap<MetricId, MetricValue>,
    ttl: chrono::Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ValueCache {
    pub fn new(ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_VALIDITY_SECS));
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Cached value if still inside its validity window
    ///
    /// A stale entry is dropped on lookup.
    pub fn get_fresh(&self, id: &MetricId) -> Option<MetricValue> {
        let now = Utc::now();
        let cached = self.entries.get(id).map(|entry| entry.value().clone());

        match cached {
            Some(value) if value.is_fresh(self.ttl, now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            },
            Some(_) => {
                self.entries
                    .remove_if(id, |_, value| !value.is_fresh(self.ttl, now));
                trace!("Cache entry for {} expired", id);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }

    /// Store a value under its own metric id; returns false for error values
    pub fn insert(&self, value: MetricValue) -> bool {
        if value.is_error() {
            return false;
        }
        self.entries.insert(value.metric_id.clone(), value);
        true
    }

    pub fn invalidate(&self, id: &MetricId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, value| value.is_fresh(self.ttl, now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
