//! Metric registry
//!
//! Concurrent store of metric definitions keyed by id. Writers are
//! serialized and every structural change bumps a generation counter that
//! the change propagator compares against its reverse index.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use kpi_model::{Metric, MetricId};
use parking_lot::Mutex;
use tracing::debug;

pub struct MetricRegistry {
    metrics: DashMap<MetricId, Arc<Metric>>,
    write_lock: Mutex<()>,
    generation: AtomicU64,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
            write_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Bulk load definitions without validation (loader path)
    pub fn from_metrics(metrics: impl IntoIterator<Item = Metric>) -> Self {
        let registry = Self::new();
        for metric in metrics {
            registry.metrics.insert(metric.id.clone(), Arc::new(metric));
        }
        registry.generation.store(1, Ordering::Release);
        registry
    }

    pub fn get(&self, id: &MetricId) -> Option<Arc<Metric>> {
        self.metrics.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: &MetricId) -> bool {
        self.metrics.contains_key(id)
    }

    /// Insert or replace a definition, returning the previous one
    pub fn upsert(&self, metric: Metric) -> Option<Arc<Metric>> {
        let _guard = self.write_lock.lock();
        let id = metric.id.clone();
        let previous = self.metrics.insert(id.clone(), Arc::new(metric));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Registry upsert {} (generation {})", id, generation);
        previous
    }

    pub fn remove(&self, id: &MetricId) -> Option<Arc<Metric>> {
        let _guard = self.write_lock.lock();
        let removed = self.metrics.remove(id).map(|(_, metric)| metric);
        if removed.is_some() {
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            debug!("Registry remove {} (generation {})", id, generation);
        }
        removed
    }

    /// All ids, sorted
    pub fn ids(&self) -> Vec<MetricId> {
        let mut ids: Vec<MetricId> = self.metrics.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn metrics(&self) -> Vec<Arc<Metric>> {
        self.metrics.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn derived_metrics(&self) -> Vec<Arc<Metric>> {
        self.metrics
            .iter()
            .filter(|e| e.value().is_derived())
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Incremented on every upsert and effective removal
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}
