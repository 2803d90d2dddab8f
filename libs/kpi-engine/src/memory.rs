//! In-memory collaborators
//!
//! Useful for testing and embedded scenarios where readings are pushed by the
//! host instead of fetched by an adapter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kpi_model::{DataSourceDescriptor, MetricId, MetricValue};
use parking_lot::RwLock;

use crate::traits::{BasicValueSource, ValueSink};

/// Value source backed by a concurrent map
#[derive(Default)]
pub struct MemoryValueSource {
    readings: DashMap<MetricId, MetricValue>,
    failures: DashMap<MetricId, String>,
    fetches: AtomicU64,
}

impl MemoryValueSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a good reading stamped now
    pub fn set_value(&self, id: impl Into<MetricId>, value: f64) {
        let id = id.into();
        self.readings
            .insert(id.clone(), MetricValue::good(id, value, ""));
    }

    /// Set an arbitrary reading (any quality, custom timestamp)
    pub fn set_reading(&self, reading: MetricValue) {
        self.readings.insert(reading.metric_id.clone(), reading);
    }

    /// Make fetches for `id` fail with `reason`
    pub fn set_failure(&self, id: impl Into<MetricId>, reason: impl Into<String>) {
        self.failures.insert(id.into(), reason.into());
    }

    pub fn clear_failure(&self, id: &MetricId) {
        self.failures.remove(id);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BasicValueSource for MemoryValueSource {
    async fn fetch(
        &self,
        id: &MetricId,
        _descriptor: &DataSourceDescriptor,
    ) -> Result<MetricValue> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if let Some(reason) = self.failures.get(id) {
            return Err(anyhow!("{}", reason.value()));
        }
        self.readings
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| anyhow!("No reading available for {}", id))
    }
}

/// Sink collecting every stored value
#[derive(Default)]
pub struct MemorySink {
    stored: RwLock<Vec<MetricValue>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent stores fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn stored(&self) -> Vec<MetricValue> {
        self.stored.read().clone()
    }

    pub fn stored_count(&self) -> usize {
        self.stored.read().len()
    }

    /// Most recent value stored for `id`
    pub fn latest(&self, id: &MetricId) -> Option<MetricValue> {
        self.stored
            .read()
            .iter()
            .rev()
            .find(|v| v.metric_id == *id)
            .cloned()
    }

    pub fn clear(&self) {
        self.stored.write().clear();
    }
}

#[async_trait]
impl ValueSink for MemorySink {
    async fn store(
        &self,
        id: &MetricId,
        value: &MetricValue,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(anyhow!("Sink unavailable, dropped value for {}", id));
        }
        let mut value = value.clone();
        value.metric_id = id.clone();
        value.timestamp = timestamp;
        self.stored.write().push(value);
        Ok(())
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl ValueSink for NullSink {
    async fn store(
        &self,
        _id: &MetricId,
        _value: &MetricValue,
        _timestamp: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }
}
