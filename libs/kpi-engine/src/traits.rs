//! Collaborator interfaces
//!
//! Data source adapters (HTTP, MQTT, database, file) and persistence backends
//! live outside the engine. The engine only sees them through these traits.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kpi_model::{DataSourceDescriptor, MetricId, MetricValue};

/// Fetches the current reading of a basic metric
#[async_trait]
pub trait BasicValueSource: Send + Sync + 'static {
    /// Returned readings are re-stamped with `id` by the caller; an empty
    /// unit falls back to the metric's unit.
    async fn fetch(&self, id: &MetricId, descriptor: &DataSourceDescriptor)
        -> Result<MetricValue>;
}

/// Receives recomputed derived values (time-series store, message bus ...)
#[async_trait]
pub trait ValueSink: Send + Sync + 'static {
    async fn store(&self, id: &MetricId, value: &MetricValue, timestamp: DateTime<Utc>)
        -> Result<()>;
}
