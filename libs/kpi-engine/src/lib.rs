//! KPI Engine
//!
//! Calculates basic and derived metrics and keeps derived values current when
//! their inputs change.
//!
//! # Architecture
//!
//! ```text
//! poller ──notify_changed──► ChangePropagator ──► ReverseIndex (dependents)
//!                                   │
//!                                   ▼
//!                              Calculator ──► ValueCache (TTL)
//!                              │        │
//!                 BasicValueSource    kpi_calc::evaluate
//!                                   │
//!                                   ▼
//!                               ValueSink
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kpi_engine::{EngineConfig, KpiEngine, MemorySink, MemoryValueSource, MetricRegistry};
//! use kpi_model::{DataSourceDescriptor, DataSourceType, Metric, MetricId};
//!
//! # async fn run() -> kpi_engine::Result<()> {
//! let config = EngineConfig::from_env()?;
//! let _log_guard = config.init_logging()?;
//!
//! let total = MetricId::new("grid.transformer.total");
//! let registry = Arc::new(MetricRegistry::from_metrics(vec![Metric::basic(
//!     total.clone(),
//!     "Transformer count",
//!     "pcs",
//!     Some(DataSourceDescriptor::new(DataSourceType::Manual, "memory")),
//! )]));
//!
//! let source = Arc::new(MemoryValueSource::new());
//! source.set_value(total.clone(), 120.0);
//!
//! let engine = KpiEngine::new(
//!     config,
//!     registry,
//!     source,
//!     Arc::new(MemorySink::new()),
//! )?;
//! engine.start()?;
//!
//! let value = engine.calculate(&total).await;
//! assert_eq!(value.value, Some(120.0));
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod calculator;
pub mod config;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod graph;
pub mod memory;
pub mod propagator;
pub mod registry;
pub mod reverse_index;
pub mod traits;

// Re-exports for convenience
pub use cache::{CacheStats, ValueCache};
pub use calculator::Calculator;
pub use config::{EngineConfig, DERIVED_UPDATE_TAG, ENV_PREFIX};
pub use dependency::{
    detect_cycle, extract_identifiers, topological_order, validate, ValidationResult,
};
pub use engine::KpiEngine;
pub use error::{EngineError, Result};
pub use graph::{CycleError, DependencyGraph, NodeKind};
pub use memory::{MemorySink, MemoryValueSource, NullSink};
pub use propagator::{ChangePropagator, Notification, PropagationStats};
pub use registry::MetricRegistry;
pub use reverse_index::ReverseIndex;
pub use traits::{BasicValueSource, ValueSink};
