//! KPI Model Library
//!
//! Core data model shared by the formula evaluator and the calculation engine.
//! Pure types without IO dependencies.
//!
//! # Modules
//!
//! - `id`: hierarchical `category.subCategory.name` metric identifiers
//! - `metric`: basic and derived metric definitions
//! - `value`: computed or fetched readings with quality tags
//!
//! # Example
//!
//! ```
//! use kpi_model::{Metric, MetricId, MetricValue, Quality};
//!
//! let total = MetricId::parse("topology.transformer.total").unwrap();
//! let metric = Metric::basic(total.clone(), "Transformer count", "pcs", None);
//! assert!(!metric.is_derived());
//!
//! let value = MetricValue::good(total, 42.0, "pcs");
//! assert_eq!(value.quality, Quality::Good);
//! assert!(value.is_valid());
//! ```

pub mod error;
pub mod id;
pub mod metric;
pub mod value;

// Re-exports for convenience
pub use error::{ModelError, Result};
pub use id::{is_segment_char, MetricId};
pub use metric::{
    BasicMetric, DataSourceDescriptor, DataSourceType, DerivedMetric, Metric, MetricKind,
};
pub use value::{MetricValue, Quality, DEFAULT_VALIDITY_SECS};
