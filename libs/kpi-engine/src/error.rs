//! Engine Error Types
//!
//! Calculation failures never surface as `Err` from `Calculator::calculate`;
//! they are carried as the message of an `Error`-quality value.

use kpi_calc::FormulaError;
use kpi_model::{MetricId, MetricValue};
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// Blank metric id
    #[error("Metric id is empty")]
    EmptyIdentifier,

    /// Metric not registered
    #[error("Metric not found: {0}")]
    MetricNotFound(MetricId),

    /// Basic metric without an enabled data source
    #[error("Data source disabled for metric: {0}")]
    DataSourceDisabled(MetricId),

    /// Fetch error or error-quality reading
    #[error("Data source fetch failed for {id}: {reason}")]
    DataSourceFetchFailed { id: MetricId, reason: String },

    /// Derived metric definition has validation errors
    #[error("Formula validation failed for {id}: {}", .errors.join("; "))]
    FormulaValidationFailed { id: MetricId, errors: Vec<String> },

    /// An operand of the formula could not be calculated
    #[error("Dependency calculation failed for {id}: {dependency} ({reason})")]
    DependencyCalculationFailed {
        id: MetricId,
        dependency: MetricId,
        reason: String,
    },

    /// Formula evaluation error
    #[error("Formula evaluation failed for {id}: {source}")]
    FormulaEvaluationFailed { id: MetricId, source: FormulaError },

    /// Metric re-entered while already being calculated
    #[error("Circular dependency detected at {0}")]
    CircularDependency(MetricId),

    /// Calculation nested deeper than the configured limit
    #[error("Recursion limit of {limit} exceeded at {id}")]
    RecursionLimitExceeded { id: MetricId, limit: usize },

    /// Propagation queue is closed
    #[error("Change propagator is not accepting notifications")]
    PropagatorClosed,

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Error-quality value carrying this error as its message
    pub fn into_value(self, id: MetricId) -> MetricValue {
        MetricValue::error(id, self.to_string())
    }
}

impl From<common::Error> for EngineError {
    fn from(err: common::Error) -> Self {
        match err {
            common::Error::Config(msg) => EngineError::Config(msg),
            other => EngineError::Config(other.to_string()),
        }
    }
}
