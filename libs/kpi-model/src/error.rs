//! Model Layer Error Types

use thiserror::Error;

/// Result type for kpi-model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Model layer errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Identifier does not have the `category.subCategory.name` shape
    #[error("Invalid metric id '{id}': {reason}")]
    InvalidMetricId { id: String, reason: String },
}

impl ModelError {
    pub fn invalid_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMetricId {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
