//! Metric identifiers
//!
//! A metric id is a hierarchical string `category.subCategory.name`. Every
//! segment is one or more word characters (letters, digits, underscore),
//! which includes CJK ideographs, e.g. `中压拓扑.配变统计.配变总数`.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Number of dot-separated segments in a metric id
pub const SEGMENT_COUNT: usize = 3;

/// Returns true for characters allowed inside an id segment
pub fn is_segment_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Unique metric identifier, used as registry and graph key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(String);

impl MetricId {
    /// Wrap a string without checking its shape
    ///
    /// Lookups with a malformed id simply miss; use [`MetricId::parse`] when
    /// the input comes from an operator.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse and validate a `category.subCategory.name` identifier
    ///
    /// ```
    /// use kpi_model::MetricId;
    ///
    /// assert!(MetricId::parse("中压拓扑.拓扑不一致.数量").is_ok());
    /// assert!(MetricId::parse("quality.gis_sync.rate").is_ok());
    /// assert!(MetricId::parse("quality.rate").is_err());
    /// assert!(MetricId::parse("quality..rate").is_err());
    /// assert!(MetricId::parse("quality.sync.rate-1").is_err());
    /// ```
    pub fn parse(id: &str) -> Result<Self> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ModelError::invalid_id(id, "identifier is empty"));
        }

        let segments: Vec<&str> = trimmed.split('.').collect();
        if segments.len() != SEGMENT_COUNT {
            return Err(ModelError::invalid_id(
                id,
                format!(
                    "expected {} segments, found {}",
                    SEGMENT_COUNT,
                    segments.len()
                ),
            ));
        }

        for segment in &segments {
            if segment.is_empty() {
                return Err(ModelError::invalid_id(id, "empty path segment"));
            }
            if let Some(c) = segment.chars().find(|c| !is_segment_char(*c)) {
                return Err(ModelError::invalid_id(
                    id,
                    format!("invalid character '{}'", c),
                ));
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn segment(&self, index: usize) -> Option<&str> {
        self.0.split('.').nth(index)
    }

    pub fn category(&self) -> Option<&str> {
        self.segment(0)
    }

    pub fn sub_category(&self) -> Option<&str> {
        self.segment(1)
    }

    pub fn name(&self) -> Option<&str> {
        self.segment(2)
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetricId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MetricId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for MetricId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for MetricId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
