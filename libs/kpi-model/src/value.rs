//! Computed or fetched metric readings

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::id::MetricId;

/// Default validity window of a value for caching purposes (5 minutes)
pub const DEFAULT_VALIDITY_SECS: i64 = 300;

/// Reliability tag attached to every value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    Warning,
    Error,
    #[default]
    Unknown,
}

/// A single reading of a metric
///
/// `Error` quality always comes with an absent value; the failure reason is
/// carried in `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub metric_id: MetricId,
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub quality: Quality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MetricValue {
    /// Good-quality value stamped now
    pub fn good(metric_id: MetricId, value: f64, unit: impl Into<String>) -> Self {
        Self {
            metric_id,
            value: Some(value),
            unit: unit.into(),
            timestamp: Utc::now(),
            quality: Quality::Good,
            message: None,
        }
    }

    /// Error-quality placeholder stamped now
    pub fn error(metric_id: MetricId, message: impl Into<String>) -> Self {
        Self {
            metric_id,
            value: None,
            unit: String::new(),
            timestamp: Utc::now(),
            quality: Quality::Error,
            message: Some(message.into()),
        }
    }

    /// Change the quality; switching to `Error` drops the value
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        if quality == Quality::Error {
            self.value = None;
        }
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Usable as a formula operand: `Good` quality with a finite value
    pub fn is_valid(&self) -> bool {
        self.quality == Quality::Good && self.value.is_some_and(f64::is_finite)
    }

    pub fn is_error(&self) -> bool {
        self.quality == Quality::Error
    }

    /// Whether the value is still inside its validity window at `now`
    ///
    /// Timestamps in the future count as fresh.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) < ttl
    }
}
