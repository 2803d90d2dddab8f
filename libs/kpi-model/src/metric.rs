//! Metric definitions
//!
//! A metric is either basic (value fetched from an external data source) or
//! derived (value computed from a formula over other metrics).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::MetricId;

/// Kind of external data source feeding a basic metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceType {
    Http,
    Mqtt,
    Database,
    File,
    /// Values are pushed by an operator or test harness
    Manual,
}

/// Where and how often a basic metric's value is fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceDescriptor {
    #[serde(rename = "type")]
    pub source_type: DataSourceType,
    /// Source address (URL, topic, query, path ...)
    pub address: String,
    /// Refresh/sampling interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Adapter-specific parameters, opaque to the engine
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_enabled() -> bool {
    true
}

impl DataSourceDescriptor {
    pub fn new(source_type: DataSourceType, address: impl Into<String>) -> Self {
        Self {
            source_type,
            address: address.into(),
            refresh_interval_secs: default_refresh_interval(),
            enabled: true,
            params: HashMap::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_refresh_interval(mut self, secs: u64) -> Self {
        self.refresh_interval_secs = secs;
        self
    }
}

/// Leaf metric with an externally supplied value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicMetric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSourceDescriptor>,
}

/// Metric computed from a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub formula: String,
    /// Declared dependencies, checked against the formula at validation
    #[serde(default)]
    pub dependencies: Vec<MetricId>,
}

/// Kind-specific part of a metric definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetricKind {
    Basic(BasicMetric),
    Derived(DerivedMetric),
}

/// Metric definition as supplied by the configuration loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: MetricId,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sub_category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: MetricKind,
}

impl Metric {
    /// Create a basic metric; category/sub-category are taken from the id
    pub fn basic(
        id: MetricId,
        name: impl Into<String>,
        unit: impl Into<String>,
        data_source: Option<DataSourceDescriptor>,
    ) -> Self {
        Self::with_kind(id, name, unit, MetricKind::Basic(BasicMetric { data_source }))
    }

    /// Create a derived metric; category/sub-category are taken from the id
    pub fn derived(
        id: MetricId,
        name: impl Into<String>,
        unit: impl Into<String>,
        formula: impl Into<String>,
        dependencies: Vec<MetricId>,
    ) -> Self {
        Self::with_kind(
            id,
            name,
            unit,
            MetricKind::Derived(DerivedMetric {
                formula: formula.into(),
                dependencies,
            }),
        )
    }

    fn with_kind(
        id: MetricId,
        name: impl Into<String>,
        unit: impl Into<String>,
        kind: MetricKind,
    ) -> Self {
        let category = id.category().unwrap_or_default().to_string();
        let sub_category = id.sub_category().unwrap_or_default().to_string();
        Self {
            id,
            name: name.into(),
            unit: unit.into(),
            category,
            sub_category,
            description: None,
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, MetricKind::Derived(_))
    }

    pub fn as_derived(&self) -> Option<&DerivedMetric> {
        match &self.kind {
            MetricKind::Derived(derived) => Some(derived),
            MetricKind::Basic(_) => None,
        }
    }

    /// Formula of a derived metric
    pub fn formula(&self) -> Option<&str> {
        self.as_derived().map(|d| d.formula.as_str())
    }

    /// Declared dependencies; empty for basic metrics
    pub fn declared_dependencies(&self) -> &[MetricId] {
        match &self.kind {
            MetricKind::Derived(derived) => &derived.dependencies,
            MetricKind::Basic(_) => &[],
        }
    }
}
