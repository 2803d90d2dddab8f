//! Dependency analysis for derived metrics
//!
//! Two views of a derived metric's inputs are checked against each other:
//! the identifiers referenced by its formula and its declared dependency
//! list. Cycle detection and ordering follow the declared list.

use std::collections::BTreeSet;

use kpi_model::{Metric, MetricId, MetricKind};
use serde::Serialize;

use crate::graph::{CycleError, DependencyGraph};
use crate::registry::MetricRegistry;

pub use kpi_calc::extract_identifiers;

/// Outcome of validating a metric definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// No errors; warnings are allowed
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn error(&mut self, msg: String) {
        self.errors.push(msg);
    }

    fn warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }
}

/// Validate a derived metric definition against the registry
///
/// The metric does not have to be registered yet; its own definition takes
/// precedence over a registered one with the same id.
pub fn validate(metric: &Metric, registry: &MetricRegistry) -> ValidationResult {
    let mut result = ValidationResult::default();

    let MetricKind::Derived(derived) = &metric.kind else {
        result.error(format!("Metric {} is not a derived metric", metric.id));
        return result;
    };

    if let Err(e) = kpi_calc::check_syntax(&derived.formula) {
        result.error(format!("Invalid formula syntax: {}", e));
    }

    let referenced = extract_identifiers(&derived.formula);
    let declared: BTreeSet<&MetricId> = derived.dependencies.iter().collect();

    for id in &referenced {
        if *id != metric.id && !registry.contains(id) {
            result.error(format!("Referenced metric not found: {}", id));
        }
        if !declared.contains(id) {
            result.warning(format!(
                "Metric {} is referenced in the formula but not declared as a dependency",
                id
            ));
        }
    }

    for dep in &declared {
        if !referenced.contains(*dep) {
            result.warning(format!(
                "Declared dependency {} is not used in the formula",
                dep
            ));
        }
    }

    if detect_cycle(metric, registry) {
        result.error(format!("Circular dependency detected involving {}", metric.id));
    }

    result
}

/// Whether a cycle is reachable from the metric over declared dependencies
pub fn detect_cycle(metric: &Metric, registry: &MetricRegistry) -> bool {
    DependencyGraph::from_candidate(metric, registry).has_cycle()
}

/// Calculation order for `root`: dependencies first, `root` last
pub fn topological_order(
    root: &MetricId,
    registry: &MetricRegistry,
) -> Result<Vec<MetricId>, CycleError> {
    DependencyGraph::from_root(root, registry).topological_order()
}
