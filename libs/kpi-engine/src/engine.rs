//! Engine facade
//!
//! Wires registry, cache, calculator and propagator together and owns the
//! mutation path for metric definitions.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use kpi_model::{Metric, MetricId, MetricValue};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::cache::{CacheStats, ValueCache};
use crate::calculator::Calculator;
use crate::config::EngineConfig;
use crate::dependency::{validate, ValidationResult};
use crate::error::Result;
use crate::propagator::{ChangePropagator, PropagationStats};
use crate::registry::MetricRegistry;
use crate::traits::{BasicValueSource, ValueSink};

pub struct KpiEngine {
    config: EngineConfig,
    registry: Arc<MetricRegistry>,
    calculator: Arc<Calculator>,
    propagator: ChangePropagator,
    mutation_lock: Mutex<()>,
}

impl KpiEngine {
    pub fn new(
        config: EngineConfig,
        registry: Arc<MetricRegistry>,
        source: Arc<dyn BasicValueSource>,
        sink: Arc<dyn ValueSink>,
    ) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(ValueCache::new(config.cache_ttl()));
        let calculator = Arc::new(Calculator::new(
            Arc::clone(&registry),
            cache,
            source,
            config.max_recursion_depth,
        ));
        let propagator = ChangePropagator::new(&config, Arc::clone(&calculator), sink);

        info!("KPI engine created with {} metrics", registry.len());
        Ok(Self {
            config,
            registry,
            calculator,
            propagator,
            mutation_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn calculator(&self) -> &Arc<Calculator> {
        &self.calculator
    }

    pub fn propagator(&self) -> &ChangePropagator {
        &self.propagator
    }

    /// Start change propagation
    pub fn start(&self) -> Result<()> {
        self.propagator.start()
    }

    pub async fn shutdown(&self) {
        self.propagator.shutdown().await;
        info!("KPI engine stopped");
    }

    /// Register or replace a metric definition
    ///
    /// Definitions with validation errors are rejected and leave the registry
    /// untouched; warnings are logged and the definition is accepted.
    pub fn upsert_metric(&self, metric: Metric) -> ValidationResult {
        let _guard = self.mutation_lock.lock();

        let mut result = ValidationResult::default();
        if let Err(e) = MetricId::parse(metric.id.as_str()) {
            result.errors.push(e.to_string());
            return result;
        }
        if metric.is_derived() {
            result = validate(&metric, &self.registry);
        }

        if !result.is_valid() {
            warn!(
                "Rejected definition of {}: {}",
                metric.id,
                result.errors.join("; ")
            );
            return result;
        }
        for warning in &result.warnings {
            warn!("{}: {}", metric.id, warning);
        }

        let id = metric.id.clone();
        let replaced = self.registry.upsert(metric).is_some();
        self.propagator.rebuild_index();
        let invalidated = self.invalidate_with_dependents(&id);
        info!(
            "{} metric {} ({} cached values invalidated)",
            if replaced { "Updated" } else { "Added" },
            id,
            invalidated
        );
        result
    }

    /// Remove a metric definition
    ///
    /// Dependents stay registered; their next calculation reports the
    /// missing dependency.
    pub fn remove_metric(&self, id: &MetricId) -> Option<Arc<Metric>> {
        let _guard = self.mutation_lock.lock();

        let invalidated = self.invalidate_with_dependents(id);
        let removed = self.registry.remove(id);
        if removed.is_some() {
            self.propagator.rebuild_index();
            info!(
                "Removed metric {} ({} cached values invalidated)",
                id, invalidated
            );
        }
        removed
    }

    pub async fn calculate(&self, id: &MetricId) -> MetricValue {
        self.calculator.calculate(id).await
    }

    pub async fn calculate_many(&self, ids: &[MetricId]) -> HashMap<MetricId, MetricValue> {
        self.calculator.calculate_many(ids).await
    }

    pub async fn notify_changed(
        &self,
        id: MetricId,
        new_value: MetricValue,
        source_tag: impl Into<String>,
    ) -> Result<()> {
        self.propagator.notify_changed(id, new_value, source_tag).await
    }

    /// Resolve once every queued change has propagated
    pub async fn wait_idle(&self) {
        self.propagator.wait_idle().await;
    }

    pub fn dependents_of(&self, id: &MetricId) -> BTreeSet<MetricId> {
        self.propagator.dependents_of(id)
    }

    pub fn dependency_chain(&self, id: &MetricId) -> Vec<MetricId> {
        self.propagator.dependency_chain(id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.calculator.cache_stats()
    }

    pub fn propagation_stats(&self) -> PropagationStats {
        self.propagator.stats()
    }

    fn invalidate_with_dependents(&self, id: &MetricId) -> usize {
        let mut invalidated = usize::from(self.calculator.invalidate(id));
        for dependent in self.propagator.dependency_chain(id) {
            if self.calculator.invalidate(&dependent) {
                invalidated += 1;
            }
        }
        invalidated
    }
}
