//! Calculation orchestrator
//!
//! Resolves a metric id to a value: cache first, then the data source for
//! basic metrics or a recursive evaluation of the formula for derived ones.
//! Failures come back as `Error`-quality values, never as panics.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use kpi_model::{BasicMetric, DerivedMetric, Metric, MetricId, MetricKind, MetricValue};
use tracing::{debug, warn};

use crate::cache::{CacheStats, ValueCache};
use crate::dependency::{extract_identifiers, validate};
use crate::error::{EngineError, Result};
use crate::registry::MetricRegistry;
use crate::traits::BasicValueSource;

pub struct Calculator {
    registry: Arc<MetricRegistry>,
    cache: Arc<ValueCache>,
    source: Arc<dyn BasicValueSource>,
    max_depth: usize,
}

impl Calculator {
    pub fn new(
        registry: Arc<MetricRegistry>,
        cache: Arc<ValueCache>,
        source: Arc<dyn BasicValueSource>,
        max_depth: usize,
    ) -> Self {
        Self {
            registry,
            cache,
            source,
            max_depth,
        }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ValueCache> {
        &self.cache
    }

    /// Current value of a metric; errors are returned as `Error` quality
    pub async fn calculate(&self, id: &MetricId) -> MetricValue {
        match self.try_calculate(id).await {
            Ok(value) => value,
            Err(e) => {
                debug!("Calculation of {} failed: {}", id, e);
                e.into_value(id.clone())
            },
        }
    }

    /// Like [`Calculator::calculate`] but with the failure as a typed error
    pub async fn try_calculate(&self, id: &MetricId) -> Result<MetricValue> {
        let mut path = Vec::new();
        self.calculate_on_path(id, &mut path).await
    }

    /// Calculate several metrics; shared dependencies hit the cache
    pub async fn calculate_many(&self, ids: &[MetricId]) -> HashMap<MetricId, MetricValue> {
        let mut results = HashMap::with_capacity(ids.len());
        for id in ids {
            let value = self.calculate(id).await;
            results.insert(id.clone(), value);
        }
        results
    }

    pub fn invalidate(&self, id: &MetricId) -> bool {
        self.cache.invalidate(id)
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// `path` holds the derived metrics currently being evaluated
    fn calculate_on_path<'a>(
        &'a self,
        id: &'a MetricId,
        path: &'a mut Vec<MetricId>,
    ) -> BoxFuture<'a, Result<MetricValue>> {
        Box::pin(async move {
            if id.is_blank() {
                return Err(EngineError::EmptyIdentifier);
            }

            if let Some(cached) = self.cache.get_fresh(id) {
                debug!("Cache hit for {}", id);
                return Ok(cached);
            }

            if path.contains(id) {
                return Err(EngineError::CircularDependency(id.clone()));
            }
            if path.len() >= self.max_depth {
                return Err(EngineError::RecursionLimitExceeded {
                    id: id.clone(),
                    limit: self.max_depth,
                });
            }

            let metric = self
                .registry
                .get(id)
                .ok_or_else(|| EngineError::MetricNotFound(id.clone()))?;

            let value = match &metric.kind {
                MetricKind::Basic(basic) => self.fetch_basic(&metric, basic).await?,
                MetricKind::Derived(derived) => {
                    path.push(id.clone());
                    let result = self.compute_derived(&metric, derived, path).await;
                    path.pop();
                    result?
                },
            };

            self.cache.insert(value.clone());
            Ok(value)
        })
    }

    async fn fetch_basic(&self, metric: &Metric, basic: &BasicMetric) -> Result<MetricValue> {
        let descriptor = basic
            .data_source
            .as_ref()
            .filter(|ds| ds.enabled)
            .ok_or_else(|| EngineError::DataSourceDisabled(metric.id.clone()))?;

        let mut reading = self
            .source
            .fetch(&metric.id, descriptor)
            .await
            .map_err(|e| EngineError::DataSourceFetchFailed {
                id: metric.id.clone(),
                reason: e.to_string(),
            })?;

        if reading.is_error() {
            return Err(EngineError::DataSourceFetchFailed {
                id: metric.id.clone(),
                reason: reading
                    .message
                    .unwrap_or_else(|| "error-quality reading".to_string()),
            });
        }

        reading.metric_id = metric.id.clone();
        if reading.unit.is_empty() {
            reading.unit = metric.unit.clone();
        }
        debug!("Fetched {} = {:?}", metric.id, reading.value);
        Ok(reading)
    }

    async fn compute_derived(
        &self,
        metric: &Metric,
        derived: &DerivedMetric,
        path: &mut Vec<MetricId>,
    ) -> Result<MetricValue> {
        let validation = validate(metric, &self.registry);
        for warning in &validation.warnings {
            warn!("{}: {}", metric.id, warning);
        }
        if !validation.is_valid() {
            return Err(EngineError::FormulaValidationFailed {
                id: metric.id.clone(),
                errors: validation.errors,
            });
        }

        let mut operands = HashMap::new();
        for dep in extract_identifiers(&derived.formula) {
            let value = self.calculate_on_path(&dep, path).await.map_err(|e| {
                EngineError::DependencyCalculationFailed {
                    id: metric.id.clone(),
                    dependency: dep.clone(),
                    reason: e.to_string(),
                }
            })?;
            operands.insert(dep, value);
        }

        let result = kpi_calc::evaluate(&derived.formula, &operands).map_err(|source| {
            EngineError::FormulaEvaluationFailed {
                id: metric.id.clone(),
                source,
            }
        })?;

        debug!("Computed {} = {}", metric.id, result);
        Ok(MetricValue::good(metric.id.clone(), result, metric.unit.clone()))
    }
}
