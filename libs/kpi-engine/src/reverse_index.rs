//! Reverse dependency index
//!
//! Maps every metric to the derived metrics that declare it as a
//! dependency. The whole map is rebuilt from the registry and swapped in one
//! step; the registry generation it was built from tells when it is stale.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use kpi_model::MetricId;
use parking_lot::RwLock;
use tracing::info;

use crate::registry::MetricRegistry;

#[derive(Default)]
struct IndexState {
    dependents: HashMap<MetricId, BTreeSet<MetricId>>,
    /// Registry generation at build time, `None` before the first build
    generation: Option<u64>,
}

#[derive(Default)]
pub struct ReverseIndex {
    state: RwLock<IndexState>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from all derived metrics, returning the number of edges
    pub fn rebuild(&self, registry: &MetricRegistry) -> usize {
        // Read the generation first so a concurrent mutation leaves us stale
        let generation = registry.generation();
        let mut dependents: HashMap<MetricId, BTreeSet<MetricId>> = HashMap::new();
        let mut edges = 0;

        for metric in registry.derived_metrics() {
            for dep in metric.declared_dependencies() {
                if dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(metric.id.clone())
                {
                    edges += 1;
                }
            }
        }

        let nodes = dependents.len();
        *self.state.write() = IndexState {
            dependents,
            generation: Some(generation),
        };
        info!(
            "Reverse index rebuilt: {} dependencies, {} edges (generation {})",
            nodes, edges, generation
        );
        edges
    }

    /// Whether the registry changed since the last rebuild
    pub fn is_stale(&self, registry: &MetricRegistry) -> bool {
        self.state.read().generation != Some(registry.generation())
    }

    pub fn generation(&self) -> Option<u64> {
        self.state.read().generation
    }

    /// Direct dependents of `id`
    pub fn dependents_of(&self, id: &MetricId) -> BTreeSet<MetricId> {
        self.state
            .read()
            .dependents
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// All transitive dependents of `id` in breadth-first order
    pub fn dependency_chain(&self, id: &MetricId) -> Vec<MetricId> {
        let state = self.state.read();
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut queue = VecDeque::from([id.clone()]);
        seen.insert(id.clone());

        while let Some(current) = queue.pop_front() {
            let Some(dependents) = state.dependents.get(&current) else {
                continue;
            };
            for dependent in dependents {
                if seen.insert(dependent.clone()) {
                    chain.push(dependent.clone());
                    queue.push_back(dependent.clone());
                }
            }
        }

        chain
    }

    /// Whether any cycle exists among the indexed edges
    pub fn has_cycle(&self) -> bool {
        let state = self.state.read();
        let mut on_stack = HashSet::new();
        let mut done = HashSet::new();

        state
            .dependents
            .keys()
            .any(|id| Self::visit(&state.dependents, id, &mut on_stack, &mut done))
    }

    fn visit<'a>(
        dependents: &'a HashMap<MetricId, BTreeSet<MetricId>>,
        id: &'a MetricId,
        on_stack: &mut HashSet<&'a MetricId>,
        done: &mut HashSet<&'a MetricId>,
    ) -> bool {
        if done.contains(id) {
            return false;
        }
        if !on_stack.insert(id) {
            return true;
        }
        if let Some(next) = dependents.get(id) {
            for dependent in next {
                if Self::visit(dependents, dependent, on_stack, done) {
                    return true;
                }
            }
        }
        on_stack.remove(id);
        done.insert(id);
        false
    }
}
