//! Dependency graph over declared dependencies
//!
//! Built from a root metric by following declared dependency lists. Every
//! reachable id becomes a node; ids absent from the registry are kept as
//! [`NodeKind::Missing`] leaves.

use std::collections::{BTreeMap, HashSet};

use kpi_model::{Metric, MetricId, MetricKind};
use thiserror::Error;

use crate::registry::MetricRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Basic,
    Derived,
    Missing,
}

/// Node revisited while on the active DFS path
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Circular dependency detected at {0}")]
pub struct CycleError(pub MetricId);

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    root: Option<MetricId>,
    nodes: BTreeMap<MetricId, NodeKind>,
    edges: BTreeMap<MetricId, Vec<MetricId>>,
}

impl DependencyGraph {
    /// Graph of everything reachable from a registered metric
    pub fn from_root(root: &MetricId, registry: &MetricRegistry) -> Self {
        Self::build(root, |id| registry.get(id).map(|m| (*m).clone()))
    }

    /// Graph rooted at a candidate definition that may not be registered yet
    ///
    /// The candidate shadows any registered definition with the same id.
    pub fn from_candidate(candidate: &Metric, registry: &MetricRegistry) -> Self {
        Self::build(&candidate.id, |id| {
            if *id == candidate.id {
                Some(candidate.clone())
            } else {
                registry.get(id).map(|m| (*m).clone())
            }
        })
    }

    fn build(root: &MetricId, resolve: impl Fn(&MetricId) -> Option<Metric>) -> Self {
        let mut graph = Self {
            root: Some(root.clone()),
            ..Default::default()
        };
        let mut stack = vec![root.clone()];

        while let Some(id) = stack.pop() {
            if graph.nodes.contains_key(&id) {
                continue;
            }
            let Some(metric) = resolve(&id) else {
                graph.nodes.insert(id, NodeKind::Missing);
                continue;
            };
            match &metric.kind {
                MetricKind::Basic(_) => {
                    graph.nodes.insert(id, NodeKind::Basic);
                },
                MetricKind::Derived(derived) => {
                    let mut dependencies = Vec::with_capacity(derived.dependencies.len());
                    for dep in &derived.dependencies {
                        if !dependencies.contains(dep) {
                            dependencies.push(dep.clone());
                        }
                    }
                    stack.extend(dependencies.iter().rev().cloned());
                    graph.nodes.insert(id.clone(), NodeKind::Derived);
                    graph.edges.insert(id, dependencies);
                },
            }
        }

        graph
    }

    pub fn root(&self) -> Option<&MetricId> {
        self.root.as_ref()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&MetricId, NodeKind)> {
        self.nodes.iter().map(|(id, kind)| (id, *kind))
    }

    pub fn kind(&self, id: &MetricId) -> Option<NodeKind> {
        self.nodes.get(id).copied()
    }

    pub fn dependencies_of(&self, id: &MetricId) -> &[MetricId] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn missing(&self) -> Vec<&MetricId> {
        self.nodes
            .iter()
            .filter(|(_, kind)| **kind == NodeKind::Missing)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// First node found on a cycle, if any
    pub fn find_cycle(&self) -> Option<MetricId> {
        let mut on_path = HashSet::new();
        let mut done = HashSet::new();
        let mut order = Vec::new();
        self.nodes
            .keys()
            .find_map(|id| self.visit(id, &mut on_path, &mut done, &mut order).err())
            .map(|CycleError(id)| id)
    }

    /// Post-order from the root: dependencies before dependents, root last
    ///
    /// Edges run from a metric to what it reads, so plain post-order is
    /// already evaluation order; reversing it would put the root first.
    pub fn topological_order(&self) -> Result<Vec<MetricId>, CycleError> {
        let mut order = Vec::with_capacity(self.nodes.len());
        if let Some(root) = &self.root {
            let mut on_path = HashSet::new();
            let mut done = HashSet::new();
            self.visit(root, &mut on_path, &mut done, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        id: &MetricId,
        on_path: &mut HashSet<MetricId>,
        done: &mut HashSet<MetricId>,
        order: &mut Vec<MetricId>,
    ) -> Result<(), CycleError> {
        if done.contains(id) {
            return Ok(());
        }
        if !on_path.insert(id.clone()) {
            return Err(CycleError(id.clone()));
        }
        for dep in self.dependencies_of(id) {
            self.visit(dep, on_path, done, order)?;
        }
        on_path.remove(id);
        done.insert(id.clone());
        order.push(id.clone());
        Ok(())
    }
}
