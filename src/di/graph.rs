//! Dependency graph between registered services.
//!
//! Nodes are [`ServiceKey`]s; an edge `A -> B` means building `A` requires
//! `B`. A dependency on every named binding of an interface fans out to each
//! named node currently known for that interface.

use crate::di::{Dependency, DependencyKind, ServiceId, ServiceKey};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    /// On the current DFS path
    Gray,
    /// Fully explored, known to be acyclic
    Black,
}

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    nodes: HashMap<ServiceKey, Vec<Dependency>>,
    named: HashMap<ServiceId, BTreeSet<ServiceKey>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` with its outgoing dependencies, returning the edges it
    /// replaced.
    pub fn insert_node(&mut self, key: ServiceKey, dependencies: Vec<Dependency>) -> Option<Vec<Dependency>> {
        if key.name().is_some() {
            self.named.entry(key.id()).or_default().insert(key.clone());
        }
        self.nodes.insert(key, dependencies)
    }

    pub fn remove_node(&mut self, key: &ServiceKey) -> Option<Vec<Dependency>> {
        if key.name().is_some() {
            if let Some(names) = self.named.get_mut(&key.id()) {
                names.remove(key);
                if names.is_empty() {
                    self.named.remove(&key.id());
                }
            }
        }
        self.nodes.remove(key)
    }

    /// Add an edge. Adding the same edge twice leaves a single edge.
    pub fn add_dependency(&mut self, dependent: &ServiceKey, dependency: Dependency) {
        if !self.nodes.contains_key(dependent) {
            self.insert_node(dependent.clone(), Vec::new());
        }
        if let Some(edges) = self.nodes.get_mut(dependent) {
            if !edges.contains(&dependency) {
                edges.push(dependency);
            }
        }
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dependencies_of(&self, key: &ServiceKey) -> &[Dependency] {
        self.nodes.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the graph contains any cycle. Linear in nodes plus edges.
    pub fn detect_cycles(&self) -> bool {
        self.find_any_cycle().is_some()
    }

    /// The first cycle found anywhere in the graph.
    pub fn find_any_cycle(&self) -> Option<Vec<ServiceKey>> {
        let mut search = CycleSearch::new(self);
        for key in self.nodes.keys() {
            if !search.colors.contains_key(key) {
                if let Some(cycle) = search.visit(key) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// The cycle reachable from `start`, listed in encounter order with the
    /// closing member repeated at the end.
    pub fn find_cycle_from(&self, start: &ServiceKey) -> Option<Vec<ServiceKey>> {
        CycleSearch::new(self).visit(start)
    }

    /// Required edges whose target is not a node, as `(dependent, dependency)`.
    pub fn missing_dependencies(&self) -> Vec<(ServiceKey, ServiceKey)> {
        let mut missing = Vec::new();
        for (key, dependencies) in &self.nodes {
            for dependency in dependencies {
                if dependency.kind() == DependencyKind::Required && !self.nodes.contains_key(dependency.key()) {
                    missing.push((key.clone(), dependency.key().clone()));
                }
            }
        }
        missing.sort_by_key(|(dependent, dependency)| (dependent.to_string(), dependency.to_string()));
        missing
    }

    /// Whether any key in `targets` is reachable from `start` by following
    /// at least one edge.
    ///
    /// A named target also counts as reached by any `AllNamed` edge on its
    /// interface, even when that name is not a node of the graph.
    pub fn reaches_any(&self, start: &ServiceKey, targets: &HashSet<ServiceKey>) -> bool {
        if targets.is_empty() {
            return false;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![start.clone()];
        while let Some(key) = stack.pop() {
            let collects_target = self.dependencies_of(&key).iter().any(|dependency| {
                dependency.kind() == DependencyKind::AllNamed
                    && targets
                        .iter()
                        .any(|target| target.name().is_some() && target.id() == dependency.key().id())
            });
            if collects_target {
                return true;
            }

            for next in self.successors(&key) {
                if targets.contains(&next) {
                    return true;
                }
                if visited.insert(next.clone()) {
                    stack.push(next);
                }
            }
        }
        false
    }

    fn successors(&self, key: &ServiceKey) -> Vec<ServiceKey> {
        let mut successors = Vec::new();
        for dependency in self.dependencies_of(key) {
            match dependency.kind() {
                DependencyKind::Required | DependencyKind::Optional => successors.push(dependency.key().clone()),
                DependencyKind::AllNamed => {
                    if let Some(names) = self.named.get(&dependency.key().id()) {
                        successors.extend(names.iter().cloned());
                    }
                }
            }
        }
        successors
    }
}

/// Three-color depth-first search
struct CycleSearch<'a> {
    graph: &'a DependencyGraph,
    colors: HashMap<ServiceKey, Color>,
    path: Vec<ServiceKey>,
}

impl<'a> CycleSearch<'a> {
    fn new(graph: &'a DependencyGraph) -> Self {
        Self {
            graph,
            colors: HashMap::new(),
            path: Vec::new(),
        }
    }

    fn visit(&mut self, key: &ServiceKey) -> Option<Vec<ServiceKey>> {
        self.colors.insert(key.clone(), Color::Gray);
        self.path.push(key.clone());

        for next in self.graph.successors(key) {
            match self.colors.get(&next) {
                Some(Color::Gray) => {
                    let start = self.path.iter().position(|k| *k == next).unwrap_or(0);
                    let mut cycle = self.path[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Some(Color::Black) => {}
                None => {
                    if let Some(cycle) = self.visit(&next) {
                        return Some(cycle);
                    }
                }
            }
        }

        self.path.pop();
        self.colors.insert(key.clone(), Color::Black);
        None
    }
}
