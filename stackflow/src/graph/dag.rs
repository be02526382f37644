//! Wave ordering over the dependency graph.
//!
//! Kahn's algorithm, taking every zero in-degree stack at once so each
//! wave holds stacks with no edges between them.

use super::DependencyGraph;
use crate::errors::{ConfigurationError, ContractErrorInfo, CycleError};
use crate::stacks::StackDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// `to` consumes at least one output of `from`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The upstream stack.
    pub from: String,
    /// The dependent stack.
    pub to: String,
}

impl DependencyEdge {
    /// Creates a new edge.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A dependency graph ordered into deployment waves.
///
/// Every stack's dependencies sit in a strictly earlier wave, and stacks
/// within a wave are sorted by name.
#[derive(Debug, Clone)]
pub struct OrderedWaves {
    graph: DependencyGraph,
    waves: Vec<Vec<String>>,
    wave_index: HashMap<String, usize>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl OrderedWaves {
    pub(super) fn new(graph: DependencyGraph, waves: Vec<Vec<String>>) -> Self {
        let mut wave_index = HashMap::new();
        for (idx, wave) in waves.iter().enumerate() {
            for name in wave {
                wave_index.insert(name.clone(), idx);
            }
        }

        let mut dependencies: BTreeMap<String, BTreeSet<String>> = graph
            .descriptors
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect();
        let mut dependents = dependencies.clone();
        for edge in &graph.edges {
            if let Some(deps) = dependencies.get_mut(&edge.to) {
                deps.insert(edge.from.clone());
            }
            if let Some(children) = dependents.get_mut(&edge.from) {
                children.insert(edge.to.clone());
            }
        }

        Self {
            graph,
            waves,
            wave_index,
            dependencies,
            dependents,
        }
    }

    /// Returns the waves in deployment order.
    #[must_use]
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Returns the number of waves.
    #[must_use]
    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    /// Returns the number of stacks.
    #[must_use]
    pub fn stack_count(&self) -> usize {
        self.graph.descriptors.len()
    }

    /// Returns the stack names in deployment order.
    pub fn stack_names(&self) -> impl Iterator<Item = &str> {
        self.waves.iter().flatten().map(String::as_str)
    }

    /// Returns true if the graph defines `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.graph.descriptors.contains_key(name)
    }

    /// Returns the descriptor of a stack.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&StackDescriptor> {
        self.graph.descriptors.get(name)
    }

    /// Returns every descriptor, sorted by name.
    pub fn descriptors(&self) -> impl Iterator<Item = &StackDescriptor> {
        self.graph.descriptors.values()
    }

    /// Returns the dependency edges.
    #[must_use]
    pub fn edges(&self) -> &BTreeSet<DependencyEdge> {
        &self.graph.edges
    }

    /// Returns the wave a stack belongs to.
    #[must_use]
    pub fn wave_of(&self, name: &str) -> Option<usize> {
        self.wave_index.get(name).copied()
    }

    /// Returns the stacks `name` directly consumes outputs of.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dependencies.get(name)
    }

    /// Returns the stacks that directly consume outputs of `name`.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dependents.get(name)
    }

    /// Returns the targets plus every stack they transitively depend on.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if a target is not defined.
    pub fn upstream_closure<S: AsRef<str>>(&self, targets: &[S]) -> Result<BTreeSet<String>, ConfigurationError> {
        let unknown: Vec<String> = targets
            .iter()
            .map(AsRef::as_ref)
            .filter(|t| !self.contains(t))
            .map(str::to_string)
            .collect();
        if !unknown.is_empty() {
            return Err(ConfigurationError::new(format!(
                "Unknown target stack(s): {}",
                unknown.join(", ")
            ))
            .with_stacks(unknown)
            .with_error_info(ContractErrorInfo::new(
                "STACK-002-UNKNOWN_STACK",
                "Deployment targets must name defined stacks",
            )));
        }

        Ok(self.walk(targets.iter().map(AsRef::as_ref), &self.dependencies))
    }

    /// Returns every stack that transitively depends on `name`, excluding `name`.
    #[must_use]
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut found = self.walk(std::iter::once(name), &self.dependents);
        found.remove(name);
        found
    }

    fn walk<'a>(
        &self,
        start: impl Iterator<Item = &'a str>,
        adjacency: &BTreeMap<String, BTreeSet<String>>,
    ) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<String> = start.map(str::to_string).collect();

        while let Some(node) = queue.pop_front() {
            if !seen.insert(node.clone()) {
                continue;
            }
            if let Some(next) = adjacency.get(&node) {
                queue.extend(next.iter().filter(|n| !seen.contains(*n)).cloned());
            }
        }

        seen
    }
}

/// Computes waves with Kahn's algorithm.
pub(super) fn order_waves(
    descriptors: &BTreeMap<String, StackDescriptor>,
    edges: &BTreeSet<DependencyEdge>,
) -> Result<Vec<Vec<String>>, CycleError> {
    let mut in_degree: BTreeMap<&str, usize> = descriptors.keys().map(|n| (n.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in edges {
        if let Some(count) = in_degree.get_mut(edge.to.as_str()) {
            *count += 1;
        }
        successors.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
    }

    let mut waves = Vec::new();
    let mut placed = 0;

    while placed < descriptors.len() {
        // BTreeMap iteration keeps each wave sorted by name
        let wave: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(name, _)| *name)
            .collect();

        if wave.is_empty() {
            let remaining: Vec<String> = in_degree.keys().map(|n| (*n).to_string()).collect();
            let cycle_path = find_cycle(&remaining, descriptors);
            return Err(CycleError::new(remaining, cycle_path));
        }

        for name in &wave {
            in_degree.remove(name);
            if let Some(children) = successors.get(name) {
                for child in children {
                    if let Some(count) = in_degree.get_mut(child) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }

        placed += wave.len();
        waves.push(wave.into_iter().map(str::to_string).collect());
    }

    Ok(waves)
}

/// Finds one concrete cycle among the unplaced stacks.
fn find_cycle(remaining: &[String], descriptors: &BTreeMap<String, StackDescriptor>) -> Vec<String> {
    let remaining: HashSet<&str> = remaining.iter().map(String::as_str).collect();
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    fn dfs<'a>(
        node: &'a str,
        remaining: &HashSet<&'a str>,
        descriptors: &'a BTreeMap<String, StackDescriptor>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(desc) = descriptors.get(node) {
            for dep in desc.upstream_stacks() {
                if !remaining.contains(dep) {
                    continue;
                }
                if rec_stack.contains(dep) {
                    let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_string()).collect();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                if !visited.contains(dep) {
                    if let Some(cycle) = dfs(dep, remaining, descriptors, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }

    let mut starts: Vec<&str> = remaining.iter().copied().collect();
    starts.sort_unstable();
    for start in starts {
        if !visited.contains(start) {
            if let Some(cycle) = dfs(start, &remaining, descriptors, &mut visited, &mut rec_stack, &mut path) {
                return cycle;
            }
        }
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StackflowError;
    use pretty_assertions::assert_eq;

    fn scenario_a() -> Vec<StackDescriptor> {
        vec![
            StackDescriptor::new("service")
                .with_required_input("network", "vpcId")
                .with_required_input("certificate", "certArn")
                .with_declared_output("serviceUrl"),
            StackDescriptor::new("network").with_declared_output("vpcId"),
            StackDescriptor::new("certificate").with_declared_output("certArn"),
        ]
    }

    fn waves(list: &[&[&str]]) -> Vec<Vec<String>> {
        list.iter()
            .map(|w| w.iter().map(|s| (*s).to_string()).collect())
            .collect()
    }

    #[test]
    fn test_scenario_a_waves() {
        let ordered = DependencyGraph::build(scenario_a()).unwrap();
        assert_eq!(ordered.waves(), waves(&[&["certificate", "network"], &["service"]]).as_slice());
        assert_eq!(ordered.wave_of("service"), Some(1));
    }

    #[test]
    fn test_waves_are_deterministic() {
        let first = DependencyGraph::build(scenario_a()).unwrap();
        let mut reversed = scenario_a();
        reversed.reverse();
        let second = DependencyGraph::build(reversed).unwrap();

        assert_eq!(first.waves(), second.waves());
    }

    #[test]
    fn test_dependencies_in_strictly_earlier_wave() {
        let ordered = DependencyGraph::build(vec![
            StackDescriptor::new("a").with_declared_output("x"),
            StackDescriptor::new("b").with_required_input("a", "x").with_declared_output("y"),
            StackDescriptor::new("c").with_required_input("b", "y").with_required_input("a", "x"),
            StackDescriptor::new("d").with_declared_output("z"),
            StackDescriptor::new("e").with_required_input("d", "z"),
        ])
        .unwrap();

        for edge in ordered.edges() {
            assert!(ordered.wave_of(&edge.from).unwrap() < ordered.wave_of(&edge.to).unwrap());
        }
        assert_eq!(ordered.waves(), waves(&[&["a", "d"], &["b", "e"], &["c"]]).as_slice());
    }

    #[test]
    fn test_cycle_reported_without_partial_order() {
        let err = DependencyGraph::build(vec![
            StackDescriptor::new("root").with_declared_output("r"),
            StackDescriptor::new("a")
                .with_required_input("c", "z")
                .with_required_input("root", "r")
                .with_declared_output("x"),
            StackDescriptor::new("b").with_required_input("a", "x").with_declared_output("y"),
            StackDescriptor::new("c").with_required_input("b", "y").with_declared_output("z"),
            StackDescriptor::new("tail").with_required_input("c", "z"),
        ])
        .unwrap_err();

        let StackflowError::Cycle(cycle) = err else {
            panic!("expected a cycle error, got {err:?}");
        };
        assert_eq!(cycle.stacks, vec!["a", "b", "c", "tail"]);
        assert_eq!(cycle.cycle_path.first(), cycle.cycle_path.last());
        assert_eq!(cycle.cycle_path.len(), 4);
        assert!(!cycle.cycle_path.contains(&"root".to_string()));
    }

    #[test]
    fn test_upstream_closure() {
        let ordered = DependencyGraph::build(scenario_a()).unwrap();

        let closure = ordered.upstream_closure(&["service"]).unwrap();
        assert_eq!(closure.into_iter().collect::<Vec<_>>(), vec!["certificate", "network", "service"]);

        let closure = ordered.upstream_closure(&["network"]).unwrap();
        assert_eq!(closure.into_iter().collect::<Vec<_>>(), vec!["network"]);

        assert!(ordered.upstream_closure(&["database"]).is_err());
    }

    #[test]
    fn test_transitive_dependents() {
        let ordered = DependencyGraph::build(vec![
            StackDescriptor::new("a").with_declared_output("x"),
            StackDescriptor::new("b").with_required_input("a", "x").with_declared_output("y"),
            StackDescriptor::new("c").with_required_input("b", "y"),
            StackDescriptor::new("d"),
        ])
        .unwrap();

        assert_eq!(ordered.transitive_dependents("a").into_iter().collect::<Vec<_>>(), vec!["b", "c"]);
        assert!(ordered.transitive_dependents("d").is_empty());
        assert_eq!(ordered.dependents_of("a").unwrap().len(), 1);
        assert_eq!(ordered.dependencies_of("c").unwrap().len(), 1);
    }

    #[test]
    fn test_stack_names_follow_wave_order() {
        let ordered = DependencyGraph::build(scenario_a()).unwrap();
        assert_eq!(ordered.stack_names().collect::<Vec<_>>(), vec!["certificate", "network", "service"]);
        assert_eq!(ordered.stack_count(), 3);
        assert_eq!(ordered.wave_count(), 2);
    }
}
