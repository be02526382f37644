//! Graph construction and validation.

use super::dag::{order_waves, DependencyEdge, OrderedWaves};
use crate::errors::{ConfigurationError, ContractErrorInfo, StackflowError};
use crate::stacks::StackDescriptor;
use std::collections::{BTreeMap, BTreeSet};

/// A validated set of stack descriptors and the edges between them.
///
/// Descriptors are immutable once the graph is built.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub(crate) descriptors: BTreeMap<String, StackDescriptor>,
    pub(crate) edges: BTreeSet<DependencyEdge>,
}

impl DependencyGraph {
    /// Validates descriptors and derives their dependency edges.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty set, duplicate or malformed
    /// names, inputs naming unknown stacks or undeclared outputs, and a cycle
    /// error for self references.
    pub fn new(descriptors: impl IntoIterator<Item = StackDescriptor>) -> Result<Self, StackflowError> {
        let mut by_name = BTreeMap::new();

        for desc in descriptors {
            desc.validate()?;
            if by_name.contains_key(&desc.name) {
                return Err(ConfigurationError::new(format!("Stack '{}' is defined twice", desc.name))
                    .with_stacks(vec![desc.name.clone()])
                    .with_error_info(ContractErrorInfo::new(
                        "STACK-002-DUPLICATE",
                        format!("Duplicate stack '{}'", desc.name),
                    ))
                    .into());
            }
            by_name.insert(desc.name.clone(), desc);
        }

        if by_name.is_empty() {
            return Err(ConfigurationError::new("No stacks defined")
                .with_error_info(
                    ContractErrorInfo::new("STACK-002-EMPTY", "Cannot build an empty dependency graph")
                        .with_fix_hint("Define at least one stack before deploying."),
                )
                .into());
        }

        let mut edges = BTreeSet::new();
        for desc in by_name.values() {
            for input in &desc.required_inputs {
                let Some(upstream) = by_name.get(&input.stack) else {
                    return Err(ConfigurationError::new(format!(
                        "Stack '{}' requires '{}' but stack '{}' is not defined",
                        desc.name, input, input.stack
                    ))
                    .with_stacks(vec![desc.name.clone(), input.stack.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "STACK-002-UNKNOWN_STACK",
                            format!("Dependency '{}' not found", input.stack),
                        )
                        .with_fix_hint("Ensure every required input names a defined stack."),
                    )
                    .into());
                };

                if !upstream.declared_outputs.contains(&input.key) {
                    return Err(ConfigurationError::new(format!(
                        "Stack '{}' requires '{}' but '{}' does not declare output '{}'",
                        desc.name, input, input.stack, input.key
                    ))
                    .with_stacks(vec![desc.name.clone(), input.stack.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "STACK-002-UNKNOWN_OUTPUT",
                            format!("Output '{input}' is not declared"),
                        )
                        .with_context_entry("declared", upstream.declared_outputs.iter().cloned().collect::<Vec<_>>().join(",")),
                    )
                    .into());
                }

                edges.insert(DependencyEdge::new(&input.stack, &desc.name));
            }
        }

        Ok(Self {
            descriptors: by_name,
            edges,
        })
    }

    /// Validates descriptors and orders them into deployment waves.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed descriptors and a cycle
    /// error if the edges do not form a DAG.
    pub fn build(descriptors: impl IntoIterator<Item = StackDescriptor>) -> Result<OrderedWaves, StackflowError> {
        Self::new(descriptors)?.into_waves()
    }

    /// Orders the graph into waves.
    ///
    /// # Errors
    ///
    /// Returns a cycle error if the edges do not form a DAG.
    pub fn into_waves(self) -> Result<OrderedWaves, StackflowError> {
        let waves = order_waves(&self.descriptors, &self.edges)?;
        Ok(OrderedWaves::new(self, waves))
    }

    /// Returns the number of stacks.
    #[must_use]
    pub fn stack_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns the dependency edges.
    #[must_use]
    pub fn edges(&self) -> &BTreeSet<DependencyEdge> {
        &self.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_graph_rejected() {
        let err = DependencyGraph::new(Vec::new()).unwrap_err();
        assert!(matches!(err, StackflowError::Configuration(_)));
        assert_eq!(err.error_info().unwrap().code, "STACK-002-EMPTY");
    }

    #[test]
    fn test_duplicate_stack_rejected() {
        let err = DependencyGraph::new(vec![
            StackDescriptor::new("network"),
            StackDescriptor::new("network"),
        ])
        .unwrap_err();
        assert_eq!(err.error_info().unwrap().code, "STACK-002-DUPLICATE");
    }

    #[test]
    fn test_unknown_upstream_rejected() {
        let err = DependencyGraph::new(vec![
            StackDescriptor::new("service").with_required_input("network", "vpcId"),
        ])
        .unwrap_err();
        assert_eq!(err.error_info().unwrap().code, "STACK-002-UNKNOWN_STACK");
    }

    #[test]
    fn test_undeclared_output_rejected() {
        let err = DependencyGraph::new(vec![
            StackDescriptor::new("network").with_declared_output("vpcId"),
            StackDescriptor::new("service").with_required_input("network", "subnetIds"),
        ])
        .unwrap_err();
        assert_eq!(err.error_info().unwrap().code, "STACK-002-UNKNOWN_OUTPUT");
    }

    #[test]
    fn test_edges_deduplicated_per_stack_pair() {
        let graph = DependencyGraph::new(vec![
            StackDescriptor::new("network").with_declared_outputs(["vpcId", "subnetIds"]),
            StackDescriptor::new("service")
                .with_required_input("network", "vpcId")
                .with_required_input("network", "subnetIds"),
        ])
        .unwrap();

        assert_eq!(graph.stack_count(), 2);
        assert_eq!(graph.edges().len(), 1);
        assert!(graph.edges().contains(&DependencyEdge::new("network", "service")));
    }
}
