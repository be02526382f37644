//! Fixture graphs and a deployment harness.

use std::sync::Arc;

use crate::driver::StackDriver;
use crate::events::CollectingEventSink;
use crate::graph::{DependencyGraph, OrderedWaves};
use crate::orchestrator::{InMemoryLeaseStore, Orchestrator};
use crate::registry::InMemoryOutputRegistry;
use crate::stacks::{todo_app_catalog, ApplicationEnvironment, StackDescriptor};

/// Descriptors of the minimal scenario: `service` needs `network.vpcId` and
/// `certificate.certArn`.
#[must_use]
pub fn scenario_a_descriptors() -> Vec<StackDescriptor> {
    vec![
        StackDescriptor::new("network").with_declared_output("vpcId"),
        StackDescriptor::new("certificate").with_declared_output("certArn"),
        StackDescriptor::new("service")
            .with_required_input("network", "vpcId")
            .with_required_input("certificate", "certArn")
            .with_declared_output("serviceUrl"),
    ]
}

/// Ordered waves `{certificate, network}`, `{service}`.
///
/// # Panics
///
/// Never, the fixture is a valid graph.
#[must_use]
pub fn scenario_a() -> OrderedWaves {
    DependencyGraph::build(scenario_a_descriptors()).expect("scenario A is a valid graph")
}

/// A staging environment with every optional context value set.
#[must_use]
pub fn sample_environment() -> ApplicationEnvironment {
    ApplicationEnvironment::new("todo", "staging", "123456789012", "us-east-2")
        .with_domain("example.com", "todo.example.com")
        .with_login_page_domain_prefix("todo-login")
}

/// The built-in to-do catalog for [`sample_environment`], ordered.
///
/// # Panics
///
/// Never, the catalog is a valid graph.
#[must_use]
pub fn todo_app_waves(artifact: Option<&str>) -> OrderedWaves {
    let descriptors =
        todo_app_catalog(&sample_environment(), artifact).expect("sample environment is complete");
    DependencyGraph::build(descriptors).expect("catalog is a valid graph")
}

/// `depth` levels of `width` stacks; each stack reads its own lane and the
/// lane to its left one level up.
#[must_use]
pub fn layered_descriptors(width: usize, depth: usize) -> Vec<StackDescriptor> {
    let mut descriptors = Vec::with_capacity(width * depth);
    for level in 0..depth {
        for lane in 0..width {
            let mut desc = StackDescriptor::new(format!("s-{level}-{lane}")).with_declared_output("id");
            if level > 0 {
                desc = desc.with_required_input(format!("s-{}-{lane}", level - 1), "id");
                if lane > 0 {
                    desc = desc.with_required_input(format!("s-{}-{}", level - 1, lane - 1), "id");
                }
            }
            descriptors.push(desc);
        }
    }
    descriptors
}

/// An orchestrator wired to in-memory collaborators, with handles to each.
#[derive(Debug)]
pub struct DeployHarness<D> {
    /// The driver under test.
    pub driver: Arc<D>,
    /// The output registry.
    pub registry: Arc<InMemoryOutputRegistry>,
    /// Collected events.
    pub events: Arc<CollectingEventSink>,
    /// Shared lease store.
    pub leases: Arc<InMemoryLeaseStore>,
    /// The orchestrator.
    pub orchestrator: Orchestrator,
}

impl<D: StackDriver + 'static> DeployHarness<D> {
    /// Wires `driver` to a fresh registry, event collector and lease store.
    #[must_use]
    pub fn new(driver: D) -> Self {
        let driver = Arc::new(driver);
        let registry = Arc::new(InMemoryOutputRegistry::new());
        let events = Arc::new(CollectingEventSink::new());
        let leases = Arc::new(InMemoryLeaseStore::new());
        let orchestrator = Orchestrator::new(driver.clone(), registry.clone())
            .with_event_sink(events.clone())
            .with_lease_store(leases.clone());

        Self {
            driver,
            registry,
            events,
            leases,
            orchestrator,
        }
    }

    /// Replaces the orchestrator, e.g. to change its failure mode.
    #[must_use]
    pub fn map_orchestrator(mut self, f: impl FnOnce(Orchestrator) -> Orchestrator) -> Self {
        self.orchestrator = f(self.orchestrator);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_a_waves() {
        let waves = scenario_a();
        assert_eq!(
            waves.waves(),
            &[
                vec!["certificate".to_string(), "network".to_string()],
                vec!["service".to_string()]
            ]
        );
    }

    #[test]
    fn test_layered_graph() {
        let waves = DependencyGraph::build(layered_descriptors(3, 4)).unwrap();
        assert_eq!(waves.wave_count(), 4);
        assert_eq!(waves.stack_count(), 12);
    }

    #[test]
    fn test_todo_app_waves() {
        let waves = todo_app_waves(Some("v1"));
        assert_eq!(waves.stack_count(), 9);
        assert_eq!(waves.wave_of("database"), Some(1));
        assert_eq!(waves.wave_of("service"), Some(2));
    }
}
