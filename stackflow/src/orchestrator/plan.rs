//! Target selection and dry-run planning.

use crate::errors::ConfigurationError;
use crate::graph::OrderedWaves;
use crate::utils::validation::ALL_STACKS;
use serde::Serialize;
use std::collections::BTreeSet;

/// One stack in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStack {
    /// Stack name.
    pub name: String,
    /// Whether the run would apply it.
    pub selected: bool,
    /// Direct upstream stacks.
    pub depends_on: Vec<String>,
}

/// The stacks a deployment would apply, wave by wave. No driver is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    /// Requested targets; `None` means every stack.
    pub targets: Option<Vec<String>>,
    /// Waves in deployment order.
    pub waves: Vec<Vec<PlannedStack>>,
}

impl DeploymentPlan {
    /// Plans a deployment of `targets` (or everything) over `waves`.
    ///
    /// An empty target list or the word `all` selects every stack.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if a target names an unknown stack.
    pub fn new<S: AsRef<str>>(waves: &OrderedWaves, targets: Option<&[S]>) -> Result<Self, ConfigurationError> {
        let targets: Option<Vec<String>> = targets
            .filter(|t| !t.is_empty() && !t.iter().any(|s| s.as_ref() == ALL_STACKS))
            .map(|t| t.iter().map(|s| s.as_ref().to_string()).collect());

        let selected: BTreeSet<String> = match targets {
            Some(ref t) => waves.upstream_closure(t)?,
            None => waves.stack_names().map(str::to_string).collect(),
        };

        let planned = waves
            .waves()
            .iter()
            .map(|wave| {
                wave.iter()
                    .map(|name| PlannedStack {
                        name: name.clone(),
                        selected: selected.contains(name),
                        depends_on: waves
                            .dependencies_of(name)
                            .map(|deps| deps.iter().cloned().collect())
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            targets,
            waves: planned,
        })
    }

    /// Returns the names of the stacks the run would apply, in wave order.
    #[must_use]
    pub fn selected(&self) -> Vec<String> {
        self.waves
            .iter()
            .flatten()
            .filter(|s| s.selected)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Returns true if the stack would be applied.
    #[must_use]
    pub fn is_selected(&self, stack: &str) -> bool {
        self.waves.iter().flatten().any(|s| s.selected && s.name == stack)
    }

    /// Returns the names of the stacks outside the selection.
    #[must_use]
    pub fn not_targeted(&self) -> Vec<String> {
        self.waves
            .iter()
            .flatten()
            .filter(|s| !s.selected)
            .map(|s| s.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::scenario_a;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plan_everything() {
        let waves = scenario_a();
        let plan = DeploymentPlan::new::<&str>(&waves, None).unwrap();

        assert_eq!(plan.selected(), vec!["certificate", "network", "service"]);
        assert!(plan.not_targeted().is_empty());
        assert_eq!(plan.waves[1][0].depends_on, vec!["certificate", "network"]);
    }

    #[test]
    fn test_all_keyword_selects_everything() {
        let waves = scenario_a();
        let plan = DeploymentPlan::new(&waves, Some(&["all"][..])).unwrap();

        assert!(plan.targets.is_none());
        assert_eq!(plan.selected().len(), 3);
    }

    #[test]
    fn test_targets_pull_in_upstream() {
        let waves = scenario_a();

        let plan = DeploymentPlan::new(&waves, Some(&["network"][..])).unwrap();
        assert_eq!(plan.selected(), vec!["network"]);
        assert_eq!(plan.not_targeted(), vec!["certificate", "service"]);

        let plan = DeploymentPlan::new(&waves, Some(&["service"][..])).unwrap();
        assert_eq!(plan.selected(), vec!["certificate", "network", "service"]);
    }

    #[test]
    fn test_unknown_target() {
        let waves = scenario_a();
        let err = DeploymentPlan::new(&waves, Some(&["database"][..])).unwrap_err();
        assert_eq!(err.stacks, vec!["database".to_string()]);
    }
}
