//! Declarative stack definitions.

use crate::errors::{ConfigurationError, CycleError, StackflowError};
use crate::utils::{validate_output_key, validate_stack_name};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// An output of an upstream stack that a stack needs before it can apply.
///
/// Written `stack.key` in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequiredInput {
    /// The upstream stack name.
    pub stack: String,
    /// The output key published by the upstream stack.
    pub key: String,
}

impl RequiredInput {
    /// Creates a new required input.
    #[must_use]
    pub fn new(stack: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for RequiredInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stack, self.key)
    }
}

impl FromStr for RequiredInput {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((stack, key)) if !stack.is_empty() && !key.is_empty() => Ok(Self::new(stack, key)),
            _ => Err(ConfigurationError::new(format!(
                "Required input '{s}' must be written as 'stack.key'"
            ))),
        }
    }
}

impl TryFrom<String> for RequiredInput {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RequiredInput> for String {
    fn from(input: RequiredInput) -> Self {
        input.to_string()
    }
}

/// A cloud resource owned by a stack. Opaque beyond its name and type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Logical resource name.
    pub name: String,
    /// Provider resource type (e.g. `AWS::EC2::VPC`).
    #[serde(rename = "type")]
    pub resource_type: String,
}

impl ResourceSpec {
    /// Creates a new resource spec.
    #[must_use]
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
        }
    }
}

/// Declarative definition of one deployable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescriptor {
    /// Unique stack name.
    pub name: String,
    /// Upstream outputs this stack consumes.
    #[serde(default)]
    pub required_inputs: BTreeSet<RequiredInput>,
    /// Output keys this stack promises to publish on success.
    #[serde(default)]
    pub declared_outputs: BTreeSet<String>,
    /// Resources owned by the stack.
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    /// Static parameters handed to the driver alongside resolved inputs.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl StackDescriptor {
    /// Creates a descriptor with no inputs or outputs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_inputs: BTreeSet::new(),
            declared_outputs: BTreeSet::new(),
            resources: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Adds a required input.
    #[must_use]
    pub fn with_required_input(mut self, stack: impl Into<String>, key: impl Into<String>) -> Self {
        self.required_inputs.insert(RequiredInput::new(stack, key));
        self
    }

    /// Adds a declared output key.
    #[must_use]
    pub fn with_declared_output(mut self, key: impl Into<String>) -> Self {
        self.declared_outputs.insert(key.into());
        self
    }

    /// Adds several declared output keys.
    #[must_use]
    pub fn with_declared_outputs(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.declared_outputs.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Adds an owned resource.
    #[must_use]
    pub fn with_resource(mut self, name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        self.resources.push(ResourceSpec::new(name, resource_type));
        self
    }

    /// Sets a static parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns the distinct upstream stacks this stack depends on.
    #[must_use]
    pub fn upstream_stacks(&self) -> BTreeSet<&str> {
        self.required_inputs.iter().map(|i| i.stack.as_str()).collect()
    }

    /// Validates the descriptor in isolation.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed names or keys, and a
    /// [`CycleError`] if the stack requires one of its own outputs.
    pub fn validate(&self) -> Result<(), StackflowError> {
        validate_stack_name(&self.name)?;

        for key in &self.declared_outputs {
            validate_output_key(&self.name, key)?;
        }

        for input in &self.required_inputs {
            if input.stack == self.name {
                return Err(CycleError::new(
                    vec![self.name.clone()],
                    vec![self.name.clone(), self.name.clone()],
                )
                .into());
            }
            validate_output_key(&input.stack, &input.key)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_creation() {
        let desc = StackDescriptor::new("service")
            .with_required_input("network", "vpcId")
            .with_required_input("network", "loadBalancerArn")
            .with_required_input("certificate", "sslCertArn")
            .with_declared_output("serviceUrl")
            .with_resource("Service", "AWS::ECS::Service")
            .with_parameter("region", "us-east-2");

        assert_eq!(desc.required_inputs.len(), 3);
        assert_eq!(
            desc.upstream_stacks().into_iter().collect::<Vec<_>>(),
            vec!["certificate", "network"]
        );
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let desc = StackDescriptor::new("network")
            .with_declared_output("vpcId")
            .with_required_input("network", "vpcId");

        assert!(matches!(desc.validate(), Err(StackflowError::Cycle(_))));
    }

    #[test]
    fn test_invalid_output_key_rejected() {
        let desc = StackDescriptor::new("network").with_declared_output("vpc id");
        assert!(matches!(desc.validate(), Err(StackflowError::Configuration(_))));
    }

    #[test]
    fn test_required_input_parse() {
        let input: RequiredInput = "network.vpcId".parse().unwrap();
        assert_eq!(input, RequiredInput::new("network", "vpcId"));
        assert_eq!(input.to_string(), "network.vpcId");

        assert!("network".parse::<RequiredInput>().is_err());
        assert!(".vpcId".parse::<RequiredInput>().is_err());
        assert!("network.".parse::<RequiredInput>().is_err());
    }

    #[test]
    fn test_descriptor_deserializes_from_toml() {
        let desc: StackDescriptor = toml::from_str(
            r#"
            name = "domain"
            required_inputs = ["network.loadBalancerArn"]
            declared_outputs = ["hostedZoneId"]
            resources = [{ name = "ARecord", type = "AWS::Route53::RecordSet" }]
            parameters = { recordName = "todo.example.com" }
            "#,
        )
        .unwrap();

        assert_eq!(desc.name, "domain");
        assert!(desc
            .required_inputs
            .contains(&RequiredInput::new("network", "loadBalancerArn")));
        assert_eq!(desc.resources[0].resource_type, "AWS::Route53::RecordSet");
        assert_eq!(desc.parameters.get("recordName").map(String::as_str), Some("todo.example.com"));
    }
}
