//! Naming conventions shared by every stack of one application environment.

use crate::errors::{ContractErrorInfo, ConfigurationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment name whose application domain is used without a prefix.
const PRODUCTION: &str = "prod";

/// The account, region and naming context stacks are deployed into.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicationEnvironment {
    /// Application name (e.g. "todo").
    pub application_name: String,
    /// Environment name (e.g. "staging", "prod").
    pub environment_name: String,
    /// Cloud account id.
    pub account_id: String,
    /// Cloud region.
    pub region: String,
    /// Hosted zone the application domain lives in.
    #[serde(default)]
    pub hosted_zone_domain: Option<String>,
    /// Application domain as configured, before environment prefixing.
    #[serde(default)]
    pub application_domain: Option<String>,
    /// Prefix of the hosted login page domain.
    #[serde(default)]
    pub login_page_domain_prefix: Option<String>,
    /// Container image repository name; defaults to the application name.
    #[serde(default)]
    pub docker_repository_name: Option<String>,
}

impl ApplicationEnvironment {
    /// Creates an environment with the required context values.
    #[must_use]
    pub fn new(
        application_name: impl Into<String>,
        environment_name: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            application_name: application_name.into(),
            environment_name: environment_name.into(),
            account_id: account_id.into(),
            region: region.into(),
            ..Self::default()
        }
    }

    /// Sets the hosted zone and application domain.
    #[must_use]
    pub fn with_domain(mut self, hosted_zone: impl Into<String>, application_domain: impl Into<String>) -> Self {
        self.hosted_zone_domain = Some(hosted_zone.into());
        self.application_domain = Some(application_domain.into());
        self
    }

    /// Sets the login page domain prefix.
    #[must_use]
    pub fn with_login_page_domain_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.login_page_domain_prefix = Some(prefix.into());
        self
    }

    /// Checks that the always-required context values are present.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] naming the first blank value.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("application_name", &self.application_name),
            ("environment_name", &self.environment_name),
            ("account_id", &self.account_id),
            ("region", &self.region),
        ] {
            if value.trim().is_empty() {
                return Err(missing(name));
            }
        }
        Ok(())
    }

    /// Prefixes a name with environment and application: `<env>-<app>-<name>`.
    #[must_use]
    pub fn prefix(&self, name: &str) -> String {
        format!("{}-{}-{}", self.environment_name, self.application_name, name)
    }

    /// Returns true for the production environment.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment_name == PRODUCTION
    }

    /// Returns the hosted zone domain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if it is not configured.
    pub fn hosted_zone_domain(&self) -> Result<&str, ConfigurationError> {
        require("hosted_zone_domain", self.hosted_zone_domain.as_deref())
    }

    /// Returns the domain the application is served on.
    ///
    /// Production uses the configured domain as is; every other environment
    /// is served from `<env>.<domain>`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if no application domain is configured.
    pub fn application_domain(&self) -> Result<String, ConfigurationError> {
        let domain = require("application_domain", self.application_domain.as_deref())?;
        if self.is_production() {
            Ok(domain.to_string())
        } else {
            Ok(format!("{}.{}", self.environment_name, domain))
        }
    }

    /// Returns the public URL of the application.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if no application domain is configured.
    pub fn application_url(&self) -> Result<String, ConfigurationError> {
        Ok(format!("https://{}", self.application_domain()?))
    }

    /// Returns the login page domain prefix.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if it is not configured.
    pub fn login_page_domain_prefix(&self) -> Result<&str, ConfigurationError> {
        require("login_page_domain_prefix", self.login_page_domain_prefix.as_deref())
    }

    /// Returns the hosted login page logout URL.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if no login page prefix is configured.
    pub fn logout_url(&self) -> Result<String, ConfigurationError> {
        Ok(format!(
            "https://{}.auth.{}.amazoncognito.com/logout",
            self.login_page_domain_prefix()?,
            self.region
        ))
    }

    /// Returns the container image repository name.
    #[must_use]
    pub fn docker_repository_name(&self) -> &str {
        self.docker_repository_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.application_name)
    }

    /// Parameters every stack receives, including its physical stack name.
    #[must_use]
    pub fn base_parameters(&self, physical_name: impl Into<String>) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("accountId".to_string(), self.account_id.clone()),
            ("region".to_string(), self.region.clone()),
            ("environmentName".to_string(), self.environment_name.clone()),
            ("applicationName".to_string(), self.application_name.clone()),
            ("stackName".to_string(), physical_name.into()),
        ])
    }
}

fn require<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str, ConfigurationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(missing(name)),
    }
}

fn missing(name: &str) -> ConfigurationError {
    ConfigurationError::new(format!("environment.{name} is required"))
        .with_error_info(
            ContractErrorInfo::new("STACK-002-MISSING_CONTEXT", format!("Missing context value '{name}'"))
                .with_fix_hint(format!("Set `{name}` in the [environment] table of the configuration.")),
        )
}
