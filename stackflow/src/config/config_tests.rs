use super::*;
use crate::driver::ResolvedInputs;
use crate::orchestrator::FailureMode;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::time::Duration;

const FULL: &str = r#"
[environment]
application_name = "todo"
environment_name = "staging"
account_id = "123456789012"
region = "us-east-2"
hosted_zone_domain = "example.com"
application_domain = "todo.example.com"
login_page_domain_prefix = "todo-login"

[orchestrator]
state_dir = "/var/lib/stackflow"
max_concurrency = 2
failure_mode = "continue-independent"
lease_store = "memory"

[driver]
kind = "command"
program = "./scripts/apply-stack.sh"
args = ["apply", "{stack}"]
env = { AWS_PROFILE = "staging" }
timeout_seconds = 600
parallel_safe = true
"#;

const CUSTOM_STACKS: &str = r#"
[environment]
application_name = "todo"
environment_name = "staging"
account_id = "123456789012"
region = "us-east-2"

[driver]
kind = "simulated"

[[stacks]]
name = "network"
declared_outputs = ["vpcId"]
resources = [{ name = "Vpc", type = "AWS::EC2::VPC" }]
parameters = { cidr = "10.0.0.0/16" }

[[stacks]]
name = "service"
required_inputs = ["network.vpcId"]
declared_outputs = ["serviceUrl"]
parameters = { artifact = "", stackName = "custom-service" }
"#;

#[test]
fn test_full_file_parses() {
    let config = StackflowConfig::from_toml_str(FULL).unwrap();

    assert_eq!(config.environment.application_name, "todo");
    assert_eq!(config.environment.login_page_domain_prefix.as_deref(), Some("todo-login"));
    assert_eq!(config.orchestrator.state_dir, PathBuf::from("/var/lib/stackflow"));
    assert_eq!(config.orchestrator.max_concurrency, 2);
    assert_eq!(config.orchestrator.failure_mode, FailureMode::ContinueIndependent);
    assert_eq!(config.orchestrator.lease_store, LeaseStoreKind::Memory);
    assert_eq!(config.driver.kind, DriverKind::Command);
    assert_eq!(config.driver.args, vec!["apply", "{stack}"]);
    assert!(config.driver.parallel_safe);
    assert!(config.uses_builtin_catalog());
}

#[test]
fn test_defaults_when_tables_are_omitted() {
    let config = StackflowConfig::from_toml_str(
        r#"
[driver]
kind = "simulated"
"#,
    )
    .unwrap();

    assert_eq!(config.orchestrator, OrchestratorSettings::default());
    assert_eq!(config.state_dir(), Path::new(DEFAULT_STATE_DIR));
    assert_eq!(config.driver.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    assert_eq!(config.registry_path(), Path::new(".stackflow/outputs.json"));
    assert_eq!(config.journal_dir(), Path::new(".stackflow/runs"));
    assert_eq!(config.lease_dir(), Path::new(".stackflow/leases"));
}

#[test]
fn test_command_driver_requires_program() {
    let err = StackflowConfig::from_toml_str("[driver]\nkind = \"command\"\n").unwrap_err();
    assert!(err.message.contains("driver.program"), "{}", err.message);
}

#[test]
fn test_fail_stacks_rejected_for_command_driver() {
    let err = StackflowConfig::from_toml_str(
        r#"
[driver]
program = "apply.sh"
fail_stacks = { certificate = "LimitExceeded" }
"#,
    )
    .unwrap_err();
    assert!(err.message.contains("fail_stacks"));
}

#[test]
fn test_unknown_failure_mode_is_parse_error() {
    let err = StackflowConfig::from_toml_str(
        r#"
[orchestrator]
failure_mode = "retry"

[driver]
kind = "simulated"
"#,
    )
    .unwrap_err();

    assert_eq!(err.error_info.unwrap().code, "STACK-002-CONFIG_PARSE");
}

#[test]
fn test_unknown_key_is_parse_error() {
    let err = StackflowConfig::from_toml_str(
        r#"
[orchestrator]
max_concurency = 2
"#,
    )
    .unwrap_err();
    assert!(err.message.contains("max_concurency"), "{}", err.message);
}

#[test]
fn test_zero_concurrency_rejected() {
    let err = StackflowConfig::from_toml_str(
        r#"
[orchestrator]
max_concurrency = 0

[driver]
kind = "simulated"
"#,
    )
    .unwrap_err();
    assert!(err.message.contains("max_concurrency"));
}

#[test]
fn test_malformed_required_input_rejected() {
    let err = StackflowConfig::from_toml_str(
        r#"
[driver]
kind = "simulated"

[[stacks]]
name = "service"
required_inputs = ["network"]
"#,
    )
    .unwrap_err();
    assert!(err.message.contains("stack.key"), "{}", err.message);
}

#[test]
fn test_command_config_carries_settings() {
    let config = StackflowConfig::from_toml_str(FULL).unwrap();
    let command = config.driver.command_config().unwrap();

    assert_eq!(command.program, PathBuf::from("./scripts/apply-stack.sh"));
    assert_eq!(command.timeout, Duration::from_secs(600));
    assert_eq!(command.env.get("AWS_PROFILE").map(String::as_str), Some("staging"));
    assert!(command.parallel_safe);
}

#[test]
fn test_state_dir_override() {
    let mut config = StackflowConfig::from_toml_str(FULL).unwrap();
    let env = BTreeMap::from([(STATE_DIR_ENV, "/tmp/override")]);

    config.apply_overrides(|key| env.get(key).map(ToString::to_string));
    assert_eq!(config.state_dir(), Path::new("/tmp/override"));

    config.apply_overrides(|_| Some(String::new()));
    assert_eq!(config.state_dir(), Path::new("/tmp/override"));
}

#[test]
fn test_builtin_catalog_receives_artifact() {
    let config = StackflowConfig::from_toml_str(FULL).unwrap();
    let waves = config.waves(Some("1.4.2")).unwrap();

    assert_eq!(waves.stack_count(), 9);
    let service = waves.descriptor("service").unwrap();
    assert_eq!(service.parameters.get(ARTIFACT_PARAMETER).map(String::as_str), Some("1.4.2"));
}

#[test]
fn test_builtin_catalog_needs_domain_context() {
    let config = StackflowConfig::from_toml_str(
        r#"
[environment]
application_name = "todo"
environment_name = "staging"
account_id = "123456789012"
region = "us-east-2"

[driver]
kind = "simulated"
"#,
    )
    .unwrap();

    let err = config.descriptors(None).unwrap_err();
    assert!(err.message.contains("hosted_zone_domain"), "{}", err.message);
}

#[test]
fn test_explicit_stacks_get_base_parameters() {
    let config = StackflowConfig::from_toml_str(CUSTOM_STACKS).unwrap();
    let descriptors = config.descriptors(Some("abc123")).unwrap();

    let network = &descriptors[0];
    assert_eq!(network.parameters.get("cidr").map(String::as_str), Some("10.0.0.0/16"));
    assert_eq!(network.parameters.get("region").map(String::as_str), Some("us-east-2"));
    assert_eq!(
        network.parameters.get("stackName").map(String::as_str),
        Some("staging-todo-network")
    );

    let service = &descriptors[1];
    assert_eq!(service.parameters.get("stackName").map(String::as_str), Some("custom-service"));
    assert_eq!(service.parameters.get(ARTIFACT_PARAMETER).map(String::as_str), Some("abc123"));
    assert!(!network.parameters.contains_key(ARTIFACT_PARAMETER));

    let waves = config.waves(None).unwrap();
    assert_eq!(waves.waves(), &[vec!["network".to_string()], vec!["service".to_string()]]);
}

#[test]
fn test_from_file_reports_missing_path() {
    let dir = tempfile::tempdir().unwrap();
    let err = StackflowConfig::from_file(dir.path().join("missing.toml")).unwrap_err();

    assert_eq!(err.error_info.unwrap().code, "STACK-002-CONFIG_READ");
}

#[test]
fn test_from_file_prefixes_parse_errors_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stackflow.toml");
    std::fs::write(&path, "[driver\n").unwrap();

    let err = StackflowConfig::from_file(&path).unwrap_err();
    assert!(err.message.starts_with(&path.display().to_string()));
}

#[tokio::test]
async fn test_simulated_driver_applies_fail_stacks() {
    let dir = tempfile::tempdir().unwrap();
    let config = StackflowConfig::from_toml_str(
        r#"
[driver]
kind = "simulated"
fail_stacks = { certificate = "LimitExceeded" }
"#,
    )
    .unwrap()
    .with_state_dir(dir.path());

    let driver = config.build_driver().await.unwrap();
    assert_eq!(driver.name(), "simulated");

    let err = driver
        .apply(&StackDescriptor::new("certificate"), &ResolvedInputs::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, "LimitExceeded");
}

#[tokio::test]
async fn test_build_orchestrator_uses_state_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = StackflowConfig::from_toml_str(CUSTOM_STACKS)
        .unwrap()
        .with_state_dir(dir.path());

    let orchestrator = config.build_orchestrator().await.unwrap();
    let waves = config.waves(Some("abc123")).unwrap();
    let run = orchestrator.deploy(&waves, None::<&[&str]>).await.unwrap();

    assert!(run.is_success());
    assert!(config.registry_path().exists());
    assert!(config.simulated_state_path().exists());
    assert_eq!(config.journal().list().await.unwrap(), vec![run.run_id]);
    assert!(config.lease_dir().is_dir());
}
