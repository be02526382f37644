//! Validation of stack names and output keys.

use crate::errors::{ContractErrorInfo, ConfigurationError};
use regex::Regex;
use std::sync::OnceLock;

/// Reserved word meaning "every stack" on the command line.
pub const ALL_STACKS: &str = "all";

fn stack_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9-]*$").expect("stack name pattern is a valid regex")
    })
}

fn output_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_.-]*$").expect("output key pattern is a valid regex")
    })
}

/// Returns true if `name` is a usable stack name.
#[must_use]
pub fn is_valid_stack_name(name: &str) -> bool {
    name != ALL_STACKS && stack_name_pattern().is_match(name)
}

/// Returns true if `key` is a usable output key.
#[must_use]
pub fn is_valid_output_key(key: &str) -> bool {
    output_key_pattern().is_match(key)
}

/// Validates a stack name.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if the name is empty, reserved, or
/// contains characters other than lowercase letters, digits and dashes.
pub fn validate_stack_name(name: &str) -> Result<(), ConfigurationError> {
    if is_valid_stack_name(name) {
        return Ok(());
    }
    Err(ConfigurationError::new(format!(
        "Invalid stack name '{name}': expected lowercase letters, digits and dashes, not '{ALL_STACKS}'"
    ))
    .with_stacks(vec![name.to_string()])
    .with_error_info(ContractErrorInfo::new(
        "STACK-002-INVALID_NAME",
        format!("Stack name '{name}' is not allowed"),
    )))
}

/// Validates an output key declared by or required from `stack`.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if the key is malformed.
pub fn validate_output_key(stack: &str, key: &str) -> Result<(), ConfigurationError> {
    if is_valid_output_key(key) {
        return Ok(());
    }
    Err(ConfigurationError::new(format!(
        "Invalid output key '{key}' on stack '{stack}'"
    ))
    .with_stacks(vec![stack.to_string()])
    .with_error_info(
        ContractErrorInfo::new("STACK-002-INVALID_KEY", format!("Output key '{key}' is not allowed"))
            .with_context_entry("stack", stack),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_names() {
        assert!(is_valid_stack_name("network"));
        assert!(is_valid_stack_name("docker-repository"));
        assert!(!is_valid_stack_name(""));
        assert!(!is_valid_stack_name("all"));
        assert!(!is_valid_stack_name("Network"));
        assert!(!is_valid_stack_name("1net"));
        assert!(!is_valid_stack_name("net work"));
    }

    #[test]
    fn test_output_keys() {
        assert!(is_valid_output_key("vpcId"));
        assert!(is_valid_output_key("load_balancer.arn"));
        assert!(!is_valid_output_key(""));
        assert!(!is_valid_output_key("9lives"));
        assert!(!is_valid_output_key("has space"));
    }

    #[test]
    fn test_validate_stack_name_error_code() {
        let err = validate_stack_name("all").unwrap_err();
        assert_eq!(err.error_info.unwrap().code, "STACK-002-INVALID_NAME");
    }

    #[test]
    fn test_validate_output_key_names_stack() {
        let err = validate_output_key("network", "bad key").unwrap_err();
        assert_eq!(err.stacks, vec!["network".to_string()]);
    }
}
