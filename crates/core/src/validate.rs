//! Declared action validation.
//!
//! Full schema validation belongs to the configuration layer; the graph only
//! needs a [`ConfigValidator`] it can call before resolving an action.

use crate::action::{ActionInfo, DeclaredAction};
use crate::error::ValidationError;

const MAX_NAME_LENGTH: usize = 63;

/// Validates a declared action before it enters the graph.
pub trait ConfigValidator: Send + Sync {
    /// Return the (possibly normalized) action, or why it's invalid.
    fn validate(&self, action: DeclaredAction) -> Result<DeclaredAction, ValidationError>;
}

/// Structural checks every action must pass.
///
/// - names are identifiers: lowercase letter first, then lowercase
///   alphanumerics separated by single dashes, at most 63 characters
/// - the provider type is non-empty
/// - the timeout, when set, is at least one second
/// - an action doesn't depend on itself
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new validator.
    pub fn new() -> Self {
        Self
    }
}

impl ConfigValidator for BasicValidator {
    fn validate(&self, action: DeclaredAction) -> Result<DeclaredAction, ValidationError> {
        let fail = |reason: String| -> Result<DeclaredAction, ValidationError> {
            Err(ValidationError::new(action.reference(), reason))
        };

        if let Err(reason) = check_identifier(&action.name) {
            return fail(format!("name \"{}\" {}", action.name, reason));
        }

        if action.action_type.trim().is_empty() {
            return fail("type must not be empty".to_string());
        }

        if action.timeout == Some(0) {
            return fail("timeout must be at least 1 second".to_string());
        }

        if action.dependencies.contains(&action.reference()) {
            return fail("an action cannot depend on itself".to_string());
        }

        Ok(action)
    }
}

fn check_identifier(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("must not be empty");
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err("must be at most 63 characters long");
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err("must start with a lowercase letter");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("may only contain lowercase letters, digits and dashes");
    }
    if name.ends_with('-') || name.contains("--") {
        return Err("must not end with a dash or contain consecutive dashes");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, ActionRef};

    fn validate(action: DeclaredAction) -> Result<DeclaredAction, ValidationError> {
        BasicValidator::new().validate(action)
    }

    #[test]
    fn test_valid_action_passes() {
        let action = DeclaredAction::new(ActionKind::Build, "api-v2", "container").with_timeout(1);
        assert_eq!(validate(action.clone()).unwrap(), action);
    }

    #[test]
    fn test_invalid_names() {
        let too_long = "a".repeat(64);
        for name in ["", "Api", "1api", "api-", "a--b", "a_b", too_long.as_str()] {
            let action = DeclaredAction::new(ActionKind::Build, name, "container");
            assert!(validate(action).is_err(), "expected {name:?} to be rejected");
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = validate(DeclaredAction::new(ActionKind::Deploy, "api", "exec").with_timeout(0))
            .unwrap_err();
        assert!(err.reason.contains("timeout"));
        assert_eq!(err.action, ActionRef::new(ActionKind::Deploy, "api"));
    }

    #[test]
    fn test_empty_type_rejected() {
        assert!(validate(DeclaredAction::new(ActionKind::Run, "task", " ")).is_err());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let action = DeclaredAction::new(ActionKind::Run, "task", "exec")
            .with_dependency(ActionRef::new(ActionKind::Run, "task"));
        let err = validate(action).unwrap_err();
        assert!(err.to_string().contains("itself"));
    }
}
