//! Error types for the action model and config graph.

use crate::action::ActionRef;
use thiserror::Error;

/// Failure to parse a kind or action reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Not one of the four kinds
    #[error("Unknown action kind: {0}")]
    UnknownKind(String),

    /// Not of the form `<kind>.<name>`
    #[error("Invalid action reference \"{0}\" (expected <kind>.<name>)")]
    InvalidReference(String),
}

/// A declared action failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {action}: {reason}")]
pub struct ValidationError {
    /// Action that failed
    pub action: ActionRef,
    /// What was wrong
    pub reason: String,
}

impl ValidationError {
    /// Create a new validation error.
    pub fn new(action: ActionRef, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
        }
    }
}

/// Template rendering failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The referenced variable isn't defined
    #[error("Could not find variable \"{0}\"")]
    MissingVariable(String),
}

/// Failure to resolve a declared action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A dependency isn't declared
    #[error("{action} depends on {dependency}, which could not be found")]
    MissingDependency {
        /// Action declaring the dependency
        action: ActionRef,
        /// The missing dependency
        dependency: ActionRef,
    },

    /// The action's spec references a missing variable
    #[error("Failed resolving templates for {action}: {source}")]
    Template {
        /// Action being resolved
        action: ActionRef,
        /// Rendering failure
        #[source]
        source: TemplateError,
    },
}

/// Config graph construction or query failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An action failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An action couldn't be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Two actions share a kind and name
    #[error("Found two actions of the same name and kind: {0}")]
    DuplicateAction(ActionRef),

    /// Dependencies form a cycle; the path in dependency order
    #[error("Detected circular dependencies between actions: {}", format_cycle(.0))]
    Cycle(Vec<ActionRef>),

    /// No action with this reference
    #[error("Could not find {} action {}", .0.kind, .0.name)]
    NotFound(ActionRef),
}

fn format_cycle(cycle: &[ActionRef]) -> String {
    cycle
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" <- ")
}
