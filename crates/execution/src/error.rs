//! Error types for selection, dispatch and runs.

use serde_json::Value;
use stagehand_core::{ActionKind, ActionRef, GraphError, Operation};
use stagehand_plugins::RegistryError;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Extra context attached to selection errors for the caller to report.
pub type ErrorDetail = BTreeMap<String, Value>;

/// Requested actions could not be found.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct NotFoundError {
    /// Kind that was searched
    pub kind: ActionKind,

    /// User-facing message
    pub message: String,

    /// The tokens that found nothing
    pub missing: Vec<String>,

    /// Caller-supplied context
    pub detail: ErrorDetail,
}

impl NotFoundError {
    /// An exact name didn't match any action.
    pub fn missing_action(kind: ActionKind, name: &str, detail: ErrorDetail) -> Self {
        Self {
            kind,
            message: format!("{kind} action \"{name}\" was not found."),
            missing: vec![name.to_string()],
            detail,
        }
    }

    /// No wildcard matched anything.
    pub fn no_matches(kind: ActionKind, patterns: Vec<String>, detail: ErrorDetail) -> Self {
        let arguments = patterns
            .iter()
            .map(|p| format!("'{p}'"))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            kind,
            message: format!("No {kind} actions were found (matching argument(s) {arguments})."),
            missing: patterns,
            detail,
        }
    }
}

/// Failure dispatching an operation to a handler.
#[derive(Debug, Error)]
pub enum RouterError {
    /// No handler is registered for the operation
    #[error("No provider implements the {} operation for {action} (type '{action_type}')", .operation.handler_name(.action.kind))]
    HandlerNotFound {
        /// Target action
        action: ActionRef,
        /// Provider type of the action
        action_type: String,
        /// Requested operation
        operation: Operation,
    },

    /// The handler didn't finish within the action's timeout
    #[error("Timed out after {} seconds waiting for {} of {action}", .timeout.as_secs(), .operation.handler_name(.action.kind))]
    Timeout {
        /// Target action
        action: ActionRef,
        /// Requested operation
        operation: Operation,
        /// The limit that was hit
        timeout: Duration,
    },

    /// The handler returned an error
    #[error("{} failed for {action}: {source}", .operation.handler_name(.action.kind))]
    HandlerFailed {
        /// Target action
        action: ActionRef,
        /// Requested operation
        operation: Operation,
        /// Provider error
        #[source]
        source: anyhow::Error,
    },

    /// A kind-scoped router was given an action of another kind
    #[error("Expected a {expected} action, got {action}")]
    KindMismatch {
        /// Kind the router accepts
        expected: ActionKind,
        /// The action it got
        action: ActionRef,
    },
}

impl RouterError {
    /// The action the failed operation targeted.
    pub fn action(&self) -> &ActionRef {
        match self {
            Self::HandlerNotFound { action, .. }
            | Self::Timeout { action, .. }
            | Self::HandlerFailed { action, .. }
            | Self::KindMismatch { action, .. } => action,
        }
    }
}

/// A run couldn't start.
#[derive(Debug, Error)]
pub enum RunError {
    /// Requested actions couldn't be resolved in the graph
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A required handler is missing
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
