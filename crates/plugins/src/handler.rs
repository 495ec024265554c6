//! Handler abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stagehand_core::{ActionKind, ConfigGraph, HandlerResult, LogSink, Operation, ResolvedAction};

/// Everything a handler gets to work with.
#[derive(Clone, Copy)]
pub struct HandlerParams<'a> {
    /// The action to operate on
    pub action: &'a ResolvedAction,

    /// The run's config graph
    pub graph: &'a ConfigGraph,

    /// Where to write user-facing lines
    pub log: &'a dyn LogSink,
}

/// Implements one operation for one kind of action of one provider type.
///
/// Provider errors are opaque to the engine; return them as `anyhow` errors
/// and the router wraps them with the action and operation.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Perform the operation.
    async fn handle(&self, params: HandlerParams<'_>) -> anyhow::Result<HandlerResult>;
}

/// Registry key: which kind, which provider type, which operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandlerKey {
    /// Action kind
    pub kind: ActionKind,

    /// Provider type
    pub action_type: String,

    /// Operation
    pub operation: Operation,
}

impl HandlerKey {
    /// Create a new key.
    pub fn new(kind: ActionKind, action_type: impl Into<String>, operation: Operation) -> Self {
        Self {
            kind,
            action_type: action_type.into(),
            operation,
        }
    }
}

impl std::fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} handler for {} actions of type '{}'",
            self.operation.handler_name(self.kind),
            self.kind,
            self.action_type
        )
    }
}
