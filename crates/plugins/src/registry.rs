//! Handler registry.

use crate::handler::{ActionHandler, HandlerKey};
use stagehand_core::{ActionInfo, ActionKind, ConfigGraph, Operation};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Error type for handler registration and verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The kind doesn't have this operation
    #[error("{kind} actions don't support the {operation} operation")]
    UnsupportedOperation {
        /// Action kind
        kind: ActionKind,
        /// Rejected operation
        operation: Operation,
    },

    /// Key registered twice
    #[error("A {0} is already registered")]
    Duplicate(HandlerKey),

    /// Keys without a handler
    #[error("No provider implements: {}", format_keys(.0))]
    Missing(Vec<HandlerKey>),
}

fn format_keys(keys: &[HandlerKey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Typed table of handlers keyed by (kind, provider type, operation).
///
/// Populated at startup and read-only while a run is in progress.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    pub fn register<H: ActionHandler + 'static>(
        &mut self,
        kind: ActionKind,
        action_type: &str,
        operation: Operation,
        handler: H,
    ) -> Result<&mut Self, RegistryError> {
        self.register_arc(kind, action_type, operation, Arc::new(handler))
    }

    /// Register a handler (Arc version for handlers shared across keys).
    pub fn register_arc(
        &mut self,
        kind: ActionKind,
        action_type: &str,
        operation: Operation,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<&mut Self, RegistryError> {
        if !operation.is_supported_by(kind) {
            return Err(RegistryError::UnsupportedOperation { kind, operation });
        }

        let key = HandlerKey::new(kind, action_type, operation);
        if self.handlers.contains_key(&key) {
            return Err(RegistryError::Duplicate(key));
        }

        tracing::debug!("Registered {}", key);
        self.handlers.insert(key, handler);
        Ok(self)
    }

    /// Find the handler for an operation on a kind/type.
    pub fn lookup(
        &self,
        kind: ActionKind,
        action_type: &str,
        operation: Operation,
    ) -> Option<Arc<dyn ActionHandler>> {
        self.handlers
            .get(&HandlerKey::new(kind, action_type, operation))
            .cloned()
    }

    /// Whether a handler is registered for the key.
    pub fn contains(&self, key: &HandlerKey) -> bool {
        self.handlers.contains_key(key)
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> Vec<&HandlerKey> {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        keys
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Check that every required key has a handler, reporting all that don't.
    pub fn verify(
        &self,
        required: impl IntoIterator<Item = HandlerKey>,
    ) -> Result<(), RegistryError> {
        let missing: Vec<HandlerKey> = required
            .into_iter()
            .filter(|key| !self.contains(key))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Missing(missing))
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.keys())
            .finish()
    }
}

/// Keys needed to perform `operations` on every action in `graph`.
///
/// Operations an action's kind doesn't support are left out.
pub fn required_handlers(graph: &ConfigGraph, operations: &[Operation]) -> Vec<HandlerKey> {
    graph
        .actions()
        .iter()
        .flat_map(|action| {
            operations
                .iter()
                .filter(|op| op.is_supported_by(action.kind()))
                .map(|&op| HandlerKey::new(action.kind(), action.action_type(), op))
        })
        .collect()
}
