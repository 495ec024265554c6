//! stagehand core data models.
//!
//! Actions at their three lifecycle phases, the config graph that links
//! them, router operations and their lifecycle labels, and the run-scoped
//! event log.

#![warn(missing_docs)]

// Identities
mod id;

// Action model
mod action;
mod operation;
mod template;
mod validate;

// Graph
mod graph;

// Events & logging
mod event;
mod event_log;
mod log;

mod error;

// Re-exports
pub use id::*;

pub use action::{
    ActionInfo, ActionKind, ActionPhase, ActionRef, ActionState, AnyAction, DeclaredAction,
    ExecutedAction, HandlerResult, Outputs, ResolvedAction, DEFAULT_BUILD_TIMEOUT_SEC,
    DEFAULT_DEPLOY_TIMEOUT_SEC, DEFAULT_RUN_TIMEOUT_SEC, DEFAULT_TEST_TIMEOUT_SEC,
};
pub use operation::{Labels, Operation};
pub use template::ResolveContext;
pub use validate::{BasicValidator, ConfigValidator};

pub use graph::ConfigGraph;

pub use event::{
    status_event_name, ActionStatusPayload, Event, EventPayload, EventState, StatusSnapshot,
    StatusState,
};
pub use event_log::EventLog;
pub use log::{LogEntry, LogLevel, LogSink, MemoryLog, TracingLog};

pub use error::{GraphError, ParseError, ResolveError, TemplateError, ValidationError};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
