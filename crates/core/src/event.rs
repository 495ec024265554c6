//! Lifecycle events emitted around router operations.

use crate::action::{ActionKind, Outputs};
use crate::id::ActionUid;
use crate::operation::Operation;
use crate::Time;
use serde::{Deserialize, Serialize};

/// Coarse lifecycle state on an action status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventState {
    /// A status check is in flight
    GettingStatus,
    /// Status check found the action up to date
    Cached,
    /// Action needs processing
    NotReady,
    /// An execution is in flight
    Processing,
    /// Execution completed successfully
    Ready,
    /// Operation failed
    Failed,
    /// Unknown
    Unknown,
}

/// State on the nested status snapshot of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusState {
    /// Checking a build's status
    Fetching,
    /// Build output is up to date
    Fetched,
    /// Needs processing
    Outdated,
    /// Build in progress
    Building,
    /// Build completed
    Built,
    /// Deployment in progress
    Deploying,
    /// Deployed and up to date
    Ready,
    /// Deployment being removed
    Stopping,
    /// Deployment removed
    Stopped,
    /// Test or run in progress
    Running,
    /// Test or run completed successfully
    Succeeded,
    /// Operation failed
    Failed,
    /// Not known yet
    Unknown,
}

/// Status/result snapshot nested in an action status event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Status state label
    pub state: StatusState,

    /// Outputs reported by the handler
    #[serde(default, skip_serializing_if = "Outputs::is_empty")]
    pub outputs: Outputs,

    /// Provider detail reported by the handler
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl StatusSnapshot {
    /// Snapshot with only a state.
    pub fn new(state: StatusState) -> Self {
        Self {
            state,
            outputs: Outputs::new(),
            detail: serde_json::Value::Null,
        }
    }
}

/// Payload of `<kind>Status` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStatusPayload {
    /// Action name
    pub action_name: String,

    /// Action kind
    pub action_kind: ActionKind,

    /// Parent module name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,

    /// Correlates start and end of one invocation
    pub action_uid: ActionUid,

    /// Operation being performed
    pub operation: Operation,

    /// Coarse lifecycle state
    pub state: EventState,

    /// Nested status snapshot
    pub status: StatusSnapshot,

    /// When the operation started
    pub started_at: Time,

    /// When the operation finished (end events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Time>,

    /// Error text (failed end events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// Router lifecycle event
    ActionStatus(ActionStatusPayload),
    /// Anything emitted from outside the router
    Other(serde_json::Value),
}

/// An immutable entry in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name, e.g. `buildStatus`
    pub name: String,

    /// When it was emitted
    pub timestamp: Time,

    /// Payload
    pub payload: EventPayload,
}

impl Event {
    /// Create an action status event, named after the action's kind.
    pub fn action_status(payload: ActionStatusPayload) -> Self {
        Self {
            name: status_event_name(payload.action_kind),
            timestamp: chrono::Utc::now(),
            payload: EventPayload::ActionStatus(payload),
        }
    }

    /// Create a free-form event.
    pub fn other(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            timestamp: chrono::Utc::now(),
            payload: EventPayload::Other(payload),
        }
    }

    /// The action status payload, if this is a router event.
    pub fn action_status_payload(&self) -> Option<&ActionStatusPayload> {
        match &self.payload {
            EventPayload::ActionStatus(p) => Some(p),
            EventPayload::Other(_) => None,
        }
    }
}

/// Name of the status event for `kind`, e.g. `deployStatus`.
pub fn status_event_name(kind: ActionKind) -> String {
    format!("{}Status", kind.lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(kind: ActionKind) -> ActionStatusPayload {
        ActionStatusPayload {
            action_name: "api".to_string(),
            action_kind: kind,
            module_name: Some("module-a".to_string()),
            action_uid: ActionUid::new(),
            operation: Operation::GetStatus,
            state: EventState::GettingStatus,
            status: StatusSnapshot::new(StatusState::Fetching),
            started_at: chrono::Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(status_event_name(ActionKind::Build), "buildStatus");
        assert_eq!(status_event_name(ActionKind::Deploy), "deployStatus");
        assert_eq!(Event::action_status(payload(ActionKind::Test)).name, "testStatus");
    }

    #[test]
    fn test_payload_serializes_labels() {
        let event = Event::action_status(payload(ActionKind::Build));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["name"], "buildStatus");
        assert_eq!(value["payload"]["state"], "getting-status");
        assert_eq!(value["payload"]["status"]["state"], "fetching");
        assert_eq!(value["payload"]["moduleName"], "module-a");
        assert_eq!(value["payload"]["operation"], "getStatus");
        assert!(value["payload"].get("completedAt").is_none());
    }

    #[test]
    fn test_other_event() {
        let event = Event::other("log", json!({ "msg": "hi" }));
        assert!(event.action_status_payload().is_none());
    }
}
