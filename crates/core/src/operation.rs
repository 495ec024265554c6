//! Router operations and the lifecycle labels each one reports.
//!
//! Every operation emits a start and an end event. The labels on those events
//! come from a fixed vocabulary per (kind, operation):
//!
//! | Kind   | Operation | start                     | end (ready)        | end (not ready)      |
//! |--------|-----------|---------------------------|--------------------|----------------------|
//! | Build  | getStatus | getting-status / fetching | cached / fetched   | not-ready / outdated |
//! | Build  | execute   | processing / building     | ready / built      | not-ready / unknown  |
//! | Deploy | getStatus | getting-status / unknown  | cached / ready     | not-ready / outdated |
//! | Deploy | execute   | processing / deploying    | ready / ready      | not-ready / unknown  |
//! | Deploy | delete    | processing / stopping     | not-ready / stopped | not-ready / stopped |
//! | Test   | getStatus | getting-status / unknown  | cached / succeeded | not-ready / outdated |
//! | Test   | execute   | processing / running      | ready / succeeded  | not-ready / unknown  |
//! | Run    | getStatus | getting-status / unknown  | cached / succeeded | not-ready / outdated |
//! | Run    | execute   | processing / running      | ready / succeeded  | not-ready / unknown  |
//!
//! Failures always end with `failed / failed`.

use crate::action::{ActionKind, ActionState};
use crate::event::{EventState, StatusState};
use serde::{Deserialize, Serialize};

/// An operation the router can dispatch to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Check whether the action is up to date, without side effects
    GetStatus,
    /// Build, deploy, test or run, depending on kind
    Execute,
    /// Tear down a deployment
    Delete,
}

impl Operation {
    /// Every operation.
    pub const ALL: [Operation; 3] = [Self::GetStatus, Self::Execute, Self::Delete];

    /// Operation name as handlers know it, e.g. `build` for a Build execute.
    pub fn handler_name(&self, kind: ActionKind) -> &'static str {
        match self {
            Self::GetStatus => "getStatus",
            Self::Execute => kind.lowercase(),
            Self::Delete => "delete",
        }
    }

    /// Whether actions of `kind` support this operation.
    pub fn is_supported_by(&self, kind: ActionKind) -> bool {
        match self {
            Self::GetStatus | Self::Execute => true,
            Self::Delete => kind == ActionKind::Deploy,
        }
    }

    /// Labels for the event emitted before the handler runs.
    pub fn start_labels(&self, kind: ActionKind) -> Labels {
        match self {
            Self::GetStatus => Labels::new(
                EventState::GettingStatus,
                match kind {
                    ActionKind::Build => StatusState::Fetching,
                    _ => StatusState::Unknown,
                },
            ),
            Self::Execute => Labels::new(
                EventState::Processing,
                match kind {
                    ActionKind::Build => StatusState::Building,
                    ActionKind::Deploy => StatusState::Deploying,
                    ActionKind::Test | ActionKind::Run => StatusState::Running,
                },
            ),
            Self::Delete => Labels::new(EventState::Processing, StatusState::Stopping),
        }
    }

    /// Labels for the event emitted after the handler returned a result.
    pub fn end_labels(&self, kind: ActionKind, state: ActionState) -> Labels {
        if state == ActionState::Failed {
            return Labels::failed();
        }

        let ready = state.is_ready();
        match self {
            Self::GetStatus if ready => Labels::new(EventState::Cached, ready_status(kind)),
            Self::GetStatus => Labels::new(EventState::NotReady, StatusState::Outdated),
            Self::Execute if ready => Labels::new(
                EventState::Ready,
                match kind {
                    ActionKind::Build => StatusState::Built,
                    _ => ready_status(kind),
                },
            ),
            Self::Execute => Labels::new(EventState::NotReady, StatusState::Unknown),
            Self::Delete => Labels::new(EventState::NotReady, StatusState::Stopped),
        }
    }
}

fn ready_status(kind: ActionKind) -> StatusState {
    match kind {
        ActionKind::Build => StatusState::Fetched,
        ActionKind::Deploy => StatusState::Ready,
        ActionKind::Test | ActionKind::Run => StatusState::Succeeded,
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::GetStatus => "getStatus",
            Self::Execute => "execute",
            Self::Delete => "delete",
        })
    }
}

/// The pair of labels carried by a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Labels {
    /// Coarse state on the event payload
    pub state: EventState,
    /// State on the nested status snapshot
    pub status: StatusState,
}

impl Labels {
    /// Create a new label pair.
    pub fn new(state: EventState, status: StatusState) -> Self {
        Self { state, status }
    }

    /// Labels for any failed operation.
    pub fn failed() -> Self {
        Self::new(EventState::Failed, StatusState::Failed)
    }
}
