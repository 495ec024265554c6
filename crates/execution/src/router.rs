//! The action router.
//!
//! Every operation goes through [`ActionRouter::call`]:
//! ```text
//! lookup handler → start event → handler (with timeout) → end event
//! ```
//! The start and end events of one invocation share an [`ActionUid`].

use crate::error::RouterError;
use chrono::Utc;
use stagehand_core::{
    ActionInfo, ActionKind, ActionStatusPayload, ActionUid, ConfigGraph, Event, EventLog,
    ExecutedAction, HandlerResult, Labels, LogSink, Operation, ResolvedAction, StatusSnapshot,
    Time, TracingLog,
};
use stagehand_plugins::{HandlerParams, HandlerRegistry};
use std::sync::Arc;
use tracing::{debug, warn};

/// The result of one routed operation.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    /// Id shared by the invocation's start and end events
    pub uid: ActionUid,

    /// The action with the handler's state and outputs attached
    pub executed: ExecutedAction,

    /// What the handler returned
    pub result: HandlerResult,
}

/// Dispatches operations to the registered handlers and records lifecycle events.
#[derive(Clone)]
pub struct ActionRouter {
    registry: Arc<HandlerRegistry>,
    events: EventLog,
    log: Arc<dyn LogSink>,
}

impl ActionRouter {
    /// Create a router that logs through `tracing`.
    pub fn new(registry: Arc<HandlerRegistry>, events: EventLog) -> Self {
        Self {
            registry,
            events,
            log: Arc::new(TracingLog::with_section("router")),
        }
    }

    /// Set the sink handlers write user-facing lines to.
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    /// The run's event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// The handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Query the current status of `action`.
    pub async fn get_status(
        &self,
        action: &ResolvedAction,
        graph: &ConfigGraph,
    ) -> Result<OperationOutcome, RouterError> {
        self.call(Operation::GetStatus, action, graph).await
    }

    /// Bring `action` to its desired state.
    pub async fn execute(
        &self,
        action: &ResolvedAction,
        graph: &ConfigGraph,
    ) -> Result<OperationOutcome, RouterError> {
        self.call(Operation::Execute, action, graph).await
    }

    /// Remove what `action` deployed.
    pub async fn delete(
        &self,
        action: &ResolvedAction,
        graph: &ConfigGraph,
    ) -> Result<OperationOutcome, RouterError> {
        self.call(Operation::Delete, action, graph).await
    }

    /// Route `operation` for `action` to its handler.
    ///
    /// A missing handler fails before any event is emitted. Otherwise
    /// exactly one start and one end event are appended, also when the
    /// handler fails or times out.
    pub async fn call(
        &self,
        operation: Operation,
        action: &ResolvedAction,
        graph: &ConfigGraph,
    ) -> Result<OperationOutcome, RouterError> {
        let kind = action.kind();
        let reference = action.reference();

        let handler = self
            .registry
            .lookup(kind, action.action_type(), operation)
            .ok_or_else(|| RouterError::HandlerNotFound {
                action: reference.clone(),
                action_type: action.action_type().to_string(),
                operation,
            })?;

        let invocation = Invocation {
            action,
            operation,
            uid: ActionUid::new(),
            started_at: Utc::now(),
        };

        self.events.append(invocation.start_event());
        debug!("{} {} ({})", operation.handler_name(kind), reference, invocation.uid);

        let timeout = action.timeout();
        let params = HandlerParams {
            action,
            graph,
            log: self.log.as_ref(),
        };

        let outcome = match tokio::time::timeout(timeout, handler.handle(params)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(source)) => Err(RouterError::HandlerFailed {
                action: reference.clone(),
                operation,
                source,
            }),
            Err(_) => Err(RouterError::Timeout {
                action: reference.clone(),
                operation,
                timeout,
            }),
        };

        match outcome {
            Ok(result) => {
                let labels = operation.end_labels(kind, result.state);
                let status = StatusSnapshot {
                    state: labels.status,
                    outputs: result.outputs.clone(),
                    detail: result.detail.clone(),
                };
                self.events.append(invocation.end_event(labels, status, None));

                Ok(OperationOutcome {
                    uid: invocation.uid,
                    executed: ExecutedAction::from_result(action.clone(), &result),
                    result,
                })
            }
            Err(err) => {
                let labels = Labels::failed();
                self.events.append(invocation.end_event(
                    labels,
                    StatusSnapshot::new(labels.status),
                    Some(err.to_string()),
                ));
                warn!("{}", err);
                Err(err)
            }
        }
    }

    /// Operations on Build actions.
    pub fn build(&self) -> KindRouter<'_> {
        self.for_kind(ActionKind::Build)
    }

    /// Operations on Deploy actions.
    pub fn deploy(&self) -> KindRouter<'_> {
        self.for_kind(ActionKind::Deploy)
    }

    /// Operations on Test actions.
    pub fn test(&self) -> KindRouter<'_> {
        self.for_kind(ActionKind::Test)
    }

    /// Operations on Run actions.
    pub fn run(&self) -> KindRouter<'_> {
        self.for_kind(ActionKind::Run)
    }

    /// Operations on actions of `kind`.
    pub fn for_kind(&self, kind: ActionKind) -> KindRouter<'_> {
        KindRouter { router: self, kind }
    }
}

impl std::fmt::Debug for ActionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRouter")
            .field("registry", &self.registry)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// A router restricted to one action kind.
///
/// Rejects actions of any other kind without calling a handler.
#[derive(Debug, Clone, Copy)]
pub struct KindRouter<'a> {
    router: &'a ActionRouter,
    kind: ActionKind,
}

impl KindRouter<'_> {
    /// The kind this router accepts.
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Query the current status of `action`.
    pub async fn get_status(
        &self,
        action: &ResolvedAction,
        graph: &ConfigGraph,
    ) -> Result<OperationOutcome, RouterError> {
        self.call(Operation::GetStatus, action, graph).await
    }

    /// Bring `action` to its desired state.
    pub async fn execute(
        &self,
        action: &ResolvedAction,
        graph: &ConfigGraph,
    ) -> Result<OperationOutcome, RouterError> {
        self.call(Operation::Execute, action, graph).await
    }

    /// Remove what `action` deployed. Only Deploy actions support this.
    pub async fn delete(
        &self,
        action: &ResolvedAction,
        graph: &ConfigGraph,
    ) -> Result<OperationOutcome, RouterError> {
        self.call(Operation::Delete, action, graph).await
    }

    async fn call(
        &self,
        operation: Operation,
        action: &ResolvedAction,
        graph: &ConfigGraph,
    ) -> Result<OperationOutcome, RouterError> {
        if action.kind() != self.kind {
            return Err(RouterError::KindMismatch {
                expected: self.kind,
                action: action.reference(),
            });
        }
        self.router.call(operation, action, graph).await
    }
}

/// One in-flight operation. Stamps its start and end events.
struct Invocation<'a> {
    action: &'a ResolvedAction,
    operation: Operation,
    uid: ActionUid,
    started_at: Time,
}

impl Invocation<'_> {
    fn start_event(&self) -> Event {
        let labels = self.operation.start_labels(self.action.kind());
        self.event(labels, StatusSnapshot::new(labels.status), None, None)
    }

    fn end_event(&self, labels: Labels, status: StatusSnapshot, error: Option<String>) -> Event {
        self.event(labels, status, Some(Utc::now()), error)
    }

    fn event(
        &self,
        labels: Labels,
        status: StatusSnapshot,
        completed_at: Option<Time>,
        error: Option<String>,
    ) -> Event {
        Event::action_status(ActionStatusPayload {
            action_name: self.action.name().to_string(),
            action_kind: self.action.kind(),
            module_name: self.action.module_name().map(str::to_string),
            action_uid: self.uid,
            operation: self.operation,
            state: labels.state,
            status,
            started_at: self.started_at,
            completed_at,
            error,
        })
    }
}
