//! Run scheduling.
//!
//! A run takes the requested actions (plus their dependencies), checks the
//! status of each and executes the ones that aren't ready. Actions start
//! once all their dependencies have finished, up to
//! [`RunConfig::max_concurrency`] at a time.

use crate::error::{RouterError, RunError};
use crate::router::ActionRouter;
use serde::{Deserialize, Serialize};
use stagehand_core::{
    ActionInfo, ActionRef, ActionState, ConfigGraph, ExecutedAction, Operation, ResolvedAction,
    RunId,
};
use stagehand_plugins::required_handlers;
use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

/// What to do with the dependants of a failed action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Don't run anything that depends on it
    #[default]
    SkipDependants,
    /// Run dependants anyway
    Continue,
}

/// Settings for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunConfig {
    /// Max actions in flight
    pub max_concurrency: NonZeroUsize,
    /// Execute even when the status check says ready
    pub force: bool,
    /// Also run the dependencies of requested actions
    pub include_dependencies: bool,
    /// Handling of failed actions' dependants
    pub on_failure: FailurePolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
            force: false,
            include_dependencies: true,
            on_failure: FailurePolicy::default(),
        }
    }
}

impl RunConfig {
    /// Create the default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max actions in flight.
    pub fn with_max_concurrency(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Execute regardless of status.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Whether to pull in dependencies.
    pub fn with_dependencies(mut self, include: bool) -> Self {
        self.include_dependencies = include;
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }
}

/// What happened to one action in a run.
#[derive(Debug)]
pub enum ActionOutcome {
    /// Status only was requested
    Status(ExecutedAction),
    /// Status was ready; not executed
    Cached(ExecutedAction),
    /// Executed; the state says how it went
    Completed(ExecutedAction),
    /// The router reported an error
    Failed(RouterError),
    /// Not run because a dependency didn't succeed
    Skipped {
        /// The dependency that failed first
        dependency: ActionRef,
    },
    /// The task died before reporting a result
    Aborted {
        /// Why
        reason: String,
    },
}

impl ActionOutcome {
    /// The resulting action, if a handler produced one.
    pub fn executed(&self) -> Option<&ExecutedAction> {
        match self {
            Self::Status(a) | Self::Cached(a) | Self::Completed(a) => Some(a),
            _ => None,
        }
    }

    /// Whether dependants may proceed.
    pub fn is_success(&self) -> bool {
        self.executed()
            .is_some_and(|a| a.state() != ActionState::Failed)
    }

    /// Short label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Cached(_) => "cached",
            Self::Completed(a) if a.state() == ActionState::Failed => "failed",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "error",
            Self::Skipped { .. } => "skipped",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// The outcome of every action in a run, in declaration order.
#[derive(Debug)]
pub struct RunReport {
    /// Run id
    pub run_id: RunId,
    outcomes: Vec<(ActionRef, ActionOutcome)>,
}

impl RunReport {
    /// All outcomes.
    pub fn outcomes(&self) -> &[(ActionRef, ActionOutcome)] {
        &self.outcomes
    }

    /// The outcome for one action.
    pub fn get(&self, action: &ActionRef) -> Option<&ActionOutcome> {
        self.outcomes
            .iter()
            .find(|(r, _)| r == action)
            .map(|(_, o)| o)
    }

    /// Outcomes that didn't succeed.
    pub fn failures(&self) -> impl Iterator<Item = &(ActionRef, ActionOutcome)> {
        self.outcomes.iter().filter(|(_, o)| !o.is_success())
    }

    /// Whether every action succeeded.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Number of actions in the run.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the run was empty.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Status,
    Execute,
}

/// Runs actions through the router in dependency order.
#[derive(Debug, Clone)]
pub struct Scheduler {
    router: ActionRouter,
    config: RunConfig,
}

impl Scheduler {
    /// Create a scheduler with the default config.
    pub fn new(router: ActionRouter) -> Self {
        Self {
            router,
            config: RunConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The router actions are dispatched through.
    pub fn router(&self) -> &ActionRouter {
        &self.router
    }

    /// Check status, then execute what isn't ready.
    pub async fn run(
        &self,
        graph: Arc<ConfigGraph>,
        requested: &[ActionRef],
    ) -> Result<RunReport, RunError> {
        self.dispatch(graph, requested, Mode::Execute).await
    }

    /// Only check status.
    pub async fn status(
        &self,
        graph: Arc<ConfigGraph>,
        requested: &[ActionRef],
    ) -> Result<RunReport, RunError> {
        self.dispatch(graph, requested, Mode::Status).await
    }

    async fn dispatch(
        &self,
        graph: Arc<ConfigGraph>,
        requested: &[ActionRef],
        mode: Mode,
    ) -> Result<RunReport, RunError> {
        let run_id = RunId::new();
        let members: Vec<&ResolvedAction> = if self.config.include_dependencies {
            graph.with_dependencies(requested)?
        } else {
            graph.topological_order(requested)?
        };

        let operations: &[Operation] = match mode {
            Mode::Status => &[Operation::GetStatus],
            Mode::Execute => &[Operation::GetStatus, Operation::Execute],
        };
        let required = required_handlers(&graph, operations)
            .into_iter()
            .filter(|key| {
                members
                    .iter()
                    .any(|a| a.kind() == key.kind && a.action_type() == key.action_type)
            });
        self.router.registry().verify(required)?;

        info!("Run {} started with {} action(s)", run_id, members.len());

        let mut plan = Plan::new(&members);
        let included: Vec<ActionRef> = members.iter().map(|a| a.reference()).collect();
        let declaration: HashMap<ActionRef, usize> = graph
            .actions()
            .iter()
            .enumerate()
            .map(|(i, a)| (a.reference(), i))
            .collect();

        let mut outcomes: HashMap<ActionRef, ActionOutcome> = HashMap::new();
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<task::Id, ActionRef> = HashMap::new();
        let max = self.config.max_concurrency.get();

        loop {
            while tasks.len() < max {
                let Some(reference) = plan.ready.pop_front() else {
                    break;
                };
                debug!("Dispatching {}", reference);
                let handle = tasks.spawn(process(
                    self.router.clone(),
                    Arc::clone(&graph),
                    reference.clone(),
                    mode,
                    self.config.force,
                ));
                in_flight.insert(handle.id(), reference);
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };
            let (id, outcome) = match joined {
                Ok(done) => done,
                Err(err) => {
                    error!("Scheduler task failed: {}", err);
                    let reason = err.to_string();
                    (err.id(), ActionOutcome::Aborted { reason })
                }
            };
            let Some(reference) = in_flight.remove(&id) else {
                continue;
            };

            let blocking = !outcome.is_success()
                && self.config.on_failure == FailurePolicy::SkipDependants;
            if !outcome.is_success() {
                warn!("{} {}", reference, outcome.label());
            }
            outcomes.insert(reference.clone(), outcome);

            for (skipped, dependency) in plan.finish(&reference, blocking) {
                info!("Skipping {} ({} did not succeed)", skipped, dependency);
                outcomes.insert(skipped, ActionOutcome::Skipped { dependency });
            }
        }

        let mut ordered: Vec<(ActionRef, ActionOutcome)> = included
            .into_iter()
            .map(|r| {
                let outcome = outcomes.remove(&r).unwrap_or(ActionOutcome::Aborted {
                    reason: "never dispatched".to_string(),
                });
                (r, outcome)
            })
            .collect();
        ordered.sort_by_key(|(r, _)| declaration.get(r).copied().unwrap_or(usize::MAX));

        let report = RunReport {
            run_id,
            outcomes: ordered,
        };
        info!(
            "Run {} finished: {} action(s), {} failed",
            run_id,
            report.len(),
            report.failures().count()
        );
        Ok(report)
    }
}

/// Dependency bookkeeping for one run.
struct Plan {
    ready: VecDeque<ActionRef>,
    pending: HashMap<ActionRef, usize>,
    dependants: HashMap<ActionRef, Vec<ActionRef>>,
    blocked_by: HashMap<ActionRef, ActionRef>,
}

impl Plan {
    fn new(members: &[&ResolvedAction]) -> Self {
        let included: HashSet<ActionRef> = members.iter().map(|a| a.reference()).collect();
        let mut pending = HashMap::new();
        let mut dependants: HashMap<ActionRef, Vec<ActionRef>> = HashMap::new();
        let mut ready = VecDeque::new();

        for action in members {
            let reference = action.reference();
            let deps: Vec<&ActionRef> = action
                .dependencies()
                .iter()
                .filter(|d| included.contains(*d))
                .collect();
            for dep in &deps {
                dependants
                    .entry((*dep).clone())
                    .or_default()
                    .push(reference.clone());
            }
            if deps.is_empty() {
                ready.push_back(reference);
            } else {
                pending.insert(reference, deps.len());
            }
        }

        Self {
            ready,
            pending,
            dependants,
            blocked_by: HashMap::new(),
        }
    }

    /// Record that `reference` finished. Newly unblocked actions join the
    /// ready queue; the ones that can no longer run are returned together
    /// with the failed dependency that blocked them.
    fn finish(&mut self, reference: &ActionRef, blocking: bool) -> Vec<(ActionRef, ActionRef)> {
        let mut skipped = Vec::new();
        let mut queue = VecDeque::from([(reference.clone(), blocking.then(|| reference.clone()))]);

        while let Some((done, cause)) = queue.pop_front() {
            let Some(dependants) = self.dependants.get(&done).cloned() else {
                continue;
            };
            for dependant in dependants {
                if let Some(cause) = &cause {
                    self.blocked_by
                        .entry(dependant.clone())
                        .or_insert_with(|| cause.clone());
                }
                let Some(remaining) = self.pending.get_mut(&dependant) else {
                    continue;
                };
                *remaining -= 1;
                if *remaining > 0 {
                    continue;
                }
                self.pending.remove(&dependant);
                match self.blocked_by.get(&dependant).cloned() {
                    Some(root) => {
                        skipped.push((dependant.clone(), root.clone()));
                        queue.push_back((dependant, Some(root)));
                    }
                    None => self.ready.push_back(dependant),
                }
            }
        }

        skipped
    }
}

async fn process(
    router: ActionRouter,
    graph: Arc<ConfigGraph>,
    reference: ActionRef,
    mode: Mode,
    force: bool,
) -> ActionOutcome {
    let Some(action) = graph.get(&reference) else {
        return ActionOutcome::Aborted {
            reason: format!("{reference} is not in the graph"),
        };
    };

    let status = match router.get_status(action, &graph).await {
        Ok(outcome) => outcome.executed,
        Err(err) => return ActionOutcome::Failed(err),
    };

    if mode == Mode::Status {
        return ActionOutcome::Status(status);
    }
    if status.state().is_ready() && !force {
        debug!("{} is ready, skipping execute", reference);
        return ActionOutcome::Cached(status);
    }

    match router.execute(action, &graph).await {
        Ok(outcome) => ActionOutcome::Completed(outcome.executed),
        Err(err) => ActionOutcome::Failed(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use stagehand_core::{
        ActionKind, BasicValidator, DeclaredAction, EventLog, HandlerResult, ResolveContext,
    };
    use stagehand_plugins::testing::{FailingHandler, StaticHandler};
    use stagehand_plugins::{ActionHandler, HandlerParams, HandlerRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const TEST_TYPE: &str = "test";

    /// Records the order actions were executed in.
    #[derive(Default)]
    struct Recorder {
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActionHandler for Recorder {
        async fn handle(&self, params: HandlerParams<'_>) -> anyhow::Result<HandlerResult> {
            tokio::task::yield_now().await;
            self.order
                .lock()
                .unwrap()
                .push(params.action.reference().to_string());
            Ok(HandlerResult::ready())
        }
    }

    /// Tracks how many invocations overlap.
    #[derive(Default)]
    struct Overlap {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ActionHandler for Overlap {
        async fn handle(&self, _params: HandlerParams<'_>) -> anyhow::Result<HandlerResult> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(HandlerResult::ready())
        }
    }

    fn chain() -> Arc<ConfigGraph> {
        let build = ActionRef::new(ActionKind::Build, "api");
        let deploy = ActionRef::new(ActionKind::Deploy, "api");
        Arc::new(
            ConfigGraph::build(
                vec![
                    DeclaredAction::new(ActionKind::Test, "e2e", TEST_TYPE)
                        .with_dependency(deploy.clone()),
                    DeclaredAction::new(ActionKind::Deploy, "api", TEST_TYPE)
                        .with_dependency(build),
                    DeclaredAction::new(ActionKind::Build, "api", TEST_TYPE),
                    DeclaredAction::new(ActionKind::Build, "unrelated", TEST_TYPE),
                ],
                &BasicValidator,
                &ResolveContext::new(),
            )
            .unwrap(),
        )
    }

    fn e2e() -> ActionRef {
        ActionRef::new(ActionKind::Test, "e2e")
    }

    /// Every kind gets `status` for getStatus and `execute` for execute.
    fn registry(
        status: Arc<dyn ActionHandler>,
        execute: Arc<dyn ActionHandler>,
    ) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        for kind in ActionKind::ALL {
            registry
                .register_arc(kind, TEST_TYPE, Operation::GetStatus, status.clone())
                .unwrap()
                .register_arc(kind, TEST_TYPE, Operation::Execute, execute.clone())
                .unwrap();
        }
        registry
    }

    fn scheduler(registry: HandlerRegistry, config: RunConfig) -> Scheduler {
        Scheduler::new(ActionRouter::new(Arc::new(registry), EventLog::new())).with_config(config)
    }

    fn not_ready() -> Arc<dyn ActionHandler> {
        Arc::new(StaticHandler::new(HandlerResult::not_ready()))
    }

    #[tokio::test]
    async fn test_runs_dependencies_first() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(registry(not_ready(), recorder.clone()), RunConfig::new());

        let report = scheduler.run(chain(), &[e2e()]).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.len(), 3);
        assert_eq!(
            *recorder.order.lock().unwrap(),
            vec!["build.api", "deploy.api", "test.e2e"]
        );
        assert!(matches!(report.get(&e2e()), Some(ActionOutcome::Completed(_))));
        assert!(report
            .get(&ActionRef::new(ActionKind::Build, "unrelated"))
            .is_none());

        // Report follows declaration order.
        let names: Vec<String> = report.outcomes().iter().map(|(r, _)| r.to_string()).collect();
        assert_eq!(names, vec!["test.e2e", "deploy.api", "build.api"]);
    }

    #[tokio::test]
    async fn test_without_dependencies() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(
            registry(not_ready(), recorder.clone()),
            RunConfig::new().with_dependencies(false),
        );

        let report = scheduler.run(chain(), &[e2e()]).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(*recorder.order.lock().unwrap(), vec!["test.e2e"]);
    }

    #[tokio::test]
    async fn test_ready_status_skips_execute() {
        let execute = Arc::new(StaticHandler::ready());
        let scheduler = scheduler(
            registry(Arc::new(StaticHandler::ready()), execute.clone()),
            RunConfig::new(),
        );

        let report = scheduler.run(chain(), &[e2e()]).await.unwrap();
        assert!(report.is_success());
        assert!(report
            .outcomes()
            .iter()
            .all(|(_, o)| matches!(o, ActionOutcome::Cached(_))));
        assert_eq!(execute.calls(), 0);
    }

    #[tokio::test]
    async fn test_force_executes_ready_actions() {
        let execute = Arc::new(StaticHandler::ready());
        let scheduler = scheduler(
            registry(Arc::new(StaticHandler::ready()), execute.clone()),
            RunConfig::new().with_force(true),
        );

        scheduler.run(chain(), &[e2e()]).await.unwrap();
        assert_eq!(execute.calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_skips_dependants() {
        let mut registry = HandlerRegistry::new();
        for kind in ActionKind::ALL {
            let execute: Arc<dyn ActionHandler> = if kind == ActionKind::Build {
                Arc::new(FailingHandler::new("no compiler"))
            } else {
                Arc::new(StaticHandler::ready())
            };
            registry
                .register_arc(kind, TEST_TYPE, Operation::GetStatus, not_ready())
                .unwrap()
                .register_arc(kind, TEST_TYPE, Operation::Execute, execute)
                .unwrap();
        }
        let scheduler = scheduler(registry, RunConfig::new());

        let report = scheduler.run(chain(), &[e2e()]).await.unwrap();
        let build = ActionRef::new(ActionKind::Build, "api");

        assert!(!report.is_success());
        assert!(matches!(report.get(&build), Some(ActionOutcome::Failed(_))));
        for skipped in [ActionRef::new(ActionKind::Deploy, "api"), e2e()] {
            match report.get(&skipped) {
                Some(ActionOutcome::Skipped { dependency }) => assert_eq!(dependency, &build),
                other => panic!("expected {skipped} to be skipped, got {other:?}"),
            }
        }
        assert_eq!(report.failures().count(), 3);
    }

    /// Panics instead of returning.
    struct Panics;

    #[async_trait]
    impl ActionHandler for Panics {
        async fn handle(&self, _params: HandlerParams<'_>) -> anyhow::Result<HandlerResult> {
            panic!("handler crashed")
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_aborts_and_releases_dependants() {
        let mut registry = HandlerRegistry::new();
        for kind in ActionKind::ALL {
            let execute: Arc<dyn ActionHandler> = if kind == ActionKind::Build {
                Arc::new(Panics)
            } else {
                Arc::new(StaticHandler::ready())
            };
            registry
                .register_arc(kind, TEST_TYPE, Operation::GetStatus, not_ready())
                .unwrap()
                .register_arc(kind, TEST_TYPE, Operation::Execute, execute)
                .unwrap();
        }
        let scheduler = scheduler(registry, RunConfig::new());

        let report = scheduler.run(chain(), &[e2e()]).await.unwrap();
        let build = ActionRef::new(ActionKind::Build, "api");

        assert_eq!(report.len(), 3);
        assert!(matches!(report.get(&build), Some(ActionOutcome::Aborted { .. })));
        for skipped in [ActionRef::new(ActionKind::Deploy, "api"), e2e()] {
            match report.get(&skipped) {
                Some(ActionOutcome::Skipped { dependency }) => assert_eq!(dependency, &build),
                other => panic!("expected {skipped} to be skipped, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_continue_policy_runs_dependants() {
        let execute = Arc::new(StaticHandler::new(HandlerResult::failed()));
        let scheduler = scheduler(
            registry(not_ready(), execute.clone()),
            RunConfig::new().with_failure_policy(FailurePolicy::Continue),
        );

        let report = scheduler.run(chain(), &[e2e()]).await.unwrap();
        assert_eq!(execute.calls(), 3);
        assert!(report
            .outcomes()
            .iter()
            .all(|(_, o)| o.label() == "failed"));
    }

    #[tokio::test]
    async fn test_missing_handler_fails_before_dispatch() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(ActionKind::Test, TEST_TYPE, Operation::GetStatus, StaticHandler::ready())
            .unwrap();
        let scheduler = scheduler(registry, RunConfig::new());

        let err = scheduler.run(chain(), &[e2e()]).await.unwrap_err();
        assert!(matches!(err, RunError::Registry(_)));
        assert!(scheduler.router().events().is_empty());
    }

    #[tokio::test]
    async fn test_status_only() {
        let mut registry = HandlerRegistry::new();
        for kind in [ActionKind::Build, ActionKind::Deploy, ActionKind::Test] {
            registry
                .register(kind, TEST_TYPE, Operation::GetStatus, StaticHandler::ready())
                .unwrap();
        }
        let scheduler = scheduler(registry, RunConfig::new());

        let report = scheduler.status(chain(), &[e2e()]).await.unwrap();
        assert_eq!(report.len(), 3);
        assert!(report
            .outcomes()
            .iter()
            .all(|(_, o)| matches!(o, ActionOutcome::Status(_))));
        assert_eq!(scheduler.router().events().len(), 6);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let scheduler = scheduler(HandlerRegistry::new(), RunConfig::new());
        let err = scheduler
            .run(chain(), &[ActionRef::new(ActionKind::Run, "nope")])
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Graph(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_respects_max_concurrency() {
        let overlap = Arc::new(Overlap::default());
        let actions = (0..5)
            .map(|i| DeclaredAction::new(ActionKind::Build, format!("b{i}"), TEST_TYPE))
            .collect();
        let graph = Arc::new(
            ConfigGraph::build(actions, &BasicValidator, &ResolveContext::new()).unwrap(),
        );
        let requested: Vec<ActionRef> = graph.actions().iter().map(|a| a.reference()).collect();
        let scheduler = scheduler(
            registry(not_ready(), overlap.clone()),
            RunConfig::new().with_max_concurrency(NonZeroUsize::new(2).unwrap()),
        );

        let report = scheduler.run(graph, &requested).await.unwrap();
        assert!(report.is_success());
        assert_eq!(overlap.peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_config_from_json() {
        let config: RunConfig =
            serde_json::from_str(r#"{"maxConcurrency": 2, "onFailure": "continue"}"#).unwrap();
        assert_eq!(config.max_concurrency.get(), 2);
        assert_eq!(config.on_failure, FailurePolicy::Continue);
        assert!(config.include_dependencies);
        assert!(!config.force);
    }
}
