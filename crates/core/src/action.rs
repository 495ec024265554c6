//! Action model - units of work at their three lifecycle phases.
//!
//! An action moves through three phases, each its own immutable value:
//!
//! ```text
//! DeclaredAction ──resolve──▶ ResolvedAction ──from_result──▶ ExecutedAction
//! ```
//!
//! The kind is fixed at declaration and carried unchanged through every
//! phase. Callers that need to branch on kind without knowing the phase use
//! the [`ActionInfo`] trait.

use crate::error::{ParseError, ResolveError};
use crate::template::ResolveContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default Build timeout, in seconds.
pub const DEFAULT_BUILD_TIMEOUT_SEC: u64 = 600;
/// Default Deploy timeout, in seconds.
pub const DEFAULT_DEPLOY_TIMEOUT_SEC: u64 = 300;
/// Default Test timeout, in seconds.
pub const DEFAULT_TEST_TIMEOUT_SEC: u64 = 600;
/// Default Run timeout, in seconds.
pub const DEFAULT_RUN_TIMEOUT_SEC: u64 = 600;

/// Named outputs produced by a handler.
pub type Outputs = BTreeMap<String, serde_json::Value>;

/// The kind of work an action describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    /// Produce an artifact (container image, bundle, ...)
    Build,
    /// Bring a service up in some environment
    Deploy,
    /// Run a test suite
    Test,
    /// Execute a one-off task
    Run,
}

impl ActionKind {
    /// Every kind, in declaration order.
    pub const ALL: [ActionKind; 4] = [Self::Build, Self::Deploy, Self::Test, Self::Run];

    /// Capitalized name, as used in user-facing messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "Build",
            Self::Deploy => "Deploy",
            Self::Test => "Test",
            Self::Run => "Run",
        }
    }

    /// Lowercase name, used for event names and action references.
    pub fn lowercase(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Deploy => "deploy",
            Self::Test => "test",
            Self::Run => "run",
        }
    }

    /// Timeout applied when the declaration doesn't set one.
    pub fn default_timeout_secs(&self) -> u64 {
        match self {
            Self::Build => DEFAULT_BUILD_TIMEOUT_SEC,
            Self::Deploy => DEFAULT_DEPLOY_TIMEOUT_SEC,
            Self::Test => DEFAULT_TEST_TIMEOUT_SEC,
            Self::Run => DEFAULT_RUN_TIMEOUT_SEC,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnknownKind(s.to_string()))
    }
}

/// Reference to an action by kind and name, written `build.api`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionRef {
    /// Action kind
    pub kind: ActionKind,
    /// Action name, unique within its kind
    pub name: String,
}

impl ActionRef {
    /// Create a new reference.
    pub fn new(kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ActionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.kind.lowercase(), self.name)
    }
}

impl std::str::FromStr for ActionRef {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('.')
            .ok_or_else(|| ParseError::InvalidReference(s.to_string()))?;
        if name.is_empty() {
            return Err(ParseError::InvalidReference(s.to_string()));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

impl TryFrom<String> for ActionRef {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActionRef> for String {
    fn from(value: ActionRef) -> Self {
        value.to_string()
    }
}

/// Identity and kind-narrowing shared by every action phase.
pub trait ActionInfo {
    /// Action kind
    fn kind(&self) -> ActionKind;

    /// Action name
    fn name(&self) -> &str;

    /// Provider type implementing this action
    fn action_type(&self) -> &str;

    /// Parent module name, for actions converted from modules
    fn module_name(&self) -> Option<&str>;

    /// Reference to this action.
    fn reference(&self) -> ActionRef {
        ActionRef::new(self.kind(), self.name())
    }

    /// Whether this is a Build action.
    fn is_build(&self) -> bool {
        self.kind() == ActionKind::Build
    }

    /// Whether this is a Deploy action.
    fn is_deploy(&self) -> bool {
        self.kind() == ActionKind::Deploy
    }

    /// Whether this is a Test action.
    fn is_test(&self) -> bool {
        self.kind() == ActionKind::Test
    }

    /// Whether this is a Run action.
    fn is_run(&self) -> bool {
        self.kind() == ActionKind::Run
    }
}

/// An action as written by the user, after schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredAction {
    /// Action kind
    pub kind: ActionKind,

    /// Action name
    pub name: String,

    /// Provider type
    #[serde(rename = "type")]
    pub action_type: String,

    /// Declared dependencies
    #[serde(default)]
    pub dependencies: Vec<ActionRef>,

    /// Provider configuration, opaque until resolved
    #[serde(default)]
    pub spec: serde_json::Value,

    /// Timeout in seconds; the kind's default applies when unset
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Parent module name
    #[serde(default)]
    pub module_name: Option<String>,

    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
}

impl DeclaredAction {
    /// Create a new declared action with an empty spec.
    pub fn new(kind: ActionKind, name: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            action_type: action_type.into(),
            dependencies: Vec::new(),
            spec: serde_json::Value::Object(Default::default()),
            timeout: None,
            module_name: None,
            description: None,
        }
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, dependency: ActionRef) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Set the spec.
    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = spec;
        self
    }

    /// Set the timeout in seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Set the parent module name.
    pub fn with_module(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = Some(module_name.into());
        self
    }

    /// Effective timeout in seconds.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.unwrap_or_else(|| self.kind.default_timeout_secs())
    }

    /// Resolve this action into its graph form.
    ///
    /// `resolve_dependency` maps each declared dependency to the concrete
    /// action it refers to, returning `None` when it isn't in the graph.
    /// Template references in the spec are substituted from `context`.
    pub fn resolve<F>(
        self,
        position: usize,
        context: &ResolveContext,
        mut resolve_dependency: F,
    ) -> Result<ResolvedAction, ResolveError>
    where
        F: FnMut(&ActionRef) -> Option<ActionRef>,
    {
        let reference = self.reference();

        let dependencies = self
            .dependencies
            .iter()
            .map(|dep| {
                resolve_dependency(dep).ok_or_else(|| ResolveError::MissingDependency {
                    action: reference.clone(),
                    dependency: dep.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let spec = context
            .render(&self.spec)
            .map_err(|source| ResolveError::Template {
                action: reference,
                source,
            })?;

        Ok(ResolvedAction {
            declared: self,
            dependencies,
            spec,
            position,
        })
    }
}

impl ActionInfo for DeclaredAction {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn action_type(&self) -> &str {
        &self.action_type
    }

    fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }
}

/// An action placed in the graph, with dependencies and templates resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAction {
    declared: DeclaredAction,
    dependencies: Vec<ActionRef>,
    spec: serde_json::Value,
    position: usize,
}

impl ResolvedAction {
    /// The declaration this action was resolved from.
    pub fn declared(&self) -> &DeclaredAction {
        &self.declared
    }

    /// Resolved dependency references.
    pub fn dependencies(&self) -> &[ActionRef] {
        &self.dependencies
    }

    /// Spec with templates substituted.
    pub fn spec(&self) -> &serde_json::Value {
        &self.spec
    }

    /// Index in the graph's topological order.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Timeout applied to every handler call for this action.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.declared.timeout_secs())
    }
}

impl ActionInfo for ResolvedAction {
    fn kind(&self) -> ActionKind {
        self.declared.kind
    }

    fn name(&self) -> &str {
        &self.declared.name
    }

    fn action_type(&self) -> &str {
        &self.declared.action_type
    }

    fn module_name(&self) -> Option<&str> {
        self.declared.module_name.as_deref()
    }
}

/// Outcome state reported by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionState {
    /// Up to date / completed successfully
    Ready,
    /// Needs processing
    NotReady,
    /// Processing failed
    Failed,
    /// Provider couldn't tell
    Unknown,
}

impl ActionState {
    /// Whether this is a successful terminal state.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// What a handler returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    /// Outcome state
    pub state: ActionState,

    /// Named outputs
    #[serde(default)]
    pub outputs: Outputs,

    /// Provider-specific detail, passed through unmodified
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl HandlerResult {
    /// Create a result with the given state and nothing else.
    pub fn new(state: ActionState) -> Self {
        Self {
            state,
            outputs: Outputs::new(),
            detail: serde_json::Value::Object(Default::default()),
        }
    }

    /// A `ready` result.
    pub fn ready() -> Self {
        Self::new(ActionState::Ready)
    }

    /// A `not-ready` result.
    pub fn not_ready() -> Self {
        Self::new(ActionState::NotReady)
    }

    /// A `failed` result.
    pub fn failed() -> Self {
        Self::new(ActionState::Failed)
    }

    /// Add an output.
    pub fn with_output(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }

    /// Set the detail payload.
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// A resolved action together with the outcome of an operation on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedAction {
    resolved: ResolvedAction,
    state: ActionState,
    outputs: Outputs,
    detail: serde_json::Value,
}

impl ExecutedAction {
    /// Build from a resolved action and the handler's result.
    ///
    /// Outputs are only carried over when the result is `ready`.
    pub fn from_result(resolved: ResolvedAction, result: &HandlerResult) -> Self {
        let outputs = if result.state.is_ready() {
            result.outputs.clone()
        } else {
            Outputs::new()
        };

        Self {
            resolved,
            state: result.state,
            outputs,
            detail: result.detail.clone(),
        }
    }

    /// The resolved action this outcome belongs to.
    pub fn resolved(&self) -> &ResolvedAction {
        &self.resolved
    }

    /// Outcome state
    pub fn state(&self) -> ActionState {
        self.state
    }

    /// Outputs (empty unless ready)
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Look up a single output.
    pub fn output(&self, name: &str) -> Option<&serde_json::Value> {
        self.outputs.get(name)
    }

    /// Provider-specific detail
    pub fn detail(&self) -> &serde_json::Value {
        &self.detail
    }
}

impl ActionInfo for ExecutedAction {
    fn kind(&self) -> ActionKind {
        self.resolved.kind()
    }

    fn name(&self) -> &str {
        self.resolved.name()
    }

    fn action_type(&self) -> &str {
        self.resolved.action_type()
    }

    fn module_name(&self) -> Option<&str> {
        self.resolved.module_name()
    }
}

/// Lifecycle phase of an action value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    /// As written
    Declared,
    /// Placed in the graph
    Resolved,
    /// Operated on
    Executed,
}

/// An action in any phase.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyAction {
    /// Declared phase
    Declared(DeclaredAction),
    /// Resolved phase
    Resolved(ResolvedAction),
    /// Executed phase
    Executed(ExecutedAction),
}

impl AnyAction {
    /// Which phase this value is in.
    pub fn phase(&self) -> ActionPhase {
        match self {
            Self::Declared(_) => ActionPhase::Declared,
            Self::Resolved(_) => ActionPhase::Resolved,
            Self::Executed(_) => ActionPhase::Executed,
        }
    }

    fn info(&self) -> &dyn ActionInfo {
        match self {
            Self::Declared(a) => a,
            Self::Resolved(a) => a,
            Self::Executed(a) => a,
        }
    }
}

impl ActionInfo for AnyAction {
    fn kind(&self) -> ActionKind {
        self.info().kind()
    }

    fn name(&self) -> &str {
        self.info().name()
    }

    fn action_type(&self) -> &str {
        self.info().action_type()
    }

    fn module_name(&self) -> Option<&str> {
        self.info().module_name()
    }
}

impl From<DeclaredAction> for AnyAction {
    fn from(value: DeclaredAction) -> Self {
        Self::Declared(value)
    }
}

impl From<ResolvedAction> for AnyAction {
    fn from(value: ResolvedAction) -> Self {
        Self::Resolved(value)
    }
}

impl From<ExecutedAction> for AnyAction {
    fn from(value: ExecutedAction) -> Self {
        Self::Executed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve_identity(action: DeclaredAction) -> ResolvedAction {
        action
            .resolve(0, &ResolveContext::default(), |dep| Some(dep.clone()))
            .unwrap()
    }

    #[test]
    fn test_kind_preserved_through_phases() {
        for kind in ActionKind::ALL {
            let declared = DeclaredAction::new(kind, "a", "exec");
            assert_eq!(declared.kind(), kind);

            let resolved = resolve_identity(declared);
            assert_eq!(resolved.kind(), kind);

            let executed = ExecutedAction::from_result(resolved, &HandlerResult::ready());
            assert_eq!(executed.kind(), kind);
        }
    }

    #[test]
    fn test_default_timeouts() {
        let deploy = DeclaredAction::new(ActionKind::Deploy, "api", "container");
        assert_eq!(deploy.timeout_secs(), DEFAULT_DEPLOY_TIMEOUT_SEC);

        let build = DeclaredAction::new(ActionKind::Build, "api", "container").with_timeout(42);
        assert_eq!(build.timeout_secs(), 42);
        assert_eq!(resolve_identity(build).timeout(), Duration::from_secs(42));
    }

    #[test]
    fn test_kind_predicates() {
        let deploy = DeclaredAction::new(ActionKind::Deploy, "api", "container");
        assert!(deploy.is_deploy());
        assert!(!deploy.is_build());
        assert!(!deploy.is_test());
        assert!(!deploy.is_run());

        let any = AnyAction::from(resolve_identity(deploy));
        assert_eq!(any.phase(), ActionPhase::Resolved);
        assert!(any.is_deploy());
    }

    #[test]
    fn test_action_ref_parse_and_display() {
        let r: ActionRef = "build.api-image".parse().unwrap();
        assert_eq!(r, ActionRef::new(ActionKind::Build, "api-image"));
        assert_eq!(r.to_string(), "build.api-image");

        let r: ActionRef = "Deploy.api".parse().unwrap();
        assert_eq!(r.kind, ActionKind::Deploy);

        assert!("api".parse::<ActionRef>().is_err());
        assert!("build.".parse::<ActionRef>().is_err());
        assert!("module.api".parse::<ActionRef>().is_err());
    }

    #[test]
    fn test_declared_action_deserializes() {
        let action: DeclaredAction = serde_json::from_value(json!({
            "kind": "Deploy",
            "name": "api",
            "type": "exec",
            "dependencies": ["build.api"],
            "spec": { "command": ["echo", "hi"] },
            "moduleName": "backend"
        }))
        .unwrap();

        assert_eq!(action.kind, ActionKind::Deploy);
        assert_eq!(action.action_type, "exec");
        assert_eq!(action.dependencies, vec![ActionRef::new(ActionKind::Build, "api")]);
        assert_eq!(action.module_name(), Some("backend"));
        assert_eq!(action.timeout, None);
    }

    #[test]
    fn test_resolve_fails_on_missing_dependency() {
        let action = DeclaredAction::new(ActionKind::Deploy, "api", "exec")
            .with_dependency(ActionRef::new(ActionKind::Build, "missing"));

        let err = action
            .resolve(0, &ResolveContext::default(), |_| None)
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingDependency { .. }));
        assert!(err.to_string().contains("build.missing"));
    }

    #[test]
    fn test_resolve_substitutes_templates() {
        let ctx = ResolveContext::new().with_variable("tag", json!("v1"));
        let action = DeclaredAction::new(ActionKind::Build, "api", "exec")
            .with_spec(json!({ "image": "api:${var.tag}" }));

        let resolved = action.resolve(3, &ctx, |d| Some(d.clone())).unwrap();
        assert_eq!(resolved.spec()["image"], "api:v1");
        assert_eq!(resolved.position(), 3);
        assert_eq!(resolved.declared().spec["image"], "api:${var.tag}");
    }

    #[test]
    fn test_outputs_only_on_ready() {
        let resolved = resolve_identity(DeclaredAction::new(ActionKind::Build, "api", "exec"));

        let ok = ExecutedAction::from_result(
            resolved.clone(),
            &HandlerResult::ready().with_output("foo", "bar"),
        );
        assert_eq!(ok.output("foo"), Some(&json!("bar")));

        let failed = ExecutedAction::from_result(
            resolved,
            &HandlerResult::failed()
                .with_output("foo", "bar")
                .with_detail(json!({ "reason": "boom" })),
        );
        assert!(failed.outputs().is_empty());
        assert_eq!(failed.detail()["reason"], "boom");
    }
}
