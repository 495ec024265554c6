//! Built-in `exec` provider: actions backed by local commands.
//!
//! Fields read from the action's spec:
//!
//! - `command`: argv run by the execute operation
//! - `statusCommand`: argv whose exit code decides status (0 = ready)
//! - `cleanupCommand`: argv run when a Deploy is deleted
//! - `env`: extra environment variables for all of the above

use crate::handler::{ActionHandler, HandlerParams};
use crate::registry::{HandlerRegistry, RegistryError};
use async_trait::async_trait;
use serde::Deserialize;
use stagehand_core::{ActionInfo, ActionKind, HandlerResult, Operation};
use std::collections::BTreeMap;
use tokio::process::Command;

/// Provider type served by the exec handlers.
pub const EXEC_TYPE: &str = "exec";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecSpec {
    #[serde(default)]
    command: Vec<String>,
    #[serde(default)]
    status_command: Vec<String>,
    #[serde(default)]
    cleanup_command: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

struct CommandOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn success(&self) -> bool {
        self.exit_code == 0
    }

    fn into_result(self, result: HandlerResult) -> HandlerResult {
        result
            .with_output("log", self.stdout.trim().to_string())
            .with_output("exitCode", self.exit_code)
            .with_detail(serde_json::json!({
                "exitCode": self.exit_code,
                "stderr": self.stderr,
            }))
    }
}

async fn run(argv: &[String], env: &BTreeMap<String, String>) -> anyhow::Result<CommandOutput> {
    let Some((program, args)) = argv.split_first() else {
        anyhow::bail!("Empty command");
    };

    let output = Command::new(program)
        .args(args)
        .envs(env)
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

fn parse_spec(params: &HandlerParams<'_>) -> anyhow::Result<ExecSpec> {
    let spec = params.action.spec();
    if spec.is_null() {
        return Ok(ExecSpec::default());
    }
    serde_json::from_value(spec.clone())
        .map_err(|e| anyhow::anyhow!("Invalid exec spec for {}: {}", params.action.reference(), e))
}

/// Reports ready when `statusCommand` exits 0.
pub struct ExecStatusHandler;

#[async_trait]
impl ActionHandler for ExecStatusHandler {
    async fn handle(&self, params: HandlerParams<'_>) -> anyhow::Result<HandlerResult> {
        let spec = parse_spec(&params)?;
        if spec.status_command.is_empty() {
            return Ok(HandlerResult::not_ready());
        }

        params
            .log
            .debug(&format!("Running status command: {}", spec.status_command.join(" ")));
        let output = run(&spec.status_command, &spec.env).await?;
        let state = if output.success() {
            HandlerResult::ready()
        } else {
            HandlerResult::not_ready()
        };
        Ok(output.into_result(state))
    }
}

/// Runs `command`.
///
/// A non-zero exit fails Build and Deploy actions outright; Test and Run
/// actions report a `failed` result instead, keeping the command output.
pub struct ExecHandler;

#[async_trait]
impl ActionHandler for ExecHandler {
    async fn handle(&self, params: HandlerParams<'_>) -> anyhow::Result<HandlerResult> {
        let spec = parse_spec(&params)?;
        if spec.command.is_empty() {
            return Ok(HandlerResult::ready());
        }

        params
            .log
            .verbose(&format!("Running command: {}", spec.command.join(" ")));
        let output = run(&spec.command, &spec.env).await?;

        if output.success() {
            return Ok(output.into_result(HandlerResult::ready()));
        }

        match params.action.kind() {
            ActionKind::Test | ActionKind::Run => Ok(output.into_result(HandlerResult::failed())),
            ActionKind::Build | ActionKind::Deploy => anyhow::bail!(
                "Command \"{}\" failed with exit code {}: {}",
                spec.command.join(" "),
                output.exit_code,
                output.stderr.trim()
            ),
        }
    }
}

/// Runs `cleanupCommand` when a Deploy is deleted.
pub struct ExecCleanupHandler;

#[async_trait]
impl ActionHandler for ExecCleanupHandler {
    async fn handle(&self, params: HandlerParams<'_>) -> anyhow::Result<HandlerResult> {
        let spec = parse_spec(&params)?;
        if spec.cleanup_command.is_empty() {
            return Ok(HandlerResult::not_ready());
        }

        let output = run(&spec.cleanup_command, &spec.env).await?;
        if !output.success() {
            anyhow::bail!(
                "Cleanup command failed with exit code {}: {}",
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output.into_result(HandlerResult::not_ready()))
    }
}

/// Register the exec provider for every kind.
pub fn register_exec(registry: &mut HandlerRegistry) -> Result<(), RegistryError> {
    for kind in ActionKind::ALL {
        registry
            .register(kind, EXEC_TYPE, Operation::GetStatus, ExecStatusHandler)?
            .register(kind, EXEC_TYPE, Operation::Execute, ExecHandler)?;
    }
    registry.register(ActionKind::Deploy, EXEC_TYPE, Operation::Delete, ExecCleanupHandler)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stagehand_core::{
        ActionState, BasicValidator, ConfigGraph, DeclaredAction, MemoryLog, ResolveContext,
    };

    fn graph(kind: ActionKind, spec: serde_json::Value) -> ConfigGraph {
        ConfigGraph::build(
            vec![DeclaredAction::new(kind, "cmd", EXEC_TYPE).with_spec(spec)],
            &BasicValidator::new(),
            &ResolveContext::default(),
        )
        .unwrap()
    }

    async fn call(
        handler: &dyn ActionHandler,
        kind: ActionKind,
        spec: serde_json::Value,
    ) -> anyhow::Result<HandlerResult> {
        let graph = graph(kind, spec);
        let log = MemoryLog::new();
        let action = graph.get_by_name(kind, "cmd").unwrap();
        handler
            .handle(HandlerParams {
                action,
                graph: &graph,
                log: &log,
            })
            .await
    }

    #[test]
    fn test_register_exec() {
        let mut registry = HandlerRegistry::new();
        register_exec(&mut registry).unwrap();
        assert_eq!(registry.len(), 9);
        assert!(registry
            .lookup(ActionKind::Deploy, EXEC_TYPE, Operation::Delete)
            .is_some());
    }

    #[tokio::test]
    async fn test_execute_captures_output() {
        let result = call(
            &ExecHandler,
            ActionKind::Build,
            json!({ "command": ["echo", "hello"] }),
        )
        .await
        .unwrap();

        assert_eq!(result.state, ActionState::Ready);
        assert_eq!(result.outputs["log"], "hello");
        assert_eq!(result.outputs["exitCode"], 0);
    }

    #[tokio::test]
    async fn test_execute_without_command_is_ready() {
        let result = call(&ExecHandler, ActionKind::Deploy, json!({})).await.unwrap();
        assert_eq!(result.state, ActionState::Ready);
    }

    #[tokio::test]
    async fn test_failing_test_reports_failed_state() {
        let result = call(&ExecHandler, ActionKind::Test, json!({ "command": ["false"] }))
            .await
            .unwrap();
        assert_eq!(result.state, ActionState::Failed);
    }

    #[tokio::test]
    async fn test_failing_build_errors() {
        let err = call(&ExecHandler, ActionKind::Build, json!({ "command": ["false"] }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit code 1"));
    }

    #[tokio::test]
    async fn test_status_without_command_is_not_ready() {
        let result = call(&ExecStatusHandler, ActionKind::Run, json!({})).await.unwrap();
        assert_eq!(result.state, ActionState::NotReady);
    }

    #[tokio::test]
    async fn test_status_command_exit_code() {
        let ready = call(
            &ExecStatusHandler,
            ActionKind::Deploy,
            json!({ "statusCommand": ["true"] }),
        )
        .await
        .unwrap();
        assert_eq!(ready.state, ActionState::Ready);

        let stale = call(
            &ExecStatusHandler,
            ActionKind::Deploy,
            json!({ "statusCommand": ["false"] }),
        )
        .await
        .unwrap();
        assert_eq!(stale.state, ActionState::NotReady);
    }

    #[tokio::test]
    async fn test_invalid_spec() {
        let err = call(&ExecHandler, ActionKind::Run, json!({ "command": "echo hi" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid exec spec for run.cmd"));
    }
}
