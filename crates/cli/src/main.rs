//! stagehand CLI - dependency-aware action runner.

mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::ProjectConfig;
use stagehand_core::{ActionInfo, ActionKind, ActionRef, ConfigGraph, EventLog, TracingLog};
use stagehand_execution::{select_from_graph, ActionOutcome, ActionRouter, RunReport, Scheduler};
use stagehand_plugins::{register_exec, HandlerRegistry};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Build, deploy, test and run project actions in dependency order", long_about = None)]
struct Cli {
    /// Project file
    #[arg(short, long, global = true, default_value = "stagehand.json")]
    project: PathBuf,

    /// Print the event log as JSON lines when done
    #[arg(long, global = true)]
    events: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the selected actions in dependency order
    Plan {
        /// Action kind (build, deploy, test, run)
        kind: ActionKind,
        /// Names or wildcards; all actions of the kind when omitted
        names: Vec<String>,
    },
    /// Check the status of the selected actions
    Status {
        /// Action kind (build, deploy, test, run)
        kind: ActionKind,
        /// Names or wildcards; all actions of the kind when omitted
        names: Vec<String>,
    },
    /// Execute the selected actions and their dependencies
    Run {
        /// Action kind (build, deploy, test, run)
        kind: ActionKind,
        /// Names or wildcards; all actions of the kind when omitted
        names: Vec<String>,
        /// Execute even if the status is ready
        #[arg(long)]
        force: bool,
        /// Don't run dependencies
        #[arg(long)]
        no_deps: bool,
        /// Max actions in flight
        #[arg(long)]
        concurrency: Option<NonZeroUsize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let project = ProjectConfig::load(&cli.project).await?;
    let graph = Arc::new(project.graph()?);
    info!("Loaded project {} ({} actions)", project.name, graph.len());

    let mut registry = HandlerRegistry::new();
    register_exec(&mut registry)?;
    let events = EventLog::new();
    let router = ActionRouter::new(Arc::new(registry), events.clone());

    let result = dispatch(cli.command, &project, graph, router).await;

    if cli.events {
        for event in events.events() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    result
}

async fn dispatch(
    command: Commands,
    project: &ProjectConfig,
    graph: Arc<ConfigGraph>,
    router: ActionRouter,
) -> Result<()> {
    let log = TracingLog::with_section("select");

    match command {
        Commands::Plan { kind, names } => {
            let requested = select(&graph, kind, &names, &log)?;
            let planned = graph.with_dependencies(&requested)?;

            println!("Plan ({})", planned.len());
            for action in planned {
                let deps: Vec<String> =
                    action.dependencies().iter().map(ToString::to_string).collect();
                if deps.is_empty() {
                    println!("  {} [{}]", action.reference(), action.action_type());
                } else {
                    println!(
                        "  {} [{}] <- {}",
                        action.reference(),
                        action.action_type(),
                        deps.join(", ")
                    );
                }
            }
        }
        Commands::Status { kind, names } => {
            let requested = select(&graph, kind, &names, &log)?;
            let config = project.run.clone().with_dependencies(false);
            let scheduler = Scheduler::new(router).with_config(config);

            let report = scheduler.status(graph, &requested).await?;
            print_report(&report);
        }
        Commands::Run {
            kind,
            names,
            force,
            no_deps,
            concurrency,
        } => {
            let requested = select(&graph, kind, &names, &log)?;
            let mut config = project.run.clone();
            if force {
                config = config.with_force(true);
            }
            if no_deps {
                config = config.with_dependencies(false);
            }
            if let Some(max) = concurrency {
                config = config.with_max_concurrency(max);
            }
            let scheduler = Scheduler::new(router).with_config(config);

            let report = scheduler.run(graph, &requested).await?;
            print_report(&report);

            let failed = report.failures().count();
            if failed > 0 {
                anyhow::bail!("{} of {} action(s) did not succeed", failed, report.len());
            }
        }
    }

    Ok(())
}

fn select(
    graph: &ConfigGraph,
    kind: ActionKind,
    names: &[String],
    log: &TracingLog,
) -> Result<Vec<ActionRef>> {
    let names = (!names.is_empty()).then_some(names);
    let selected = select_from_graph(graph, kind, names, log)?;
    Ok(selected.iter().map(|a| a.reference()).collect())
}

fn print_report(report: &RunReport) {
    println!("Run {}", report.run_id);
    for (action, outcome) in report.outcomes() {
        match outcome {
            ActionOutcome::Failed(err) => println!("  {} | ERROR | {}", action, err),
            ActionOutcome::Skipped { dependency } => {
                println!("  {} | SKIPPED | {} did not succeed", action, dependency)
            }
            ActionOutcome::Aborted { reason } => println!("  {} | ABORTED | {}", action, reason),
            other => {
                let state = other
                    .executed()
                    .map(|a| format!("{:?}", a.state()))
                    .unwrap_or_default();
                println!("  {} | {} | {}", action, other.label().to_uppercase(), state);
            }
        }
    }
}
