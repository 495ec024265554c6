//! Project file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagehand_core::{BasicValidator, ConfigGraph, DeclaredAction, ResolveContext};
use stagehand_execution::RunConfig;
use std::collections::BTreeMap;
use std::path::Path;

/// A project: its variables, actions and run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Values for `${var.<name>}` references
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,

    /// Declared actions
    #[serde(default)]
    pub actions: Vec<DeclaredAction>,

    /// Run settings
    #[serde(default)]
    pub run: RunConfig,
}

impl ProjectConfig {
    /// Read a project file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Could not read project file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid project file {}", path.display()))
    }

    /// Parse a project document.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Validate and resolve the declared actions.
    pub fn graph(&self) -> Result<ConfigGraph> {
        let context = ResolveContext::from_variables(self.variables.clone());
        let graph = ConfigGraph::build(self.actions.clone(), &BasicValidator, &context)?;
        Ok(graph)
    }
}
