//! Template substitution for action specs.
//!
//! Strings in a spec may reference run variables as `${var.<name>}`. A string
//! that is exactly one reference takes the variable's value as-is, keeping
//! its JSON type; references embedded in longer strings are stringified.

use crate::error::TemplateError;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{\s*var\.([A-Za-z0-9_-]+)\s*\}").expect("template pattern is valid")
    })
}

/// Variables available when resolving action specs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveContext {
    variables: BTreeMap<String, Value>,
}

impl ResolveContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from a variable map.
    pub fn from_variables(variables: BTreeMap<String, Value>) -> Self {
        Self { variables }
    }

    /// Set a variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Look up a variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Render every string in `value`, recursing through arrays and objects.
    pub fn render(&self, value: &Value) -> Result<Value, TemplateError> {
        match value {
            Value::String(s) => self.render_str(s),
            Value::Array(items) => items
                .iter()
                .map(|item| self.render(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.render(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn render_str(&self, s: &str) -> Result<Value, TemplateError> {
        let pattern = reference_pattern();

        if let Some(caps) = pattern.captures(s) {
            if caps.get(0).map(|m| m.as_str().len()) == Some(s.len()) {
                return self.lookup(&caps[1]).cloned();
            }
        } else {
            return Ok(Value::String(s.to_string()));
        }

        let mut missing = None;
        let rendered = pattern.replace_all(s, |caps: &Captures| match self.lookup(&caps[1]) {
            Ok(Value::String(v)) => v.clone(),
            Ok(v) => v.to_string(),
            Err(e) => {
                missing.get_or_insert(e);
                String::new()
            }
        });

        match missing {
            Some(e) => Err(e),
            None => Ok(Value::String(rendered.into_owned())),
        }
    }

    fn lookup(&self, name: &str) -> Result<&Value, TemplateError> {
        self.variables
            .get(name)
            .ok_or_else(|| TemplateError::MissingVariable(name.to_string()))
    }
}
