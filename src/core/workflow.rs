//! Workflow definitions and loading.
//!
//! A workflow is a fixed start delay followed by one activity called once
//! per configured input, strictly in order.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::activities::HELLO_ACTIVITY;

/// Name of the built-in workflow
pub const DEFAULT_WORKFLOW: &str = "hello_sequence";

/// Longest accepted start delay (one year)
pub const MAX_DELAY_SECONDS: u64 = 365 * 24 * 60 * 60;

/// A complete workflow definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name (used by the trigger route)
    #[serde(default = "default_name")]
    pub name: String,

    /// Delay between start and the first activity call, in seconds
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,

    /// Activity called for each input
    #[serde(default = "default_activity")]
    pub activity: String,

    /// Ordered activity inputs
    #[serde(default = "default_inputs")]
    pub inputs: Vec<String>,
}

fn default_name() -> String {
    DEFAULT_WORKFLOW.to_string()
}
fn default_delay_seconds() -> u64 {
    10
}
fn default_activity() -> String {
    HELLO_ACTIVITY.to_string()
}
fn default_inputs() -> Vec<String> {
    vec!["Tokyo".to_string(), "Seattle".to_string(), "London".to_string()]
}

impl Default for WorkflowDefinition {
    fn default() -> Self {
        Self {
            name: default_name(),
            delay_seconds: default_delay_seconds(),
            activity: default_activity(),
            inputs: default_inputs(),
        }
    }
}

impl WorkflowDefinition {
    /// Load a workflow from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a workflow from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse workflow YAML")
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Workflow name cannot be empty");
        }

        if self.activity.trim().is_empty() {
            anyhow::bail!("Workflow '{}' has an empty activity name", self.name);
        }

        if self.inputs.is_empty() {
            anyhow::bail!("Workflow '{}' must have at least one input", self.name);
        }

        if self.delay_seconds > MAX_DELAY_SECONDS {
            anyhow::bail!(
                "Workflow '{}' delay of {}s exceeds the maximum of {}s",
                self.name,
                self.delay_seconds,
                MAX_DELAY_SECONDS
            );
        }

        Ok(())
    }

    /// The start delay as a chrono duration; `None` if it does not fit
    pub fn delay(&self) -> Option<chrono::Duration> {
        i64::try_from(self.delay_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }
}
