//! Activity interfaces and the executor that dispatches them by name.
//!
//! An activity is one named unit of external work: one string input, one
//! string result or an explicit failure. Activities never retry internally.

pub mod failure;
pub mod hello;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use failure::FailureInjection;
pub use hello::{HelloActivity, HELLO_ACTIVITY};

/// Explicit failure signalled by an activity
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ActivityFailure {
    pub message: String,
}

impl ActivityFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Trait for activities
#[async_trait]
pub trait Activity: Send + Sync {
    /// Name the orchestrator uses to call this activity
    fn name(&self) -> &str;

    /// Run the activity against one input
    async fn invoke(&self, input: &str) -> Result<String, ActivityFailure>;
}

/// Errors from dispatching an activity call
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The activity ran and reported failure
    #[error(transparent)]
    Failed(#[from] ActivityFailure),

    /// No activity is registered under the requested name
    #[error("Activity '{0}' is not registered")]
    NotRegistered(String),
}

/// Executes activities by name
#[derive(Default, Clone)]
pub struct ActivityRegistry {
    activities: HashMap<String, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity under its own name, replacing any previous one
    pub fn register(mut self, activity: impl Activity + 'static) -> Self {
        let activity: Arc<dyn Activity> = Arc::new(activity);
        self.activities.insert(activity.name().to_string(), activity);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.activities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invoke the named activity with a single input
    pub async fn invoke(&self, name: &str, input: &str) -> Result<String, InvokeError> {
        let activity = self
            .activities
            .get(name)
            .ok_or_else(|| InvokeError::NotRegistered(name.to_string()))?;

        Ok(activity.invoke(input).await?)
    }
}
