//! Workflow instance state and reconstruction from history.
//!
//! A WorkflowInstance is one execution of the orchestrator's workflow. It is
//! never written directly: snapshots are rebuilt by replaying events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventType};
use super::response::WorkflowResponse;

/// Snapshot of a workflow instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier for this instance
    pub id: Uuid,

    /// Name of the workflow being driven
    pub workflow_name: String,

    /// Payload supplied with the start request
    pub payload: Option<serde_json::Value>,

    /// Where the orchestrator currently is
    pub runtime_status: RuntimeStatus,

    /// Custom status label; `None` while in progress
    pub custom_status: Option<StatusLabel>,

    /// Activity outputs collected so far, in invocation order
    pub outputs: Vec<String>,

    /// Terminal outcome once recorded
    pub outcome: Option<Outcome>,

    /// When the start request was accepted
    pub created_at: DateTime<Utc>,

    /// Timestamp of the latest history event
    pub last_updated_at: DateTime<Utc>,

    /// When the instance reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Reconstruct an instance from its history
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first = events.first()?;

        let mut instance = Self {
            id: first.instance_id,
            workflow_name: String::new(),
            payload: None,
            runtime_status: RuntimeStatus::Pending,
            custom_status: None,
            outputs: Vec::new(),
            outcome: None,
            created_at: first.timestamp,
            last_updated_at: first.timestamp,
            completed_at: None,
        };

        for event in events {
            instance.apply_event(event);
        }

        Some(instance)
    }

    /// Apply a single event to update instance state.
    ///
    /// Events after a terminal event are ignored so a finished instance
    /// never changes again.
    pub fn apply_event(&mut self, event: &Event) {
        if self.is_finished() {
            return;
        }
        self.last_updated_at = event.timestamp;

        match event.event_type {
            EventType::InstanceStarted => {
                self.workflow_name = event.name.clone().unwrap_or_default();
                self.payload = event.payload.clone();
                self.created_at = event.timestamp;
                self.runtime_status = RuntimeStatus::Pending;
            }
            EventType::TimerCreated => {
                self.runtime_status = RuntimeStatus::Delaying {
                    fire_at: event.fire_at.unwrap_or(event.timestamp),
                };
            }
            EventType::TimerFired => {
                self.runtime_status = RuntimeStatus::Running;
            }
            EventType::ActivityScheduled => {
                // Calls are sequential, so the current index is the output count
                self.runtime_status = RuntimeStatus::InvokingActivity {
                    index: self.outputs.len(),
                };
            }
            EventType::ActivityCompleted => {
                if let Some(ref result) = event.result {
                    self.outputs.push(result.clone());
                }
                self.runtime_status = RuntimeStatus::Running;
            }
            EventType::ActivityFailed => {}
            EventType::InstanceCompleted => {
                let results = event.outputs.clone().unwrap_or_default();
                self.outputs = results.clone();
                self.finish(Outcome::Completed { results }, event.timestamp);
            }
            EventType::InstanceFailed => {
                let message = event.error.clone().unwrap_or_default();
                self.outputs.clear();
                self.finish(Outcome::FailedActivity { message }, event.timestamp);
            }
            EventType::InstanceErrored => {
                let message = event.error.clone().unwrap_or_default();
                self.outputs.clear();
                self.finish(Outcome::FailedInternal { message }, event.timestamp);
            }
            EventType::InstanceCancelled => {
                self.runtime_status = RuntimeStatus::Cancelled;
                self.custom_status = None;
                self.completed_at = Some(event.timestamp);
            }
        }
    }

    // The label is a function of the outcome, so both change together
    fn finish(&mut self, outcome: Outcome, at: DateTime<Utc>) {
        self.runtime_status = outcome.runtime_status();
        self.custom_status = Some(outcome.status_label());
        self.outcome = Some(outcome);
        self.completed_at = Some(at);
    }

    /// Check if the instance reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.runtime_status.is_terminal()
    }

    /// Outward response for a finished instance (cancelled instances have none)
    pub fn response(&self) -> Option<WorkflowResponse> {
        self.outcome.as_ref().map(Outcome::response)
    }
}

/// Progress of an instance through the workflow state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RuntimeStatus {
    /// Accepted, not yet driven
    Pending,

    /// Suspended on the start delay
    Delaying { fire_at: DateTime<Utc> },

    /// Between suspension points
    Running,

    /// Waiting on the activity at `index` (zero-based)
    InvokingActivity { index: usize },

    /// All activities succeeded
    Completed,

    /// An activity failed
    Failed,

    /// Internal error while orchestrating
    Errored,

    /// Terminated from outside
    Cancelled,
}

impl RuntimeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Errored | Self::Cancelled
        )
    }

    /// Short name for listings
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delaying { .. } => "delaying",
            Self::Running => "running",
            Self::InvokingActivity { .. } => "invoking",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Default for RuntimeStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Custom status label owned by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLabel {
    #[serde(rename = "Custom->Complete")]
    Complete,

    #[serde(rename = "Custom->Fail")]
    Fail,

    #[serde(rename = "Custom->Error")]
    Error,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "Custom->Complete",
            Self::Fail => "Custom->Fail",
            Self::Error => "Custom->Error",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Outcome {
    /// Every activity succeeded; results are in invocation order
    Completed { results: Vec<String> },

    /// An activity signalled failure
    FailedActivity { message: String },

    /// Something other than an activity went wrong
    FailedInternal { message: String },
}

impl Outcome {
    /// The only label consistent with this outcome
    pub fn status_label(&self) -> StatusLabel {
        match self {
            Self::Completed { .. } => StatusLabel::Complete,
            Self::FailedActivity { .. } => StatusLabel::Fail,
            Self::FailedInternal { .. } => StatusLabel::Error,
        }
    }

    pub fn runtime_status(&self) -> RuntimeStatus {
        match self {
            Self::Completed { .. } => RuntimeStatus::Completed,
            Self::FailedActivity { .. } => RuntimeStatus::Failed,
            Self::FailedInternal { .. } => RuntimeStatus::Errored,
        }
    }

    pub fn response(&self) -> WorkflowResponse {
        WorkflowResponse::from_outcome(self)
    }
}
