//! History events for durable workflow instances.
//!
//! Every state change of an instance is recorded as an immutable event in an
//! append-only history. Replaying the history rebuilds the instance and lets
//! the orchestrator skip work that already happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::WorkflowDefinition;

/// A single event in an instance's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event was recorded (orchestrator clock)
    pub timestamp: DateTime<Utc>,

    /// The instance this event belongs to
    pub instance_id: Uuid,

    /// Type of event
    pub event_type: EventType,

    /// Correlation sequence number for timer and activity events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u32>,

    /// Workflow name (instance_started) or activity name (activity_*)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Activity input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Activity result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Due time of a durable timer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire_at: Option<DateTime<Utc>>,

    /// Idempotency key format: "{instance_id}:{seq}:{activity}:{input_hash}"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    /// Start payload supplied by the trigger
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// Workflow definition the instance was started with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowDefinition>,

    /// Aggregated outputs of a completed instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<String>>,

    /// Failure reason or error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    /// Create a bare event of the given type at the given time
    pub fn new(instance_id: Uuid, event_type: EventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            instance_id,
            event_type,
            seq: None,
            name: None,
            input: None,
            result: None,
            fire_at: None,
            idempotency_key: None,
            payload: None,
            workflow: None,
            outputs: None,
            error: None,
        }
    }

    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_fire_at(mut self, fire_at: DateTime<Utc>) -> Self {
        self.fire_at = Some(fire_at);
        self
    }

    pub fn with_idempotency_key(mut self, key: String) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    pub fn with_payload(mut self, payload: Option<serde_json::Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_workflow(mut self, workflow: WorkflowDefinition) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<String>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// Attach a failure reason or error message
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of events recorded while driving an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The trigger accepted a start request
    InstanceStarted,

    /// A durable timer was scheduled
    TimerCreated,

    /// A durable timer reached its due time
    TimerFired,

    /// An activity call was issued
    ActivityScheduled,

    /// An activity returned a result
    ActivityCompleted,

    /// An activity signalled failure
    ActivityFailed,

    /// All activities succeeded and outputs were aggregated
    InstanceCompleted,

    /// An activity failure aborted the sequence
    InstanceFailed,

    /// An unexpected internal error aborted the sequence
    InstanceErrored,

    /// The instance was terminated from outside
    InstanceCancelled,
}
