//! Replay-aware orchestration context.
//!
//! Every timer and activity call gets a sequence number. Before doing any
//! work the context looks the sequence number up in the instance history:
//! work that already finished is answered from history, so re-driving an
//! instance after a restart neither repeats activities nor re-applies the
//! delay. Replay also checks that the body asks for the same work at each
//! sequence number as history recorded; a mismatch is an internal error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activities::{ActivityFailure, ActivityRegistry, InvokeError};
use crate::domain::{Event, EventType};

use super::event_store::{generate_idempotency_key, EventStore};
use super::timer::{DelayScheduler, TimerOutcome};

/// Why the workflow body stopped early
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// An activity reported failure
    #[error(transparent)]
    Activity(#[from] ActivityFailure),

    /// Anything else went wrong while orchestrating
    #[error("{0}")]
    Internal(String),

    /// The instance was terminated from outside
    #[error("Instance was cancelled")]
    Cancelled,
}

impl From<anyhow::Error> for WorkflowError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", err))
    }
}

/// Context handed to the workflow body for one instance
pub struct OrchestrationContext {
    instance_id: Uuid,
    history: Vec<Event>,
    store: EventStore,
    scheduler: DelayScheduler,
    activities: Arc<ActivityRegistry>,
    cancel: CancellationToken,
    current_time: DateTime<Utc>,
    next_seq: u32,
}

impl OrchestrationContext {
    /// Build a context from an instance history that holds its start event
    pub fn new(
        instance_id: Uuid,
        history: Vec<Event>,
        store: EventStore,
        scheduler: DelayScheduler,
        activities: Arc<ActivityRegistry>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let started = history
            .iter()
            .find(|e| e.event_type == EventType::InstanceStarted)
            .ok_or_else(|| anyhow::anyhow!("Instance {} has no start event", instance_id))?;
        let current_time = started.timestamp;

        Ok(Self {
            instance_id,
            history,
            store,
            scheduler,
            activities,
            cancel,
            current_time,
            next_seq: 0,
        })
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Orchestrator time: the timestamp of the latest history event reached.
    ///
    /// Stable across replays, unlike the wall clock.
    pub fn current_utc_date_time(&self) -> DateTime<Utc> {
        self.current_time
    }

    pub fn history(&self) -> &[Event] {
        &self.history
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn recorded(&self, seq: u32, event_type: EventType) -> Option<&Event> {
        self.history
            .iter()
            .find(|e| e.seq == Some(seq) && e.event_type == event_type)
    }

    /// Reject history at `seq` that records a different step than the one requested
    fn check_replay(&self, seq: u32, step: Step<'_>) -> Result<(), WorkflowError> {
        for event in self.history.iter().filter(|e| e.seq == Some(seq)) {
            let matches = match (step, event.event_type) {
                (Step::Timer, EventType::TimerCreated | EventType::TimerFired) => true,
                (
                    Step::Activity { name, input },
                    EventType::ActivityScheduled
                    | EventType::ActivityCompleted
                    | EventType::ActivityFailed,
                ) => {
                    event.name.as_deref().map_or(true, |n| n == name)
                        && event.input.as_deref().map_or(true, |i| i == input)
                }
                _ => false,
            };

            if !matches {
                return Err(WorkflowError::Internal(format!(
                    "Non-deterministic replay at step {}: history has {:?}{}, workflow asked for {}",
                    seq,
                    event.event_type,
                    event
                        .name
                        .as_deref()
                        .map(|n| format!(" of '{}'", n))
                        .unwrap_or_default(),
                    step,
                )));
            }
        }
        Ok(())
    }

    /// New event stamped with the clock's current time
    pub(crate) fn event(&self, event_type: EventType) -> Event {
        Event::new(self.instance_id, event_type, self.scheduler.clock().now())
    }

    /// Persist an event and advance orchestrator time to it
    pub(crate) async fn record(&mut self, event: Event) -> Result<(), WorkflowError> {
        self.store.append(&event).await?;
        self.current_time = event.timestamp;
        self.history.push(event);
        Ok(())
    }

    /// Durable timer: suspend until `fire_at`.
    ///
    /// A timer already created in history keeps its recorded due time; a
    /// timer already fired returns without suspending.
    pub async fn create_timer(&mut self, fire_at: DateTime<Utc>) -> Result<(), WorkflowError> {
        let seq = self.next_seq();
        self.check_replay(seq, Step::Timer)?;

        if let Some(fired_at) = self.recorded(seq, EventType::TimerFired).map(|e| e.timestamp) {
            debug!(seq, "Timer already fired (replay)");
            self.current_time = fired_at;
            return Ok(());
        }

        let fire_at = match self
            .recorded(seq, EventType::TimerCreated)
            .and_then(|e| e.fire_at)
        {
            Some(recorded) => recorded,
            None => {
                let created = self
                    .event(EventType::TimerCreated)
                    .with_seq(seq)
                    .with_fire_at(fire_at);
                self.record(created).await?;
                fire_at
            }
        };

        info!(instance_id = %self.instance_id, %fire_at, "Waiting for timer");

        if self.scheduler.suspend_until(fire_at, &self.cancel).await == TimerOutcome::Cancelled {
            return Err(WorkflowError::Cancelled);
        }

        let mut fired = self.event(EventType::TimerFired).with_seq(seq).with_fire_at(fire_at);
        fired.timestamp = fired.timestamp.max(fire_at);
        self.record(fired).await
    }

    /// Call an activity and wait for its result.
    ///
    /// A call already answered in history returns the recorded result or
    /// failure without invoking the activity again.
    pub async fn call_activity(&mut self, name: &str, input: &str) -> Result<String, WorkflowError> {
        let seq = self.next_seq();
        self.check_replay(seq, Step::Activity { name, input })?;

        let answered = self.history.iter().find(|e| {
            e.seq == Some(seq)
                && matches!(
                    e.event_type,
                    EventType::ActivityCompleted | EventType::ActivityFailed
                )
        });
        if let Some(event) = answered {
            debug!(seq, activity = name, "Activity already answered (replay)");
            let timestamp = event.timestamp;
            let replayed = match event.event_type {
                EventType::ActivityCompleted => Ok(event.result.clone().unwrap_or_default()),
                _ => Err(WorkflowError::Activity(ActivityFailure::new(
                    event.error.clone().unwrap_or_default(),
                ))),
            };
            self.current_time = timestamp;
            return replayed;
        }

        if self.cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        if !self.activities.contains(name) {
            warn!(activity = name, available = ?self.activities.names(), "Activity not registered");
            return Err(WorkflowError::Internal(
                InvokeError::NotRegistered(name.to_string()).to_string(),
            ));
        }

        if self.recorded(seq, EventType::ActivityScheduled).is_none() {
            let key = generate_idempotency_key(self.instance_id, seq, name, input);
            let scheduled = self
                .event(EventType::ActivityScheduled)
                .with_seq(seq)
                .with_name(name)
                .with_input(input)
                .with_idempotency_key(key);
            self.record(scheduled).await?;
        }

        info!(instance_id = %self.instance_id, seq, activity = name, %input, "Calling activity");

        let activities = self.activities.clone();
        let cancel = self.cancel.clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
            result = activities.invoke(name, input) => result,
        };

        match result {
            Ok(output) => {
                let completed = self
                    .event(EventType::ActivityCompleted)
                    .with_seq(seq)
                    .with_name(name)
                    .with_result(output.clone());
                self.record(completed).await?;
                Ok(output)
            }
            Err(InvokeError::Failed(failure)) => {
                warn!(instance_id = %self.instance_id, seq, activity = name, error = %failure, "Activity failed");
                let failed = self
                    .event(EventType::ActivityFailed)
                    .with_seq(seq)
                    .with_name(name)
                    .with_error(failure.message.clone());
                self.record(failed).await?;
                Err(WorkflowError::Activity(failure))
            }
            Err(err @ InvokeError::NotRegistered(_)) => Err(WorkflowError::Internal(err.to_string())),
        }
    }
}

/// Work requested at one sequence number
#[derive(Debug, Clone, Copy)]
enum Step<'a> {
    Timer,
    Activity { name: &'a str, input: &'a str },
}

impl std::fmt::Display for Step<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timer => write!(f, "a timer"),
            Self::Activity { name, input } => write!(f, "'{}' with input '{}'", name, input),
        }
    }
}
