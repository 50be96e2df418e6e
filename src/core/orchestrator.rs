//! Workflow orchestrator.
//!
//! Drives one instance through the delay, the sequential activity calls and
//! aggregation, then classifies how it ended. Activity failures and internal
//! errors settle into different terminal states with different responses.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::activities::ActivityRegistry;
use crate::domain::{Event, EventType, Outcome, RuntimeStatus, WorkflowInstance, WorkflowResponse};

use super::clock::{Clock, SystemClock};
use super::context::{OrchestrationContext, WorkflowError};
use super::event_store::EventStore;
use super::timer::DelayScheduler;
use super::workflow::WorkflowDefinition;

/// How a run of the orchestrator ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Reached one of the three terminal outcomes
    Finished(Outcome),

    /// Terminated from outside before finishing
    Cancelled,
}

impl Termination {
    /// Outward response; cancelled runs have none
    pub fn response(&self) -> Option<WorkflowResponse> {
        match self {
            Self::Finished(outcome) => Some(outcome.response()),
            Self::Cancelled => None,
        }
    }

    fn of(instance: &WorkflowInstance) -> Option<Self> {
        match (&instance.outcome, &instance.runtime_status) {
            (Some(outcome), _) => Some(Self::Finished(outcome.clone())),
            (None, RuntimeStatus::Cancelled) => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Main workflow orchestrator
pub struct Orchestrator {
    workflow: WorkflowDefinition,
    activities: Arc<ActivityRegistry>,
    clock: Arc<dyn Clock>,
    instances_dir: PathBuf,
}

impl Orchestrator {
    /// Create an orchestrator storing instance histories under `instances_dir`
    pub fn new(
        workflow: WorkflowDefinition,
        activities: ActivityRegistry,
        instances_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            workflow,
            activities: Arc::new(activities),
            clock: Arc::new(SystemClock),
            instances_dir: instances_dir.into(),
        }
    }

    /// Replace the clock (tests drive time manually)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn workflow(&self) -> &WorkflowDefinition {
        &self.workflow
    }

    /// Allocate a new instance and record its start with the workflow definition
    #[instrument(skip(self, payload), fields(workflow = %self.workflow.name))]
    pub async fn create_instance(&self, payload: Option<serde_json::Value>) -> Result<Uuid> {
        let instance_id = Uuid::new_v4();
        let store = EventStore::open(&self.instances_dir, instance_id).await?;

        let started = Event::new(instance_id, EventType::InstanceStarted, self.clock.now())
            .with_name(self.workflow.name.clone())
            .with_workflow(self.workflow.clone())
            .with_payload(payload);
        store.append(&started).await?;

        info!(%instance_id, "Started orchestration");
        Ok(instance_id)
    }

    /// Create an instance and drive it to the end
    pub async fn execute(&self, payload: Option<serde_json::Value>) -> Result<(Uuid, Termination)> {
        let instance_id = self.create_instance(payload).await?;
        let termination = self
            .drive_instance(instance_id, CancellationToken::new())
            .await?;
        Ok((instance_id, termination))
    }

    /// Drive an instance from its recorded history until it terminates.
    ///
    /// Work already in history is replayed, not repeated. The instance runs
    /// the definition recorded at its start; histories without one fall back
    /// to this orchestrator's definition. A terminal instance is left
    /// untouched and its recorded ending returned.
    #[instrument(skip(self, cancel), fields(workflow = %self.workflow.name))]
    pub async fn drive_instance(
        &self,
        instance_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<Termination> {
        let store = EventStore::existing(&self.instances_dir, instance_id)
            .await?
            .with_context(|| format!("Instance {} not found", instance_id))?;
        let history = store.replay().await?;

        let instance = WorkflowInstance::from_events(&history)
            .with_context(|| format!("Instance {} has an empty history", instance_id))?;
        if let Some(termination) = Termination::of(&instance) {
            info!(%instance_id, status = instance.runtime_status.as_str(), "Instance already terminal");
            return Ok(termination);
        }

        let workflow = history
            .iter()
            .find(|e| e.event_type == EventType::InstanceStarted)
            .and_then(|e| e.workflow.clone())
            .unwrap_or_else(|| self.workflow.clone());
        if workflow != self.workflow {
            info!(%instance_id, recorded = %workflow.name, "Driving recorded workflow definition");
        }

        let mut ctx = OrchestrationContext::new(
            instance_id,
            history,
            store,
            DelayScheduler::new(self.clock.clone()),
            self.activities.clone(),
            cancel,
        )?;

        self.run(&mut ctx, &workflow).await
    }

    /// Run the workflow body and settle the terminal state.
    ///
    /// Every workflow error is absorbed into one of the three outcomes or a
    /// cancellation. Only a failure to record that ending is returned as an
    /// error, since the instance would otherwise report a state its history
    /// does not hold.
    pub async fn run(
        &self,
        ctx: &mut OrchestrationContext,
        workflow: &WorkflowDefinition,
    ) -> Result<Termination> {
        let instance_id = ctx.instance_id();

        let outcome = match Self::sequence(ctx, workflow).await {
            Ok(results) => {
                info!(%instance_id, results = results.len(), "Orchestration completed");
                Outcome::Completed { results }
            }
            Err(WorkflowError::Activity(failure)) => {
                error!(%instance_id, "Function failed with exception: {}", failure.message);
                Outcome::FailedActivity {
                    message: failure.message,
                }
            }
            Err(WorkflowError::Internal(message)) => {
                error!(%instance_id, "An error occurred: {}", message);
                Outcome::FailedInternal { message }
            }
            Err(WorkflowError::Cancelled) => {
                warn!(%instance_id, "Orchestration cancelled");
                let cancelled = ctx.event(EventType::InstanceCancelled);
                ctx.record(cancelled)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to record cancellation: {}", e))?;
                return Ok(Termination::Cancelled);
            }
        };

        Self::settle(ctx, &outcome).await?;
        Ok(Termination::Finished(outcome))
    }

    /// Delay, then call the activity once per input, strictly in order
    async fn sequence(
        ctx: &mut OrchestrationContext,
        workflow: &WorkflowDefinition,
    ) -> Result<Vec<String>, WorkflowError> {
        workflow
            .validate()
            .map_err(|e| WorkflowError::Internal(e.to_string()))?;

        let start = ctx.current_utc_date_time();
        let due_time = workflow
            .delay()
            .and_then(|delay| start.checked_add_signed(delay))
            .ok_or_else(|| {
                WorkflowError::Internal(format!(
                    "Delay of {}s from {} is out of range",
                    workflow.delay_seconds, start
                ))
            })?;
        ctx.create_timer(due_time).await?;

        let mut outputs = Vec::with_capacity(workflow.inputs.len());
        for input in &workflow.inputs {
            outputs.push(ctx.call_activity(&workflow.activity, input).await?);
        }

        Ok(outputs)
    }

    /// Record the terminal event; its type alone determines the status label
    async fn settle(ctx: &mut OrchestrationContext, outcome: &Outcome) -> Result<()> {
        let event = match outcome {
            Outcome::Completed { results } => ctx
                .event(EventType::InstanceCompleted)
                .with_outputs(results.clone()),
            Outcome::FailedActivity { message } => {
                ctx.event(EventType::InstanceFailed).with_error(message.clone())
            }
            Outcome::FailedInternal { message } => {
                ctx.event(EventType::InstanceErrored).with_error(message.clone())
            }
        };

        let instance_id = ctx.instance_id();
        ctx.record(event).await.map_err(|e| {
            error!(%instance_id, error = %e, "Failed to record terminal state");
            anyhow::anyhow!("Failed to record terminal state of {}: {}", instance_id, e)
        })
    }

    /// Cancel an instance that no task is driving
    pub async fn record_cancellation(&self, instance_id: Uuid) -> Result<()> {
        let store = EventStore::existing(&self.instances_dir, instance_id)
            .await?
            .with_context(|| format!("Instance {} not found", instance_id))?;

        let event = Event::new(instance_id, EventType::InstanceCancelled, self.clock.now());
        store.append(&event).await?;

        warn!(%instance_id, "Instance cancelled while idle");
        Ok(())
    }

    /// Get a snapshot of an instance by ID
    pub async fn status(&self, instance_id: Uuid) -> Result<Option<WorkflowInstance>> {
        let Some(store) = EventStore::existing(&self.instances_dir, instance_id).await? else {
            return Ok(None);
        };
        let events = store.replay().await?;

        Ok(WorkflowInstance::from_events(&events))
    }

    /// List instances, most recent first
    pub async fn list_instances(&self, limit: usize) -> Result<Vec<WorkflowInstance>> {
        let ids = EventStore::list_instances(&self.instances_dir).await?;
        let mut instances = Vec::new();

        for id in ids {
            match self.status(id).await {
                Ok(Some(instance)) => instances.push(instance),
                Ok(None) => {}
                Err(e) => warn!(instance_id = %id, error = %e, "Skipping unreadable instance"),
            }
        }

        instances.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        instances.truncate(limit);

        Ok(instances)
    }

    /// IDs of instances that have not reached a terminal state
    pub async fn unfinished_instances(&self) -> Result<Vec<Uuid>> {
        let instances = self.list_instances(usize::MAX).await?;
        Ok(instances
            .into_iter()
            .filter(|i| !i.is_finished())
            .map(|i| i.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::{Activity, ActivityFailure, FailureInjection, HelloActivity};
    use crate::core::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;

    /// Greets, but wipes the instances directory first
    struct DiskLossActivity {
        root: PathBuf,
    }

    #[async_trait]
    impl Activity for DiskLossActivity {
        fn name(&self) -> &str {
            "say_hello"
        }

        async fn invoke(&self, input: &str) -> Result<String, ActivityFailure> {
            std::fs::remove_dir_all(&self.root).map_err(|e| ActivityFailure::new(e.to_string()))?;
            Ok(format!("Hello {}!", input))
        }
    }

    fn orchestrator(temp: &TempDir, workflow: WorkflowDefinition, failure: FailureInjection) -> Orchestrator {
        let activities = ActivityRegistry::new().register(HelloActivity::new(failure));
        Orchestrator::new(workflow, activities, temp.path())
            .with_clock(Arc::new(ManualClock::new(Utc::now())))
    }

    fn no_delay() -> WorkflowDefinition {
        WorkflowDefinition {
            delay_seconds: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_instance_records_start() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, no_delay(), FailureInjection::Never);

        let id = orch
            .create_instance(Some(serde_json::json!({"k": 1})))
            .await
            .unwrap();

        let instance = orch.status(id).await.unwrap().unwrap();
        assert_eq!(instance.runtime_status, RuntimeStatus::Pending);
        assert_eq!(instance.workflow_name, "hello_sequence");
        assert_eq!(instance.payload, Some(serde_json::json!({"k": 1})));
        assert!(instance.custom_status.is_none());

        let store = EventStore::existing(temp.path(), id).await.unwrap().unwrap();
        let started = &store.replay().await.unwrap()[0];
        assert_eq!(started.workflow.as_ref(), Some(&no_delay()));
    }

    #[tokio::test]
    async fn test_unrecordable_ending_is_an_error() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("instances");
        let orch = Orchestrator::new(
            no_delay(),
            ActivityRegistry::new().register(DiskLossActivity { root: root.clone() }),
            root.clone(),
        )
        .with_clock(Arc::new(ManualClock::new(Utc::now())));

        let err = orch.execute(None).await.unwrap_err();
        assert!(
            format!("{:#}", err).contains("Failed to record terminal state"),
            "unexpected error: {:#}",
            err
        );
    }

    #[tokio::test]
    async fn test_invalid_workflow_errors() {
        let temp = TempDir::new().unwrap();
        let workflow = WorkflowDefinition {
            inputs: Vec::new(),
            ..no_delay()
        };
        let orch = orchestrator(&temp, workflow, FailureInjection::Never);

        let (_, termination) = orch.execute(None).await.unwrap();
        let response = termination.response().unwrap();
        assert_eq!(response.status_code, 400);
    }

    #[tokio::test]
    async fn test_drive_unknown_instance_fails() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, no_delay(), FailureInjection::Never);

        assert!(orch
            .drive_instance(Uuid::new_v4(), CancellationToken::new())
            .await
            .is_err());
        assert!(orch.status(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_instances_most_recent_first() {
        let temp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let orch = Orchestrator::new(
            no_delay(),
            ActivityRegistry::new().register(HelloActivity::new(FailureInjection::Never)),
            temp.path(),
        )
        .with_clock(clock.clone());

        let first = orch.create_instance(None).await.unwrap();
        clock.advance(chrono::Duration::seconds(1));
        let second = orch.create_instance(None).await.unwrap();

        let listed: Vec<Uuid> = orch.list_instances(10).await.unwrap().iter().map(|i| i.id).collect();
        assert_eq!(listed, vec![second, first]);
        assert_eq!(orch.list_instances(1).await.unwrap().len(), 1);

        let unfinished = orch.unfinished_instances().await.unwrap();
        assert_eq!(unfinished.len(), 2);
    }
}
