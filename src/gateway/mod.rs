//! Trigger gateway: starts instances and answers status queries.
//!
//! Each started instance is driven on its own tokio task, so many instances
//! share the runtime's worker pool. Instances never share mutable state;
//! the gateway only tracks how to cancel and await the ones it launched.

pub mod http;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::core::{Orchestrator, Termination};
use crate::domain::WorkflowInstance;

pub use http::{create_router, serve};

/// Errors surfaced by the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Instance {0} not found")]
    NotFound(Uuid),

    #[error("Workflow '{0}' not found")]
    UnknownWorkflow(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Returned to the caller of a start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceHandle {
    pub id: Uuid,
    pub status_query_get_uri: String,
    pub result_get_uri: String,
    pub terminate_post_uri: String,
}

struct RunningInstance {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

/// Accepts start requests and launches orchestrator instances
pub struct TriggerGateway {
    orchestrator: Arc<Orchestrator>,
    running: Arc<Mutex<HashMap<Uuid, RunningInstance>>>,
    base_url: String,
}

impl TriggerGateway {
    /// `base_url` prefixes the URIs handed back in instance handles
    pub fn new(orchestrator: Orchestrator, base_url: impl Into<String>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            running: Arc::new(Mutex::new(HashMap::new())),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Name of the workflow this gateway starts
    pub fn workflow_name(&self) -> &str {
        &self.orchestrator.workflow().name
    }

    /// Build the polling handle for an instance
    pub fn handle(&self, instance_id: Uuid) -> InstanceHandle {
        let instance_uri = format!("{}/runtime/instances/{}", self.base_url, instance_id);
        InstanceHandle {
            id: instance_id,
            result_get_uri: format!("{}/result", instance_uri),
            terminate_post_uri: format!("{}/terminate", instance_uri),
            status_query_get_uri: instance_uri,
        }
    }

    fn lock_running(&self) -> MutexGuard<'_, HashMap<Uuid, RunningInstance>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new instance; the payload is recorded and handed to the workflow
    #[instrument(skip(self, payload), fields(workflow = %self.workflow_name()))]
    pub async fn start(
        &self,
        payload: Option<serde_json::Value>,
    ) -> Result<InstanceHandle, GatewayError> {
        let instance_id = self.orchestrator.create_instance(payload).await?;
        self.launch(instance_id);
        Ok(self.handle(instance_id))
    }

    fn launch(&self, instance_id: Uuid) {
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        self.lock_running().insert(
            instance_id,
            RunningInstance {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        let orchestrator = self.orchestrator.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            // Driven on its own task so a panic surfaces here as a join error
            // and the bookkeeping below still runs
            let driver =
                tokio::spawn(async move { orchestrator.drive_instance(instance_id, cancel).await });

            match driver.await {
                Ok(Ok(Termination::Finished(outcome))) => {
                    debug!(%instance_id, label = %outcome.status_label(), "Instance finished");
                }
                Ok(Ok(Termination::Cancelled)) => debug!(%instance_id, "Instance cancelled"),
                Ok(Err(e)) => error!(%instance_id, error = %e, "Failed to drive instance"),
                Err(e) => error!(%instance_id, error = %e, "Instance task panicked"),
            }

            running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&instance_id);
            let _ = done_tx.send(true);
        });
    }

    /// Whether this gateway is currently driving the instance
    pub fn is_running(&self, instance_id: Uuid) -> bool {
        self.lock_running().contains_key(&instance_id)
    }

    /// Snapshot of an instance
    pub async fn status(&self, instance_id: Uuid) -> Result<WorkflowInstance, GatewayError> {
        self.orchestrator
            .status(instance_id)
            .await?
            .ok_or(GatewayError::NotFound(instance_id))
    }

    /// Wait until a launched instance stops, then return its snapshot
    pub async fn wait(&self, instance_id: Uuid) -> Result<WorkflowInstance, GatewayError> {
        let done = self
            .lock_running()
            .get(&instance_id)
            .map(|running| running.done.clone());

        if let Some(mut done) = done {
            // A closed channel also means the task is gone
            let _ = done.wait_for(|finished| *finished).await;
        }

        self.status(instance_id).await
    }

    /// Request cancellation of an instance; a finished instance is left as is
    #[instrument(skip(self))]
    pub async fn terminate(&self, instance_id: Uuid) -> Result<(), GatewayError> {
        let cancel = self
            .lock_running()
            .get(&instance_id)
            .map(|running| running.cancel.clone());

        if let Some(cancel) = cancel {
            info!("Terminating running instance");
            cancel.cancel();
            return Ok(());
        }

        let instance = self.status(instance_id).await?;
        if !instance.is_finished() {
            // Nobody drives it here; settle it directly
            self.orchestrator.record_cancellation(instance_id).await?;
        }

        Ok(())
    }

    /// Relaunch instances left unfinished by a previous process
    pub async fn recover(&self) -> Result<usize, GatewayError> {
        let mut relaunched = 0;

        for instance_id in self.orchestrator.unfinished_instances().await? {
            if self.is_running(instance_id) {
                continue;
            }
            info!(%instance_id, "Resuming unfinished instance");
            self.launch(instance_id);
            relaunched += 1;
        }

        Ok(relaunched)
    }

    /// List instances, most recent first
    pub async fn list(&self, limit: usize) -> Result<Vec<WorkflowInstance>, GatewayError> {
        Ok(self.orchestrator.list_instances(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::{Activity, ActivityFailure, ActivityRegistry, FailureInjection, HelloActivity};
    use crate::core::{ManualClock, WorkflowDefinition};
    use crate::domain::RuntimeStatus;
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;

    struct PanickingActivity;

    #[async_trait]
    impl Activity for PanickingActivity {
        fn name(&self) -> &str {
            "say_hello"
        }

        async fn invoke(&self, _input: &str) -> Result<String, ActivityFailure> {
            panic!("activity blew up");
        }
    }

    fn gateway(temp: &TempDir) -> TriggerGateway {
        let orchestrator = Orchestrator::new(
            WorkflowDefinition::default(),
            ActivityRegistry::new().register(HelloActivity::new(FailureInjection::Never)),
            temp.path(),
        )
        .with_clock(Arc::new(ManualClock::new(Utc::now())));

        TriggerGateway::new(orchestrator, "http://localhost:7071/")
    }

    #[tokio::test]
    async fn test_handle_uris() {
        let temp = TempDir::new().unwrap();
        let gateway = gateway(&temp);
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();

        let handle = gateway.handle(id);

        assert_eq!(
            handle.status_query_get_uri,
            "http://localhost:7071/runtime/instances/550e8400-e29b-41d4-a716-446655440000"
        );
        assert!(handle.result_get_uri.ends_with("/result"));
        assert!(handle.terminate_post_uri.ends_with("/terminate"));

        let json = serde_json::to_value(&handle).unwrap();
        assert!(json.get("statusQueryGetUri").is_some());
    }

    #[tokio::test]
    async fn test_unknown_instance_is_not_found() {
        let temp = TempDir::new().unwrap();
        let gateway = gateway(&temp);

        let err = gateway.status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
        assert!(matches!(
            gateway.terminate(Uuid::new_v4()).await.unwrap_err(),
            GatewayError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_terminate_idle_instance_records_cancellation() {
        let temp = TempDir::new().unwrap();
        let gateway = gateway(&temp);
        let id = gateway.orchestrator().create_instance(None).await.unwrap();

        gateway.terminate(id).await.unwrap();

        let instance = gateway.status(id).await.unwrap();
        assert_eq!(instance.runtime_status, RuntimeStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_panicked_instance_is_released() {
        let temp = TempDir::new().unwrap();
        let workflow = WorkflowDefinition {
            delay_seconds: 0,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(
            workflow,
            ActivityRegistry::new().register(PanickingActivity),
            temp.path(),
        )
        .with_clock(Arc::new(ManualClock::new(Utc::now())));
        let gateway = TriggerGateway::new(orchestrator, "http://localhost:7071");

        let handle = gateway.start(None).await.unwrap();
        let instance = gateway.wait(handle.id).await.unwrap();

        assert!(!gateway.is_running(handle.id));
        assert!(!instance.is_finished());

        // No task drives it any more, so terminate settles it directly
        gateway.terminate(handle.id).await.unwrap();
        let instance = gateway.status(handle.id).await.unwrap();
        assert_eq!(instance.runtime_status, RuntimeStatus::Cancelled);
    }
}
