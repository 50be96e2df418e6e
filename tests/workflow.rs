//! Workflow Integration Tests
//!
//! Drives whole instances through the orchestrator: ordering of activity
//! calls, failure classification, and the response each outcome produces.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use durafn::activities::hello::RANDOM_FAILURE_MESSAGE;
use durafn::core::{ManualClock, Orchestrator, Termination, WorkflowDefinition};
use durafn::domain::{EventType, Outcome, ResponseBody, RuntimeStatus, StatusLabel};
use durafn::{Activity, ActivityFailure, ActivityRegistry, FailureInjection, HelloActivity};
use tempfile::TempDir;
use tokio_test::assert_ok;

/// Greets like the hello activity and records every input it sees
struct RecordingActivity {
    calls: Arc<Mutex<Vec<String>>>,
    fail_on_call: Option<usize>,
}

#[async_trait]
impl Activity for RecordingActivity {
    fn name(&self) -> &str {
        "say_hello"
    }

    async fn invoke(&self, input: &str) -> Result<String, ActivityFailure> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(input.to_string());
            calls.len()
        };

        if self.fail_on_call == Some(call) {
            return Err(ActivityFailure::new(RANDOM_FAILURE_MESSAGE));
        }
        Ok(format!("Hello {}!", input))
    }
}

fn no_delay() -> WorkflowDefinition {
    WorkflowDefinition {
        delay_seconds: 0,
        ..Default::default()
    }
}

fn recording(
    temp: &TempDir,
    workflow: WorkflowDefinition,
    fail_on_call: Option<usize>,
) -> (Orchestrator, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let activity = RecordingActivity {
        calls: calls.clone(),
        fail_on_call,
    };

    let orchestrator = Orchestrator::new(workflow, ActivityRegistry::new().register(activity), temp.path())
        .with_clock(Arc::new(ManualClock::new(Utc::now())));

    (orchestrator, calls)
}

#[tokio::test]
async fn test_all_activities_succeed() {
    let temp = TempDir::new().unwrap();
    let (orch, calls) = recording(&temp, no_delay(), None);

    let (id, termination) = assert_ok!(orch.execute(None).await);

    let expected = vec!["Hello Tokyo!", "Hello Seattle!", "Hello London!"];
    assert_eq!(
        termination,
        Termination::Finished(Outcome::Completed {
            results: expected.iter().map(|s| s.to_string()).collect()
        })
    );
    assert_eq!(*calls.lock().unwrap(), vec!["Tokyo", "Seattle", "London"]);

    let response = termination.response().unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(
        response.body_string(),
        r#"["Hello Tokyo!","Hello Seattle!","Hello London!"]"#
    );

    let instance = orch.status(id).await.unwrap().unwrap();
    assert_eq!(instance.runtime_status, RuntimeStatus::Completed);
    assert_eq!(instance.custom_status, Some(StatusLabel::Complete));
    assert_eq!(instance.outputs, expected);
    assert!(instance.completed_at.is_some());
}

#[tokio::test]
async fn test_first_failure_stops_the_sequence() {
    let temp = TempDir::new().unwrap();
    let (orch, calls) = recording(&temp, no_delay(), Some(1));

    let (id, termination) = orch.execute(None).await.unwrap();

    // No further calls after the failing one
    assert_eq!(*calls.lock().unwrap(), vec!["Tokyo"]);

    let response = termination.response().unwrap();
    assert_eq!(response.status_code, 500);
    assert_eq!(
        response.body,
        ResponseBody::Text("Function execution failed: Random failure occurred".to_string())
    );

    let instance = orch.status(id).await.unwrap().unwrap();
    assert_eq!(instance.runtime_status, RuntimeStatus::Failed);
    assert_eq!(instance.custom_status, Some(StatusLabel::Fail));
    assert_eq!(instance.custom_status.unwrap().as_str(), "Custom->Fail");
    assert!(instance.outputs.is_empty());
}

#[tokio::test]
async fn test_failure_after_partial_success_discards_results() {
    let temp = TempDir::new().unwrap();
    let (orch, calls) = recording(&temp, no_delay(), Some(2));

    let (id, termination) = orch.execute(None).await.unwrap();

    assert_eq!(*calls.lock().unwrap(), vec!["Tokyo", "Seattle"]);
    assert_eq!(termination.response().unwrap().status_code, 500);

    let instance = orch.status(id).await.unwrap().unwrap();
    assert!(instance.outputs.is_empty());
    assert_eq!(
        instance.outcome,
        Some(Outcome::FailedActivity {
            message: RANDOM_FAILURE_MESSAGE.to_string()
        })
    );
}

#[tokio::test]
async fn test_unregistered_activity_is_internal_error() {
    let temp = TempDir::new().unwrap();
    let workflow = WorkflowDefinition {
        activity: "say_goodbye".to_string(),
        ..no_delay()
    };
    let (orch, calls) = recording(&temp, workflow, None);

    let (id, termination) = orch.execute(None).await.unwrap();

    assert!(calls.lock().unwrap().is_empty());

    let response = termination.response().unwrap();
    assert_eq!(response.status_code, 400);
    assert_eq!(
        response.body_string(),
        "An error occurred: Activity 'say_goodbye' is not registered"
    );

    let instance = orch.status(id).await.unwrap().unwrap();
    assert_eq!(instance.runtime_status, RuntimeStatus::Errored);
    assert_eq!(instance.custom_status, Some(StatusLabel::Error));
}

#[tokio::test]
async fn test_terminal_status_is_stable() {
    let temp = TempDir::new().unwrap();
    let (orch, _calls) = recording(&temp, no_delay(), None);

    let (id, _) = orch.execute(None).await.unwrap();

    let first = orch.status(id).await.unwrap().unwrap();
    let second = orch.status(id).await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.response(), second.response());
}

#[tokio::test]
async fn test_history_records_each_step_in_order() {
    let temp = TempDir::new().unwrap();
    let (orch, _calls) = recording(&temp, no_delay(), None);

    let (id, _) = orch.execute(Some(serde_json::json!("payload"))).await.unwrap();

    let store = durafn::core::EventStore::existing(temp.path(), id)
        .await
        .unwrap()
        .unwrap();
    let types: Vec<EventType> = store
        .replay()
        .await
        .unwrap()
        .iter()
        .map(|e| e.event_type)
        .collect();

    assert_eq!(
        types,
        vec![
            EventType::InstanceStarted,
            EventType::TimerCreated,
            EventType::TimerFired,
            EventType::ActivityScheduled,
            EventType::ActivityCompleted,
            EventType::ActivityScheduled,
            EventType::ActivityCompleted,
            EventType::ActivityScheduled,
            EventType::ActivityCompleted,
            EventType::InstanceCompleted,
        ]
    );

    let history = store.replay().await.unwrap();
    let terminal = history.last().unwrap();
    assert_eq!(
        terminal.outputs.as_deref(),
        Some(&["Hello Tokyo!".to_string(), "Hello Seattle!".to_string(), "Hello London!".to_string()][..])
    );
}

#[tokio::test]
async fn test_seeded_failures_settle_into_one_of_two_outcomes() {
    let temp = TempDir::new().unwrap();
    let activities = ActivityRegistry::new().register(HelloActivity::new(FailureInjection::seeded(6, 11)));
    let orch = Orchestrator::new(no_delay(), activities, temp.path())
        .with_clock(Arc::new(ManualClock::new(Utc::now())));

    let mut completed = 0;
    let mut failed = 0;
    for _ in 0..30 {
        let (_, termination) = orch.execute(None).await.unwrap();
        match termination {
            Termination::Finished(Outcome::Completed { results }) => {
                assert_eq!(results, vec!["Hello Tokyo!", "Hello Seattle!", "Hello London!"]);
                completed += 1;
            }
            Termination::Finished(Outcome::FailedActivity { message }) => {
                assert_eq!(message, RANDOM_FAILURE_MESSAGE);
                failed += 1;
            }
            other => panic!("unexpected termination: {:?}", other),
        }
    }

    assert_eq!(completed + failed, 30);
    assert_eq!(orch.list_instances(100).await.unwrap().len(), 30);
}
