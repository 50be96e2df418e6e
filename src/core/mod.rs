//! Core orchestration logic.
//!
//! This module contains:
//! - EventStore: Append-only instance history
//! - Clock / DelayScheduler: Time and cooperative suspension
//! - OrchestrationContext: Replay-aware timer and activity calls
//! - WorkflowDefinition: Delay, activity and ordered inputs
//! - Orchestrator: Main execution engine

pub mod clock;
pub mod context;
pub mod event_store;
pub mod orchestrator;
pub mod timer;
pub mod workflow;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{OrchestrationContext, WorkflowError};
pub use event_store::{generate_idempotency_key, hash_input, EventStore};
pub use orchestrator::{Orchestrator, Termination};
pub use timer::{DelayScheduler, TimerOutcome};
pub use workflow::{WorkflowDefinition, DEFAULT_WORKFLOW, MAX_DELAY_SECONDS};
