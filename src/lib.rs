//! durafn - Durable workflow runner
//!
//! Runs a small durable workflow: wait a fixed delay, call one activity
//! for each configured input strictly in order, and answer with the
//! collected results or a classified failure.
//!
//! # Architecture
//!
//! Every instance is event-sourced:
//! - Each step (start, timer, activity call, terminal state) is an
//!   appended history event
//! - Instance status is derived by replaying the history
//! - An interrupted instance resumes from its history without repeating
//!   answered activity calls
//!
//! # Modules
//!
//! - `activities`: Activity trait, registry and the hello activity
//! - `core`: Orchestration logic (EventStore, DelayScheduler, Orchestrator)
//! - `domain`: Data structures (Event, WorkflowInstance, WorkflowResponse)
//! - `gateway`: Trigger gateway and its HTTP routes
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run one instance in the foreground
//! durafn run
//!
//! # Serve the HTTP trigger
//! durafn serve --bind 127.0.0.1:7071
//!
//! # Check instance status
//! durafn status <instance-id>
//! ```

pub mod activities;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod gateway;

// Re-export main types at crate root for convenience
pub use activities::{Activity, ActivityFailure, ActivityRegistry, FailureInjection, HelloActivity};
pub use core::{Orchestrator, Termination, WorkflowDefinition};
pub use domain::{Event, EventType, Outcome, RuntimeStatus, StatusLabel, WorkflowInstance, WorkflowResponse};
pub use gateway::{InstanceHandle, TriggerGateway};
