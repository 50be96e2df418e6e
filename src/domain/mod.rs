//! Domain types for the durafn workflow host.
//!
//! This module contains the core data structures:
//! - Events: Immutable history records
//! - WorkflowInstance: Instance state rebuilt from history
//! - WorkflowResponse: Outward result of a finished instance

pub mod events;
pub mod instance;
pub mod response;

// Re-export commonly used types
pub use events::{Event, EventType};
pub use instance::{Outcome, RuntimeStatus, StatusLabel, WorkflowInstance};
pub use response::{ResponseBody, WorkflowResponse};
