//! Run Tracking Module
//!
//! - [`state`]: Run identifiers, states and resources
//! - [`registry`]: The lock-guarded table of runs

pub mod registry;
pub mod state;

pub use registry::{RunRegistry, WorkerHandle};
pub use state::{Resource, RunId, RunState, RunStatus};
