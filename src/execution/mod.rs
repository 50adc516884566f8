//! Run Execution Module
//!
//! Creates run workspaces, executes resolved commands and records their
//! outcome.
//!
//! # Architecture
//!
//! - [`engine`]: Public facade used to submit and manage runs
//! - [`workspace`]: Run directory creation and cleanup
//! - [`scheduler`]: Synchronous and per-run worker thread dispatch
//! - [`runner`]: Sequential shell command execution
//! - [`completion`]: Conversion of command outcomes into run states

pub mod completion;
pub mod engine;
pub mod runner;
pub mod scheduler;
pub mod workspace;

pub use engine::{Engine, RunOptions, Submission};
pub use runner::{CancelToken, CommandRunner, RunOutcome};
pub use scheduler::{RunJob, Scheduler};
