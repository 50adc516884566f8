//! ShellFlow - Run Lifecycle Engine for Shell Workflows
//!
//! Executes parameterized workflow templates as isolated, trackable runs.
//! Each run gets its own directory, executes its commands one after another
//! and ends in exactly one terminal state that callers can poll.
//!
//! # Architecture
//!
//! The library is organized into three main modules:
//!
//! - [`template`]: Template model, argument resolution and file staging
//! - [`run`]: Run identifiers, states and the concurrency-safe run registry
//! - [`execution`]: Workspaces, scheduling, command execution and the engine facade
//!
//! # Example
//!
//! ```rust,no_run
//! use shellflow::{load_template, Arguments, ArgumentValue, Engine, RunOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a template from YAML
//!     let template = load_template("hello/template.yaml")?;
//!
//!     // Runs are kept under the base directory
//!     let engine = Engine::new("/tmp/shellflow")?;
//!
//!     let mut arguments = Arguments::new();
//!     arguments.insert("names".to_string(), ArgumentValue::file("names.txt"));
//!
//!     // Execute synchronously
//!     let submission = engine.execute(&template, &arguments, RunOptions::sync())?;
//!     println!("{}: {}", submission.run_id, submission.state);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod execution;
pub mod run;
pub mod template;

// Re-export commonly used types
pub use error::{EngineError, Result};
pub use execution::{Engine, RunOptions, Submission};
pub use run::{Resource, RunId, RunState};
pub use template::{load_template, ArgumentValue, Arguments, FileHandle, WorkflowTemplate};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "ShellFlow";
