//! Run Engine
//!
//! The public entry point for executing workflow templates. Each call to
//! [`Engine::execute`] creates a run:
//! 1. Validates the arguments against the template parameters
//! 2. Creates the run directory and stages input files
//! 3. Resolves the command list and output files
//! 4. Executes the commands inline or on a worker thread
//!
//! Failures in steps 1-3 are returned to the caller and leave neither a
//! registry entry nor a run directory behind. Failures of the commands
//! themselves end the run in the `Error` state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::error::Result;
use crate::run::{RunId, RunRegistry, RunState};
use crate::template::{
    Arguments, CopyStager, DefaultResolver, FileStager, TemplateResolver, WorkflowTemplate,
};

use super::scheduler::{RunJob, Scheduler};
use super::workspace;

/// How a run is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Return immediately and execute on a worker thread
    pub run_async: bool,
    /// Log every command before it executes
    pub verbose: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_async: true,
            verbose: false,
        }
    }
}

impl RunOptions {
    pub fn sync() -> Self {
        Self {
            run_async: false,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// A run accepted by the engine.
#[derive(Debug, Clone)]
pub struct Submission {
    pub run_id: RunId,
    /// `Running` for asynchronous runs, the terminal state otherwise
    pub state: RunState,
}

/// Workflow run engine.
///
/// # Example
///
/// ```rust,no_run
/// use shellflow::execution::{Engine, RunOptions};
/// use shellflow::template::{load_template, ArgumentValue, Arguments};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let template = load_template("hello/template.yaml")?;
///     let engine = Engine::new("/tmp/shellflow")?;
///
///     let mut arguments = Arguments::new();
///     arguments.insert("names".to_string(), ArgumentValue::file("names.txt"));
///
///     let submission = engine.execute(&template, &arguments, RunOptions::default())?;
///     let state = engine.wait(&submission.run_id, std::time::Duration::from_millis(250))?;
///     println!("Run {} finished: {}", submission.run_id, state);
///     Ok(())
/// }
/// ```
pub struct Engine {
    base_dir: PathBuf,
    registry: Arc<RunRegistry>,
    scheduler: Scheduler,
    resolver: Box<dyn TemplateResolver>,
    stager: Box<dyn FileStager>,
}

impl Engine {
    /// Creates an engine that keeps run directories under `base_dir`.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_collaborators(base_dir, Box::new(DefaultResolver), Box::new(CopyStager))
    }

    /// Creates an engine with custom template resolution and file staging.
    pub fn with_collaborators(
        base_dir: impl AsRef<Path>,
        resolver: Box<dyn TemplateResolver>,
        stager: Box<dyn FileStager>,
    ) -> Result<Self> {
        fs::create_dir_all(base_dir.as_ref())?;
        let base_dir = fs::canonicalize(base_dir.as_ref())?;
        info!("Run directory: {}", base_dir.display());

        let registry = Arc::new(RunRegistry::new());
        Ok(Self {
            base_dir,
            scheduler: Scheduler::new(Arc::clone(&registry)),
            registry,
            resolver,
            stager,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Executes a template for a set of arguments.
    pub fn execute(
        &self,
        template: &WorkflowTemplate,
        arguments: &Arguments,
        options: RunOptions,
    ) -> Result<Submission> {
        self.resolver.validate_arguments(template, arguments)?;

        let run_id = RunId::new();
        let run_dir = workspace::prepare(
            &self.base_dir,
            &run_id,
            template,
            arguments,
            self.stager.as_ref(),
        )?;

        let job = match self.build_job(&run_id, run_dir.clone(), template, arguments, options) {
            Ok(job) => job,
            Err(e) => {
                workspace::discard(&run_dir);
                return Err(e);
            }
        };

        info!(
            "Starting run {} ({} commands, {})",
            run_id,
            job.commands.len(),
            if options.run_async { "async" } else { "sync" }
        );

        let dispatched = if options.run_async {
            self.scheduler.run_async(job)
        } else {
            self.scheduler.run_sync(job)
        };

        // A run that never started, or that was canceled while executing
        // inline, has no registry entry left to own its directory.
        dispatched
            .map(|state| Submission { run_id, state })
            .map_err(|e| {
                workspace::discard(&run_dir);
                e
            })
    }

    fn build_job(
        &self,
        run_id: &RunId,
        run_dir: PathBuf,
        template: &WorkflowTemplate,
        arguments: &Arguments,
        options: RunOptions,
    ) -> Result<RunJob> {
        let commands = self.resolver.resolve_commands(template, arguments)?;
        let output_files = self.resolver.resolve_output_files(template, arguments)?;
        debug!("Run {} outputs: {:?}", run_id, output_files);

        Ok(RunJob {
            run_id: run_id.clone(),
            commands,
            run_dir,
            output_files,
            verbose: options.verbose,
        })
    }

    /// Returns the current state of a run.
    pub fn get_state(&self, run_id: &RunId) -> Result<RunState> {
        self.registry.get(run_id)
    }

    /// Cancels a run and forgets it.
    ///
    /// The command in flight is killed on a best-effort basis; processes it
    /// spawned may keep running. Canceling an unknown run does nothing.
    pub fn cancel_run(&self, run_id: &RunId) {
        self.registry.cancel(run_id);
    }

    /// Forgets a finished run. The run directory is left in place.
    pub fn remove_run(&self, run_id: &RunId) -> Result<()> {
        self.registry.remove(run_id)
    }

    /// Returns all known runs, oldest first.
    pub fn runs(&self) -> Vec<(RunId, RunState)> {
        self.registry.snapshot()
    }

    /// Returns the directory a run executes in.
    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.base_dir.join(run_id.as_str())
    }

    /// Blocks until a run reaches a terminal state.
    pub fn wait(&self, run_id: &RunId, poll_interval: Duration) -> Result<RunState> {
        loop {
            let state = self.get_state(run_id)?;
            if !state.is_active() {
                return Ok(state);
            }
            thread::sleep(poll_interval);
        }
    }
}
