//! Run Scheduling
//!
//! Synchronous runs execute on the caller's thread. Asynchronous runs get a
//! dedicated worker thread each; there is no shared pool, so the number of
//! concurrently executing runs is bounded only by the system.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use log::{debug, error};

use crate::error::Result;
use crate::run::{RunId, RunRegistry, RunState, WorkerHandle};

use super::completion::on_complete;
use super::runner::{CancelToken, CommandRunner};

/// Everything a worker needs to execute one run.
#[derive(Debug, Clone)]
pub struct RunJob {
    pub run_id: RunId,
    pub commands: Vec<String>,
    pub run_dir: PathBuf,
    pub output_files: Vec<String>,
    pub verbose: bool,
}

impl RunJob {
    fn execute(&self, registry: &RunRegistry, token: &CancelToken) -> bool {
        let outcome = CommandRunner::new(self.verbose).run(&self.commands, &self.run_dir, token);
        on_complete(registry, &self.run_id, outcome, &self.run_dir, &self.output_files)
    }
}

/// Dispatches runs in blocking or non-blocking mode.
#[derive(Debug, Clone)]
pub struct Scheduler {
    registry: Arc<RunRegistry>,
}

impl Scheduler {
    pub fn new(registry: Arc<RunRegistry>) -> Self {
        Self { registry }
    }

    /// Executes a run on the calling thread and returns its terminal state.
    pub fn run_sync(&self, job: RunJob) -> Result<RunState> {
        self.registry.register(&job.run_id, RunState::running(), None)?;
        job.execute(&self.registry, &CancelToken::new());
        self.registry.get(&job.run_id)
    }

    /// Starts a run on a new worker thread and returns its initial state.
    ///
    /// The run is registered before the worker starts, so the completion
    /// callback always finds it unless it was canceled.
    pub fn run_async(&self, job: RunJob) -> Result<RunState> {
        let token = CancelToken::new();
        let state = RunState::running();
        let run_id = job.run_id.clone();

        self.registry.register(
            &run_id,
            state.clone(),
            Some(WorkerHandle::new(token.clone())),
        )?;

        let registry = Arc::clone(&self.registry);
        let spawned = thread::Builder::new()
            .name(format!("run-{}", run_id))
            .spawn(move || {
                job.execute(&registry, &token);
            });

        if let Err(e) = spawned {
            error!("Failed to start worker for run {}: {}", run_id, e);
            self.registry.cancel(&run_id);
            return Err(e.into());
        }

        debug!("Dispatched run {}", run_id);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn job(run_dir: PathBuf, commands: &[&str]) -> RunJob {
        RunJob {
            run_id: RunId::new(),
            commands: commands.iter().map(|c| c.to_string()).collect(),
            run_dir,
            output_files: vec!["out.txt".to_string()],
            verbose: false,
        }
    }

    fn wait_until_done(registry: &RunRegistry, run_id: &RunId) -> RunState {
        let deadline = Instant::now() + Duration::from_secs(20);
        loop {
            let state = registry.get(run_id).unwrap();
            if !state.is_active() || Instant::now() > deadline {
                return state;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_run_sync_success() {
        let temp_dir = tempdir().unwrap();
        let registry = Arc::new(RunRegistry::new());
        let scheduler = Scheduler::new(Arc::clone(&registry));

        let job = job(temp_dir.path().to_path_buf(), &["echo done > out.txt"]);
        let run_id = job.run_id.clone();
        let state = scheduler.run_sync(job).unwrap();

        assert!(state.is_success());
        assert!(state.resources().unwrap().contains_key("out.txt"));
        assert_eq!(registry.get(&run_id).unwrap(), state);
    }

    #[test]
    fn test_run_sync_error() {
        let temp_dir = tempdir().unwrap();
        let scheduler = Scheduler::new(Arc::new(RunRegistry::new()));

        let state = scheduler
            .run_sync(job(temp_dir.path().to_path_buf(), &["exit 1", "echo done > out.txt"]))
            .unwrap();

        assert!(state.is_error());
        assert!(!state.messages().is_empty());
        assert!(!temp_dir.path().join("out.txt").exists());
    }

    #[test]
    fn test_run_async_completes() {
        let temp_dir = tempdir().unwrap();
        let registry = Arc::new(RunRegistry::new());
        let scheduler = Scheduler::new(Arc::clone(&registry));

        let job = job(temp_dir.path().to_path_buf(), &["sleep 1", "echo done > out.txt"]);
        let run_id = job.run_id.clone();
        let initial = scheduler.run_async(job).unwrap();
        assert!(initial.is_active());

        let state = wait_until_done(&registry, &run_id);
        assert!(state.is_success());
        assert_eq!(state.resources().unwrap().len(), 1);
    }

    #[test]
    fn test_run_async_cancel() {
        let temp_dir = tempdir().unwrap();
        let registry = Arc::new(RunRegistry::new());
        let scheduler = Scheduler::new(Arc::clone(&registry));

        let job = job(temp_dir.path().to_path_buf(), &["sleep 30", "echo done > out.txt"]);
        let run_id = job.run_id.clone();
        scheduler.run_async(job).unwrap();

        assert!(registry.cancel(&run_id));
        thread::sleep(Duration::from_millis(200));

        assert!(registry.get(&run_id).is_err());
        assert!(!temp_dir.path().join("out.txt").exists());
    }

    #[test]
    fn test_duplicate_run_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let scheduler = Scheduler::new(Arc::new(RunRegistry::new()));

        let job = job(temp_dir.path().to_path_buf(), &["true"]);
        scheduler.run_sync(job.clone()).unwrap();
        assert!(scheduler.run_async(job).is_err());
    }
}
