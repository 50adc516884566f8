//! Run Registry
//!
//! Maps run identifiers to their current state and, while a run executes on
//! a worker, to the handle that can cancel it. A single lock guards the map.
//! The lock is held only for bookkeeping; killing a worker and any other I/O
//! happens after it is released.

use std::collections::HashMap;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::{EngineError, Result};
use crate::execution::runner::CancelToken;

use super::state::{RunId, RunState};

/// Cancellable handle of a run executing on a worker thread.
///
/// Canceling is best-effort: the shell process of the command in flight is
/// killed, but processes that shell spawned itself may keep running.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    token: CancelToken,
}

impl WorkerHandle {
    pub fn new(token: CancelToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

#[derive(Debug)]
struct RunEntry {
    state: RunState,
    handle: Option<WorkerHandle>,
}

/// Concurrency-safe table of runs.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<RunId, RunEntry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new run.
    pub fn register(
        &self,
        run_id: &RunId,
        state: RunState,
        handle: Option<WorkerHandle>,
    ) -> Result<()> {
        let mut runs = self.runs.lock();
        if runs.contains_key(run_id) {
            return Err(EngineError::DuplicateRun(run_id.to_string()));
        }
        runs.insert(run_id.clone(), RunEntry { state, handle });
        debug!("Registered run {}", run_id);
        Ok(())
    }

    /// Returns a copy of the current state of a run.
    pub fn get(&self, run_id: &RunId) -> Result<RunState> {
        self.runs
            .lock()
            .get(run_id)
            .map(|entry| entry.state.clone())
            .ok_or_else(|| EngineError::UnknownRun(run_id.to_string()))
    }

    /// Moves a running run to the state computed by `next`.
    ///
    /// `next` is called under the lock with the current state. The update is
    /// applied only if the run is still present and running, in which case
    /// the worker handle is released as well. Returns whether the state
    /// changed.
    pub fn transition<F>(&self, run_id: &RunId, next: F) -> bool
    where
        F: FnOnce(&RunState) -> Option<RunState>,
    {
        let mut runs = self.runs.lock();
        let Some(entry) = runs.get_mut(run_id) else {
            debug!("Run {} is no longer registered; result discarded", run_id);
            return false;
        };
        if !entry.state.is_active() {
            warn!("Run {} is already {}; transition ignored", run_id, entry.state);
            return false;
        }
        let Some(state) = next(&entry.state) else {
            return false;
        };

        info!("Run {} finished: {}", run_id, state);
        entry.state = state;
        entry.handle = None;
        true
    }

    /// Deletes a run that is no longer active.
    ///
    /// Removing an unknown run is not an error.
    pub fn remove(&self, run_id: &RunId) -> Result<()> {
        let mut runs = self.runs.lock();
        match runs.get(run_id) {
            Some(entry) if entry.state.is_active() => {
                Err(EngineError::RunActive(run_id.to_string()))
            }
            Some(_) => {
                runs.remove(run_id);
                debug!("Removed run {}", run_id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Deletes a run regardless of its state and cancels its worker.
    ///
    /// Returns whether the run was registered.
    pub fn cancel(&self, run_id: &RunId) -> bool {
        let entry = self.runs.lock().remove(run_id);
        let Some(entry) = entry else {
            return false;
        };

        if let Some(handle) = entry.handle {
            handle.cancel();
        }
        info!("Canceled run {}", run_id);
        true
    }

    /// Returns a snapshot of all runs ordered by creation time.
    pub fn snapshot(&self) -> Vec<(RunId, RunState)> {
        let mut runs: Vec<(RunId, RunState)> = self
            .runs
            .lock()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.state.clone()))
            .collect();
        runs.sort_by_key(|(id, state)| (state.created_at(), id.clone()));
        runs
    }

    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.lock().is_empty()
    }

    #[cfg(test)]
    fn has_handle(&self, run_id: &RunId) -> bool {
        self.runs
            .lock()
            .get(run_id)
            .map(|entry| entry.handle.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_register_and_get() {
        let registry = RunRegistry::new();
        let id = RunId::new();
        registry.register(&id, RunState::running(), None).unwrap();

        assert!(registry.get(&id).unwrap().is_active());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_duplicate() {
        let registry = RunRegistry::new();
        let id = RunId::new();
        registry.register(&id, RunState::running(), None).unwrap();

        let result = registry.register(&id, RunState::running(), None);
        assert!(matches!(result, Err(EngineError::DuplicateRun(_))));
    }

    #[test]
    fn test_get_unknown() {
        let registry = RunRegistry::new();
        let result = registry.get(&RunId::from("missing"));
        assert!(matches!(result, Err(EngineError::UnknownRun(id)) if id == "missing"));
    }

    #[test]
    fn test_transition_once() {
        let registry = RunRegistry::new();
        let id = RunId::new();
        let token = CancelToken::new();
        registry
            .register(&id, RunState::running(), Some(WorkerHandle::new(token)))
            .unwrap();
        assert!(registry.has_handle(&id));

        assert!(registry.transition(&id, |state| state.success(BTreeMap::new())));
        assert!(registry.get(&id).unwrap().is_success());
        assert!(!registry.has_handle(&id));

        assert!(!registry.transition(&id, |state| state.error(vec!["late".to_string()])));
        assert!(registry.get(&id).unwrap().is_success());
    }

    #[test]
    fn test_transition_unknown_run() {
        let registry = RunRegistry::new();
        let applied = registry.transition(&RunId::new(), |state| state.success(BTreeMap::new()));
        assert!(!applied);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_active_run() {
        let registry = RunRegistry::new();
        let id = RunId::new();
        registry.register(&id, RunState::running(), None).unwrap();

        assert!(matches!(registry.remove(&id), Err(EngineError::RunActive(_))));
        assert!(registry.get(&id).is_ok());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = RunRegistry::new();
        let id = RunId::new();
        registry.register(&id, RunState::running(), None).unwrap();
        registry.transition(&id, |state| state.error(vec!["boom".to_string()]));

        registry.remove(&id).unwrap();
        registry.remove(&id).unwrap();
        assert!(matches!(registry.get(&id), Err(EngineError::UnknownRun(_))));
    }

    #[test]
    fn test_cancel_running_run() {
        let registry = RunRegistry::new();
        let id = RunId::new();
        let token = CancelToken::new();
        registry
            .register(&id, RunState::running(), Some(WorkerHandle::new(token.clone())))
            .unwrap();

        assert!(registry.cancel(&id));
        assert!(token.is_canceled());
        assert!(matches!(registry.get(&id), Err(EngineError::UnknownRun(_))));
        assert!(!registry.cancel(&id));
    }

    #[test]
    fn test_cancel_finished_run() {
        let registry = RunRegistry::new();
        let id = RunId::new();
        registry.register(&id, RunState::running(), None).unwrap();
        registry.transition(&id, |state| state.success(BTreeMap::new()));

        assert!(registry.cancel(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_order() {
        let registry = RunRegistry::new();
        let first = RunId::new();
        registry.register(&first, RunState::running(), None).unwrap();
        thread::sleep(std::time::Duration::from_millis(5));
        let second = RunId::new();
        registry.register(&second, RunState::running(), None).unwrap();

        let runs = registry.snapshot();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].0, first);
        assert_eq!(runs[1].0, second);
    }

    #[test]
    fn test_concurrent_transitions_apply_once() {
        let registry = Arc::new(RunRegistry::new());
        let id = RunId::new();
        registry.register(&id, RunState::running(), None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                thread::spawn(move || {
                    registry.transition(&id, |state| state.error(vec![format!("worker {}", i)]))
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|applied| *applied)
            .count();

        assert_eq!(applied, 1);
        assert!(registry.get(&id).unwrap().is_error());
    }
}
