//! Run Completion
//!
//! Converts the outcome of a finished command sequence into the terminal
//! state of its run.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, warn};

use crate::run::{Resource, RunId, RunRegistry, RunStatus};
use crate::template::is_workspace_relative;

use super::runner::RunOutcome;

/// Records the outcome of a run in the registry.
///
/// Output files are looked up before the registry lock is taken; declared
/// outputs that do not exist are left out of the resource map. If the run
/// was canceled or removed in the meantime the outcome is discarded.
/// Returns whether the run's state changed.
pub fn on_complete(
    registry: &RunRegistry,
    run_id: &RunId,
    outcome: RunOutcome,
    run_dir: &Path,
    output_files: &[String],
) -> bool {
    let resources = match outcome.status {
        RunStatus::Success => collect_resources(run_dir, output_files),
        RunStatus::Error => BTreeMap::new(),
    };

    registry.transition(run_id, move |state| match outcome.status {
        RunStatus::Success => state.success(resources),
        RunStatus::Error => state.error(outcome.messages),
    })
}

/// Builds resources for the declared output files that exist on disk.
///
/// Only paths inside `run_dir` are considered.
pub fn collect_resources(run_dir: &Path, output_files: &[String]) -> BTreeMap<String, Resource> {
    output_files
        .iter()
        .filter_map(|file_id| {
            if !is_workspace_relative(file_id) {
                warn!("Ignoring output '{}' outside the run directory", file_id);
                return None;
            }
            let filepath = run_dir.join(file_id);
            if filepath.is_file() {
                Some((file_id.clone(), Resource::new(file_id.clone(), filepath)))
            } else {
                debug!("Declared output '{}' was not produced", file_id);
                None
            }
        })
        .collect()
}
