//! Run Workspaces
//!
//! Every run owns a directory `{base_dir}/{run_id}` that holds its staged
//! input files and the files its commands produce.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::Result;
use crate::run::RunId;
use crate::template::{Arguments, FileStager, WorkflowTemplate};

/// Creates the run directory and stages the run's input files into it.
///
/// If staging fails the directory is removed again and the staging error
/// is returned unchanged.
pub fn prepare(
    base_dir: &Path,
    run_id: &RunId,
    template: &WorkflowTemplate,
    arguments: &Arguments,
    stager: &dyn FileStager,
) -> Result<PathBuf> {
    let run_dir = base_dir.join(run_id.as_str());
    fs::create_dir(&run_dir)?;
    debug!("Created run directory: {}", run_dir.display());

    if let Err(e) = stager.stage_files(template, template.input_files(), arguments, &run_dir) {
        discard(&run_dir);
        return Err(e);
    }

    Ok(run_dir)
}

/// Removes a run directory, logging instead of failing.
pub fn discard(run_dir: &Path) {
    match fs::remove_dir_all(run_dir) {
        Ok(()) => debug!("Removed run directory: {}", run_dir.display()),
        Err(e) => warn!("Failed to remove run directory {}: {}", run_dir.display(), e),
    }
}
