//! Input File Staging
//!
//! Copies the static input files of a template and the file-valued
//! arguments of a run into the run directory.

use std::fs;
use std::path::{Component, Path};

use log::debug;

use crate::error::{EngineError, Result};

use super::arguments::{ArgumentValue, Arguments};
use super::model::WorkflowTemplate;
use super::resolver::file_target;

/// Places the files a run needs into its working directory.
pub trait FileStager: Send + Sync {
    /// Copies `files` (relative to the template source directory) and every
    /// file argument into `destination`.
    fn stage_files(
        &self,
        template: &WorkflowTemplate,
        files: &[String],
        arguments: &Arguments,
        destination: &Path,
    ) -> Result<()>;
}

/// Stager that copies files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyStager;

impl FileStager for CopyStager {
    fn stage_files(
        &self,
        template: &WorkflowTemplate,
        files: &[String],
        arguments: &Arguments,
        destination: &Path,
    ) -> Result<()> {
        for file in files {
            if !is_workspace_relative(file) {
                return Err(EngineError::OutsideWorkspace(file.clone()));
            }
        }

        let mut staged_arguments = Vec::new();
        for (name, value) in arguments {
            let ArgumentValue::File(handle) = value else {
                continue;
            };
            let Some(param) = template.get_parameter(name) else {
                continue;
            };
            let target = file_target(param, handle);
            if !is_workspace_relative(&target) {
                return Err(EngineError::InvalidArgument {
                    name: name.clone(),
                    reason: format!("target '{}' is outside the run directory", target),
                });
            }
            staged_arguments.push((&handle.source, target));
        }

        for file in files {
            let source = template.source_dir.join(file);
            copy_path(&source, &destination.join(file))?;
        }

        for (source, target) in staged_arguments {
            copy_path(source, &destination.join(target))?;
        }

        Ok(())
    }
}

/// Returns true if `path` names a location strictly inside a directory it
/// is joined onto: relative, non-empty and without `..` components.
pub fn is_workspace_relative(path: impl AsRef<Path>) -> bool {
    let mut has_name = false;
    for component in path.as_ref().components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    has_name
}

/// Copies a file or a directory tree, creating parent directories.
fn copy_path(source: &Path, target: &Path) -> Result<()> {
    if source.is_dir() {
        fs::create_dir_all(target)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_path(&entry.path(), &target.join(entry.file_name()))?;
        }
        return Ok(());
    }

    if !source.is_file() {
        return Err(EngineError::InputFileNotFound(source.to_path_buf()));
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, target)?;
    debug!("Staged {} -> {}", source.display(), target.display());

    Ok(())
}
