//! Template Parser
//!
//! Loads workflow templates from YAML files.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::error::{EngineError, Result};

use super::model::WorkflowTemplate;
use super::stager::is_workspace_relative;

/// Loads a workflow template from a YAML file.
///
/// Static input files of the template are resolved relative to the
/// directory that contains the template file.
///
/// # Example
///
/// ```rust,no_run
/// use shellflow::template::load_template;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let template = load_template("benchmark/template.yaml")?;
///     println!("Loaded {} parameters", template.parameters.len());
///     Ok(())
/// }
/// ```
pub fn load_template(path: impl AsRef<Path>) -> Result<WorkflowTemplate> {
    let path = path.as_ref();
    info!("Loading template from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|e| {
        EngineError::TemplateParse(format!(
            "failed to read template file '{}': {}",
            path.display(),
            e
        ))
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    let source_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    parse_template(&yaml_content, source_dir)
}

/// Parses a workflow template from YAML text.
pub fn parse_template(yaml: &str, source_dir: impl AsRef<Path>) -> Result<WorkflowTemplate> {
    let mut template: WorkflowTemplate = serde_yaml::from_str(yaml)?;
    template.source_dir = source_dir.as_ref().to_path_buf();

    check_template(&template)?;

    info!(
        "Parsed template: {} steps, {} parameters",
        template.workflow_spec.workflow.specification.steps.len(),
        template.parameters.len()
    );

    Ok(template)
}

/// Structural checks that do not depend on arguments.
fn check_template(template: &WorkflowTemplate) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for param in &template.parameters {
        if param.id.trim().is_empty() {
            return Err(EngineError::TemplateParse(
                "parameter has empty identifier".to_string(),
            ));
        }
        if !seen.insert(param.id.as_str()) {
            return Err(EngineError::TemplateParse(format!(
                "duplicate parameter '{}'",
                param.id
            )));
        }
        if let Some(target) = &param.target {
            if !is_workspace_relative(target) {
                return Err(EngineError::TemplateParse(format!(
                    "target '{}' of parameter '{}' is outside the run directory",
                    target, param.id
                )));
            }
        }
    }

    if let Some(file) = template
        .input_files()
        .iter()
        .find(|file| !is_workspace_relative(file))
    {
        return Err(EngineError::TemplateParse(format!(
            "input file '{}' is outside the template directory",
            file
        )));
    }

    if let Some(kind) = &template.workflow_spec.workflow.kind {
        if kind != "serial" {
            warn!("Workflow type '{}' is executed serially", kind);
        }
    }

    if template.raw_commands().next().is_none() {
        warn!("Template defines no commands");
    }

    Ok(())
}
