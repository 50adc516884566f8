//! Template Resolution
//!
//! Turns a template plus caller arguments into the concrete command list and
//! output file list of a run.
//!
//! Two reference syntaxes are involved:
//! - `$[[name]]` inside `inputs.parameters` values and `outputs.files`
//!   refers to a template parameter (argument value or declared default).
//! - `$name` / `${name}` inside step commands refers to a resolved workflow
//!   parameter from `inputs.parameters`. `$$` produces a literal `$`.

use std::collections::BTreeMap;

use log::debug;
use serde_yaml::Value;

use crate::error::{EngineError, Result};

use super::arguments::{ArgumentValue, Arguments, FileHandle};
use super::model::{DataType, ParameterDecl, WorkflowTemplate};
use super::stager::is_workspace_relative;

/// Resolves templates for the engine.
///
/// Implementations must be shareable across run workers.
pub trait TemplateResolver: Send + Sync {
    /// Checks that every required parameter has a value.
    fn validate_arguments(&self, template: &WorkflowTemplate, arguments: &Arguments) -> Result<()>;

    /// Returns the shell commands of the run with all placeholders substituted.
    fn resolve_commands(
        &self,
        template: &WorkflowTemplate,
        arguments: &Arguments,
    ) -> Result<Vec<String>>;

    /// Returns the output file paths (relative to the run directory).
    fn resolve_output_files(
        &self,
        template: &WorkflowTemplate,
        arguments: &Arguments,
    ) -> Result<Vec<String>>;
}

/// Resolver for the template format described in [`crate::template::model`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl TemplateResolver for DefaultResolver {
    fn validate_arguments(&self, template: &WorkflowTemplate, arguments: &Arguments) -> Result<()> {
        for (name, value) in arguments {
            let param = template.get_parameter(name).ok_or_else(|| EngineError::InvalidArgument {
                name: name.clone(),
                reason: "no such parameter in template".to_string(),
            })?;
            check_argument(param, value)?;
        }

        for param in &template.parameters {
            if param.required && param.default.is_none() && !arguments.contains_key(&param.id) {
                return Err(EngineError::MissingArgument(param.id.clone()));
            }
        }

        Ok(())
    }

    fn resolve_commands(
        &self,
        template: &WorkflowTemplate,
        arguments: &Arguments,
    ) -> Result<Vec<String>> {
        let bindings = workflow_parameters(template, arguments)?;

        let commands = template
            .raw_commands()
            .map(|command| substitute(command, &bindings))
            .collect::<Result<Vec<_>>>()?;

        debug!("Resolved {} commands", commands.len());
        Ok(commands)
    }

    fn resolve_output_files(
        &self,
        template: &WorkflowTemplate,
        arguments: &Arguments,
    ) -> Result<Vec<String>> {
        template
            .workflow_spec
            .outputs
            .files
            .iter()
            .map(|file| {
                let resolved = replace_args(file, template, arguments)?;
                if !is_workspace_relative(&resolved) {
                    return Err(EngineError::OutsideWorkspace(resolved));
                }
                Ok(resolved)
            })
            .collect()
    }
}

/// Resolves the `inputs.parameters` section into plain string bindings.
pub fn workflow_parameters(
    template: &WorkflowTemplate,
    arguments: &Arguments,
) -> Result<BTreeMap<String, String>> {
    template
        .workflow_spec
        .inputs
        .parameters
        .iter()
        .map(|(key, value)| {
            let resolved = replace_args(&value_to_string(value), template, arguments)?;
            Ok((key.clone(), resolved))
        })
        .collect()
}

/// Returns the path inside the run directory that a file argument is copied to.
///
/// An explicit target on the argument wins over the parameter's `as`
/// declaration; without either the source file name is used.
pub fn file_target(param: &ParameterDecl, handle: &FileHandle) -> String {
    handle
        .target
        .clone()
        .or_else(|| param.target.clone())
        .unwrap_or_else(|| handle.file_name())
}

/// Returns the value of a parameter for this set of arguments, if any.
pub fn parameter_value(param: &ParameterDecl, arguments: &Arguments) -> Option<String> {
    match arguments.get(&param.id) {
        Some(ArgumentValue::Scalar(value)) => Some(value.clone()),
        Some(ArgumentValue::File(handle)) => Some(file_target(param, handle)),
        None => param.default.as_ref().map(value_to_string),
    }
}

/// Replaces `$[[name]]` references with parameter values.
pub fn replace_args(text: &str, template: &WorkflowTemplate, arguments: &Arguments) -> Result<String> {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("$[[") {
        let after_start = &rest[start + 3..];
        let Some(end) = after_start.find("]]") else {
            break;
        };

        result.push_str(&rest[..start]);
        let name = after_start[..end].trim();
        let param = template
            .get_parameter(name)
            .ok_or_else(|| EngineError::InvalidTemplate(name.to_string()))?;
        let value = parameter_value(param, arguments)
            .ok_or_else(|| EngineError::MissingArgument(name.to_string()))?;
        result.push_str(&value);

        rest = &after_start[end + 2..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Substitutes `$name` and `${name}` placeholders in a command.
pub fn substitute(command: &str, bindings: &BTreeMap<String, String>) -> Result<String> {
    let lookup = |name: &str| {
        bindings
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| EngineError::InvalidTemplate(name.to_string()))
    };

    let mut result = String::with_capacity(command.len());
    let mut rest = command;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(escaped) = after.strip_prefix('$') {
            result.push('$');
            rest = escaped;
            continue;
        }

        if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) if identifier_len(&braced[..end]) == end && end > 0 => {
                    result.push_str(lookup(&braced[..end])?);
                    rest = &braced[end + 1..];
                }
                _ => {
                    result.push('$');
                    rest = after;
                }
            }
            continue;
        }

        let len = identifier_len(after);
        if len == 0 {
            result.push('$');
            rest = after;
            continue;
        }

        result.push_str(lookup(&after[..len])?);
        rest = &after[len..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Length of the identifier (`[A-Za-z_][A-Za-z0-9_]*`) at the start of `text`.
fn identifier_len(text: &str) -> usize {
    let mut len = 0;
    for (index, c) in text.char_indices() {
        let valid = if index == 0 {
            c == '_' || c.is_ascii_alphabetic()
        } else {
            c == '_' || c.is_ascii_alphanumeric()
        };
        if !valid {
            break;
        }
        len = index + 1;
    }
    len
}

fn check_argument(param: &ParameterDecl, value: &ArgumentValue) -> Result<()> {
    let invalid = |reason: &str| EngineError::InvalidArgument {
        name: param.id.clone(),
        reason: reason.to_string(),
    };

    match (param.datatype, value) {
        (DataType::File, ArgumentValue::Scalar(_)) => Err(invalid("expects a file")),
        (DataType::File, ArgumentValue::File(handle)) => match &handle.target {
            Some(target) if !is_workspace_relative(target) => {
                Err(invalid("target is outside the run directory"))
            }
            _ => Ok(()),
        },
        (_, ArgumentValue::File(_)) => Err(invalid("expects a scalar value")),
        (DataType::Int, ArgumentValue::Scalar(v)) if v.trim().parse::<i64>().is_err() => {
            Err(invalid("expects an integer"))
        }
        (DataType::Decimal, ArgumentValue::Scalar(v)) if v.trim().parse::<f64>().is_err() => {
            Err(invalid("expects a decimal number"))
        }
        (DataType::Bool, ArgumentValue::Scalar(v)) if v.trim().parse::<bool>().is_err() => {
            Err(invalid("expects true or false"))
        }
        _ => Ok(()),
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
