//! Workflow Template Model
//!
//! Data structures describing a parameterized workflow template.
//!
//! # Example YAML Format
//!
//! ```yaml
//! workflow:
//!   inputs:
//!     files:
//!       - code/greet.sh
//!     parameters:
//!       script: code/greet.sh
//!       inputfile: $[[names]]
//!       outputfile: results/greetings.txt
//!       sleeptime: $[[sleeptime]]
//!   workflow:
//!     type: serial
//!     specification:
//!       steps:
//!         - environment: alpine:3
//!           commands:
//!             - sleep ${sleeptime}
//!             - sh ${script} ${inputfile} ${outputfile}
//!   outputs:
//!     files:
//!       - results/greetings.txt
//! parameters:
//!   - id: names
//!     datatype: file
//!     as: data/names.txt
//!   - id: sleeptime
//!     datatype: int
//!     default: 1
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// A parameterized workflow together with its parameter declarations.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkflowTemplate {
    /// Directory that static input files are copied from
    #[serde(skip)]
    pub source_dir: PathBuf,

    /// The workflow specification (inputs, steps, outputs)
    #[serde(rename = "workflow")]
    pub workflow_spec: WorkflowSpec,

    /// Declared template parameters
    #[serde(default)]
    pub parameters: Vec<ParameterDecl>,
}

impl WorkflowTemplate {
    /// Creates a template from a specification and its parameters.
    pub fn new(
        source_dir: impl Into<PathBuf>,
        workflow_spec: WorkflowSpec,
        parameters: Vec<ParameterDecl>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            workflow_spec,
            parameters,
        }
    }

    /// Looks up a parameter declaration by identifier.
    pub fn get_parameter(&self, id: &str) -> Option<&ParameterDecl> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Returns the static input files to stage into each run.
    pub fn input_files(&self) -> &[String] {
        &self.workflow_spec.inputs.files
    }

    /// Returns the raw command templates of all steps in order.
    pub fn raw_commands(&self) -> impl Iterator<Item = &str> {
        self.workflow_spec
            .workflow
            .specification
            .steps
            .iter()
            .flat_map(|step| step.commands.iter().map(String::as_str))
    }
}

/// REANA-style workflow specification.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct WorkflowSpec {
    #[serde(default)]
    pub inputs: Inputs,

    #[serde(default)]
    pub workflow: WorkflowBody,

    #[serde(default)]
    pub outputs: Outputs,
}

/// Files and parameter bindings consumed by the workflow.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Inputs {
    /// Paths relative to the template source directory
    #[serde(default)]
    pub files: Vec<String>,

    /// Workflow parameter bindings; values may reference template
    /// parameters with `$[[name]]`
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct WorkflowBody {
    /// Workflow type (only serial execution is supported)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub specification: Specification,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Specification {
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

/// A single workflow step: an ordered list of command templates.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StepSpec {
    /// Container image or environment label (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default)]
    pub commands: Vec<String>,
}

impl StepSpec {
    pub fn new(commands: Vec<String>) -> Self {
        Self {
            environment: None,
            commands,
        }
    }
}

/// Output files produced by the workflow.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Outputs {
    /// Paths relative to the run directory; may reference `$[[name]]`
    #[serde(default)]
    pub files: Vec<String>,
}

/// Value type of a template parameter.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Int,
    Decimal,
    Bool,
    File,
}

/// Declaration of a template parameter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParameterDecl {
    /// Identifier used in `$[[id]]` references
    pub id: String,

    /// Human readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub datatype: DataType,

    /// Value used when no argument is supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default = "default_required")]
    pub required: bool,

    /// Target path inside the run directory for file parameters
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

fn default_required() -> bool {
    true
}

impl ParameterDecl {
    /// Creates a required string parameter without default.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            datatype: DataType::String,
            default: None,
            required: true,
            target: None,
        }
    }

    pub fn with_datatype(mut self, datatype: DataType) -> Self {
        self.datatype = datatype;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn is_file(&self) -> bool {
        self.datatype == DataType::File
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_template() -> WorkflowTemplate {
        let mut spec = WorkflowSpec::default();
        spec.inputs.files.push("code/run.sh".to_string());
        spec.workflow.specification.steps = vec![
            StepSpec::new(vec!["echo a".to_string(), "echo b".to_string()]),
            StepSpec::new(vec!["echo c".to_string()]),
        ];
        WorkflowTemplate::new(
            "/tmp/template",
            spec,
            vec![ParameterDecl::new("names").with_datatype(DataType::File)],
        )
    }

    #[test]
    fn test_raw_commands_in_step_order() {
        let template = sample_template();
        let commands: Vec<&str> = template.raw_commands().collect();
        assert_eq!(commands, vec!["echo a", "echo b", "echo c"]);
    }

    #[test]
    fn test_get_parameter() {
        let template = sample_template();
        assert!(template.get_parameter("names").unwrap().is_file());
        assert!(template.get_parameter("unknown").is_none());
    }

    #[test]
    fn test_parameter_builder() {
        let param = ParameterDecl::new("sleeptime")
            .with_datatype(DataType::Int)
            .with_default(10)
            .optional();

        assert_eq!(param.datatype, DataType::Int);
        assert_eq!(param.default, Some(Value::from(10)));
        assert!(!param.required);
        assert!(!param.is_file());
    }

    #[test]
    fn test_parameter_defaults_from_yaml() {
        let param: ParameterDecl = serde_yaml::from_str("id: greeting").unwrap();
        assert_eq!(param.datatype, DataType::String);
        assert!(param.required);
        assert!(param.default.is_none());
        assert!(param.target.is_none());
    }

    #[test]
    fn test_file_parameter_target_from_yaml() {
        let param: ParameterDecl =
            serde_yaml::from_str("id: names\ndatatype: file\nas: data/names.txt").unwrap();
        assert!(param.is_file());
        assert_eq!(param.target.as_deref(), Some("data/names.txt"));
    }
}
