//! Workflow Template Module
//!
//! Templates describe what a run executes. The engine consumes them only
//! through the [`TemplateResolver`] and [`FileStager`] traits.
//!
//! # Structure
//!
//! - [`model`]: Template data structures
//! - [`parser`]: YAML loading
//! - [`arguments`]: Caller-supplied parameter values
//! - [`resolver`]: Argument validation and placeholder substitution
//! - [`stager`]: Copying input files into a run directory

pub mod arguments;
pub mod model;
pub mod parser;
pub mod resolver;
pub mod stager;

pub use arguments::{ArgumentValue, Arguments, FileHandle};
pub use model::{DataType, ParameterDecl, StepSpec, WorkflowSpec, WorkflowTemplate};
pub use parser::{load_template, parse_template};
pub use resolver::{DefaultResolver, TemplateResolver};
pub use stager::{is_workspace_relative, CopyStager, FileStager};
