//! Engine Errors
//!
//! Setup-phase failures (argument validation, file staging, template
//! resolution) and registry lookups surface as [`EngineError`]. Failures of
//! the commands themselves never do; they are captured in the run state.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the engine and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required template parameter has neither an argument nor a default.
    #[error("missing argument for parameter '{0}'")]
    MissingArgument(String),

    /// An argument does not fit the parameter it is bound to.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// A command or output path references a value that cannot be resolved.
    #[error("invalid template: unresolved reference '{0}'")]
    InvalidTemplate(String),

    /// A declared input file or file argument does not exist.
    #[error("input file not found: {}", .0.display())]
    InputFileNotFound(PathBuf),

    /// A staged or declared path would resolve outside the run directory.
    #[error("path '{0}' is outside the run directory")]
    OutsideWorkspace(String),

    /// The template document could not be parsed.
    #[error("failed to parse template: {0}")]
    TemplateParse(String),

    #[error("unknown run '{0}'")]
    UnknownRun(String),

    /// The run is still executing and must be canceled before removal.
    #[error("run '{0}' is still active")]
    RunActive(String),

    #[error("run '{0}' is already registered")]
    DuplicateRun(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Returns true for errors caused by the filesystem.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::InputFileNotFound(_) | Self::Io(_))
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::TemplateParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::MissingArgument("names".to_string());
        assert_eq!(err.to_string(), "missing argument for parameter 'names'");

        let err = EngineError::RunActive("abc".to_string());
        assert!(err.to_string().contains("abc"));

        let err = EngineError::InputFileNotFound(PathBuf::from("/no/such/file"));
        assert!(err.to_string().contains("/no/such/file"));

        let err = EngineError::OutsideWorkspace("../escape.txt".to_string());
        assert_eq!(err.to_string(), "path '../escape.txt' is outside the run directory");
    }

    #[test]
    fn test_io_classification() {
        assert!(EngineError::InputFileNotFound(PathBuf::from("x")).is_io());
        assert!(EngineError::Io(io::Error::new(io::ErrorKind::Other, "boom")).is_io());
        assert!(!EngineError::UnknownRun("x".to_string()).is_io());
        assert!(!EngineError::InvalidTemplate("x".to_string()).is_io());
        assert!(!EngineError::OutsideWorkspace("/x".to_string()).is_io());
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<Vec<String>>("{ not: [a list").unwrap_err();
        let err: EngineError = yaml_err.into();
        assert!(matches!(err, EngineError::TemplateParse(_)));
    }
}
