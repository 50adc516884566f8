//! Template Arguments
//!
//! Values supplied by the caller for template parameters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Arguments keyed by parameter identifier.
pub type Arguments = HashMap<String, ArgumentValue>;

/// A value bound to a template parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    /// A scalar value, substituted verbatim
    Scalar(String),

    /// A file that is copied into the run directory
    File(FileHandle),
}

impl ArgumentValue {
    pub fn scalar(value: impl ToString) -> Self {
        Self::Scalar(value.to_string())
    }

    pub fn file(source: impl Into<PathBuf>) -> Self {
        Self::File(FileHandle::new(source))
    }
}

/// Reference to a local file supplied as an argument.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHandle {
    /// Path of the file on the caller's filesystem
    pub source: PathBuf,

    /// Optional target path relative to the run directory
    pub target: Option<String>,
}

impl FileHandle {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Returns the file name of the source path.
    pub fn file_name(&self) -> String {
        Path::new(&self.source)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_from_number() {
        assert_eq!(ArgumentValue::scalar(3), ArgumentValue::Scalar("3".to_string()));
    }

    #[test]
    fn test_file_handle_name() {
        let handle = FileHandle::new("data/myfriends.txt");
        assert_eq!(handle.file_name(), "myfriends.txt");
        assert!(handle.target.is_none());

        let handle = handle.with_target("data/names.txt");
        assert_eq!(handle.target.as_deref(), Some("data/names.txt"));
    }
}
