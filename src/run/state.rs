//! Run State
//!
//! A run is created in the `Running` state and moves exactly once to either
//! `Success` or `Error`. Terminal states never change again.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Mints a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Raw result of executing a run's commands.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// Output file produced by a successful run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Declared output path, relative to the run directory
    pub identifier: String,

    /// Absolute path of the file on disk
    pub filepath: PathBuf,
}

impl Resource {
    pub fn new(identifier: impl Into<String>, filepath: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            filepath: filepath.into(),
        }
    }
}

/// State of a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RunState {
    Running {
        created_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
    },
    Success {
        created_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        resources: BTreeMap<String, Resource>,
    },
    Error {
        created_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        stopped_at: DateTime<Utc>,
        messages: Vec<String>,
    },
}

impl RunState {
    /// Creates the initial state of a run that starts now.
    pub fn running() -> Self {
        let now = Utc::now();
        Self::Running {
            created_at: now,
            started_at: now,
        }
    }

    /// Returns the success state following this one.
    ///
    /// Returns `None` if the run is not running.
    pub fn success(&self, resources: BTreeMap<String, Resource>) -> Option<Self> {
        match self {
            Self::Running {
                created_at,
                started_at,
            } => Some(Self::Success {
                created_at: *created_at,
                started_at: *started_at,
                finished_at: Utc::now(),
                resources,
            }),
            _ => None,
        }
    }

    /// Returns the error state following this one.
    ///
    /// Returns `None` if the run is not running. An empty message list is
    /// replaced by a generic message so that error states always explain
    /// themselves.
    pub fn error(&self, messages: Vec<String>) -> Option<Self> {
        let messages = if messages.is_empty() {
            vec!["run failed without diagnostic output".to_string()]
        } else {
            messages
        };

        match self {
            Self::Running {
                created_at,
                started_at,
            } => Some(Self::Error {
                created_at: *created_at,
                started_at: *started_at,
                stopped_at: Utc::now(),
                messages,
            }),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Running { created_at, .. }
            | Self::Success { created_at, .. }
            | Self::Error { created_at, .. } => *created_at,
        }
    }

    /// Error messages of a failed run (empty otherwise).
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Error { messages, .. } => messages,
            _ => &[],
        }
    }

    /// Resources of a successful run.
    pub fn resources(&self) -> Option<&BTreeMap<String, Resource>> {
        match self {
            Self::Success { resources, .. } => Some(resources),
            _ => None,
        }
    }

    /// Short lowercase name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Running { .. } => "running",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
