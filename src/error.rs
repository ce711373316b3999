//! Error types shared by the library.

use std::path::{Path, PathBuf};

/// Result type alias for mutag operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed structured output from the index.
    #[error("Parse error at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// A parsed index record lacks a required key or carries a bad value.
    #[error("Malformed index record: {0}")]
    MalformedRecord(String),

    /// An external program (the indexer, a rule script) failed.
    #[error("{tool} failed ({status}): {stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("File does not belong to the configured maildir: {}", .0.display())]
    PathOutsideMaildir(PathBuf),

    #[error("File does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    /// Tag rules could not be loaded.
    #[error("Can't load tag rules at {}: {reason}", path.display())]
    RuleLoad { path: PathBuf, reason: String },

    /// Tag rules failed while evaluating a message.
    #[error("Tag rules failed: {0}")]
    Rule(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }

    pub fn rule_load(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::RuleLoad {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Per-file errors are reported and skipped; everything else aborts the run.
    pub fn is_per_message(&self) -> bool {
        matches!(
            self,
            Self::PathOutsideMaildir(_) | Self::PathNotFound(_) | Self::Io { .. }
        )
    }
}
