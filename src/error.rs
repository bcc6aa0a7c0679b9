//! Error types for image builds.
//!
//! Each variant maps to one failure class of a build run. Argument errors are
//! raised before any side effect; the rest are raised by the step that failed.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for image build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("invalid argument '{name}': {reason}")]
    Argument { name: &'static str, reason: String },

    #[error("failed to acquire binary '{source_ref}': {reason}")]
    ArtifactAcquisition { source_ref: String, reason: String },

    #[error("{0}")]
    Packaging(#[from] PackagingError),

    #[error("command `{command}` failed in '{cwd}': {reason}")]
    BuildCommand {
        command: String,
        cwd: PathBuf,
        reason: String,
    },

    #[error("{action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("preflight failed:\n{0}")]
    Preflight(String),
}

#[derive(Error, Debug)]
pub enum PackagingError {
    #[error(
        "source archive '{}' not found after packaging{}",
        .expected.display(),
        format_candidates(.candidates)
    )]
    ArchiveMissing {
        expected: PathBuf,
        candidates: Vec<String>,
    },

    #[error("unreadable package metadata from `{command}`: {reason}")]
    Metadata { command: String, reason: String },
}

fn format_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!(" (other archives present: {})", candidates.join(", "))
    }
}

impl BuildError {
    pub(crate) fn argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Argument {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
