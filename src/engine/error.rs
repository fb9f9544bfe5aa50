//! Error taxonomy for the encode pipeline.
//!
//! Configuration, tool provisioning and single-file index errors stop the run.
//! Probe and launch errors are scoped to one file; the orchestrator records
//! them and moves on (see [`EncodeError::is_per_file`]).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid configuration: {}", .0.join("; "))]
    ConfigValidation(Vec<String>),

    #[error("failed to provision encoder binary: {0}")]
    ToolFetch(String),

    #[error("failed to probe {}: {reason}", path.display())]
    Probe { path: PathBuf, reason: String },

    #[error("failed to launch encoder for {}: {source}", path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "single file mode is active, but the file index ({index}) exceeds the amount of files found ({count})"
    )]
    FileIndexOutOfRange { index: usize, count: usize },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl EncodeError {
    pub fn probe(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EncodeError::Probe {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        EncodeError::Io {
            context: context.into(),
            source,
        }
    }

    /// Errors that only affect the file being processed.
    ///
    /// A launch error caused by a missing or non-executable binary is not
    /// per-file: every following file would fail the same way.
    pub fn is_per_file(&self) -> bool {
        match self {
            EncodeError::Probe { .. } => true,
            EncodeError::Launch { source, .. } => !matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}
