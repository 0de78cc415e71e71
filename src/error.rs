//! Error taxonomy for the import pipeline.
//!
//! Each variant maps to one propagation rule:
//!
//! | Variant | Scope |
//! |---------|-------|
//! | [`ImportError::SourceNotFound`] | fatal to the run |
//! | [`ImportError::SourceInaccessible`] | fatal to one parser, may trigger fallback |
//! | [`ImportError::MalformedSource`] | fatal to one parser, may trigger fallback |
//! | [`ImportError::MalformedRecord`] | one record, skipped |
//! | [`ImportError::RemoteTransient`] | retried with backoff |
//! | [`ImportError::RemoteFatal`] | one note, counted as failed |
//!
//! Degraded rich-text conversion is not an error at all: the converter falls
//! back to plain text and the pipeline counts it (see [`crate::convert`]).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no Stickies source found ({0})")]
    SourceNotFound(String),

    #[error(
        "cannot read {path}: {source} (quit the Stickies app and check file permissions)"
    )]
    SourceInaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {path}: {reason}")]
    MalformedSource { path: PathBuf, reason: String },

    #[error("record {record}: {reason}")]
    MalformedRecord { record: String, reason: String },

    #[error("transient Notion API error: {0}")]
    RemoteTransient(String),

    #[error("Notion API error: {0}")]
    RemoteFatal(String),
}

impl ImportError {
    /// Whether the caller may try the next source candidate after this error.
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            ImportError::SourceInaccessible { .. } | ImportError::MalformedSource { .. }
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ImportError::RemoteTransient(_))
    }

    /// Classify an I/O failure on a source file.
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => {
                ImportError::SourceNotFound(format!("{} does not exist", path.display()))
            }
            _ => ImportError::SourceInaccessible { path, source: err },
        }
    }
}

pub type Result<T, E = ImportError> = std::result::Result<T, E>;
