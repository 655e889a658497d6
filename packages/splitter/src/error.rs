//! Error types for the splitter.
//!
//! Uses the dual-error pattern: `SplitterError` for library consumers
//! with detailed error context, and `FailureReason` for the subset of
//! errors that route a source file into the `failed` holding area:
//! missing envelope metadata, invalid UTF-8, and a document whose
//! structure cannot be parsed. I/O errors are never routed.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Main error type for the splitter library.
#[derive(Debug, Error)]
pub enum SplitterError {
    /// The envelope attributes could not be found by the line scanner.
    #[error("No ONIX envelope metadata in {}: {reason}", .path.display())]
    MetadataNotFound { path: PathBuf, reason: String },

    /// The source file is not valid UTF-8.
    #[error("File is not valid UTF-8: {}", .path.display())]
    NotUtf8 { path: PathBuf },

    /// The document parsed, but its structure cannot be split.
    #[error("Malformed ONIX document {}: {reason}", .path.display())]
    MalformedDocument { path: PathBuf, reason: String },

    /// XML parsing failed while streaming.
    #[error("XML parsing failed: {0}")]
    Xml(#[from] quick_xml::Error),

    /// IO error (disk full, permission denied, rename failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A byte size option could not be parsed.
    #[error("Invalid byte size: '{0}'. Expected a number with optional unit (e.g., 200MB, 512KiB)")]
    InvalidByteSize(String),
}

impl From<quick_xml::events::attributes::AttrError> for SplitterError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(quick_xml::Error::from(err))
    }
}

/// Why a source file was moved to the `failed` holding area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MetadataNotFound,
    NotUtf8,
    MalformedDocument,
}

impl SplitterError {
    /// The failure reason when this error routes the source to `failed`.
    ///
    /// Such failures are terminal for the file and never retried
    /// automatically. Every other error leaves the source in place.
    #[must_use]
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::MetadataNotFound { .. } => Some(FailureReason::MetadataNotFound),
            Self::NotUtf8 { .. } => Some(FailureReason::NotUtf8),
            Self::MalformedDocument { .. } => Some(FailureReason::MalformedDocument),
            Self::Xml(quick_xml::Error::Io(_)) => None,
            Self::Xml(_) => Some(FailureReason::MalformedDocument),
            _ => None,
        }
    }

    /// Whether this error moves the source file to the `failed` folder.
    #[must_use]
    pub fn is_routable_failure(&self) -> bool {
        self.failure_reason().is_some()
    }
}

/// Result type alias for splitter operations.
pub type Result<T> = std::result::Result<T, SplitterError>;
