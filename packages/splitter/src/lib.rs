//! ONIX splitter - Stream large ONIX feed files into size-bounded messages.
//!
//! This crate rewrites gigabyte-scale ONIX 3.0 messages into a series of
//! smaller, standalone ONIX messages, each carrying the source declaration,
//! envelope attributes and header. Files that do not need splitting are
//! copied through unchanged.
//!
//! # Example
//!
//! ```
//! use onix_splitter::config::parse_byte_size;
//! use onix_splitter::policy::{decide, SplitDecision};
//!
//! let max = parse_byte_size("500MB").unwrap();
//! assert_eq!(decide(600_000_000, "3.0", max), SplitDecision::Split);
//! assert_eq!(decide(600_000_000, "2.1", max), SplitDecision::PassThrough);
//! ```
//!
//! # Architecture
//!
//! - [`metadata`]: Declaration and envelope attribute extraction
//! - [`utf8`]: Streaming UTF-8 validation
//! - [`inflight`]: Detection of files still being written
//! - [`policy`]: Pass-through or split decision
//! - [`xml`]: Namespace prefix normalization
//! - [`splitting`]: Streaming split engine and part writer
//! - [`routing`]: Output naming, pass-through copies, archive and failed moves
//! - [`processor`]: Per-file coordinator
//! - [`config`]: Thresholds and byte size parsing
//! - [`error`]: Error types and Result alias
//! - [`cli`]: Command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod inflight;
pub mod metadata;
pub mod policy;
pub mod processor;
pub mod routing;
pub mod splitting;
pub mod utf8;
pub mod xml;

// Re-export commonly used items
pub use config::{parse_byte_size, SplitOptions, SplitterConfig};
pub use error::{FailureReason, Result, SplitterError};
pub use inflight::{
    CompletionMarkerDetector, InFlightDetector, InFlightStrategy, SizeStabilityDetector,
};
pub use metadata::{extract_metadata, EnvelopeMetadata};
pub use processor::{FileProcessor, ProcessingOutcome};
pub use splitting::{SplitEngine, SplitReport};
