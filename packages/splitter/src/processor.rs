//! Per-file coordinator.
//!
//! Runs the steps for one source file in a fixed order: extract metadata,
//! validate UTF-8, decide, check for an in-flight write, then copy or
//! split. Rejected files (no metadata, not UTF-8, malformed XML) are moved
//! to `failed`;
//! split sources are moved to `archive` once every part is published.
//! Pass-through copies are archived by the caller through [`FileProcessor::archive`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::Span;

use crate::config::SplitterConfig;
use crate::error::{FailureReason, Result, SplitterError};
use crate::inflight::InFlightDetector;
use crate::metadata::extract_metadata;
use crate::policy::{decide, SplitDecision};
use crate::routing::{archive_source, fail_source, pass_through};
use crate::splitting::{SplitEngine, SplitReport};
use crate::utf8::ensure_utf8;

/// What happened to a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// Rejected and moved to the `failed` folder; not retried.
    Failed {
        reason: FailureReason,
        moved_to: PathBuf,
    },
    /// Copied unchanged into the output directory.
    CopiedWhole { output: PathBuf },
    /// Still being written; left untouched for the next cycle.
    Deferred,
    /// Split into parts and archived.
    Split(SplitReport),
}

impl ProcessingOutcome {
    /// Short label for logs and summaries.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "failed",
            Self::CopiedWhole { .. } => "copied",
            Self::Deferred => "deferred",
            Self::Split(_) => "split",
        }
    }

    /// Number of files written to the output directory.
    #[must_use]
    pub fn output_count(&self) -> usize {
        match self {
            Self::CopiedWhole { .. } => 1,
            Self::Split(report) => report.part_count(),
            Self::Failed { .. } | Self::Deferred => 0,
        }
    }
}

/// Processes source files one at a time.
pub struct FileProcessor {
    config: SplitterConfig,
    detector: Box<dyn InFlightDetector>,
    engine: SplitEngine,
}

impl FileProcessor {
    /// Create a processor whose split engine logs inside an `onix_split` span.
    pub fn new(config: SplitterConfig, detector: Box<dyn InFlightDetector>) -> Self {
        let span = tracing::info_span!("onix_split");
        Self::with_span(config, detector, span)
    }

    /// Create a processor with an explicit span for the split engine.
    pub fn with_span(
        config: SplitterConfig,
        detector: Box<dyn InFlightDetector>,
        span: Span,
    ) -> Self {
        let engine = SplitEngine::new(config.split_options(), span);
        Self {
            config,
            detector,
            engine,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    #[must_use]
    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Process one source file.
    ///
    /// Errors other than the rejection reasons are returned as `Err` and
    /// leave the source where it is, so the next attempt starts over.
    pub fn process_file(&self, path: &Path) -> Result<ProcessingOutcome> {
        tracing::info!(path = %path.display(), "processing file");

        let metadata = match extract_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => return self.reject(path, e),
        };
        if let Err(e) = ensure_utf8(path) {
            return self.reject(path, e);
        }

        let file_size = fs::metadata(path)?.len();
        let decision = decide(file_size, &metadata.release_version, self.config.max_file_size);
        tracing::info!(
            path = %path.display(),
            file_size,
            release = %metadata.release_version,
            decision = decision.as_str(),
            "routing decision"
        );

        // Checked before either branch: a growing file must not be copied half-written
        if self.detector.is_still_writing(path)? {
            tracing::info!(
                path = %path.display(),
                detector = self.detector.name(),
                "file is still being written, deferring"
            );
            return Ok(ProcessingOutcome::Deferred);
        }

        match decision {
            SplitDecision::PassThrough => {
                let output =
                    pass_through(path, &self.config.output_dir, &metadata.release_version)?;
                Ok(ProcessingOutcome::CopiedWhole { output })
            }
            SplitDecision::Split => {
                let report = match self.engine.split(path, &self.config.output_dir, &metadata) {
                    Ok(report) => report,
                    Err(e) => return self.reject(path, e),
                };
                self.archive(path)?;
                Ok(ProcessingOutcome::Split(report))
            }
        }
    }

    /// Move a handled source into `archive` and clear its detector state.
    pub fn archive(&self, path: &Path) -> Result<PathBuf> {
        let destination = archive_source(path)?;
        self.detector.release(path)?;
        Ok(destination)
    }

    fn reject(&self, path: &Path, error: SplitterError) -> Result<ProcessingOutcome> {
        let Some(reason) = error.failure_reason() else {
            tracing::error!(path = %path.display(), error = %error, "processing failed, leaving source in place");
            return Err(error);
        };

        tracing::warn!(path = %path.display(), error = %error, "rejecting source file");
        let moved_to = fail_source(path)?;
        self.detector.release(path)?;
        Ok(ProcessingOutcome::Failed { reason, moved_to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflight::{CompletionMarkerDetector, SizeStabilityDetector};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::tempdir;

    fn message(release: &str, products: usize) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <ONIXMessage xmlns=\"http://ns.editeur.org/onix/3.0/reference\" release=\"{release}\">\n\
             <Header><Sender>ACME</Sender></Header>\n"
        );
        for i in 0..products {
            xml.push_str(&format!(
                "<Product><RecordReference>{i:04}</RecordReference></Product>\n"
            ));
        }
        xml.push_str("</ONIXMessage>\n");
        xml
    }

    fn processor(output: &Path, max_file_size: u64) -> FileProcessor {
        let config = SplitterConfig::new(output)
            .with_max_file_size(max_file_size)
            .with_split_file_size(max_file_size / 2);
        FileProcessor::new(config, Box::new(SizeStabilityDetector::new(Duration::ZERO)))
    }

    #[test]
    fn test_split_archives_source() {
        let tmp = tempdir().unwrap();
        let output = tmp.path().join("out");
        fs::create_dir_all(&output).unwrap();
        let source = tmp.path().join("big.xml");
        fs::write(&source, message("3.0", 40)).unwrap();

        let outcome = processor(&output, 1024).process_file(&source).unwrap();

        let ProcessingOutcome::Split(report) = &outcome else {
            panic!("expected split, got {outcome:?}");
        };
        assert!(report.part_count() >= 2);
        assert_eq!(report.product_count, 40);
        assert!(!source.exists());
        assert!(tmp.path().join("archive").join("big.xml").exists());
        assert_eq!(outcome.label(), "split");
    }

    #[test]
    fn test_small_file_is_copied_not_archived() {
        let tmp = tempdir().unwrap();
        let output = tmp.path().join("out");
        fs::create_dir_all(&output).unwrap();
        let source = tmp.path().join("small.xml");
        fs::write(&source, message("3.0", 1)).unwrap();

        let outcome = processor(&output, 1024 * 1024).process_file(&source).unwrap();

        assert_eq!(
            outcome,
            ProcessingOutcome::CopiedWhole {
                output: output.join("Orig_3_0_small.xml")
            }
        );
        assert!(source.exists());
        assert_eq!(outcome.output_count(), 1);
    }

    #[test]
    fn test_other_release_is_copied_whatever_its_size() {
        let tmp = tempdir().unwrap();
        let output = tmp.path().join("out");
        fs::create_dir_all(&output).unwrap();
        let source = tmp.path().join("legacy.xml");
        fs::write(&source, message("2.1", 40)).unwrap();

        let outcome = processor(&output, 1024).process_file(&source).unwrap();

        assert_eq!(
            outcome,
            ProcessingOutcome::CopiedWhole {
                output: output.join("Orig_2_1_legacy.xml")
            }
        );
    }

    #[test]
    fn test_rejections_move_to_failed() {
        let tmp = tempdir().unwrap();
        let output = tmp.path().join("out");
        fs::create_dir_all(&output).unwrap();
        let no_envelope = tmp.path().join("plain.xml");
        let latin1 = tmp.path().join("latin1.xml");
        fs::write(&no_envelope, "<?xml version=\"1.0\"?>\n<Catalog/>\n").unwrap();
        let mut bytes = message("3.0", 1).into_bytes();
        bytes.extend_from_slice(b"<!-- caf\xE9 -->\n");
        fs::write(&latin1, bytes).unwrap();

        let processor = processor(&output, 1024);

        let outcome = processor.process_file(&no_envelope).unwrap();
        assert_eq!(
            outcome,
            ProcessingOutcome::Failed {
                reason: FailureReason::MetadataNotFound,
                moved_to: tmp.path().join("failed").join("plain.xml"),
            }
        );

        let outcome = processor.process_file(&latin1).unwrap();
        assert!(matches!(
            outcome,
            ProcessingOutcome::Failed {
                reason: FailureReason::NotUtf8,
                ..
            }
        ));
        assert_eq!(fs::read_dir(&output).unwrap().count(), 0);
    }

    #[test]
    fn test_malformed_source_moves_to_failed_without_parts() {
        let tmp = tempdir().unwrap();
        let output = tmp.path().join("out");
        fs::create_dir_all(&output).unwrap();
        let source = tmp.path().join("broken.xml");
        let xml = message("3.0", 40).replace(
            "</ONIXMessage>",
            "<Product><RecordReference>x</Broken></Product>\n</ONIXMessage>",
        );
        fs::write(&source, xml).unwrap();

        let outcome = processor(&output, 1024).process_file(&source).unwrap();

        assert_eq!(
            outcome,
            ProcessingOutcome::Failed {
                reason: FailureReason::MalformedDocument,
                moved_to: tmp.path().join("failed").join("broken.xml"),
            }
        );
        assert!(!source.exists());
        assert_eq!(fs::read_dir(&output).unwrap().count(), 0);
    }

    #[test]
    fn test_deferred_without_completion_marker() {
        let tmp = tempdir().unwrap();
        let output = tmp.path().join("out");
        fs::create_dir_all(&output).unwrap();
        let source = tmp.path().join("feed.xml");
        fs::write(&source, message("3.0", 40)).unwrap();

        let detector = CompletionMarkerDetector::new(".done");
        let marker = detector.marker_path(&source);
        let processor = FileProcessor::new(
            SplitterConfig::new(&output).with_max_file_size(1024),
            Box::new(detector),
        );

        assert_eq!(
            processor.process_file(&source).unwrap(),
            ProcessingOutcome::Deferred
        );
        assert!(source.exists());
        assert_eq!(fs::read_dir(&output).unwrap().count(), 0);

        fs::write(&marker, "").unwrap();
        let outcome = processor.process_file(&source).unwrap();
        assert_eq!(outcome.label(), "split");
        assert!(!marker.exists(), "marker is removed with the archived source");
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let outcome = ProcessingOutcome::CopiedWhole {
            output: PathBuf::from("out/Orig_2_1_a.xml"),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "copied_whole");
        assert_eq!(json["output"], "out/Orig_2_1_a.xml");
    }
}
