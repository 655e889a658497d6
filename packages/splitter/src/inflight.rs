//! Detection of files still being written by an upstream producer.
//!
//! The default [`SizeStabilityDetector`] is a best-effort heuristic: it
//! samples the file size twice with a short sleep in between. A producer
//! that pauses for longer than the interval mid-transfer is not detected.
//! Environments that need a guarantee should use a completion-marker
//! convention ([`CompletionMarkerDetector`]) or their own implementation of
//! [`InFlightDetector`].

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use crate::error::{Result, SplitterError};

/// Decides whether a source file may still be growing.
pub trait InFlightDetector: Send + Sync {
    /// Returns `true` if the file should be left alone for this poll cycle.
    fn is_still_writing(&self, path: &Path) -> Result<bool>;

    /// Clean up detector state once the source has left the input directory.
    fn release(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Short name for log lines.
    fn name(&self) -> &'static str;
}

/// Compares two size samples taken `interval` apart.
#[derive(Debug, Clone, Copy)]
pub struct SizeStabilityDetector {
    interval: Duration,
}

impl SizeStabilityDetector {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl InFlightDetector for SizeStabilityDetector {
    fn is_still_writing(&self, path: &Path) -> Result<bool> {
        let before = fs::metadata(path)?.len();
        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }
        let after = fs::metadata(path)?.len();

        if before != after {
            tracing::debug!(path = %path.display(), before, after, "file size changed between samples");
        }
        Ok(before != after)
    }

    fn name(&self) -> &'static str {
        "size-stability"
    }
}

/// Treats a file as complete once a sibling marker file exists.
///
/// For `feed.xml` and suffix `.done` the marker is `feed.xml.done`.
#[derive(Debug, Clone)]
pub struct CompletionMarkerDetector {
    suffix: String,
}

impl CompletionMarkerDetector {
    #[must_use]
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    /// Path of the marker belonging to `path`.
    #[must_use]
    pub fn marker_path(&self, path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(&self.suffix);
        path.with_file_name(name)
    }
}

impl InFlightDetector for CompletionMarkerDetector {
    fn is_still_writing(&self, path: &Path) -> Result<bool> {
        Ok(!self.marker_path(path).is_file())
    }

    fn release(&self, path: &Path) -> Result<()> {
        let marker = self.marker_path(path);
        match fs::remove_file(&marker) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "completion-marker"
    }
}

/// Which detector a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InFlightStrategy {
    #[default]
    SizeStability,
    CompletionMarker,
}

impl InFlightStrategy {
    /// Build the detector for this strategy.
    #[must_use]
    pub fn build(
        self,
        interval: Duration,
        marker_suffix: &str,
    ) -> Box<dyn InFlightDetector> {
        match self {
            Self::SizeStability => Box::new(SizeStabilityDetector::new(interval)),
            Self::CompletionMarker => Box::new(CompletionMarkerDetector::new(marker_suffix)),
        }
    }
}

impl FromStr for InFlightStrategy {
    type Err = SplitterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "size" | "size-stability" => Ok(Self::SizeStability),
            "marker" | "completion-marker" => Ok(Self::CompletionMarker),
            other => Err(SplitterError::InvalidConfig(format!(
                "unknown in-flight strategy '{other}', expected 'size' or 'marker'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_size_stability_on_stable_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("feed.xml");
        fs::write(&path, "<ONIXMessage/>").unwrap();

        let detector = SizeStabilityDetector::new(Duration::from_millis(10));
        assert!(!detector.is_still_writing(&path).unwrap());
    }

    #[test]
    fn test_size_stability_on_growing_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("feed.xml");
        fs::write(&path, "<ONIXMessage>").unwrap();

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            let mut file = fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .unwrap();
            for _ in 0..40 {
                file.write_all(b"<Product/>").unwrap();
                file.flush().unwrap();
                thread::sleep(Duration::from_millis(10));
            }
        });

        thread::sleep(Duration::from_millis(20));
        let detector = SizeStabilityDetector::new(Duration::from_millis(150));
        let growing = detector.is_still_writing(&path).unwrap();
        writer.join().unwrap();

        assert!(growing);
    }

    #[test]
    fn test_size_stability_missing_file_errors() {
        let detector = SizeStabilityDetector::new(Duration::ZERO);
        assert!(detector.is_still_writing(Path::new("/nonexistent/feed.xml")).is_err());
    }

    #[test]
    fn test_completion_marker() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("feed.xml");
        fs::write(&path, "<ONIXMessage/>").unwrap();

        let detector = CompletionMarkerDetector::new(".done");
        assert_eq!(detector.marker_path(&path), tmp.path().join("feed.xml.done"));
        assert!(detector.is_still_writing(&path).unwrap());

        fs::write(detector.marker_path(&path), "").unwrap();
        assert!(!detector.is_still_writing(&path).unwrap());

        detector.release(&path).unwrap();
        assert!(!detector.marker_path(&path).exists());
        // Releasing twice is fine
        detector.release(&path).unwrap();
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "size".parse::<InFlightStrategy>().unwrap(),
            InFlightStrategy::SizeStability
        );
        assert_eq!(
            "Marker".parse::<InFlightStrategy>().unwrap(),
            InFlightStrategy::CompletionMarker
        );
        assert!("lock".parse::<InFlightStrategy>().is_err());
    }

    #[test]
    fn test_strategy_build() {
        let detector = InFlightStrategy::CompletionMarker.build(Duration::ZERO, ".ok");
        assert_eq!(detector.name(), "completion-marker");

        let detector = InFlightStrategy::default().build(Duration::ZERO, ".ok");
        assert_eq!(detector.name(), "size-stability");
    }
}
