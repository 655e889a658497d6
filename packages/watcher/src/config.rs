use std::path::PathBuf;
use std::time::Duration;

use onix_splitter::config::{
    DEFAULT_INFLIGHT_INTERVAL_MS, DEFAULT_MAX_FILE_SIZE, DEFAULT_MIN_PART_BYTES,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SPLIT_FILE_SIZE,
};
use onix_splitter::{
    parse_byte_size, FileProcessor, InFlightDetector, InFlightStrategy, SplitterConfig,
};

use crate::error::{Result, WatcherError};

/// Default suffix of completion marker files (`feed.xml.done`).
pub const DEFAULT_COMPLETION_MARKER_SUFFIX: &str = ".done";

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_file_size: u64,
    pub split_file_size: u64,
    pub min_part_bytes: u64,
    pub poll_interval: Duration,
    pub inflight_strategy: InFlightStrategy,
    pub inflight_interval: Duration,
    pub completion_marker_suffix: String,
}

impl WatcherConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            split_file_size: DEFAULT_SPLIT_FILE_SIZE,
            min_part_bytes: DEFAULT_MIN_PART_BYTES,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            inflight_strategy: InFlightStrategy::default(),
            inflight_interval: Duration::from_millis(DEFAULT_INFLIGHT_INTERVAL_MS),
            completion_marker_suffix: DEFAULT_COMPLETION_MARKER_SUFFIX.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let input_dir = lookup("ONIX_INPUT_DIR")
            .ok_or_else(|| WatcherError::Config("ONIX_INPUT_DIR not set".into()))?;

        let output_dir = lookup("ONIX_OUTPUT_DIR")
            .ok_or_else(|| WatcherError::Config("ONIX_OUTPUT_DIR not set".into()))?;

        let max_file_size = byte_size(&lookup, "ONIX_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;
        let split_file_size = byte_size(&lookup, "ONIX_SPLIT_FILE_SIZE", DEFAULT_SPLIT_FILE_SIZE)?;
        let min_part_bytes = byte_size(&lookup, "ONIX_MIN_PART_BYTES", DEFAULT_MIN_PART_BYTES)?;

        let poll_interval_secs: u64 = lookup("ONIX_POLL_INTERVAL_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        let inflight_interval_ms: u64 = lookup("ONIX_INFLIGHT_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_INFLIGHT_INTERVAL_MS);

        let inflight_strategy = match lookup("ONIX_INFLIGHT_STRATEGY") {
            Some(value) => value
                .parse()
                .map_err(|e: onix_splitter::SplitterError| WatcherError::Config(e.to_string()))?,
            None => InFlightStrategy::default(),
        };

        let completion_marker_suffix = lookup("ONIX_COMPLETION_MARKER_SUFFIX")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_COMPLETION_MARKER_SUFFIX.into());

        Ok(Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            max_file_size,
            split_file_size,
            min_part_bytes,
            poll_interval: Duration::from_secs(poll_interval_secs),
            inflight_strategy,
            inflight_interval: Duration::from_millis(inflight_interval_ms),
            completion_marker_suffix,
        })
    }

    pub fn splitter_config(&self) -> SplitterConfig {
        SplitterConfig::new(&self.output_dir)
            .with_max_file_size(self.max_file_size)
            .with_split_file_size(self.split_file_size)
            .with_min_part_bytes(self.min_part_bytes)
    }

    pub fn detector(&self) -> Box<dyn InFlightDetector> {
        self.inflight_strategy
            .build(self.inflight_interval, &self.completion_marker_suffix)
    }

    pub fn build_processor(&self) -> FileProcessor {
        FileProcessor::new(self.splitter_config(), self.detector())
    }
}

fn byte_size<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => parse_byte_size(&value)
            .map_err(|e| WatcherError::Config(format!("{key}: {e}"))),
        None => Ok(default),
    }
}
