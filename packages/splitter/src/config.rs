//! Configuration constants and validation functions for the splitter.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, SplitterError};

/// Default whole-file size (500 MiB) above which a 3.0 feed is split.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Default target size per output part (200 MiB).
pub const DEFAULT_SPLIT_FILE_SIZE: u64 = 200 * 1024 * 1024;

/// Default interval between directory polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default sampling interval of the size-stability in-flight detector.
pub const DEFAULT_INFLIGHT_INTERVAL_MS: u64 = 500;

/// Default minimum product payload for the trailing part to be published.
///
/// One byte means "at least one product"; the trailing part is only
/// discarded when it holds nothing but the header.
pub const DEFAULT_MIN_PART_BYTES: u64 = 1;

/// Name of the folder (inside the input directory) receiving processed sources.
pub const ARCHIVE_DIR_NAME: &str = "archive";

/// Name of the folder (inside the input directory) receiving rejected sources.
pub const FAILED_DIR_NAME: &str = "failed";

/// Suffix of part files under construction.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Prefix of every file written to the output directory.
pub const OUTPUT_PREFIX: &str = "Orig";

/// Declaration used when the source has no `<?xml ...?>` first line.
pub const DEFAULT_XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Byte size pattern: digits with an optional decimal or binary unit.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static BYTE_SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*(b|kb|mb|gb|tb|kib|mib|gib|tib|k|m|g|t)?\s*$")
        .expect("valid regex")
});

/// Parse a human-friendly byte size.
///
/// Decimal units (`KB`, `MB`, `GB`, `TB`) are powers of 1000, binary units
/// (`KiB`, `MiB`, `GiB`, `TiB`) and the bare letters (`K`, `M`, `G`, `T`)
/// are powers of 1024. A bare number is a byte count.
///
/// # Examples
/// ```
/// use onix_splitter::config::parse_byte_size;
///
/// assert_eq!(parse_byte_size("1048576").unwrap(), 1_048_576);
/// assert_eq!(parse_byte_size("200MB").unwrap(), 200_000_000);
/// assert_eq!(parse_byte_size("512KiB").unwrap(), 512 * 1024);
/// assert!(parse_byte_size("lots").is_err());
/// ```
pub fn parse_byte_size(value: &str) -> Result<u64> {
    let invalid = || SplitterError::InvalidByteSize(value.to_string());

    let captures = BYTE_SIZE_PATTERN.captures(value).ok_or_else(invalid)?;
    let amount: u64 = captures[1].parse().map_err(|_| invalid())?;

    let multiplier: u64 = match captures
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("b") => 1,
        Some("kb") => 1_000,
        Some("mb") => 1_000_000,
        Some("gb") => 1_000_000_000,
        Some("tb") => 1_000_000_000_000,
        Some("k" | "kib") => 1 << 10,
        Some("m" | "mib") => 1 << 20,
        Some("g" | "gib") => 1 << 30,
        Some("t" | "tib") => 1 << 40,
        Some(_) => return Err(invalid()),
    };

    amount.checked_mul(multiplier).ok_or_else(invalid)
}

/// Options consumed by the streaming split engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitOptions {
    /// A part is closed once its size reaches this many bytes.
    pub split_file_size: u64,

    /// Minimum product payload of the trailing part; smaller trailing parts are discarded.
    pub min_part_bytes: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            split_file_size: DEFAULT_SPLIT_FILE_SIZE,
            min_part_bytes: DEFAULT_MIN_PART_BYTES,
        }
    }
}

/// Plain parameters of the per-file processor.
///
/// Owned by whoever drives the splitter (CLI or watcher) and passed in
/// as-is; the library never reads the environment itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    pub output_dir: PathBuf,
    pub max_file_size: u64,
    pub split_file_size: u64,
    pub min_part_bytes: u64,
}

impl SplitterConfig {
    /// Create a configuration with default thresholds.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            split_file_size: DEFAULT_SPLIT_FILE_SIZE,
            min_part_bytes: DEFAULT_MIN_PART_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    #[must_use]
    pub fn with_split_file_size(mut self, bytes: u64) -> Self {
        self.split_file_size = bytes;
        self
    }

    #[must_use]
    pub fn with_min_part_bytes(mut self, bytes: u64) -> Self {
        self.min_part_bytes = bytes;
        self
    }

    /// Options for the split engine.
    #[must_use]
    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            split_file_size: self.split_file_size,
            min_part_bytes: self.min_part_bytes,
        }
    }

    /// Validate thresholds.
    ///
    /// A split size at or above the whole-file threshold is allowed (a split
    /// file then yields a single part), but it is almost always a mistake.
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(SplitterError::InvalidConfig(
                "max file size must be greater than zero".to_string(),
            ));
        }
        if self.split_file_size == 0 {
            return Err(SplitterError::InvalidConfig(
                "split file size must be greater than zero".to_string(),
            ));
        }
        if self.split_file_size >= self.max_file_size {
            tracing::warn!(
                split_file_size = self.split_file_size,
                max_file_size = self.max_file_size,
                "split file size is not below the max file size, split files yield a single part"
            );
        }
        Ok(())
    }

    /// Create the output directory if it does not exist yet.
    pub fn ensure_output_dir(&self) -> Result<()> {
        ensure_directory(&self.output_dir)
    }
}

/// Create `dir` if missing; fail if the path exists but is not a directory.
pub fn ensure_directory(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(SplitterError::InvalidConfig(format!(
            "path is not a directory: {}",
            dir.display()
        )));
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Check that `dir` is an existing directory.
pub fn require_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Err(SplitterError::InvalidConfig(format!(
            "directory does not exist: {}",
            dir.display()
        )));
    }
    if !dir.is_dir() {
        return Err(SplitterError::InvalidConfig(format!(
            "path is not a directory: {}",
            dir.display()
        )));
    }
    Ok(())
}
