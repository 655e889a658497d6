//! Types reported by the split engine.

use std::path::PathBuf;

use serde::Serialize;

/// Result of streaming one source file into parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitReport {
    /// Published parts, in ordinal order.
    pub parts: Vec<PathBuf>,

    /// Products written to published parts.
    pub product_count: usize,

    /// Top-level elements that were neither the header nor a product.
    pub skipped_count: usize,

    /// Products in a trailing part that fell below the minimum part size.
    pub discarded_product_count: usize,

    /// Total size of the published parts.
    pub bytes_written: u64,
}

impl SplitReport {
    #[must_use]
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }
}
