use std::path::Path;
use std::sync::Arc;

use onix_splitter::config::require_directory;
use onix_splitter::routing::{cleanup_stale_temp_files, list_source_files};
use onix_splitter::{FileProcessor, ProcessingOutcome};
use tokio_util::sync::CancellationToken;

use crate::config::WatcherConfig;
use crate::error::Result;

/// Counts for one pass over the input directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub processed: usize,
    pub split: usize,
    pub copied: usize,
    pub deferred: usize,
    pub failed: usize,
    pub errored: usize,
}

impl CycleSummary {
    fn record(&mut self, outcome: &ProcessingOutcome) {
        match outcome {
            ProcessingOutcome::Split(_) => self.split += 1,
            ProcessingOutcome::CopiedWhole { .. } => self.copied += 1,
            ProcessingOutcome::Deferred => self.deferred += 1,
            ProcessingOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Run the watch worker loop.
///
/// Lists the input directory, processes each source file in turn, then
/// sleeps for the poll interval. Stops when `cancel` fires. Cancellation
/// is checked between files; a file in progress always runs to completion.
pub async fn run_watch_worker(config: WatcherConfig, cancel: CancellationToken) -> Result<()> {
    require_directory(&config.input_dir)?;
    let splitter_config = config.splitter_config();
    splitter_config.validate()?;
    splitter_config.ensure_output_dir()?;

    let removed = cleanup_stale_temp_files(&config.output_dir)?;
    if removed > 0 {
        tracing::info!(removed, "removed stale temp files from an earlier run");
    }

    let processor = Arc::new(config.build_processor());

    tracing::info!(
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        poll_interval = ?config.poll_interval,
        detector = processor.detector_name(),
        "starting watch worker"
    );

    loop {
        match poll_once(&processor, &config.input_dir, &cancel).await {
            Ok(summary) if summary.processed > 0 => {
                tracing::info!(
                    processed = summary.processed,
                    split = summary.split,
                    copied = summary.copied,
                    deferred = summary.deferred,
                    failed = summary.failed,
                    errored = summary.errored,
                    "poll cycle finished"
                );
            }
            Ok(_) => tracing::debug!("no source files found"),
            Err(e) => tracing::error!(error = %e, "poll cycle failed"),
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::info!("shutdown requested, stopping worker");
                break;
            }
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }

    Ok(())
}

/// Process every source file currently in `input_dir`, one at a time.
///
/// Per-file errors are logged and counted; they never end the cycle.
pub async fn poll_once(
    processor: &Arc<FileProcessor>,
    input_dir: &Path,
    cancel: &CancellationToken,
) -> Result<CycleSummary> {
    let dir = input_dir.to_path_buf();
    let sources = tokio::task::spawn_blocking(move || list_source_files(&dir)).await??;

    let mut summary = CycleSummary::default();
    for source in sources {
        if cancel.is_cancelled() {
            tracing::debug!("shutdown requested, leaving remaining files for the next run");
            break;
        }

        let worker = Arc::clone(processor);
        let path = source.clone();
        let result = tokio::task::spawn_blocking(move || handle_file(&worker, &path)).await?;

        summary.processed += 1;
        match result {
            Ok(outcome) => {
                tracing::debug!(path = %source.display(), outcome = outcome.label(), "file handled");
                summary.record(&outcome);
            }
            Err(e) => {
                tracing::error!(path = %source.display(), error = %e, "failed to process file");
                summary.errored += 1;
            }
        }
    }

    Ok(summary)
}

/// Process one file; copies are archived here since the engine leaves them in place.
fn handle_file(processor: &FileProcessor, path: &Path) -> onix_splitter::Result<ProcessingOutcome> {
    let outcome = processor.process_file(path)?;
    if matches!(outcome, ProcessingOutcome::CopiedWhole { .. }) {
        processor.archive(path)?;
    }
    Ok(outcome)
}
