//! Command-line interface for the splitter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::config::{parse_byte_size, SplitterConfig};
use crate::error::Result;
use crate::inflight::SizeStabilityDetector;
use crate::metadata::extract_metadata;
use crate::policy::decide;
use crate::processor::{FileProcessor, ProcessingOutcome};
use crate::routing::list_source_files;
use crate::utf8::is_valid_utf8;

/// ONIX splitter - Stream large ONIX feed files into size-bounded messages.
#[derive(Parser)]
#[command(name = "onix-splitter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split or copy ONIX files into an output directory.
    Split {
        /// Source files, or directories whose *.xml files are processed
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (created if missing)
        #[arg(short, long)]
        output: PathBuf,

        /// Files larger than this are split (e.g. 500MB, 1GiB)
        #[arg(long, default_value = "500MB", value_parser = byte_size)]
        max_file_size: u64,

        /// Target size of each part
        #[arg(long, default_value = "200MB", value_parser = byte_size)]
        split_file_size: u64,

        /// Trailing parts with less product payload than this are dropped
        #[arg(long, default_value = "1", value_parser = byte_size)]
        min_part_bytes: u64,

        /// Leave copied (not split) sources in place instead of archiving them
        #[arg(long)]
        no_archive: bool,

        /// Print a JSON report instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show envelope metadata and the split decision for a file.
    Inspect {
        /// ONIX file to inspect
        file: PathBuf,

        /// Threshold used for the split decision
        #[arg(long, default_value = "500MB", value_parser = byte_size)]
        max_file_size: u64,
    },
}

fn byte_size(value: &str) -> std::result::Result<u64, String> {
    parse_byte_size(value).map_err(|e| e.to_string())
}

/// Options of the `split` command.
#[derive(Debug, Clone)]
struct SplitArgs {
    inputs: Vec<PathBuf>,
    config: SplitterConfig,
    archive_copies: bool,
    json: bool,
}

/// Outcome for one source file, as printed by `--json`.
#[derive(Debug, Serialize)]
struct FileReport {
    source: PathBuf,
    #[serde(flatten)]
    outcome: ProcessingOutcome,
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Split {
            inputs,
            output,
            max_file_size,
            split_file_size,
            min_part_bytes,
            no_archive,
            json,
        } => {
            let config = SplitterConfig::new(output)
                .with_max_file_size(max_file_size)
                .with_split_file_size(split_file_size)
                .with_min_part_bytes(min_part_bytes);
            split_command(SplitArgs {
                inputs,
                config,
                archive_copies: !no_archive,
                json,
            })
        }
        Commands::Inspect {
            file,
            max_file_size,
        } => inspect_command(&file, max_file_size),
    }
}

/// Expand directories into their source files.
fn collect_sources(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for input in inputs {
        if input.is_dir() {
            sources.extend(list_source_files(input)?);
        } else {
            sources.push(input.clone());
        }
    }
    Ok(sources)
}

/// Execute the split command.
fn split_command(args: SplitArgs) -> Result<()> {
    args.config.validate()?;
    args.config.ensure_output_dir()?;
    let sources = collect_sources(&args.inputs)?;

    // One-shot runs do not wait for writers
    let processor = FileProcessor::new(
        args.config.clone(),
        Box::new(SizeStabilityDetector::new(Duration::ZERO)),
    );

    let pb = if args.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut reports = Vec::with_capacity(sources.len());
    for source in sources {
        pb.set_message(format!("Processing {}...", display_name(&source)));

        let outcome = match processor.process_file(&source) {
            Ok(outcome) => outcome,
            Err(e) => {
                pb.finish_and_clear();
                return Err(e);
            }
        };
        if args.archive_copies && matches!(outcome, ProcessingOutcome::CopiedWhole { .. }) {
            if let Err(e) = processor.archive(&source) {
                pb.finish_and_clear();
                return Err(e);
            }
        }

        reports.push(FileReport { source, outcome });
    }
    pb.finish_and_clear();

    if args.json {
        let json = serde_json::to_string_pretty(&reports).map_err(std::io::Error::from)?;
        println!("{json}");
    } else {
        print_summary(&reports, &args.config.output_dir);
    }

    Ok(())
}

fn print_summary(reports: &[FileReport], output_dir: &Path) {
    if reports.is_empty() {
        println!("{}", style("No ONIX files found").yellow());
        return;
    }

    for report in reports {
        let name = display_name(&report.source);
        match &report.outcome {
            ProcessingOutcome::Split(split) => {
                println!(
                    "{} {} into {} parts ({} products)",
                    style("Split").green().bold(),
                    style(name).cyan(),
                    split.part_count(),
                    split.product_count
                );
                if split.discarded_product_count > 0 {
                    println!(
                        "  {} {} trailing product(s) below --min-part-bytes were not written",
                        style("Dropped").yellow().bold(),
                        split.discarded_product_count
                    );
                }
            }
            ProcessingOutcome::CopiedWhole { output } => println!(
                "{} {} to {}",
                style("Copied").green().bold(),
                style(name).cyan(),
                output.display()
            ),
            ProcessingOutcome::Deferred => println!(
                "{} {} (still being written)",
                style("Deferred").yellow().bold(),
                style(name).cyan()
            ),
            ProcessingOutcome::Failed { reason, moved_to } => println!(
                "{} {} ({reason:?}), moved to {}",
                style("Rejected").red().bold(),
                style(name).cyan(),
                moved_to.display()
            ),
        }
    }

    let outputs: usize = reports.iter().map(|r| r.outcome.output_count()).sum();
    println!();
    println!(
        "{} {} file(s) in {}",
        style("Wrote").green().bold(),
        outputs,
        output_dir.display()
    );
}

/// Execute the inspect command.
fn inspect_command(file: &Path, max_file_size: u64) -> Result<()> {
    let metadata = extract_metadata(file)?;
    let utf8 = is_valid_utf8(file)?;
    let size = std::fs::metadata(file)?.len();
    let decision = decide(size, &metadata.release_version, max_file_size);

    println!("{} {}", style("Inspecting").bold(), style(file.display()).cyan());
    println!();
    println!("  Declaration: {}", metadata.declaration());
    println!("  Envelope: {}", metadata.envelope_tag);
    println!("  Namespace: {}", style(&metadata.xml_namespace).green());
    println!("  Release: {}", style(&metadata.release_version).green());
    println!("  Size: {size} bytes");
    if utf8 {
        println!("  UTF-8: {}", style("valid").green());
    } else {
        println!("  UTF-8: {}", style("invalid").red().bold());
    }
    println!("  Decision: {}", style(decision.as_str()).bold());

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_split_defaults() {
        let cli = Cli::parse_from(["onix-splitter", "split", "feed.xml", "--output", "out"]);

        let Commands::Split {
            inputs,
            output,
            max_file_size,
            split_file_size,
            min_part_bytes,
            no_archive,
            json,
        } = cli.command
        else {
            panic!("expected split command");
        };
        assert_eq!(inputs, vec![PathBuf::from("feed.xml")]);
        assert_eq!(output, PathBuf::from("out"));
        assert_eq!(max_file_size, 500_000_000);
        assert_eq!(split_file_size, 200_000_000);
        assert_eq!(min_part_bytes, 1);
        assert!(!no_archive);
        assert!(!json);
    }

    #[test]
    fn test_cli_parse_split_sizes() {
        let cli = Cli::parse_from([
            "onix-splitter",
            "split",
            "a.xml",
            "b.xml",
            "-o",
            "out",
            "--max-file-size",
            "1GiB",
            "--split-file-size",
            "64KiB",
            "--json",
        ]);

        let Commands::Split {
            inputs,
            max_file_size,
            split_file_size,
            json,
            ..
        } = cli.command
        else {
            panic!("expected split command");
        };
        assert_eq!(inputs.len(), 2);
        assert_eq!(max_file_size, 1024 * 1024 * 1024);
        assert_eq!(split_file_size, 64 * 1024);
        assert!(json);
    }

    #[test]
    fn test_cli_rejects_bad_size() {
        let result = Cli::try_parse_from([
            "onix-splitter",
            "split",
            "a.xml",
            "-o",
            "out",
            "--split-file-size",
            "12XB",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_inspect() {
        let cli = Cli::parse_from(["onix-splitter", "inspect", "feed.xml"]);

        let Commands::Inspect {
            file,
            max_file_size,
        } = cli.command
        else {
            panic!("expected inspect command");
        };
        assert_eq!(file, PathBuf::from("feed.xml"));
        assert_eq!(max_file_size, 500_000_000);
    }

    #[test]
    fn test_collect_sources_expands_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.xml"), "").unwrap();
        std::fs::write(tmp.path().join("a.xml"), "").unwrap();
        let single = tmp.path().join("single.onix");

        let sources = collect_sources(&[tmp.path().to_path_buf(), single.clone()]).unwrap();
        assert_eq!(
            sources,
            vec![tmp.path().join("a.xml"), tmp.path().join("b.xml"), single]
        );
    }
}
