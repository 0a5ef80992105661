//! entroscan CLI - scans a directory tree for the EICAR test signature and
//! classifies the remaining files with a pre-trained SVM.
//!
//! Usage:
//!   entroscan /path/to/scan
//!   entroscan /path/to/scan --model svm_model.json --format json
//!   entroscan /path/to/scan --parallel --time-limit 30

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use entroscan_core::classifier::resolve_model_path;
use entroscan_core::report::{print_report, OutputFormat};
use entroscan_core::{spawn_scan, Classifier, ScanConfig, ScanEvent, ScanReport};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const EXIT_BAD_ROOT: u8 = 3;

#[derive(Parser)]
#[command(name = "entroscan")]
#[command(about = "Signature and SVM based file scanner")]
struct Cli {
    /// Directory (or single file) to scan
    root: PathBuf,

    /// Classifier artifact (.onnx or .json). Defaults to $ENTROSCAN_MODEL,
    /// then ./svm_model.onnx
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Classify files on all cores
    #[arg(long)]
    parallel: bool,

    /// Suppress the progress line
    #[arg(short, long)]
    quiet: bool,

    /// Stop the scan after this many seconds
    #[arg(long, value_name = "SECS")]
    time_limit: Option<u64>,
}

/// Initialize the tracing subscriber with env-based filtering.
///
/// Reads `RUST_LOG` (or `LOG_LEVEL`) to set the filter, defaulting to `info`.
/// Logs go to stderr so JSON reports on stdout stay parseable.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// The scan root must exist before a worker is started for it.
fn check_root(root: &Path) -> Result<()> {
    std::fs::metadata(root)
        .map(|_| ())
        .with_context(|| format!("scan root {} is not accessible", root.display()))
}

/// 0 clean, 1 threats found, 2 stopped before completion. An inaccessible
/// root exits with `EXIT_BAD_ROOT` before any scan starts.
fn exit_status(report: &ScanReport) -> u8 {
    if report.stopped {
        2
    } else if report.infected_count() > 0 {
        1
    } else {
        0
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing("info");
    if let Err(err) = check_root(&cli.root) {
        error!("{err:#}");
        return Ok(ExitCode::from(EXIT_BAD_ROOT));
    }

    let model_path = resolve_model_path(cli.model.as_deref());
    let classifier = Classifier::load(&model_path);

    let config = ScanConfig {
        root: cli.root,
        parallel: cli.parallel,
    };
    let deadline = cli
        .time_limit
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let handle = spawn_scan(config, classifier);

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) && !handle.session().is_cancelled() {
            info!("time limit reached, stopping scan");
            handle.cancel();
        }

        match handle.events().recv_timeout(POLL_INTERVAL) {
            Ok(ScanEvent::Progress(p)) => {
                if !cli.quiet {
                    eprint!("\r[*] Scanned {}/{}", p.index, p.total);
                    let _ = std::io::stderr().flush();
                }
            }
            Ok(ScanEvent::Finished(_)) | Err(RecvTimeoutError::Disconnected) => break,
            // Channel drained and the worker is gone: nothing more will arrive.
            Err(RecvTimeoutError::Timeout) if handle.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    if !cli.quiet {
        eprintln!();
    }

    let report = handle.join()?;
    print_report(&report, cli.format);

    Ok(ExitCode::from(exit_status(&report)))
}
