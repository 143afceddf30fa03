//! upload-media - push a local media directory to the configured storage.
//!
//! Resolves the storage backend from settings, confirms before falling back
//! to local storage, runs the sync, and prints a summary.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use dialoguer::Input;
use engine::{
    model::{FileItem, FileState, RunSummary, SyncJob},
    progress::ProgressCallback,
    sync, BackendKind, EngineError, Settings,
};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Upload local media files to cloud storage
#[derive(Parser, Debug)]
#[command(name = "upload-media")]
#[command(version)]
#[command(about = "Upload local media files to the configured cloud storage")]
struct Args {
    /// Media directory to upload (overrides MEDIA_ROOT)
    #[arg(long, value_name = "PATH")]
    media_root: Option<PathBuf>,

    /// TOML settings file, applied before environment variables
    #[arg(long, value_name = "FILE", env = "UPLOAD_MEDIA_CONFIG")]
    config: Option<PathBuf>,

    /// Storage backend: cloudinary, s3, or local (overrides detection)
    #[arg(long, value_name = "BACKEND")]
    backend: Option<BackendKind>,

    /// Do not ask before uploading to local storage
    #[arg(short, long)]
    yes: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to render summary: {0}")]
    Report(#[from] serde_json::Error),
}

/// How a run ended when nothing fatal happened.
#[derive(Debug)]
enum RunStatus {
    /// User declined local storage; nothing was attempted
    Declined,
    Completed(RunSummary),
}

/// Human-readable lines go to stdout, or to stderr when stdout carries JSON.
#[derive(Clone, Copy)]
struct Console {
    json: bool,
}

impl Console {
    fn line(&self, message: &str) {
        if self.json {
            eprintln!("{}", message);
        } else {
            println!("{}", message);
        }
    }
}

/// CLI implementation of ProgressCallback printing one line per file
struct CliProgress {
    console: Console,
    verbose: bool,
}

impl ProgressCallback for CliProgress {
    fn on_job_started(&self, job: &SyncJob) {
        self.console
            .line(&format!("Starting upload from: {}", job.source_root.display()));
        self.console.line(&format!(
            "  Files: {} ({})",
            job.files.len(),
            format_bytes(job.total_bytes_planned)
        ));
        self.console.line(&"-".repeat(50));
    }

    fn on_file_started(&self, _job: &SyncJob, file_index: usize, file: &FileItem) {
        if self.verbose {
            self.console
                .line(&format!("[{:3}] Checking: {}", file_index, file.key));
        }
    }

    fn on_file_completed(&self, _job: &SyncJob, _file_index: usize, file: &FileItem) {
        let line = match file.state {
            FileState::Transferred => format!("Uploaded: {}", file.key),
            FileState::Skipped => format!("Skipped (exists): {}", file.key),
            FileState::Failed => format!(
                "{} {}: {}",
                if file.is_dir {
                    "Error reading directory"
                } else {
                    "Error uploading"
                },
                file.key,
                file.error_message.as_deref().unwrap_or("unknown error")
            ),
            FileState::Pending | FileState::Uploading => return,
        };
        self.console.line(&line);
    }

    fn on_job_completed(&self, _job: &SyncJob) {
        self.console.line(&"-".repeat(50));
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

fn format_duration(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

fn print_summary(console: Console, summary: &RunSummary, started: Instant) {
    console.line("Upload complete!");
    console.line(&format!("  Uploaded: {} files", summary.transferred));
    console.line(&format!("  Skipped: {} files", summary.skipped));
    console.line(&format!("  Errors: {} files", summary.failed));
    console.line(&format!("  Bytes uploaded: {}", format_bytes(summary.bytes_transferred)));
    console.line(&format!("  Elapsed: {}", format_duration(started.elapsed())));

    if summary.has_failures() {
        console.line("");
        console.line("Failed files:");
        for failure in &summary.failures {
            console.line(&format!("  {}: {}", failure.key, failure.message));
        }
    }
}

/// Only "y" (any case) continues; every other answer, including an empty
/// one, declines.
fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

fn confirm_local_storage() -> bool {
    if !std::io::stdin().is_terminal() {
        return false;
    }
    Input::<String>::new()
        .with_prompt("Continue anyway? (y/n)")
        .allow_empty(true)
        .interact_text()
        .map(|answer| is_affirmative(&answer))
        .unwrap_or(false)
}

/// JSON form of the summary, with the run outcome alongside the counts.
fn json_report(summary: &RunSummary) -> Result<String, serde_json::Error> {
    let mut report = serde_json::to_value(summary)?;
    if let Some(fields) = report.as_object_mut() {
        fields.insert("outcome".to_string(), serde_json::to_value(summary.outcome())?);
    }
    serde_json::to_string_pretty(&report)
}

fn init_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
}

/// Parse arguments, then run the upload
fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let env = |name: &str| std::env::var(name).ok();
    let exit_code = match run_cli(&args, &env, &confirm_local_storage) {
        Ok(RunStatus::Declined) => 0,
        Ok(RunStatus::Completed(summary)) if summary.has_failures() => 2,
        Ok(RunStatus::Completed(_)) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(
    args: &Args,
    env: &dyn Fn(&str) -> Option<String>,
    confirm: &dyn Fn() -> bool,
) -> Result<RunStatus, CliError> {
    let console = Console { json: args.json };

    let mut settings = match &args.config {
        Some(path) => Settings::from_toml_file(path)?,
        None => Settings::default(),
    };
    settings.apply_env(|name| env(name))?;

    if let Some(root) = &args.media_root {
        settings.media_root = root.clone();
    }
    if let Some(kind) = args.backend {
        settings.storage_backend = Some(kind);
    }

    let backend = settings.resolve_backend()?;
    debug!(?backend, media_root = %settings.media_root.display(), "resolved settings");
    console.line(&format!("Storage backend: {}", backend));

    if backend.is_local() && !args.yes {
        console.line("Warning: using local file storage");
        console.line("Files will not persist on hosts with ephemeral disks");
        if !confirm() {
            console.line("Aborted: nothing uploaded.");
            return Ok(RunStatus::Declined);
        }
    }

    let store = backend.open()?;
    let progress = CliProgress {
        console,
        verbose: args.verbose,
    };

    let started = Instant::now();
    let summary = sync(&settings.media_root, store.as_ref(), Some(&progress))?;

    if args.json {
        println!("{}", json_report(&summary)?);
    } else {
        print_summary(console, &summary, started);
    }

    Ok(RunStatus::Completed(summary))
}
