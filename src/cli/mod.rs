//! # CLI Module
//!
//! Command-line interface for the photo library merger.
//!
//! ## Usage
//! ```bash
//! # Count and classify photos
//! nolossia scan ~/Pictures /Volumes/OldDrive/Photos
//!
//! # Preview a merge into a library
//! nolossia plan ~/Pictures /Volumes/OldDrive/Photos --dest ~/Library/Photos
//!
//! # Merge (asks for the EXECUTE token)
//! nolossia merge ~/Pictures --dest ~/Library/Photos
//!
//! # Put a batch back (asks for the UNDO token)
//! nolossia undo 3f2a9c1b7e04 --dest ~/Library/Photos
//! ```

use clap::{Args, Parser, Subcommand};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use nolossia::core::config::{ExtractConfig, NolossiaConfig, Sensitivity, WorkerStrategy};
use nolossia::core::engine::{ExecutionResult, ExecutionStatus, CONFIRMATION_TOKEN};
use nolossia::core::executor::run_worker;
use nolossia::core::extractor::Extractor;
use nolossia::core::fs::LocalFileSystem;
use nolossia::core::hasher::ImageDownsampler;
use nolossia::core::manifest::{default_manifest_path, InMemoryManifest, SqliteManifest};
use nolossia::core::metadata::ExifMetadataReader;
use nolossia::core::planner::{dry_run, MergePlan, ValidationState};
use nolossia::core::session::{MergeSession, ScanOutcome};
use nolossia::core::undo::{execute_undo, prepare_undo, UndoCounts, UNDO_TOKEN};
use nolossia::core::DedupeSummary;
use nolossia::error::{ExecuteError, ExtractError, NolossiaError, Result, UndoError};
use nolossia::events::{Event, EventChannel, EventReceiver, ExecuteEvent, ExtractEvent};
use serde::Serialize;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;

/// Nolossia - Merge photo libraries without losing a single file
#[derive(Parser, Debug)]
#[command(name = "nolossia")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan folders and report duplicates
    Scan {
        /// Folders to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Build and show a merge plan without moving anything
    Plan {
        /// Folders to merge
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Library folder to merge into
        #[arg(long)]
        dest: PathBuf,

        /// Print the full plan as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Build a merge plan and execute it after confirmation
    Merge {
        /// Folders to merge
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Library folder to merge into
        #[arg(long)]
        dest: PathBuf,

        /// Proceed even when the destination looks too small
        #[arg(long)]
        allow_low_space: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Move the files of a previous merge back
    Undo {
        /// Batch id printed by `merge`
        batch: String,

        /// Library folder the batch was merged into
        #[arg(long)]
        dest: PathBuf,

        /// Manifest database
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Only show what would happen
        #[arg(long)]
        preview: bool,
    },

    /// Extraction worker speaking JSON lines on stdin/stdout
    #[command(hide = true)]
    Worker {
        #[arg(long, default_value_t = ExtractConfig::default().max_pixels)]
        max_pixels: u64,
    },
}

/// Options shared by every command that scans
#[derive(Args, Debug)]
struct EngineArgs {
    /// Near-duplicate sensitivity: conservative, balanced or aggressive
    #[arg(long, default_value = "conservative")]
    sensitivity: String,

    /// Worker strategy: auto, thread or process
    #[arg(long, env = "NOLOSSIA_EXECUTOR", default_value = "auto")]
    executor: String,

    /// Number of extraction workers
    #[arg(long, env = "NOLOSSIA_WORKERS")]
    workers: Option<usize>,

    /// Include hidden files
    #[arg(long)]
    include_hidden: bool,

    /// Manifest database
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl EngineArgs {
    fn config(&self) -> Result<NolossiaConfig> {
        let mut config = NolossiaConfig::default()
            .with_sensitivity(Sensitivity::from_str(&self.sensitivity)?)
            .with_strategy(WorkerStrategy::from_str(&self.executor)?);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Ok(program) = std::env::current_exe() {
            config = config.with_worker_program(program);
        }
        config.scan.include_hidden = self.include_hidden;
        config.validate()?;
        Ok(config)
    }

    fn manifest_path(&self) -> PathBuf {
        self.manifest.clone().unwrap_or_else(default_manifest_path)
    }
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            paths,
            json,
            engine,
        } => run_scan(&paths, json, &engine),
        Commands::Plan {
            paths,
            dest,
            json,
            engine,
        } => run_plan(&paths, &dest, json, &engine),
        Commands::Merge {
            paths,
            dest,
            allow_low_space,
            engine,
        } => run_merge(&paths, &dest, allow_low_space, &engine),
        Commands::Undo {
            batch,
            dest,
            manifest,
            preview,
        } => run_undo(&batch, &dest, manifest, preview),
        Commands::Worker { max_pixels } => run_worker_mode(max_pixels),
    }
}

fn run_worker_mode(max_pixels: u64) -> Result<()> {
    let fs = LocalFileSystem;
    let metadata = ExifMetadataReader::new();
    let downsampler = ImageDownsampler::new();
    let config = ExtractConfig { max_pixels };
    let extractor = Extractor::new(&fs, &metadata, &downsampler, &config);

    let stdin = io::stdin();
    run_worker(stdin.lock(), io::stdout().lock(), &extractor).map_err(|e| {
        NolossiaError::Extract(ExtractError::WorkerFailed(e.to_string()))
    })
}

/// Draws extraction and execution progress until the sender side closes
fn spawn_progress(receiver: EventReceiver, enabled: bool) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        let mut bar: Option<ProgressBar> = None;

        for event in receiver.iter() {
            if !enabled {
                continue;
            }
            match event {
                Event::Extract(ExtractEvent::Started { total_files }) => {
                    let pb = ProgressBar::new(total_files as u64).with_style(style.clone());
                    pb.set_message("reading photos");
                    bar = Some(pb);
                }
                Event::Extract(ExtractEvent::Progress(p)) => {
                    if let Some(pb) = &bar {
                        pb.set_position(p.completed as u64);
                    }
                }
                Event::Execute(ExecuteEvent::Started { total_actions, .. }) => {
                    let pb = ProgressBar::new(total_actions as u64).with_style(style.clone());
                    pb.set_message("moving");
                    bar = Some(pb);
                }
                Event::Execute(ExecuteEvent::Progress(p)) => {
                    if let Some(pb) = &bar {
                        pb.set_position(p.completed as u64);
                    }
                }
                Event::Extract(ExtractEvent::Completed { .. })
                | Event::Execute(ExecuteEvent::Finished { .. }) => {
                    if let Some(pb) = bar.take() {
                        pb.finish_and_clear();
                    }
                }
                _ => {}
            }
        }
    })
}

fn classify(
    session: &mut MergeSession<'_>,
    paths: &[PathBuf],
) -> Result<(ScanOutcome, DedupeSummary)> {
    let scanned = session.scan(paths)?.clone();
    let summary = session.dedupe()?.summary;
    Ok((scanned, summary))
}

fn run_scan(paths: &[PathBuf], json: bool, engine: &EngineArgs) -> Result<()> {
    let term = Term::stderr();
    let config = engine.config()?;
    let fs = LocalFileSystem;
    let manifest = InMemoryManifest::new();

    print_header(&term, json);
    let (sender, receiver) = EventChannel::new();
    let progress = spawn_progress(receiver, !json);
    let mut session = MergeSession::new(config, &fs, &manifest).with_events(sender);
    let outcome = classify(&mut session, paths);
    drop(session);
    progress.join().ok();
    let (scanned, summary) = outcome?;

    if json {
        print_json(&serde_json::json!({
            "counts": scanned.counts,
            "failures": scanned.failures,
            "summary": summary,
        }));
        return Ok(());
    }

    print_scan(&term, &scanned, &summary, engine.verbose);
    Ok(())
}

fn run_plan(paths: &[PathBuf], dest: &Path, json: bool, engine: &EngineArgs) -> Result<()> {
    let term = Term::stderr();
    let config = engine.config()?;
    let fs = LocalFileSystem;
    let manifest = InMemoryManifest::new();

    print_header(&term, json);
    let (sender, receiver) = EventChannel::new();
    let progress = spawn_progress(receiver, !json);
    let mut session = MergeSession::new(config, &fs, &manifest).with_events(sender);
    let outcome = (|| {
        let (scanned, summary) = classify(&mut session, paths)?;
        let plan = session.build_plan(dest)?.clone();
        Ok::<_, NolossiaError>((scanned, summary, plan))
    })();
    drop(session);
    progress.join().ok();
    let (scanned, summary, plan) = outcome?;

    if json {
        print_json(&plan);
        return Ok(());
    }

    print_scan(&term, &scanned, &summary, false);
    print_plan(&term, &plan, engine.verbose);
    term.write_line(&format!(
        "{}",
        style("Preview only. Nothing was moved.").dim()
    ))
    .ok();
    Ok(())
}

fn run_merge(paths: &[PathBuf], dest: &Path, allow_low_space: bool, engine: &EngineArgs) -> Result<()> {
    let term = Term::stderr();
    let config = engine.config()?;
    let fs = LocalFileSystem;
    let manifest = SqliteManifest::open(&engine.manifest_path())?;

    print_header(&term, false);
    let (sender, receiver) = EventChannel::new();
    let progress = spawn_progress(receiver, true);
    let mut session = MergeSession::new(config, &fs, &manifest).with_events(sender);

    let outcome = (|| {
        let (scanned, summary) = classify(&mut session, paths)?;
        print_scan(&term, &scanned, &summary, false);

        let plan = session.build_plan(dest)?.clone();
        print_plan(&term, &plan, engine.verbose);
        if plan.validation != ValidationState::Ready && allow_low_space {
            session.override_storage_shortfall()?;
            term.write_line(&format!(
                "{} Continuing despite low space (--allow-low-space)",
                style("!").yellow().bold()
            ))
            .ok();
        }

        let token = prompt(&term, CONFIRMATION_TOKEN)?;
        session.execute(&token)
    })();
    drop(session);
    progress.join().ok();

    let result = outcome?;
    print_execution(&term, &result, &manifest.path().display().to_string());
    match (result.status, result.reason) {
        (ExecutionStatus::Failed, Some(reason)) => Err(reason.into()),
        _ => Ok(()),
    }
}

fn run_undo(batch: &str, dest: &Path, manifest: Option<PathBuf>, preview: bool) -> Result<()> {
    let term = Term::stderr();
    let fs = LocalFileSystem;
    let store = SqliteManifest::open(&manifest.unwrap_or_else(default_manifest_path))?;
    let config = NolossiaConfig::default();

    let plan = prepare_undo(&store, &fs, batch, dest, &config.plan.review_dir)?;
    term.write_line(&format!("{} {}", style("Undo batch").bold(), style(batch).cyan()))
        .ok();
    print_undo_counts(&term, &plan.counts());
    if preview {
        return Ok(());
    }

    let token = prompt(&term, UNDO_TOKEN)?;
    match execute_undo(&plan, &token, &fs) {
        Ok(report) => {
            term.write_line(&format!("{} Undo complete", style("✓").green().bold()))
                .ok();
            print_undo_counts(&term, &report.counts);
            Ok(())
        }
        Err(UndoError::ConfirmationRejected) => {
            term.write_line(&format!(
                "{} Token not accepted. Nothing was moved back.",
                style("✗").red().bold()
            ))
            .ok();
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Ask for the confirmation literal on stdin
fn prompt(term: &Term, literal: &str) -> Result<String> {
    term.write_line(&format!(
        "Type {} to proceed, anything else to abort:",
        style(literal).bold().yellow()
    ))
    .ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| ExecuteError::Io {
            path: PathBuf::from("<stdin>"),
            reason: e.to_string(),
        })?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_header(term: &Term, quiet: bool) {
    if quiet {
        return;
    }
    term.write_line(&format!(
        "{} {}",
        style("Nolossia").bold().cyan(),
        style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
    ))
    .ok();
    term.write_line("").ok();
}

fn print_scan(term: &Term, scanned: &ScanOutcome, summary: &DedupeSummary, verbose: bool) {
    term.write_line(&format!("{} Scan Complete", style("✓").green().bold()))
        .ok();
    term.write_line(&format!(
        "  {} photos, {} unsupported, {} skipped",
        style(scanned.counts.supported).cyan(),
        style(scanned.counts.unsupported).dim(),
        style(scanned.counts.skipped).dim()
    ))
    .ok();
    term.write_line(&format!(
        "  {} masters, {} exact duplicates, {} near duplicates in {} clusters",
        style(summary.masters).cyan(),
        style(summary.exact_duplicates).yellow(),
        style(summary.near_duplicates).yellow(),
        summary.cluster_count
    ))
    .ok();
    if verbose {
        for failure in &scanned.failures {
            term.write_line(&format!(
                "    {} {} ({})",
                style("○").dim(),
                failure.path.display(),
                failure.reason
            ))
            .ok();
        }
    }
    term.write_line("").ok();
}

fn print_plan(term: &Term, plan: &MergePlan, verbose: bool) {
    let counts = dry_run(plan);
    term.write_line(&format!(
        "{} {}",
        style("Merge plan").bold().underlined(),
        style(&plan.plan_id).dim()
    ))
    .ok();
    term.write_line(&format!(
        "  {} masters to move, {} duplicates to quarantine, {} near duplicates to flag",
        style(counts.move_master).cyan(),
        style(counts.quarantine_exact).yellow(),
        style(counts.mark_near_duplicate).yellow()
    ))
    .ok();
    term.write_line(&format!(
        "  {} folders to create, {} files need review",
        counts.directories,
        plan.review.len()
    ))
    .ok();
    term.write_line(&format!(
        "  {} required, {} available",
        style(format_bytes(plan.storage.required)).yellow(),
        plan.storage
            .available
            .map(format_bytes)
            .unwrap_or_else(|| "unknown".to_string())
    ))
    .ok();
    if let ValidationState::InsufficientStorage { shortfall } = plan.validation {
        term.write_line(&format!(
            "  {} Not enough space: {} short",
            style("✗").red().bold(),
            format_bytes(shortfall)
        ))
        .ok();
    }

    if verbose {
        for action in &plan.actions {
            let target = action
                .destination()
                .map(|d| d.display().to_string())
                .unwrap_or_default();
            term.write_line(&format!(
                "    {} {} {}",
                style(action.kind()).dim(),
                action.source().display(),
                target
            ))
            .ok();
        }
    }
    term.write_line("").ok();
}

fn print_execution(term: &Term, result: &ExecutionResult, manifest: &str) {
    let marker = match result.status {
        ExecutionStatus::Completed => style("✓").green().bold(),
        ExecutionStatus::Failed => style("✗").red().bold(),
        ExecutionStatus::Aborted => style("!").yellow().bold(),
    };
    term.write_line(&format!(
        "{} {} - {} files moved and verified",
        marker, result.status, result.completed_actions
    ))
    .ok();
    if let Some(reason) = &result.reason {
        term.write_line(&format!("  {}", reason)).ok();
    }
    if result.completed_actions > 0 {
        term.write_line(&format!(
            "  Batch {} recorded in {}",
            style(&result.batch_id).cyan(),
            manifest
        ))
        .ok();
    }
    term.write_line(&format!(
        "{}",
        style("Nothing was deleted. Duplicates are in QUARANTINE_EXACT.").dim()
    ))
    .ok();
}

fn print_undo_counts(term: &Term, counts: &UndoCounts) {
    term.write_line(&format!(
        "  {} to restore, {} conflicts, {} already restored, {} missing",
        style(counts.restore).cyan(),
        style(counts.conflict).yellow(),
        counts.already_restored,
        counts.missing
    ))
    .ok();
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render JSON: {}", e),
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
