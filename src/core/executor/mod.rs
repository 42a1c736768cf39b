//! # Executor Module
//!
//! Runs the extractor over many files on a bounded worker pool and hands the
//! results back in input order.
//!
//! ## Strategies
//! - **Threads** - a rayon pool; cheap, good for metadata-heavy batches
//! - **Processes** - child `nolossia worker` processes speaking JSON lines,
//!   isolating CPU-heavy decoding from the parent
//! - **Auto** - processes only for large batches when a worker program is
//!   configured, threads otherwise
//!
//! ## Cancellation
//! A `CancellationToken` is checked before each file is dispatched. Files
//! already in flight finish; the report then holds only the dispatched slots.

mod process;
mod threads;

pub use process::{run_worker, WorkerRequest, WorkerResponse};

use crate::core::config::{ExecutorConfig, WorkerStrategy};
use crate::core::extractor::{ExtractOutcome, Extractor};
use crate::core::scanner::DiscoveredFile;
use crate::events::{Event, EventSender, ExtractEvent, ExtractProgress};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Cooperative cancellation flag shared between a caller and running work
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result of one executor run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorReport {
    /// Dispatched slots, in input order
    pub outcomes: Vec<ExtractOutcome>,
    /// True when some files were never dispatched
    pub cancelled: bool,
    /// Strategy that actually ran
    pub strategy: WorkerStrategy,
}

/// Shared progress bookkeeping for both strategies
pub(crate) struct Progress<'a> {
    completed: AtomicUsize,
    total: usize,
    events: &'a EventSender,
}

impl<'a> Progress<'a> {
    fn new(total: usize, events: &'a EventSender) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
            events,
        }
    }

    fn record(&self, outcome: &ExtractOutcome) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let current_path = match outcome {
            ExtractOutcome::Record(record) => record.path.clone(),
            ExtractOutcome::Failed(failure) => {
                self.events.send(Event::Extract(ExtractEvent::Failed {
                    path: failure.path.clone(),
                    message: failure.reason.clone(),
                }));
                failure.path.clone()
            }
        };
        self.events.send(Event::Extract(ExtractEvent::Progress(ExtractProgress {
            completed,
            total: self.total,
            current_path,
        })));
    }
}

/// Concurrency executor
pub struct Executor<'a> {
    config: &'a ExecutorConfig,
    cancel: CancellationToken,
    events: EventSender,
}

impl<'a> Executor<'a> {
    pub fn new(config: &'a ExecutorConfig, cancel: CancellationToken, events: EventSender) -> Self {
        Self {
            config,
            cancel,
            events,
        }
    }

    /// Strategy for a batch of `batch` files
    pub fn choose_strategy(&self, batch: usize) -> WorkerStrategy {
        let has_program = self.config.worker_program.is_some();
        match self.config.strategy {
            WorkerStrategy::Threads => WorkerStrategy::Threads,
            WorkerStrategy::Processes if has_program => WorkerStrategy::Processes,
            WorkerStrategy::Processes => {
                warn!("Process workers requested but no worker program is known; using threads");
                WorkerStrategy::Threads
            }
            WorkerStrategy::Auto if has_program && batch >= self.config.process_min_batch => {
                WorkerStrategy::Processes
            }
            WorkerStrategy::Auto => WorkerStrategy::Threads,
        }
    }

    /// Extract every file, preserving input order
    pub fn run(&self, files: &[DiscoveredFile], extractor: &Extractor<'_>) -> ExecutorReport {
        let workers = self.config.worker_count().max(1);
        let mut strategy = self.choose_strategy(files.len());
        info!(
            "Extracting {} files with {} {:?} workers",
            files.len(),
            workers,
            strategy
        );
        self.events.send(Event::Extract(ExtractEvent::Started {
            total_files: files.len(),
        }));

        let progress = Progress::new(files.len(), &self.events);
        let mut slots: Vec<Option<ExtractOutcome>> = vec![None; files.len()];

        if strategy == WorkerStrategy::Processes {
            let program = self.config.worker_program.as_deref();
            match program.map(|p| {
                process::run(p, workers, files, extractor, &self.cancel, &progress, &mut slots)
            }) {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    warn!("Process workers failed ({}); finishing with threads", e);
                    strategy = WorkerStrategy::Threads;
                }
                None => strategy = WorkerStrategy::Threads,
            }
        }

        // Threads handle the whole batch, or whatever the process pool left behind
        threads::run(workers, files, extractor, &self.cancel, &progress, &mut slots);

        let dispatched = slots.iter().filter(|s| s.is_some()).count();
        let cancelled = dispatched < files.len();
        let outcomes: Vec<ExtractOutcome> = slots.into_iter().flatten().collect();

        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, ExtractOutcome::Failed(_)))
            .count();
        self.events.send(Event::Extract(ExtractEvent::Completed {
            extracted: outcomes.len() - failed,
            failed,
            cancelled,
        }));
        if cancelled {
            warn!("Extraction cancelled after {} of {} files", dispatched, files.len());
        }

        ExecutorReport {
            outcomes,
            cancelled,
            strategy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ExtractConfig;
    use crate::core::fs::LocalFileSystem;
    use crate::core::hasher::ImageDownsampler;
    use crate::core::metadata::ExifMetadataReader;
    use crate::core::record::ImageFormat;
    use crate::events::null_sender;
    use std::path::Path;
    use tempfile::TempDir;

    fn files(dir: &Path, count: usize) -> Vec<DiscoveredFile> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("{:03}.jpg", i));
                std::fs::write(&path, format!("content {}", i)).unwrap();
                DiscoveredFile {
                    path,
                    format: ImageFormat::Jpeg,
                }
            })
            .collect()
    }

    fn run(
        config: &ExecutorConfig,
        cancel: CancellationToken,
        files: &[DiscoveredFile],
    ) -> ExecutorReport {
        let extract = ExtractConfig::default();
        let extractor =
            Extractor::new(&LocalFileSystem, &ExifMetadataReader, &ImageDownsampler, &extract);
        Executor::new(config, cancel, null_sender()).run(files, &extractor)
    }

    #[test]
    fn thread_results_preserve_input_order() {
        let dir = TempDir::new().unwrap();
        let inputs = files(dir.path(), 40);
        let config = ExecutorConfig {
            strategy: WorkerStrategy::Threads,
            workers: Some(4),
            ..Default::default()
        };

        let report = run(&config, CancellationToken::new(), &inputs);

        assert!(!report.cancelled);
        assert_eq!(report.outcomes.len(), 40);
        for (i, outcome) in report.outcomes.iter().enumerate() {
            let ExtractOutcome::Record(record) = outcome else {
                panic!("expected record");
            };
            assert_eq!(record.scan_index, i);
            assert_eq!(record.path, inputs[i].path);
        }
    }

    #[test]
    fn failures_keep_their_slot() {
        let dir = TempDir::new().unwrap();
        let mut inputs = files(dir.path(), 3);
        inputs[1].path = dir.path().join("missing.jpg");
        let config = ExecutorConfig {
            strategy: WorkerStrategy::Threads,
            ..Default::default()
        };

        let report = run(&config, CancellationToken::new(), &inputs);

        assert!(matches!(report.outcomes[0], ExtractOutcome::Record(_)));
        assert!(matches!(report.outcomes[1], ExtractOutcome::Failed(_)));
        assert!(matches!(report.outcomes[2], ExtractOutcome::Record(_)));
    }

    #[test]
    fn cancelled_before_start_dispatches_nothing() {
        let dir = TempDir::new().unwrap();
        let inputs = files(dir.path(), 5);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run(&ExecutorConfig::default(), cancel, &inputs);

        assert!(report.cancelled);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn auto_uses_threads_without_worker_program() {
        let config = ExecutorConfig::default();
        let executor = Executor::new(&config, CancellationToken::new(), null_sender());
        assert_eq!(executor.choose_strategy(10_000), WorkerStrategy::Threads);
    }

    #[test]
    fn auto_uses_processes_for_large_batches() {
        let config = ExecutorConfig {
            worker_program: Some("/usr/bin/nolossia".into()),
            ..Default::default()
        };
        let executor = Executor::new(&config, CancellationToken::new(), null_sender());
        assert_eq!(executor.choose_strategy(63), WorkerStrategy::Threads);
        assert_eq!(executor.choose_strategy(64), WorkerStrategy::Processes);
    }

    #[test]
    fn broken_worker_program_falls_back_to_threads() {
        let dir = TempDir::new().unwrap();
        let inputs = files(dir.path(), 4);
        let config = ExecutorConfig {
            strategy: WorkerStrategy::Processes,
            worker_program: Some(dir.path().join("no-such-binary")),
            workers: Some(2),
            ..Default::default()
        };

        let report = run(&config, CancellationToken::new(), &inputs);

        assert_eq!(report.strategy, WorkerStrategy::Threads);
        assert_eq!(report.outcomes.len(), 4);
        assert!(!report.cancelled);
    }
}
