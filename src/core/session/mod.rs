//! # Session Module
//!
//! Drives one merge run through its phases and refuses out-of-order calls.
//!
//! ## States
//! ```text
//! INIT -> SCANNED -> DEDUPED -> PLAN_READY (rebuild any number of times)
//!                                   |
//!                               EXECUTING -> COMPLETED | FAILED | ABORTED
//! ```
//!
//! A plan blocked by a non-chronological destination leaves the session in
//! DEDUPED. A cancelled scan ends the session as ABORTED.
//!
//! ## Example
//! ```rust,ignore
//! let manifest = SqliteManifest::open(&default_manifest_path())?;
//! let mut session = MergeSession::new(config, &LocalFileSystem, &manifest)
//!     .with_events(sender);
//! session.scan(&["/photos/old_laptop".into()])?;
//! session.dedupe()?;
//! session.build_plan(Path::new("/photos/library"))?;
//! let result = session.execute(CONFIRMATION_TOKEN)?;
//! ```

use crate::core::classifier::{self, DedupeResult};
use crate::core::config::NolossiaConfig;
use crate::core::engine::{ExecutionEngine, ExecutionResult, ExecutionStatus};
use crate::core::executor::{CancellationToken, Executor};
use crate::core::extractor::{ExtractFailure, ExtractOutcome, Extractor, FailureKind};
use crate::core::fs::FileSystem;
use crate::core::hasher::{Downsampler, ImageDownsampler};
use crate::core::manifest::ManifestStore;
use crate::core::metadata::{ExifMetadataReader, MetadataReader};
use crate::core::planner::{self, MergePlan};
use crate::core::record::FileRecord;
use crate::core::scanner::{PhotoScanner, ScanCounts, WalkDirScanner};
use crate::error::{NolossiaError, Result, ScanError};
use crate::events::{null_sender, Event, EventSender, ScanEvent, SessionEvent};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where a session is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Init,
    Scanned,
    Deduped,
    PlanReady,
    Executing,
    Completed,
    Failed,
    Aborted,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Init => "INIT",
            SessionState::Scanned => "SCANNED",
            SessionState::Deduped => "DEDUPED",
            SessionState::PlanReady => "PLAN_READY",
            SessionState::Executing => "EXECUTING",
            SessionState::Completed => "COMPLETED",
            SessionState::Failed => "FAILED",
            SessionState::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Aborted
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Records plus what happened to the files that produced none
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub records: Vec<FileRecord>,
    /// `supported` counts records; unreadable files move to `skipped`
    pub counts: ScanCounts,
    pub failures: Vec<ExtractFailure>,
    pub cancelled: bool,
}

/// Discover and extract every supported file under `paths`
pub fn scan(
    paths: &[PathBuf],
    config: &NolossiaConfig,
    fs: &dyn FileSystem,
    metadata: &dyn MetadataReader,
    downsampler: &dyn Downsampler,
    cancel: &CancellationToken,
    events: &EventSender,
) -> std::result::Result<ScanOutcome, ScanError> {
    let discovery = WalkDirScanner::new(fs, config.scan.clone()).discover(paths, events)?;

    let extractor = Extractor::new(fs, metadata, downsampler, &config.extract);
    let report = Executor::new(&config.executor, cancel.clone(), events.clone())
        .run(&discovery.files, &extractor);

    let mut counts = discovery.counts;
    let mut records = Vec::with_capacity(report.outcomes.len());
    let mut failures = Vec::new();
    for outcome in report.outcomes {
        match outcome {
            ExtractOutcome::Record(record) => records.push(record),
            ExtractOutcome::Failed(failure) => {
                counts.supported = counts.supported.saturating_sub(1);
                match failure.kind {
                    FailureKind::Unreadable => counts.skipped += 1,
                    FailureKind::Unsupported => counts.unsupported += 1,
                }
                failures.push(failure);
            }
        }
    }
    if report.cancelled {
        counts.supported = records.len();
    }

    info!(
        "Scan finished: {} records, {} unsupported, {} skipped",
        records.len(),
        counts.unsupported,
        counts.skipped
    );
    events.send(Event::Scan(ScanEvent::Completed {
        supported: counts.supported,
        unsupported: counts.unsupported,
        skipped: counts.skipped,
    }));

    Ok(ScanOutcome {
        records,
        counts,
        failures,
        cancelled: report.cancelled,
    })
}

/// One merge run from scan to execution
pub struct MergeSession<'a> {
    config: NolossiaConfig,
    fs: &'a dyn FileSystem,
    manifest: &'a dyn ManifestStore,
    metadata: Box<dyn MetadataReader>,
    downsampler: Box<dyn Downsampler>,
    cancel: CancellationToken,
    events: EventSender,
    state: SessionState,
    scanned: Option<ScanOutcome>,
    deduped: Option<DedupeResult>,
    plan: Option<MergePlan>,
}

impl<'a> MergeSession<'a> {
    pub fn new(
        config: NolossiaConfig,
        fs: &'a dyn FileSystem,
        manifest: &'a dyn ManifestStore,
    ) -> Self {
        Self {
            config,
            fs,
            manifest,
            metadata: Box::new(ExifMetadataReader::new()),
            downsampler: Box::new(ImageDownsampler::new()),
            cancel: CancellationToken::new(),
            events: null_sender(),
            state: SessionState::Init,
            scanned: None,
            deduped: None,
            plan: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn with_metadata_reader(mut self, reader: Box<dyn MetadataReader>) -> Self {
        self.metadata = reader;
        self
    }

    pub fn with_downsampler(mut self, downsampler: Box<dyn Downsampler>) -> Self {
        self.downsampler = downsampler;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &NolossiaConfig {
        &self.config
    }

    /// A handle that cancels this session's extraction and execution
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
        self.events.send(Event::Session(SessionEvent::Cancelled));
    }

    pub fn scan_outcome(&self) -> Option<&ScanOutcome> {
        self.scanned.as_ref()
    }

    pub fn dedupe_result(&self) -> Option<&DedupeResult> {
        self.deduped.as_ref()
    }

    pub fn plan(&self) -> Option<&MergePlan> {
        self.plan.as_ref()
    }

    fn require(&self, allowed: &[SessionState], expected: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(NolossiaError::InvalidState {
                expected,
                actual: self.state.name().to_string(),
            })
        }
    }

    fn transition(&mut self, state: SessionState) {
        if self.state != state {
            info!("Session {} -> {}", self.state, state);
        }
        self.state = state;
        self.events.state_changed(state.name());
    }

    /// INIT -> SCANNED
    pub fn scan(&mut self, paths: &[PathBuf]) -> Result<&ScanOutcome> {
        self.require(&[SessionState::Init], "INIT")?;
        self.config.validate()?;

        let outcome = scan(
            paths,
            &self.config,
            self.fs,
            self.metadata.as_ref(),
            self.downsampler.as_ref(),
            &self.cancel,
            &self.events,
        )?;
        if outcome.cancelled {
            warn!("Scan cancelled; the session cannot continue");
            self.transition(SessionState::Aborted);
        } else {
            self.transition(SessionState::Scanned);
        }
        Ok(self.scanned.insert(outcome))
    }

    /// SCANNED -> DEDUPED
    pub fn dedupe(&mut self) -> Result<&DedupeResult> {
        self.require(&[SessionState::Scanned], "SCANNED")?;
        let records = self
            .scanned
            .as_ref()
            .map(|s| s.records.as_slice())
            .unwrap_or_default();
        let result = classifier::dedupe(records, &self.config.classify, &self.events);
        self.transition(SessionState::Deduped);
        Ok(self.deduped.insert(result))
    }

    /// DEDUPED | PLAN_READY -> PLAN_READY
    ///
    /// Every call re-validates `destination`. A rejected destination drops
    /// any earlier plan and returns the session to DEDUPED.
    pub fn build_plan(&mut self, destination: &Path) -> Result<&MergePlan> {
        self.require(
            &[SessionState::Deduped, SessionState::PlanReady],
            "DEDUPED or PLAN_READY",
        )?;
        let Some(deduped) = self.deduped.as_ref() else {
            return Err(NolossiaError::InvalidState {
                expected: "DEDUPED",
                actual: self.state.name().to_string(),
            });
        };

        match planner::build_plan(
            &deduped.clusters,
            &deduped.uniques,
            destination,
            &self.config.plan,
            self.fs,
            &self.events,
        ) {
            Ok(plan) => {
                self.transition(SessionState::PlanReady);
                Ok(self.plan.insert(plan))
            }
            Err(error) => {
                self.plan = None;
                self.transition(SessionState::Deduped);
                Err(error.into())
            }
        }
    }

    /// Accept a storage shortfall on the current plan
    pub fn override_storage_shortfall(&mut self) -> Result<&MergePlan> {
        self.require(&[SessionState::PlanReady], "PLAN_READY")?;
        match self.plan.as_mut() {
            Some(plan) => {
                plan.override_storage_shortfall();
                Ok(plan)
            }
            None => Err(NolossiaError::InvalidState {
                expected: "PLAN_READY",
                actual: self.state.name().to_string(),
            }),
        }
    }

    /// PLAN_READY -> EXECUTING -> terminal
    ///
    /// Runs at most once per session, whatever the outcome.
    pub fn execute(&mut self, token: &str) -> Result<ExecutionResult> {
        self.require(&[SessionState::PlanReady], "PLAN_READY")?;
        let Some(plan) = self.plan.as_ref() else {
            return Err(NolossiaError::InvalidState {
                expected: "PLAN_READY",
                actual: self.state.name().to_string(),
            });
        };

        self.state = SessionState::Executing;
        self.events.state_changed(SessionState::Executing.name());

        let engine = ExecutionEngine::new(
            self.fs,
            self.manifest,
            self.cancel.clone(),
            self.events.clone(),
        );
        let result = engine.execute(plan, token);
        self.transition(match result.status {
            ExecutionStatus::Completed => SessionState::Completed,
            ExecutionStatus::Failed => SessionState::Failed,
            ExecutionStatus::Aborted => SessionState::Aborted,
        });
        Ok(result)
    }
}
