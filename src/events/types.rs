//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by a merge session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// File discovery events
    Scan(ScanEvent),
    /// Hash and metadata extraction events
    Extract(ExtractEvent),
    /// Duplicate classification events
    Classify(ClassifyEvent),
    /// Merge plan events
    Plan(PlanEvent),
    /// Plan execution events
    Execute(ExecuteEvent),
    /// Session-level events
    Session(SessionEvent),
}

/// Events during the discovery phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Scanning has started
    Started { paths: Vec<PathBuf> },
    /// A symlink or unreadable entry was skipped
    Skipped { path: PathBuf, reason: String },
    /// Scanning completed
    Completed {
        supported: usize,
        unsupported: usize,
        skipped: usize,
    },
}

/// Events during extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtractEvent {
    /// Extraction has started
    Started { total_files: usize },
    /// Progress update during extraction
    Progress(ExtractProgress),
    /// A file could not be extracted; the scan continues
    Failed { path: PathBuf, message: String },
    /// Extraction completed
    Completed {
        extracted: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Progress information during extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractProgress {
    /// Number of files processed so far
    pub completed: usize,
    /// Total number of files to process
    pub total: usize,
    /// File that just finished
    pub current_path: PathBuf,
}

/// Events during classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClassifyEvent {
    /// Classification has started
    Started { total_records: usize },
    /// Classification completed
    Completed {
        exact_clusters: usize,
        near_links: usize,
    },
}

/// Events during plan construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanEvent {
    /// The destination was inspected
    DestinationValidated { root: PathBuf, state: String },
    /// A plan was built
    Built {
        plan_id: String,
        actions: usize,
        required_bytes: u64,
        /// None when free space could not be queried
        available_bytes: Option<u64>,
    },
}

/// Events during execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecuteEvent {
    /// Execution has started
    Started { batch_id: String, total_actions: usize },
    /// One action finished and was verified
    Progress(ExecuteProgress),
    /// Execution reached a terminal state
    Finished { status: String },
}

/// Progress information during execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteProgress {
    /// Number of actions completed so far
    pub completed: usize,
    /// Total number of actions in the plan
    pub total: usize,
    /// Destination of the action that just completed
    pub current_path: PathBuf,
}

/// Session-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// The session moved to a new state
    StateChanged { state: String },
    /// The session was cancelled
    Cancelled,
}
