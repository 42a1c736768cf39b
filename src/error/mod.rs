//! # Error Module
//!
//! Error types for the Nolossia merge engine.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, file names, what went wrong
//! - **User-friendly messages** - non-technical users should understand
//! - **Recovery hints** - suggest how to fix when possible
//!
//! Per-file extraction problems are not errors at this level: they are
//! returned as values (`ExtractFailure`) so a scan never aborts because of one
//! bad file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum NolossiaError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Merge plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Execution error: {0}")]
    Execute(#[from] ExecuteError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Undo error: {0}")]
    Undo(#[from] UndoError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation not allowed while the run is {actual} (expected {expected})")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },
}

/// Errors that occur while discovering files
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Not a directory: {path}. Pass folders, not individual files.")]
    NotADirectory { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No folders were given to scan")]
    NoPaths,
}

/// Errors that occur while extracting hashes and metadata from one file
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported format '{extension}' for {path}")]
    Unsupported { path: PathBuf, extension: String },

    #[error("Failed to decode image {path}: {reason}")]
    DecodeError { path: PathBuf, reason: String },

    #[error("Image {path} has {pixels} pixels, above the limit of {limit}")]
    ImageTooLarge {
        path: PathBuf,
        pixels: u64,
        limit: u64,
    },

    #[error("Extraction worker failed: {0}")]
    WorkerFailed(String),
}

/// Errors that block merge plan construction
#[derive(Error, Debug)]
pub enum PlanError {
    #[error(
        "Destination {root} is not organized as YEAR/YEAR-MONTH. Blocking paths: {}. \
         Reorganize it, pick an empty folder, or abort.",
        format_paths(.blocking_paths)
    )]
    NonChronologicalDestination {
        root: PathBuf,
        blocking_paths: Vec<PathBuf>,
    },

    #[error("Destination {path} is a symlink. Choose a real folder for the merged library.")]
    DestinationIsSymlink { path: PathBuf },

    #[error("Destination {path} is a file, not a folder")]
    DestinationNotDirectory { path: PathBuf },

    #[error("Failed to inspect destination {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not find a free name for {path}")]
    UnresolvableCollision { path: PathBuf },

    #[error("Invalid folder pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Reasons an execution run stops before completing.
///
/// Carried inside `ExecutionResult` for FAILED and ABORTED runs, so it is
/// cloneable and serializable.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecuteError {
    #[error("Confirmation token rejected; nothing was moved")]
    ConfirmationRejected,

    #[error("Plan is not ready for execution ({state})")]
    PlanNotReady { state: String },

    #[error("Hash mismatch after moving to {path}: expected {expected}, found {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Source {path} changed since it was scanned (expected {expected}, found {actual})")]
    StaleSource {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Refusing to overwrite existing file {path}")]
    DestinationExists { path: PathBuf },

    #[error("I/O failure on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Failed to record manifest entry: {reason}")]
    ManifestWrite { reason: String },

    #[error("Execution was cancelled")]
    Cancelled,

    #[error("Plan was already executed in this session")]
    AlreadyExecuted,
}

/// Invalid configuration values
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Worker count must be at least 1")]
    ZeroWorkers,

    #[error("Unknown executor strategy '{0}'. Use auto, thread or process.")]
    UnknownStrategy(String),

    #[error("Unknown sensitivity '{0}'. Use conservative, balanced or aggressive.")]
    UnknownSensitivity(String),

    #[error("Folder name '{name}' must be a single plain path component")]
    InvalidFolderName { name: String },
}

/// Errors from the manifest store
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to open manifest database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Manifest query failed: {0}")]
    QueryFailed(String),

    #[error("Failed to serialize manifest data: {0}")]
    SerializationFailed(String),
}

/// Errors during undo of a previous merge
#[derive(Error, Debug)]
pub enum UndoError {
    #[error("Confirmation token rejected; nothing was moved back")]
    ConfirmationRejected,

    #[error("No manifest entries found for batch {batch_id}")]
    UnknownBatch { batch_id: String },

    #[error("Integrity mismatch for {path}; undo stopped")]
    IntegrityMismatch { path: PathBuf },

    #[error("I/O failure on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Could not find a free name for {path}")]
    UnresolvableConflict { path: PathBuf },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, NolossiaError>;
