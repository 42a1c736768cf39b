//! # Core Module
//!
//! The UI-agnostic merge engine.
//!
//! ## Modules
//! - `scanner` - Discovers photos in directories
//! - `extractor` - Hashes and reads metadata for one file
//! - `executor` - Runs the extractor across a worker pool
//! - `hasher` - Content digest and average hash
//! - `metadata` - Extracts EXIF metadata from photos
//! - `classifier` - Exact clusters, master selection, near-duplicate links
//! - `planner` - Destination validation and the ordered merge plan
//! - `engine` - Applies a confirmed plan with verified moves
//! - `manifest` - Append-only record of every move
//! - `undo` - Moves a batch back using the manifest
//! - `session` - Runs the phases in order

pub mod classifier;
pub mod config;
pub mod engine;
pub mod executor;
pub mod extractor;
pub mod fs;
pub mod hasher;
pub mod manifest;
pub mod metadata;
pub mod planner;
pub mod record;
pub mod scanner;
pub mod session;
pub mod undo;

// Re-export commonly used types
pub use classifier::{Cluster, ClusterKind, DedupeResult, DedupeSummary, NearBand};
pub use config::NolossiaConfig;
pub use engine::{ExecutionResult, ExecutionStatus, CONFIRMATION_TOKEN};
pub use manifest::{ManifestEntry, ManifestStore};
pub use planner::{Action, MergePlan};
pub use record::FileRecord;
pub use session::{MergeSession, SessionState};
