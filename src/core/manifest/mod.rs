//! # Manifest Module
//!
//! The durable, append-only audit log of every executed move.
//!
//! ## Features
//! - Persistent storage using SQLite (`SqliteManifest`)
//! - In-memory store for tests and dry tooling (`InMemoryManifest`)
//! - JSON export for downstream report renderers
//!
//! Entries are written only by the execution engine, one per verified move,
//! and are never updated or deleted.

mod sqlite;

pub use sqlite::SqliteManifest;

use crate::core::record::ContentHash;
use crate::error::ManifestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Version of the exported JSON layout
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// One verified move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub original_path: PathBuf,
    pub original_folder: PathBuf,
    pub destination_path: PathBuf,
    pub content_hash: ContentHash,
    pub batch_id: String,
    pub moved_at: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn new(
        original_path: &Path,
        destination_path: &Path,
        content_hash: ContentHash,
        batch_id: &str,
    ) -> Self {
        Self {
            original_path: original_path.to_path_buf(),
            original_folder: original_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            destination_path: destination_path.to_path_buf(),
            content_hash,
            batch_id: batch_id.to_string(),
            moved_at: Utc::now(),
        }
    }
}

/// Trait for manifest storage
///
/// Implementations must make `append` durable before returning.
pub trait ManifestStore: Send + Sync {
    fn append(&self, entry: &ManifestEntry) -> Result<(), ManifestError>;

    /// Entries of one batch in the order they were appended
    fn entries_for_batch(&self, batch_id: &str) -> Result<Vec<ManifestEntry>, ManifestError>;

    /// Known batch ids, oldest first
    fn batches(&self) -> Result<Vec<String>, ManifestError>;
}

/// Non-persistent store
#[derive(Debug, Default)]
pub struct InMemoryManifest {
    entries: Mutex<Vec<ManifestEntry>>,
}

impl InMemoryManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry across batches
    pub fn all(&self) -> Vec<ManifestEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ManifestStore for InMemoryManifest {
    fn append(&self, entry: &ManifestEntry) -> Result<(), ManifestError> {
        self.entries
            .lock()
            .map_err(|e| ManifestError::QueryFailed(e.to_string()))?
            .push(entry.clone());
        Ok(())
    }

    fn entries_for_batch(&self, batch_id: &str) -> Result<Vec<ManifestEntry>, ManifestError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| ManifestError::QueryFailed(e.to_string()))?;
        Ok(entries
            .iter()
            .filter(|e| e.batch_id == batch_id)
            .cloned()
            .collect())
    }

    fn batches(&self) -> Result<Vec<String>, ManifestError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| ManifestError::QueryFailed(e.to_string()))?;
        let mut batches: Vec<String> = Vec::new();
        for entry in entries.iter() {
            if !batches.contains(&entry.batch_id) {
                batches.push(entry.batch_id.clone());
            }
        }
        Ok(batches)
    }
}

#[derive(Serialize)]
struct ManifestExport<'a> {
    schema_version: u32,
    batch_id: &'a str,
    entries: &'a [ManifestEntry],
}

/// Render one batch as pretty JSON
pub fn export_json(batch_id: &str, entries: &[ManifestEntry]) -> Result<String, ManifestError> {
    serde_json::to_string_pretty(&ManifestExport {
        schema_version: MANIFEST_SCHEMA_VERSION,
        batch_id,
        entries,
    })
    .map_err(|e| ManifestError::SerializationFailed(e.to_string()))
}

/// `<local data dir>/nolossia/manifest.db`
pub fn default_manifest_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("nolossia")
        .join("manifest.db")
}
