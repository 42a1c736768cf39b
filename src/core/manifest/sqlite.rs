//! SQLite-backed manifest store.

use super::{ManifestEntry, ManifestStore};
use crate::core::record::ContentHash;
use crate::error::ManifestError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Insert-only manifest table in a WAL-mode database
pub struct SqliteManifest {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteManifest {
    /// Open or create the manifest database
    pub fn open(path: &Path) -> Result<Self, ManifestError> {
        let open_failed = |reason: String| ManifestError::OpenFailed {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| open_failed(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| open_failed(e.to_string()))?;

        // WAL with full sync so every committed entry survives a crash
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=FULL;

             CREATE TABLE IF NOT EXISTS manifest_entries (
                 seq INTEGER PRIMARY KEY AUTOINCREMENT,
                 batch_id TEXT NOT NULL,
                 original_path TEXT NOT NULL,
                 original_folder TEXT NOT NULL,
                 destination_path TEXT NOT NULL,
                 content_hash TEXT NOT NULL,
                 moved_at TEXT NOT NULL
             );

             CREATE INDEX IF NOT EXISTS idx_manifest_batch
                 ON manifest_entries(batch_id, seq);

             CREATE TRIGGER IF NOT EXISTS manifest_no_update
                 BEFORE UPDATE ON manifest_entries
                 BEGIN SELECT RAISE(ABORT, 'manifest is append-only'); END;

             CREATE TRIGGER IF NOT EXISTS manifest_no_delete
                 BEFORE DELETE ON manifest_entries
                 BEGIN SELECT RAISE(ABORT, 'manifest is append-only'); END;",
        )
        .map_err(|e| open_failed(e.to_string()))?;

        debug!("Opened manifest at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

fn query_failed(e: impl ToString) -> ManifestError {
    ManifestError::QueryFailed(e.to_string())
}

impl ManifestStore for SqliteManifest {
    fn append(&self, entry: &ManifestEntry) -> Result<(), ManifestError> {
        let mut conn = self.conn.lock().map_err(query_failed)?;
        let tx = conn.transaction().map_err(query_failed)?;
        tx.execute(
            "INSERT INTO manifest_entries
             (batch_id, original_path, original_folder, destination_path, content_hash, moved_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                entry.batch_id,
                entry.original_path.to_string_lossy(),
                entry.original_folder.to_string_lossy(),
                entry.destination_path.to_string_lossy(),
                entry.content_hash.to_hex(),
                entry.moved_at.to_rfc3339(),
            ],
        )
        .map_err(query_failed)?;
        tx.commit().map_err(query_failed)
    }

    fn entries_for_batch(&self, batch_id: &str) -> Result<Vec<ManifestEntry>, ManifestError> {
        let conn = self.conn.lock().map_err(query_failed)?;
        let mut stmt = conn
            .prepare(
                "SELECT batch_id, original_path, original_folder, destination_path,
                        content_hash, moved_at
                 FROM manifest_entries
                 WHERE batch_id = ?
                 ORDER BY seq",
            )
            .map_err(query_failed)?;

        let rows = stmt
            .query_map([batch_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(query_failed)?;

        let mut entries = Vec::new();
        for row in rows {
            let (batch_id, original, folder, destination, hash, moved_at) =
                row.map_err(query_failed)?;
            entries.push(ManifestEntry {
                original_path: PathBuf::from(original),
                original_folder: PathBuf::from(folder),
                destination_path: PathBuf::from(destination),
                content_hash: ContentHash::try_from(hash)
                    .map_err(ManifestError::SerializationFailed)?,
                batch_id,
                moved_at: DateTime::parse_from_rfc3339(&moved_at)
                    .map_err(|e| ManifestError::SerializationFailed(e.to_string()))?
                    .with_timezone(&Utc),
            });
        }
        Ok(entries)
    }

    fn batches(&self) -> Result<Vec<String>, ManifestError> {
        let conn = self.conn.lock().map_err(query_failed)?;
        let mut stmt = conn
            .prepare(
                "SELECT batch_id FROM manifest_entries
                 GROUP BY batch_id
                 ORDER BY MIN(seq)",
            )
            .map_err(query_failed)?;
        let batches = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_failed)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_failed)?;
        Ok(batches)
    }
}
