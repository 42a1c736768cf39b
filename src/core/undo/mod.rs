//! # Undo Module
//!
//! Moves the files of a previous merge back where they came from, driven by
//! the manifest.
//!
//! ## Statuses
//! | Status | Meaning |
//! |--------|---------|
//! | `RESTORE` | Moved file present, original location free |
//! | `CONFLICT` | Original location occupied; file goes to `REVIEW/UNDO_CONFLICTS/<batch>/` |
//! | `ALREADY_RESTORED` | Moved file gone, original present with the recorded hash |
//! | `MISSING_SOURCE` | Neither location holds the file |
//! | `CONFLICT_MISSING_SOURCE` | Moved file gone, original occupied by other content |
//!
//! Entries are undone newest first. Hashes are checked before and after each
//! move, nothing is ever overwritten, and the first integrity failure stops
//! the run. Undo moves are not written to the manifest.

use crate::core::fs::FileSystem;
use crate::core::hasher::hash_file;
use crate::core::manifest::ManifestStore;
use crate::core::planner::paths::free_path;
use crate::core::record::ContentHash;
use crate::error::UndoError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// The literal a user must type to start an undo
pub const UNDO_TOKEN: &str = "UNDO";

/// Folder under the review directory that receives conflicting restores
pub const UNDO_CONFLICTS_DIR: &str = "UNDO_CONFLICTS";

/// State of one manifest entry during undo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UndoStatus {
    Restore,
    Conflict,
    AlreadyRestored,
    MissingSource,
    ConflictMissingSource,
    /// After execution: back at the original path
    Restored,
    /// After execution: parked in the conflict folder
    ConflictRouted,
}

/// One manifest entry and what undo will do (or did) with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoItem {
    pub original_path: PathBuf,
    /// Where the merge put the file
    pub moved_path: PathBuf,
    pub content_hash: ContentHash,
    pub status: UndoStatus,
    pub target_path: Option<PathBuf>,
}

/// Per-status totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoCounts {
    pub total: usize,
    pub restore: usize,
    pub conflict: usize,
    pub already_restored: usize,
    pub missing: usize,
}

impl UndoCounts {
    fn of(items: &[UndoItem]) -> Self {
        let mut counts = UndoCounts {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.status {
                UndoStatus::Restore | UndoStatus::Restored => counts.restore += 1,
                UndoStatus::Conflict
                | UndoStatus::ConflictRouted
                | UndoStatus::ConflictMissingSource => counts.conflict += 1,
                UndoStatus::AlreadyRestored => counts.already_restored += 1,
                UndoStatus::MissingSource => counts.missing += 1,
            }
        }
        counts
    }
}

/// A previewable undo of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoPlan {
    pub batch_id: String,
    pub library_root: PathBuf,
    pub conflict_root: PathBuf,
    /// Newest move first
    pub items: Vec<UndoItem>,
}

impl UndoPlan {
    /// What would happen, without moving anything
    pub fn counts(&self) -> UndoCounts {
        UndoCounts::of(&self.items)
    }
}

/// Result of an executed undo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoReport {
    pub batch_id: String,
    pub items: Vec<UndoItem>,
    pub counts: UndoCounts,
}

fn matches_hash(fs: &dyn FileSystem, path: &Path, expected: &ContentHash) -> bool {
    hash_file(fs, path).is_ok_and(|h| h == *expected)
}

fn conflict_target(conflict_root: &Path, moved: &Path) -> PathBuf {
    match moved.file_name() {
        Some(name) => conflict_root.join(name),
        None => conflict_root.to_path_buf(),
    }
}

/// Classify every entry of `batch_id`
pub fn prepare_undo(
    store: &dyn ManifestStore,
    fs: &dyn FileSystem,
    batch_id: &str,
    library_root: &Path,
    review_dir: &str,
) -> Result<UndoPlan, UndoError> {
    let entries = store.entries_for_batch(batch_id)?;
    if entries.is_empty() {
        return Err(UndoError::UnknownBatch {
            batch_id: batch_id.to_string(),
        });
    }
    let conflict_root = library_root
        .join(review_dir)
        .join(UNDO_CONFLICTS_DIR)
        .join(batch_id);

    let items = entries
        .into_iter()
        .rev()
        .map(|entry| {
            let moved_present = fs.exists(&entry.destination_path);
            let original_present = fs.exists(&entry.original_path);
            let (status, target_path) = match (moved_present, original_present) {
                (true, false) => (UndoStatus::Restore, Some(entry.original_path.clone())),
                (true, true) => (
                    UndoStatus::Conflict,
                    Some(conflict_target(&conflict_root, &entry.destination_path)),
                ),
                (false, true) if matches_hash(fs, &entry.original_path, &entry.content_hash) => {
                    (UndoStatus::AlreadyRestored, None)
                }
                (false, true) => (UndoStatus::ConflictMissingSource, None),
                (false, false) => (UndoStatus::MissingSource, None),
            };
            UndoItem {
                original_path: entry.original_path,
                moved_path: entry.destination_path,
                content_hash: entry.content_hash,
                status,
                target_path,
            }
        })
        .collect();

    Ok(UndoPlan {
        batch_id: batch_id.to_string(),
        library_root: library_root.to_path_buf(),
        conflict_root,
        items,
    })
}

/// Apply an undo plan if `token` is exactly the undo literal
pub fn execute_undo(
    plan: &UndoPlan,
    token: &str,
    fs: &dyn FileSystem,
) -> Result<UndoReport, UndoError> {
    if token != UNDO_TOKEN {
        return Err(UndoError::ConfirmationRejected);
    }

    let mut items = Vec::with_capacity(plan.items.len());
    for item in &plan.items {
        if !matches!(item.status, UndoStatus::Restore | UndoStatus::Conflict) {
            items.push(item.clone());
            continue;
        }
        items.push(undo_one(plan, item, fs)?);
    }

    let counts = UndoCounts::of(&items);
    info!(
        "Undo of batch {}: {} restored, {} routed to conflicts",
        plan.batch_id, counts.restore, counts.conflict
    );
    Ok(UndoReport {
        batch_id: plan.batch_id.clone(),
        items,
        counts,
    })
}

fn undo_one(plan: &UndoPlan, item: &UndoItem, fs: &dyn FileSystem) -> Result<UndoItem, UndoError> {
    let io_error = |path: &Path, e: std::io::Error| UndoError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    // The world may have changed since the plan was prepared
    if !fs.exists(&item.moved_path) {
        let status = if matches_hash(fs, &item.original_path, &item.content_hash) {
            UndoStatus::AlreadyRestored
        } else {
            UndoStatus::MissingSource
        };
        warn!("{} vanished before undo", item.moved_path.display());
        return Ok(UndoItem {
            status,
            target_path: None,
            ..item.clone()
        });
    }

    let before = hash_file(fs, &item.moved_path).map_err(|e| io_error(&item.moved_path, e))?;
    if before != item.content_hash {
        error!("Integrity mismatch before undo: {}", item.moved_path.display());
        return Err(UndoError::IntegrityMismatch {
            path: item.moved_path.clone(),
        });
    }

    let mut target = match item.status {
        UndoStatus::Restore => item.original_path.clone(),
        _ => conflict_target(&plan.conflict_root, &item.moved_path),
    };
    if fs.exists(&target) {
        if item.status == UndoStatus::Restore {
            target = conflict_target(&plan.conflict_root, &item.moved_path);
        }
        target = free_path(&target, &item.content_hash, |p| fs.exists(p))
            .ok_or_else(|| UndoError::UnresolvableConflict {
                path: target.clone(),
            })?;
    }

    if let Some(parent) = target.parent() {
        fs.create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    fs.move_file(&item.moved_path, &target)
        .map_err(|e| io_error(&item.moved_path, e))?;

    if !matches_hash(fs, &target, &item.content_hash) {
        error!("Integrity mismatch after undo: {}", target.display());
        return Err(UndoError::IntegrityMismatch { path: target });
    }

    let status = if target == item.original_path {
        UndoStatus::Restored
    } else {
        UndoStatus::ConflictRouted
    };
    info!("Undo {:?}: {} -> {}", status, item.moved_path.display(), target.display());
    Ok(UndoItem {
        status,
        target_path: Some(target),
        ..item.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fs::LocalFileSystem;
    use crate::core::hasher::hash_reader;
    use crate::core::manifest::{InMemoryManifest, ManifestEntry};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        inputs: PathBuf,
        store: InMemoryManifest,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("lib");
        let inputs = dir.path().join("in");
        fs::create_dir_all(root.join("REVIEW")).unwrap();
        fs::create_dir_all(&inputs).unwrap();
        Fixture {
            root,
            inputs,
            _dir: dir,
            store: InMemoryManifest::new(),
        }
    }

    /// Simulate a merged file: content sits at the destination
    fn merged(f: &Fixture, name: &str, content: &[u8]) -> (PathBuf, PathBuf) {
        let original = f.inputs.join(name);
        let moved = f.root.join("REVIEW").join(name);
        fs::write(&moved, content).unwrap();
        f.store
            .append(&ManifestEntry::new(
                &original,
                &moved,
                hash_reader(content).unwrap(),
                "batch1",
            ))
            .unwrap();
        (original, moved)
    }

    fn prepare(f: &Fixture) -> UndoPlan {
        prepare_undo(&f.store, &LocalFileSystem, "batch1", &f.root, "REVIEW").unwrap()
    }

    #[test]
    fn unknown_batch_is_an_error() {
        let f = fixture();
        let err = prepare_undo(&f.store, &LocalFileSystem, "nope", &f.root, "REVIEW").unwrap_err();
        assert!(matches!(err, UndoError::UnknownBatch { .. }));
    }

    #[test]
    fn classifies_each_entry() {
        let f = fixture();
        merged(&f, "restore.jpg", b"r");
        let (occupied, _) = merged(&f, "conflict.jpg", b"c");
        fs::write(&occupied, b"someone else").unwrap();
        let (done, moved) = merged(&f, "done.jpg", b"d");
        fs::rename(&moved, &done).unwrap();
        let (_, gone) = merged(&f, "gone.jpg", b"g");
        fs::remove_file(&gone).unwrap();
        let (other, moved) = merged(&f, "other.jpg", b"o");
        fs::remove_file(&moved).unwrap();
        fs::write(&other, b"different").unwrap();

        let plan = prepare(&f);
        let statuses: Vec<_> = plan.items.iter().map(|i| i.status).collect();

        // Newest first
        assert_eq!(
            statuses,
            vec![
                UndoStatus::ConflictMissingSource,
                UndoStatus::MissingSource,
                UndoStatus::AlreadyRestored,
                UndoStatus::Conflict,
                UndoStatus::Restore,
            ]
        );
        assert_eq!(
            plan.items[3].target_path,
            Some(f.root.join("REVIEW/UNDO_CONFLICTS/batch1/conflict.jpg"))
        );
        let counts = plan.counts();
        assert_eq!(counts.total, 5);
        assert_eq!(counts.restore, 1);
        assert_eq!(counts.conflict, 2);
    }

    #[test]
    fn wrong_token_moves_nothing() {
        let f = fixture();
        let (original, moved) = merged(&f, "a.jpg", b"a");
        let plan = prepare(&f);

        let err = execute_undo(&plan, "undo", &LocalFileSystem).unwrap_err();

        assert!(matches!(err, UndoError::ConfirmationRejected));
        assert!(moved.exists());
        assert!(!original.exists());
    }

    #[test]
    fn restores_and_routes_conflicts() {
        let f = fixture();
        let (original, _) = merged(&f, "a.jpg", b"a");
        let (occupied, _) = merged(&f, "b.jpg", b"b");
        fs::write(&occupied, b"new file").unwrap();
        let plan = prepare(&f);

        let report = execute_undo(&plan, UNDO_TOKEN, &LocalFileSystem).unwrap();

        assert_eq!(fs::read(&original).unwrap(), b"a");
        let parked = f.root.join("REVIEW/UNDO_CONFLICTS/batch1/b.jpg");
        assert_eq!(fs::read(&parked).unwrap(), b"b");
        assert_eq!(fs::read(&occupied).unwrap(), b"new file");
        assert_eq!(report.counts.restore, 1);
        assert_eq!(report.counts.conflict, 1);
    }

    #[test]
    fn tampered_file_stops_undo() {
        let f = fixture();
        let (_, moved) = merged(&f, "a.jpg", b"a");
        let plan = prepare(&f);
        fs::write(&moved, b"edited after merge").unwrap();

        let err = execute_undo(&plan, UNDO_TOKEN, &LocalFileSystem).unwrap_err();

        assert!(matches!(err, UndoError::IntegrityMismatch { .. }));
        assert!(moved.exists());
    }
}
