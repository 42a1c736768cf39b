//! # Engine Module
//!
//! Applies a confirmed merge plan to the filesystem.
//!
//! ## Order
//! 1. Create destination directories
//! 2. Move masters
//! 3. Move exact duplicates into quarantine
//! 4. Record near-duplicate annotations (no mutation)
//!
//! Every move is verified: the source is re-hashed before it moves and the
//! destination after. Only a verified move is appended to the manifest. The
//! first failure stops the run; completed moves are left in place and are
//! listed in the manifest.
//!
//! Cancellation is checked between actions, never during one.

use crate::core::executor::CancellationToken;
use crate::core::fs::FileSystem;
use crate::core::hasher::hash_file;
use crate::core::manifest::{ManifestEntry, ManifestStore};
use crate::core::planner::{Action, MergePlan};
use crate::core::record::ContentHash;
use crate::error::ExecuteError;
use crate::events::{Event, EventSender, ExecuteEvent, ExecuteProgress};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The literal a user must type to start execution
pub const CONFIRMATION_TOKEN: &str = "EXECUTE";

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Aborted,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "COMPLETED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
            ExecutionStatus::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A near-duplicate annotation recorded during the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearDuplicateMark {
    pub source: PathBuf,
    pub related_master: PathBuf,
    pub cluster_id: String,
}

/// Outcome of one execution run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    /// Manifest batch of this run; the hyphenated `run_id`
    pub batch_id: String,
    /// Digest of the plan that was executed
    pub plan_id: String,
    pub status: ExecutionStatus,
    pub manifest_entries: Vec<ManifestEntry>,
    /// Verified moves
    pub completed_actions: usize,
    pub last_completed_action: Option<Action>,
    /// Set for FAILED and ABORTED runs
    pub reason: Option<ExecuteError>,
    pub near_duplicates_marked: Vec<NearDuplicateMark>,
}

impl ExecutionResult {
    fn new(plan_id: &str) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            batch_id: run_id.to_string(),
            plan_id: plan_id.to_string(),
            status: ExecutionStatus::Completed,
            manifest_entries: Vec::new(),
            completed_actions: 0,
            last_completed_action: None,
            reason: None,
            near_duplicates_marked: Vec::new(),
        }
    }

    fn stop(mut self, status: ExecutionStatus, reason: ExecuteError) -> Self {
        self.status = status;
        self.reason = Some(reason);
        self
    }
}

/// Applies plans through the injected filesystem and manifest store
pub struct ExecutionEngine<'a> {
    fs: &'a dyn FileSystem,
    manifest: &'a dyn ManifestStore,
    cancel: CancellationToken,
    events: EventSender,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        manifest: &'a dyn ManifestStore,
        cancel: CancellationToken,
        events: EventSender,
    ) -> Self {
        Self {
            fs,
            manifest,
            cancel,
            events,
        }
    }

    /// Run `plan` if `token` is exactly the confirmation literal
    pub fn execute(&self, plan: &MergePlan, token: &str) -> ExecutionResult {
        let result = self.run(plan, token);
        match result.status {
            ExecutionStatus::Completed => info!(
                "Batch {} completed: {} moves verified",
                result.batch_id, result.completed_actions
            ),
            ExecutionStatus::Failed => error!(
                "Batch {} failed after {} moves: {}",
                result.batch_id,
                result.completed_actions,
                result
                    .reason
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            ),
            ExecutionStatus::Aborted => warn!(
                "Batch {} aborted after {} moves",
                result.batch_id, result.completed_actions
            ),
        }
        self.events.send(Event::Execute(ExecuteEvent::Finished {
            status: result.status.to_string(),
        }));
        result
    }

    fn run(&self, plan: &MergePlan, token: &str) -> ExecutionResult {
        let mut result = ExecutionResult::new(&plan.plan_id);

        if token != CONFIRMATION_TOKEN {
            return result.stop(ExecutionStatus::Aborted, ExecuteError::ConfirmationRejected);
        }
        if !plan.is_ready() {
            return result.stop(
                ExecutionStatus::Aborted,
                ExecuteError::PlanNotReady {
                    state: plan.validation.name().to_string(),
                },
            );
        }

        let moves: Vec<&Action> = plan
            .actions
            .iter()
            .filter(|a| matches!(a, Action::MoveMaster { .. }))
            .chain(
                plan.actions
                    .iter()
                    .filter(|a| matches!(a, Action::QuarantineExact { .. })),
            )
            .collect();
        self.events.send(Event::Execute(ExecuteEvent::Started {
            batch_id: result.batch_id.clone(),
            total_actions: plan.actions.len(),
        }));

        for dir in plan.required_directories() {
            if self.cancel.is_cancelled() {
                return result.stop(ExecutionStatus::Aborted, ExecuteError::Cancelled);
            }
            if let Err(e) = self.fs.create_dir_all(&dir) {
                return result.stop(
                    ExecutionStatus::Failed,
                    ExecuteError::Io {
                        path: dir,
                        reason: e.to_string(),
                    },
                );
            }
        }

        for action in moves {
            if self.cancel.is_cancelled() {
                return result.stop(ExecutionStatus::Aborted, ExecuteError::Cancelled);
            }
            let (Some(destination), Some(hash)) = (action.destination(), content_hash(action))
            else {
                continue;
            };

            if let Err(reason) = self.verified_move(action.source(), destination, hash) {
                return result.stop(ExecutionStatus::Failed, reason);
            }

            let entry = ManifestEntry::new(action.source(), destination, *hash, &result.batch_id);
            if let Err(e) = self.manifest.append(&entry) {
                return result.stop(
                    ExecutionStatus::Failed,
                    ExecuteError::ManifestWrite {
                        reason: e.to_string(),
                    },
                );
            }

            result.manifest_entries.push(entry);
            result.completed_actions += 1;
            result.last_completed_action = Some(action.clone());
            self.events
                .send(Event::Execute(ExecuteEvent::Progress(ExecuteProgress {
                    completed: result.completed_actions,
                    total: plan.actions.len(),
                    current_path: destination.to_path_buf(),
                })));
        }

        for action in &plan.actions {
            if let Action::MarkNearDuplicate {
                source,
                related_master,
                cluster_id,
                ..
            } = action
            {
                debug!(
                    "Near duplicate left in place: {} (master {})",
                    source.display(),
                    related_master.display()
                );
                result.near_duplicates_marked.push(NearDuplicateMark {
                    source: source.clone(),
                    related_master: related_master.clone(),
                    cluster_id: cluster_id.clone(),
                });
            }
        }

        result
    }

    /// Move one file, checking content on both sides
    fn verified_move(
        &self,
        source: &Path,
        destination: &Path,
        expected: &ContentHash,
    ) -> Result<(), ExecuteError> {
        let io_error = |path: &Path, e: std::io::Error| ExecuteError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if self.fs.exists(destination) {
            return Err(ExecuteError::DestinationExists {
                path: destination.to_path_buf(),
            });
        }

        let before = hash_file(self.fs, source).map_err(|e| io_error(source, e))?;
        if before != *expected {
            return Err(ExecuteError::StaleSource {
                path: source.to_path_buf(),
                expected: expected.to_hex(),
                actual: before.to_hex(),
            });
        }

        debug!("Moving {} -> {}", source.display(), destination.display());
        self.fs
            .move_file(source, destination)
            .map_err(|e| io_error(source, e))?;

        let after = hash_file(self.fs, destination).map_err(|e| io_error(destination, e))?;
        if after != *expected {
            return Err(ExecuteError::HashMismatch {
                path: destination.to_path_buf(),
                expected: expected.to_hex(),
                actual: after.to_hex(),
            });
        }
        Ok(())
    }
}

fn content_hash(action: &Action) -> Option<&ContentHash> {
    match action {
        Action::MoveMaster { content_hash, .. } | Action::QuarantineExact { content_hash, .. } => {
            Some(content_hash)
        }
        Action::MarkNearDuplicate { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::PlanConfig;
    use crate::core::fs::LocalFileSystem;
    use crate::core::hasher::hash_reader;
    use crate::core::manifest::InMemoryManifest;
    use crate::core::planner::{DestinationState, StorageSummary, ValidationState};
    use crate::core::planner::paths::quarantine_destination;
    use crate::events::null_sender;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &[u8]) -> ContentHash {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        hash_reader(content).unwrap()
    }

    fn plan(root: &Path, actions: Vec<Action>) -> MergePlan {
        MergePlan {
            plan_id: "0123456789ab".into(),
            target_root: root.to_path_buf(),
            destination_state: DestinationState::Empty,
            actions,
            storage: StorageSummary::default(),
            review: vec![],
            validation: ValidationState::Ready,
            storage_override: false,
        }
    }

    fn move_master(source: &Path, destination: PathBuf, hash: ContentHash) -> Action {
        Action::MoveMaster {
            source: source.to_path_buf(),
            destination,
            content_hash: hash,
            size: 1,
            cluster_id: None,
        }
    }

    #[test]
    fn wrong_token_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in/a.jpg");
        let hash = write(&source, b"a");
        let root = dir.path().join("lib");
        let plan = plan(&root, vec![move_master(&source, root.join("REVIEW/a.jpg"), hash)]);
        let manifest = InMemoryManifest::new();
        let engine = ExecutionEngine::new(
            &LocalFileSystem,
            &manifest,
            CancellationToken::new(),
            null_sender(),
        );

        for token in ["", "execute", "EXECUTE ", "yes"] {
            let result = engine.execute(&plan, token);
            assert_eq!(result.status, ExecutionStatus::Aborted);
            assert_eq!(result.reason, Some(ExecuteError::ConfirmationRejected));
        }
        assert!(source.exists());
        assert!(!root.exists());
        assert!(manifest.all().is_empty());
    }

    #[test]
    fn moves_masters_then_quarantine_and_records_manifest() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("lib");
        let master = dir.path().join("in/a.jpg");
        let dup = dir.path().join("in/b/a.jpg");
        let hash = write(&master, b"same");
        write(&dup, b"same");

        let quarantine = quarantine_destination(&root, &PlanConfig::default().quarantine_dir, &dup);
        let actions = vec![
            move_master(&master, root.join("2020/2020-01/a.jpg"), hash),
            Action::QuarantineExact {
                source: dup.clone(),
                destination: quarantine.clone(),
                content_hash: hash,
                size: 4,
                master: master.clone(),
                cluster_id: "exact-0001".into(),
            },
        ];
        let manifest = InMemoryManifest::new();
        let engine = ExecutionEngine::new(
            &LocalFileSystem,
            &manifest,
            CancellationToken::new(),
            null_sender(),
        );

        let result = engine.execute(&plan(&root, actions), CONFIRMATION_TOKEN);

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.completed_actions, 2);
        assert!(root.join("2020/2020-01/a.jpg").exists());
        assert!(quarantine.exists());
        assert!(!master.exists() && !dup.exists());
        assert_eq!(result.plan_id, "0123456789ab");
        let entries = manifest.entries_for_batch(&result.batch_id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].original_path, master);
        assert_eq!(result.manifest_entries, entries);
    }

    #[test]
    fn each_run_of_the_same_plan_gets_its_own_batch() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("lib");
        let source = dir.path().join("in/a.jpg");
        let hash = write(&source, b"a");
        let destination = root.join("REVIEW/a.jpg");
        let plan = plan(&root, vec![move_master(&source, destination.clone(), hash)]);
        let manifest = InMemoryManifest::new();
        let engine = ExecutionEngine::new(
            &LocalFileSystem,
            &manifest,
            CancellationToken::new(),
            null_sender(),
        );

        let first = engine.execute(&plan, CONFIRMATION_TOKEN);
        fs::rename(&destination, &source).unwrap();
        let second = engine.execute(&plan, CONFIRMATION_TOKEN);

        assert_eq!(first.status, ExecutionStatus::Completed);
        assert_eq!(second.status, ExecutionStatus::Completed);
        assert_eq!(first.plan_id, second.plan_id);
        assert_ne!(first.batch_id, second.batch_id);
        assert_eq!(first.batch_id, first.run_id.to_string());
        assert_eq!(manifest.entries_for_batch(&first.batch_id).unwrap().len(), 1);
        assert_eq!(
            manifest.batches().unwrap(),
            vec![first.batch_id.clone(), second.batch_id.clone()]
        );
    }

    #[test]
    fn changed_source_stops_before_moving() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("lib");
        let source = dir.path().join("in/a.jpg");
        let hash = write(&source, b"original");
        fs::write(&source, b"edited").unwrap();
        let manifest = InMemoryManifest::new();
        let engine = ExecutionEngine::new(
            &LocalFileSystem,
            &manifest,
            CancellationToken::new(),
            null_sender(),
        );

        let plan = plan(&root, vec![move_master(&source, root.join("REVIEW/a.jpg"), hash)]);
        let result = engine.execute(&plan, CONFIRMATION_TOKEN);

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(matches!(result.reason, Some(ExecuteError::StaleSource { .. })));
        assert!(source.exists());
        assert!(!root.join("REVIEW/a.jpg").exists());
    }

    #[test]
    fn existing_destination_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("lib");
        let source = dir.path().join("in/a.jpg");
        let hash = write(&source, b"new");
        write(&root.join("REVIEW/a.jpg"), b"already here");
        let manifest = InMemoryManifest::new();
        let engine = ExecutionEngine::new(
            &LocalFileSystem,
            &manifest,
            CancellationToken::new(),
            null_sender(),
        );

        let plan = plan(&root, vec![move_master(&source, root.join("REVIEW/a.jpg"), hash)]);
        let result = engine.execute(&plan, CONFIRMATION_TOKEN);

        assert!(matches!(result.reason, Some(ExecuteError::DestinationExists { .. })));
        assert_eq!(fs::read(root.join("REVIEW/a.jpg")).unwrap(), b"already here");
    }

    #[test]
    fn cancelled_run_aborts_before_first_move() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("lib");
        let source = dir.path().join("in/a.jpg");
        let hash = write(&source, b"a");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let manifest = InMemoryManifest::new();
        let engine = ExecutionEngine::new(&LocalFileSystem, &manifest, cancel, null_sender());

        let plan = plan(&root, vec![move_master(&source, root.join("REVIEW/a.jpg"), hash)]);
        let result = engine.execute(&plan, CONFIRMATION_TOKEN);

        assert_eq!(result.status, ExecutionStatus::Aborted);
        assert_eq!(result.reason, Some(ExecuteError::Cancelled));
        assert!(source.exists());
    }

    #[test]
    fn unready_plan_is_refused() {
        let dir = TempDir::new().unwrap();
        let mut plan = plan(dir.path(), vec![]);
        plan.validation = ValidationState::InsufficientStorage { shortfall: 10 };
        let manifest = InMemoryManifest::new();
        let engine = ExecutionEngine::new(
            &LocalFileSystem,
            &manifest,
            CancellationToken::new(),
            null_sender(),
        );

        let result = engine.execute(&plan, CONFIRMATION_TOKEN);

        assert_eq!(result.status, ExecutionStatus::Aborted);
        assert!(matches!(result.reason, Some(ExecuteError::PlanNotReady { .. })));
    }
}
