//! # Planner Module
//!
//! Turns classification output plus the destination's current state into a
//! concrete, storage-checked, ordered list of actions. Nothing is touched on
//! disk while planning.
//!
//! ## Layout
//! ```text
//! <root>/2021/2021-07/IMG_0001.jpg             masters with a reliable date
//! <root>/REVIEW/IMG_0002.jpg                   masters without one
//! <root>/QUARANTINE_EXACT/<source dirs>/x.jpg  exact duplicates
//! ```
//!
//! Building the same plan twice from the same input yields the same value,
//! including `plan_id`.

mod destination;
pub mod paths;
mod types;

pub use destination::{validate_destination, DestinationState};
pub use types::{
    Action, DryRunSummary, MergePlan, ReviewEntry, StorageBreakdown, StorageSummary,
    ValidationState,
};

use crate::core::classifier::{Cluster, ClusterKind};
use crate::core::config::PlanConfig;
use crate::core::fs::FileSystem;
use crate::core::record::FileRecord;
use crate::error::PlanError;
use crate::events::{Event, EventSender, PlanEvent};
use paths::PathAllocator;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Build a merge plan for `clusters` and `uniques` into `root`
pub fn build_plan(
    clusters: &[Cluster],
    uniques: &[FileRecord],
    root: &Path,
    config: &PlanConfig,
    fs: &dyn FileSystem,
    events: &EventSender,
) -> Result<MergePlan, PlanError> {
    let state = validate_destination(fs, root, config)?;
    events.send(Event::Plan(PlanEvent::DestinationValidated {
        root: root.to_path_buf(),
        state: state.name().to_string(),
    }));
    if let DestinationState::NonChronological { blocking_paths } = state {
        return Err(PlanError::NonChronologicalDestination {
            root: root.to_path_buf(),
            blocking_paths,
        });
    }

    let near_candidates: HashSet<&Path> = clusters
        .iter()
        .filter(|c| c.kind == ClusterKind::Near)
        .flat_map(|c| c.duplicates())
        .map(|r| r.path.as_path())
        .collect();

    let mut masters: Vec<(&FileRecord, Option<&str>)> = clusters
        .iter()
        .filter(|c| c.kind == ClusterKind::Exact)
        .map(|c| (c.master(), Some(c.id.as_str())))
        .chain(
            uniques
                .iter()
                .filter(|r| !near_candidates.contains(r.path.as_path()))
                .map(|r| (r, None)),
        )
        .collect();
    masters.sort_by_key(|(r, _)| r.scan_index);

    let mut quarantined: Vec<(&FileRecord, &Cluster)> = clusters
        .iter()
        .filter(|c| c.kind == ClusterKind::Exact)
        .flat_map(|c| c.duplicates().map(move |r| (r, c)))
        .collect();
    quarantined.sort_by_key(|(r, _)| r.scan_index);

    let mut near: Vec<&Cluster> = clusters
        .iter()
        .filter(|c| c.kind == ClusterKind::Near)
        .collect();
    near.sort_by_key(|c| c.members.get(1).map(|r| r.scan_index));

    let exists = |p: &Path| fs.exists(p);
    let mut allocator = PathAllocator::default();
    let mut actions = Vec::with_capacity(masters.len() + quarantined.len() + near.len());
    let mut review = Vec::new();
    let mut breakdown = StorageBreakdown::default();

    for (record, cluster_id) in masters {
        let (desired, review_reason) =
            paths::master_destination(root, &config.review_dir, record);
        let destination = allocator
            .claim(&desired, &record.content_hash, exists)
            .ok_or_else(|| PlanError::UnresolvableCollision {
                path: desired.clone(),
            })?;

        if let Some(reason) = review_reason {
            breakdown.review += record.size;
            review.push(ReviewEntry {
                source: record.path.clone(),
                destination: destination.clone(),
                reason,
            });
        } else {
            breakdown.masters += record.size;
        }
        actions.push(Action::MoveMaster {
            source: record.path.clone(),
            destination,
            content_hash: record.content_hash,
            size: record.size,
            cluster_id: cluster_id.map(str::to_string),
        });
    }

    for (record, cluster) in quarantined {
        let desired = paths::quarantine_destination(root, &config.quarantine_dir, &record.path);
        let destination = allocator
            .claim(&desired, &record.content_hash, exists)
            .ok_or_else(|| PlanError::UnresolvableCollision {
                path: desired.clone(),
            })?;

        breakdown.quarantine += record.size;
        actions.push(Action::QuarantineExact {
            source: record.path.clone(),
            destination,
            content_hash: record.content_hash,
            size: record.size,
            master: cluster.master().path.clone(),
            cluster_id: cluster.id.clone(),
        });
    }

    for cluster in near {
        let Some(candidate) = cluster.duplicates().next() else {
            continue;
        };
        let (Some(distance), Some(band)) = (cluster.distance, cluster.band) else {
            continue;
        };
        actions.push(Action::MarkNearDuplicate {
            source: candidate.path.clone(),
            related_master: cluster.master().path.clone(),
            cluster_id: cluster.id.clone(),
            distance,
            band,
        });
    }

    let available = match fs.available_space(root) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == io::ErrorKind::Unsupported => {
            warn!("Free space at {} is unknown: {}", root.display(), e);
            None
        }
        Err(source) => {
            return Err(PlanError::Io {
                path: root.to_path_buf(),
                source,
            })
        }
    };
    let storage = StorageSummary::new(breakdown, available);
    let validation = match storage.shortfall() {
        0 => ValidationState::Ready,
        shortfall => {
            warn!(
                "Plan needs {} bytes but only {} are free at {}",
                storage.required,
                storage.required - shortfall,
                root.display()
            );
            ValidationState::InsufficientStorage { shortfall }
        }
    };

    let plan_id = plan_digest(root, &actions);
    info!(
        "Built plan {} with {} actions ({} for review)",
        plan_id,
        actions.len(),
        review.len()
    );
    events.send(Event::Plan(PlanEvent::Built {
        plan_id: plan_id.clone(),
        actions: actions.len(),
        required_bytes: storage.required,
        available_bytes: storage.available,
    }));

    Ok(MergePlan {
        plan_id,
        target_root: root.to_path_buf(),
        destination_state: state,
        actions,
        storage,
        review,
        validation,
        storage_override: false,
    })
}

/// Count what a plan would do, without touching the filesystem
pub fn dry_run(plan: &MergePlan) -> DryRunSummary {
    let mut summary = DryRunSummary {
        directories: plan.required_directories().len(),
        ..Default::default()
    };
    for action in &plan.actions {
        match action {
            Action::MoveMaster { .. } => summary.move_master += 1,
            Action::QuarantineExact { .. } => summary.quarantine_exact += 1,
            Action::MarkNearDuplicate { .. } => summary.mark_near_duplicate += 1,
        }
    }
    summary
}

/// One line per action, fed through SHA-256
fn plan_digest(root: &Path, actions: &[Action]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    hasher.update(b"\n");
    for action in actions {
        let line = match action {
            Action::MoveMaster {
                source,
                destination,
                content_hash,
                ..
            }
            | Action::QuarantineExact {
                source,
                destination,
                content_hash,
                ..
            } => format!(
                "{}\t{}\t{}\t{}",
                action.kind(),
                source.display(),
                destination.display(),
                content_hash
            ),
            Action::MarkNearDuplicate {
                source,
                related_master,
                ..
            } => format!(
                "{}\t{}\t{}",
                action.kind(),
                source.display(),
                related_master.display()
            ),
        };
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())[..12].to_string()
}
