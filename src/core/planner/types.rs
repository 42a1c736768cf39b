//! Types for the planner module.

use super::DestinationState;
use crate::core::classifier::NearBand;
use crate::core::extractor::ReviewReason;
use crate::core::record::ContentHash;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One step of a merge plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Move a master into the organized library
    MoveMaster {
        source: PathBuf,
        destination: PathBuf,
        content_hash: ContentHash,
        size: u64,
        /// Set when the master came from an exact cluster
        cluster_id: Option<String>,
    },
    /// Move an exact duplicate into the quarantine subtree
    QuarantineExact {
        source: PathBuf,
        destination: PathBuf,
        content_hash: ContentHash,
        size: u64,
        master: PathBuf,
        cluster_id: String,
    },
    /// Annotation only; the file stays where it is
    MarkNearDuplicate {
        source: PathBuf,
        related_master: PathBuf,
        cluster_id: String,
        distance: u32,
        band: NearBand,
    },
}

impl Action {
    pub fn source(&self) -> &Path {
        match self {
            Action::MoveMaster { source, .. }
            | Action::QuarantineExact { source, .. }
            | Action::MarkNearDuplicate { source, .. } => source,
        }
    }

    /// None for annotations
    pub fn destination(&self) -> Option<&Path> {
        match self {
            Action::MoveMaster { destination, .. } | Action::QuarantineExact { destination, .. } => {
                Some(destination)
            }
            Action::MarkNearDuplicate { .. } => None,
        }
    }

    pub fn is_move(&self) -> bool {
        self.destination().is_some()
    }

    /// Stable label used in dry runs and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Action::MoveMaster { .. } => "move_master",
            Action::QuarantineExact { .. } => "quarantine_exact",
            Action::MarkNearDuplicate { .. } => "mark_near_duplicate",
        }
    }
}

/// Bytes per destination category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBreakdown {
    pub masters: u64,
    pub quarantine: u64,
    pub review: u64,
}

impl StorageBreakdown {
    pub fn total(&self) -> u64 {
        self.masters + self.quarantine + self.review
    }
}

/// Storage needed versus storage free at the destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSummary {
    /// Always `breakdown.total()`
    pub required: u64,
    /// None when the platform cannot report free space
    pub available: Option<u64>,
    pub breakdown: StorageBreakdown,
}

impl StorageSummary {
    pub fn new(breakdown: StorageBreakdown, available: Option<u64>) -> Self {
        Self {
            required: breakdown.total(),
            available,
            breakdown,
        }
    }

    /// Bytes missing; zero when everything fits or free space is unknown
    pub fn shortfall(&self) -> u64 {
        self.available
            .map_or(0, |available| self.required.saturating_sub(available))
    }
}

/// A master routed to REVIEW
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub reason: ReviewReason,
}

/// Whether a plan may be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ValidationState {
    Ready,
    /// Blocks execution until explicitly overridden
    InsufficientStorage { shortfall: u64 },
}

impl ValidationState {
    pub fn name(&self) -> &'static str {
        match self {
            ValidationState::Ready => "PLAN_READY",
            ValidationState::InsufficientStorage { .. } => "INSUFFICIENT_STORAGE",
        }
    }
}

/// A fully materialized, not yet executed merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePlan {
    /// First 12 hex of SHA-256 over the root and action list
    pub plan_id: String,
    pub target_root: PathBuf,
    pub destination_state: DestinationState,
    /// MoveMaster, then QuarantineExact, then MarkNearDuplicate
    pub actions: Vec<Action>,
    pub storage: StorageSummary,
    pub review: Vec<ReviewEntry>,
    pub validation: ValidationState,
    /// True once a storage shortfall was explicitly accepted
    pub storage_override: bool,
}

impl MergePlan {
    pub fn is_ready(&self) -> bool {
        self.validation == ValidationState::Ready
    }

    /// Accept a storage shortfall and mark the plan ready
    pub fn override_storage_shortfall(&mut self) {
        if let ValidationState::InsufficientStorage { shortfall } = self.validation {
            warn!(
                "Storage shortfall of {} bytes overridden for plan {}",
                shortfall, self.plan_id
            );
            self.validation = ValidationState::Ready;
            self.storage_override = true;
        }
    }

    pub fn move_actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| a.is_move())
    }

    /// Every directory the moves need, sorted
    pub fn required_directories(&self) -> Vec<PathBuf> {
        let dirs: std::collections::BTreeSet<PathBuf> = self
            .move_actions()
            .filter_map(|a| a.destination()?.parent().map(Path::to_path_buf))
            .collect();
        dirs.into_iter().collect()
    }
}

/// Per-kind action counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunSummary {
    pub move_master: usize,
    pub quarantine_exact: usize,
    pub mark_near_duplicate: usize,
    pub directories: usize,
}

impl DryRunSummary {
    pub fn total_actions(&self) -> usize {
        self.move_master + self.quarantine_exact + self.mark_near_duplicate
    }
}
