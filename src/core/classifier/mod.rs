//! # Classifier Module
//!
//! Groups extracted records into duplicate clusters and picks a master for
//! each one.
//!
//! ## How It Works
//! 1. Partition records by content hash; partitions of two or more are
//!    `EXACT` clusters
//! 2. Pick a master per exact cluster with the comparator chain in `master`
//! 3. Link visually similar representatives by perceptual Hamming distance
//!
//! ## Near-duplicate Bands
//! | Distance (conservative) | Result |
//! |----------|---------------|
//! | 0-2      | Strong link   |
//! | 3-5      | Weak link, only when the strict predicate holds |
//! | 6+       | No link       |
//!
//! Near links never merge exact clusters. Every qualifying pair is reported as
//! its own two-member `NEAR` cluster `[anchor, candidate]`, so one file can be
//! linked to several anchors, and two exact masters can link to each other.
//!
//! Classification is single-threaded. Identical input always produces
//! identical clusters, ids and masters.

pub mod master;
mod near;

pub use near::{classify_pair, weak_match};

use crate::core::config::ClassifyConfig;
use crate::core::record::{ContentHash, FileRecord};
use crate::events::{ClassifyEvent, Event, EventSender};
use near::Representative;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Kind of duplicate relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterKind {
    Exact,
    Near,
}

/// Hamming band a near link matched in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NearBand {
    Strong,
    Weak,
}

/// A group of duplicates with one designated master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// `exact-0001`, `near-0001`, ...
    pub id: String,
    pub kind: ClusterKind,
    /// Exact clusters keep scan order; near clusters are `[anchor, candidate]`
    pub members: Vec<FileRecord>,
    /// Position of the master in `members`
    pub master_index: usize,
    /// Only for `NEAR` clusters
    pub band: Option<NearBand>,
    /// Only for `NEAR` clusters
    pub distance: Option<u32>,
}

impl Cluster {
    pub fn master(&self) -> &FileRecord {
        &self.members[self.master_index]
    }

    /// Every member except the master
    pub fn duplicates(&self) -> impl Iterator<Item = &FileRecord> {
        self.members
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.master_index)
            .map(|(_, record)| record)
    }
}

/// Counts for the calling layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupeSummary {
    /// Files moved into the library: exact masters plus singletons that are
    /// not near-duplicate candidates
    pub masters: usize,
    /// Non-master members of exact clusters
    pub exact_duplicates: usize,
    /// Distinct files linked to an anchor as near-duplicates
    pub near_duplicates: usize,
    pub cluster_count: usize,
}

/// Output of `dedupe`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupeResult {
    /// Exact clusters first, then near clusters
    pub clusters: Vec<Cluster>,
    /// Records that belong to no exact cluster, in scan order
    pub uniques: Vec<FileRecord>,
    pub summary: DedupeSummary,
}

impl DedupeResult {
    pub fn exact_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(|c| c.kind == ClusterKind::Exact)
    }

    pub fn near_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(|c| c.kind == ClusterKind::Near)
    }
}

/// Classify one run's records
pub fn dedupe(records: &[FileRecord], config: &ClassifyConfig, events: &EventSender) -> DedupeResult {
    events.send(Event::Classify(ClassifyEvent::Started {
        total_records: records.len(),
    }));

    // Phase 1: exact groups, in order of first appearance
    let mut slot_of: HashMap<ContentHash, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let slot = *slot_of.entry(record.content_hash).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(index);
    }

    let mut clusters = Vec::new();
    let mut representatives = Vec::new();
    let mut uniques = Vec::new();
    let mut exact_duplicates = 0;

    for group in &groups {
        if let [only] = group.as_slice() {
            representatives.push(Representative {
                index: *only,
                exact_master: false,
            });
            continue;
        }

        let members: Vec<FileRecord> = group.iter().map(|&i| records[i].clone()).collect();
        let master_index = master::select_master(&members);
        let master = &members[master_index];
        for (i, other) in members.iter().enumerate() {
            if i != master_index {
                debug!(
                    "Kept {} over {} ({})",
                    master.path.display(),
                    other.path.display(),
                    master::deciding_rule(master, other)
                );
            }
        }

        representatives.push(Representative {
            index: group[master_index],
            exact_master: true,
        });
        exact_duplicates += members.len() - 1;
        clusters.push(Cluster {
            id: format!("exact-{:04}", clusters.len() + 1),
            kind: ClusterKind::Exact,
            members,
            master_index,
            band: None,
            distance: None,
        });
    }
    representatives.sort_by_key(|rep| rep.index);
    for rep in representatives.iter().filter(|rep| !rep.exact_master) {
        uniques.push(records[rep.index].clone());
    }
    let exact_count = clusters.len();

    // Phase 2: near links between representatives
    let links = near::link(records, &representatives, config.sensitivity.bands());
    for (n, link) in links.iter().enumerate() {
        debug!(
            "Near duplicate {} -> {} (distance {}, {:?})",
            records[link.candidate].path.display(),
            records[link.anchor].path.display(),
            link.distance,
            link.band
        );
        clusters.push(Cluster {
            id: format!("near-{:04}", n + 1),
            kind: ClusterKind::Near,
            members: vec![records[link.anchor].clone(), records[link.candidate].clone()],
            master_index: 0,
            band: Some(link.band),
            distance: Some(link.distance),
        });
    }

    let exact_masters: HashSet<usize> = representatives
        .iter()
        .filter(|rep| rep.exact_master)
        .map(|rep| rep.index)
        .collect();
    let candidates: HashSet<usize> = links.iter().map(|l| l.candidate).collect();
    let left_in_place = candidates
        .iter()
        .filter(|index| !exact_masters.contains(index))
        .count();

    let summary = DedupeSummary {
        masters: records.len() - exact_duplicates - left_in_place,
        exact_duplicates,
        near_duplicates: candidates.len(),
        cluster_count: clusters.len(),
    };
    info!(
        "Classified {} records: {} exact clusters, {} near links, {} masters",
        records.len(),
        exact_count,
        links.len(),
        summary.masters
    );
    events.send(Event::Classify(ClassifyEvent::Completed {
        exact_clusters: exact_count,
        near_links: links.len(),
    }));

    DedupeResult {
        clusters,
        uniques,
        summary,
    }
}
