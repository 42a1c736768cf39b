//! Near-duplicate linking between representatives.
//!
//! Candidate pairs come from a band index: the 64 hash bits are split into
//! `weak + 1` segments, and two hashes within `weak` bits of each other must
//! agree exactly on at least one segment. Every true pair is found, so the
//! index only saves comparisons and never changes the result.

use super::{master, NearBand};
use crate::core::config::HammingBands;
use crate::core::record::FileRecord;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// A representative taking part in linking
#[derive(Debug, Clone, Copy)]
pub(super) struct Representative {
    /// Position in the record list
    pub index: usize,
    /// Master of an exact cluster; anchors every singleton it links with
    pub exact_master: bool,
}

/// One accepted link, expressed as record positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct NearLink {
    pub anchor: usize,
    pub candidate: usize,
    pub distance: u32,
    pub band: NearBand,
}

/// Weak-band validation: equal known resolution, and the same capture day or
/// the same known camera.
pub fn weak_match(a: &FileRecord, b: &FileRecord) -> bool {
    let same_resolution = matches!((a.resolution, b.resolution), (Some(x), Some(y)) if x == y);
    if !same_resolution {
        return false;
    }
    let same_day = matches!(
        (a.reliable_timestamp(), b.reliable_timestamp()),
        (Some(x), Some(y)) if x.date() == y.date()
    );
    let same_camera = matches!((&a.camera, &b.camera), (Some(x), Some(y)) if x == y);
    same_day || same_camera
}

/// Band for a pair, or None when it must not link
pub fn classify_pair(
    a: &FileRecord,
    b: &FileRecord,
    distance: u32,
    bands: HammingBands,
) -> Option<NearBand> {
    if distance <= bands.strong {
        Some(NearBand::Strong)
    } else if distance <= bands.weak && weak_match(a, b) {
        Some(NearBand::Weak)
    } else {
        None
    }
}

pub(super) fn link(
    records: &[FileRecord],
    representatives: &[Representative],
    bands: HammingBands,
) -> Vec<NearLink> {
    let hashed: Vec<(Representative, u64)> = representatives
        .iter()
        .filter_map(|rep| records[rep.index].perceptual_hash.map(|h| (*rep, h.bits())))
        .collect();

    let mut links = Vec::new();
    for (i, j) in candidate_pairs(&hashed, bands.weak) {
        let (left, left_bits) = hashed[i];
        let (right, right_bits) = hashed[j];

        let (anchor, candidate) = orient(records, left, right);
        let distance = (left_bits ^ right_bits).count_ones();
        let Some(band) = classify_pair(&records[anchor], &records[candidate], distance, bands)
        else {
            continue;
        };
        links.push(NearLink {
            anchor,
            candidate,
            distance,
            band,
        });
    }

    // Every qualifying pair is its own annotation: a file may be linked to
    // several anchors and may anchor others itself.
    links.sort_by_key(|l| (records[l.candidate].scan_index, records[l.anchor].scan_index));
    links
}

/// Anchor first. An exact master anchors a singleton; otherwise the
/// better-ranked record anchors.
fn orient(records: &[FileRecord], a: Representative, b: Representative) -> (usize, usize) {
    if a.exact_master != b.exact_master {
        return if a.exact_master {
            (a.index, b.index)
        } else {
            (b.index, a.index)
        };
    }
    match master::rank(&records[a.index], &records[b.index]) {
        Ordering::Greater => (b.index, a.index),
        _ => (a.index, b.index),
    }
}

/// Pairs (i < j) sharing at least one segment
fn candidate_pairs(hashed: &[(Representative, u64)], max_distance: u32) -> BTreeSet<(usize, usize)> {
    let segments = segment_masks(max_distance as usize + 1);
    let mut pairs = BTreeSet::new();

    for mask in segments {
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
        for (i, (_, bits)) in hashed.iter().enumerate() {
            buckets.entry(bits & mask).or_default().push(i);
        }
        for bucket in buckets.values() {
            for (x, &i) in bucket.iter().enumerate() {
                for &j in &bucket[x + 1..] {
                    pairs.insert((i, j));
                }
            }
        }
    }
    pairs
}

/// Split 64 bits into `count` contiguous masks of near-equal width
fn segment_masks(count: usize) -> Vec<u64> {
    let count = count.clamp(1, 64);
    let base = 64 / count;
    let extra = 64 % count;
    let mut masks = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let width = base + usize::from(i < extra);
        let mask = if width == 64 {
            u64::MAX
        } else {
            ((1u64 << width) - 1) << start
        };
        masks.push(mask);
        start += width;
    }
    masks
}
