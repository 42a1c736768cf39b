//! Master selection: an ordered chain of comparison rules.
//!
//! Each rule returns `Less` when the left record should be preferred. Rules
//! are folded left to right and the scan index closes the chain, so two
//! distinct records never compare `Equal`.

use crate::core::record::FileRecord;
use std::cmp::Ordering;

type Rule = fn(&FileRecord, &FileRecord) -> Ordering;

/// The comparator chain, most significant rule first
const RULES: [(&str, Rule); 6] = [
    ("raw format", |a, b| b.is_raw.cmp(&a.is_raw)),
    ("higher resolution", |a, b| b.pixel_count().cmp(&a.pixel_count())),
    ("larger file", |a, b| b.size.cmp(&a.size)),
    ("reliable capture date", |a, b| {
        let left = a.reliable_timestamp().is_some();
        let right = b.reliable_timestamp().is_some();
        right.cmp(&left)
    }),
    ("GPS data", |a, b| b.gps.is_some().cmp(&a.gps.is_some())),
    ("older capture date", |a, b| {
        match (a.reliable_timestamp(), b.reliable_timestamp()) {
            (Some(left), Some(right)) => left.cmp(&right),
            _ => Ordering::Equal,
        }
    }),
];

/// Strict total order: `Less` means `a` ranks above `b`
pub fn rank(a: &FileRecord, b: &FileRecord) -> Ordering {
    RULES
        .iter()
        .fold(Ordering::Equal, |acc, (_, rule)| acc.then_with(|| rule(a, b)))
        .then_with(|| a.scan_index.cmp(&b.scan_index))
}

/// Name of the first rule that separates `a` from `b`
pub fn deciding_rule(a: &FileRecord, b: &FileRecord) -> &'static str {
    RULES
        .iter()
        .find(|(_, rule)| rule(a, b) != Ordering::Equal)
        .map(|(name, _)| *name)
        .unwrap_or("scan order")
}

/// Position of the best record in `members`
pub fn select_master(members: &[FileRecord]) -> usize {
    members
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| rank(a, b))
        .map(|(index, _)| index)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::test_support::{captured, record};
    use crate::core::record::{GpsCoordinates, Resolution};

    #[test]
    fn raw_beats_everything_below_it() {
        let jpeg = FileRecord {
            size: 50_000,
            resolution: Some(Resolution::new(8000, 6000)),
            ..record("/a/big.jpg", 1, 0)
        };
        let raw = record("/a/small.dng", 1, 1);

        assert_eq!(rank(&raw, &jpeg), Ordering::Less);
        assert_eq!(select_master(&[jpeg.clone(), raw.clone()]), 1);
        assert_eq!(deciding_rule(&raw, &jpeg), "raw format");
    }

    #[test]
    fn resolution_then_size() {
        let small = FileRecord {
            resolution: Some(Resolution::new(100, 100)),
            size: 9_999,
            ..record("/a/1.jpg", 1, 0)
        };
        let large = record("/a/2.jpg", 1, 1);
        assert_eq!(rank(&large, &small), Ordering::Less);

        let bigger_file = FileRecord {
            size: 2_000,
            ..record("/a/3.jpg", 1, 2)
        };
        assert_eq!(rank(&bigger_file, &large), Ordering::Less);
        assert_eq!(deciding_rule(&bigger_file, &large), "larger file");
    }

    #[test]
    fn reliable_date_then_gps_then_oldest() {
        let undated = record("/a/1.jpg", 1, 0);
        let dated = captured(record("/a/2.jpg", 1, 1), 2021, 5, 1);
        assert_eq!(rank(&dated, &undated), Ordering::Less);

        let with_gps = FileRecord {
            gps: Some(GpsCoordinates {
                latitude: 1.0,
                longitude: 2.0,
            }),
            ..captured(record("/a/3.jpg", 1, 2), 2022, 1, 1)
        };
        assert_eq!(rank(&with_gps, &dated), Ordering::Less);

        let older = captured(record("/a/4.jpg", 1, 3), 2019, 1, 1);
        assert_eq!(rank(&older, &dated), Ordering::Less);
        assert_eq!(deciding_rule(&older, &dated), "older capture date");
    }

    #[test]
    fn scan_order_breaks_full_ties() {
        let first = record("/a/x.jpg", 1, 0);
        let second = record("/b/x.jpg", 1, 1);

        assert_eq!(rank(&first, &second), Ordering::Less);
        assert_eq!(rank(&second, &first), Ordering::Greater);
        assert_eq!(deciding_rule(&first, &second), "scan order");
    }

    #[test]
    fn selection_ignores_input_permutation_when_attributes_decide() {
        let raw = record("/a/r.nef", 1, 5);
        let big = FileRecord {
            size: 5_000,
            ..record("/a/b.jpg", 1, 2)
        };
        let plain = record("/a/p.jpg", 1, 9);

        let forward = [raw.clone(), big.clone(), plain.clone()];
        let backward = [plain, big, raw];

        assert_eq!(forward[select_master(&forward)].path, backward[select_master(&backward)].path);
    }
}
