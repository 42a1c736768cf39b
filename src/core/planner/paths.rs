//! Destination path derivation and collision handling.

use crate::core::extractor::ReviewReason;
use crate::core::record::{ContentHash, FileRecord};
use chrono::Datelike;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Numbered attempts after the hash suffix before giving up
const MAX_NUMBERED_ATTEMPTS: usize = 10_000;

/// Year and month already encoded in a source path's folders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChronology {
    Month { year: i32, month: u32 },
    /// A year folder followed by a month folder outside 01-12
    Invalid,
}

/// Looks for a `YYYY` folder directly followed by `YYYY-MM`, `YYYY_MM`,
/// `YYYYMM` or `MM` among the parent folders of `source`.
pub fn source_chronology(source: &Path) -> Option<SourceChronology> {
    let folders: Vec<&str> = source
        .parent()?
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    folders.windows(2).find_map(|pair| {
        let year = parse_year(pair[0])?;
        let month = parse_month_folder(pair[0], pair[1])?;
        Some(if (1..=12).contains(&month) {
            SourceChronology::Month { year, month }
        } else {
            SourceChronology::Invalid
        })
    })
}

fn parse_year(folder: &str) -> Option<i32> {
    let is_year = folder.len() == 4
        && folder.bytes().all(|b| b.is_ascii_digit())
        && (folder.starts_with("19") || folder.starts_with("20"));
    if is_year {
        folder.parse().ok()
    } else {
        None
    }
}

/// Two digits, the first of them 0 or 1
fn parse_month_folder(year: &str, folder: &str) -> Option<u32> {
    let digits = match folder.strip_prefix(year) {
        Some(rest) => rest.strip_prefix(['-', '_']).unwrap_or(rest),
        None => folder,
    };
    let bytes = digits.as_bytes();
    let is_month = bytes.len() == 2 && matches!(bytes[0], b'0' | b'1') && bytes[1].is_ascii_digit();
    if is_month {
        digits.parse().ok()
    } else {
        None
    }
}

fn dated(root: &Path, year: i32, month: u32, name: &std::ffi::OsStr) -> PathBuf {
    root.join(format!("{:04}", year))
        .join(format!("{:04}-{:02}", year, month))
        .join(name)
}

/// `root/YEAR/YEAR-MONTH/name`, or `root/<review_dir>/name` with the reason
/// the master needs a human look.
///
/// A reliable capture time decides the month. Without one, a `YEAR/YEAR-MONTH`
/// pair already present in the source folders is reused. A source under a
/// year folder with an impossible month always goes to review.
pub fn master_destination(
    root: &Path,
    review_dir: &str,
    record: &FileRecord,
) -> (PathBuf, Option<ReviewReason>) {
    let name = record.file_name();
    let name = std::ffi::OsStr::new(&name);
    let review = |reason| (root.join(review_dir).join(name), Some(reason));
    let source = source_chronology(&record.path);
    if source == Some(SourceChronology::Invalid) {
        return review(ReviewReason::InvalidSourceChronology);
    }
    match (record.reliable_timestamp(), source) {
        (Some(ts), _) => (dated(root, ts.year(), ts.month(), name), None),
        (None, Some(SourceChronology::Month { year, month })) => {
            (dated(root, year, month, name), None)
        }
        (None, _) => review(
            ReviewReason::for_record(record).unwrap_or(ReviewReason::MissingExifTimestamp),
        ),
    }
}

/// `root/<quarantine_dir>/<source parent components>/name`
pub fn quarantine_destination(root: &Path, quarantine_dir: &str, source: &Path) -> PathBuf {
    let mut path = root.join(quarantine_dir);
    if let Some(parent) = source.parent() {
        for component in parent.components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
    }
    if let Some(name) = source.file_name() {
        path.push(name);
    }
    path
}

/// `dir/stem-suffix.ext`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push("-");
    name.push(suffix);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// First free name for `desired`: the path itself, then `-<hash12>`, then
/// `-<hash12>-<n>` counting from 1.
pub fn free_path(
    desired: &Path,
    hash: &ContentHash,
    mut taken: impl FnMut(&Path) -> bool,
) -> Option<PathBuf> {
    if !taken(desired) {
        return Some(desired.to_path_buf());
    }
    let short = hash.short();
    let hashed = with_suffix(desired, &short);
    if !taken(&hashed) {
        return Some(hashed);
    }
    (1..=MAX_NUMBERED_ATTEMPTS)
        .map(|n| with_suffix(desired, &format!("{}-{}", short, n)))
        .find(|candidate| !taken(candidate))
}

/// Hands out destinations that are unique within one plan
#[derive(Debug, Default)]
pub(super) struct PathAllocator {
    claimed: HashSet<PathBuf>,
}

impl PathAllocator {
    pub fn claim(
        &mut self,
        desired: &Path,
        hash: &ContentHash,
        exists: impl Fn(&Path) -> bool,
    ) -> Option<PathBuf> {
        let claimed = &self.claimed;
        let path = free_path(desired, hash, |p| claimed.contains(p) || exists(p))?;
        self.claimed.insert(path.clone());
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::test_support::{captured, record};

    #[test]
    fn dated_masters_go_to_year_month() {
        let r = captured(record("/in/a/IMG_1.jpg", 1, 0), 2021, 7, 4);
        let (path, review) = master_destination(Path::new("/lib"), "REVIEW", &r);
        assert_eq!(path, PathBuf::from("/lib/2021/2021-07/IMG_1.jpg"));
        assert_eq!(review, None);
    }

    #[test]
    fn undated_masters_go_to_review() {
        let r = record("/in/a/IMG_2.jpg", 1, 0);
        let (path, review) = master_destination(Path::new("/lib"), "REVIEW", &r);
        assert_eq!(path, PathBuf::from("/lib/REVIEW/IMG_2.jpg"));
        assert_eq!(review, Some(ReviewReason::MissingExifTimestamp));
    }

    #[test]
    fn undated_masters_reuse_source_year_month() {
        let r = record("/in/old/2014/2014-08/IMG_3.jpg", 1, 0);
        let (path, review) = master_destination(Path::new("/lib"), "REVIEW", &r);
        assert_eq!(path, PathBuf::from("/lib/2014/2014-08/IMG_3.jpg"));
        assert_eq!(review, None);
    }

    #[test]
    fn capture_time_beats_source_folders() {
        let r = captured(record("/in/2014/2014-08/IMG_4.jpg", 1, 0), 2021, 7, 4);
        let (path, _) = master_destination(Path::new("/lib"), "REVIEW", &r);
        assert_eq!(path, PathBuf::from("/lib/2021/2021-07/IMG_4.jpg"));
    }

    #[test]
    fn impossible_source_month_goes_to_review() {
        let r = captured(record("/in/2014/2014-13/IMG_5.jpg", 1, 0), 2021, 7, 4);
        let (path, review) = master_destination(Path::new("/lib"), "REVIEW", &r);
        assert_eq!(path, PathBuf::from("/lib/REVIEW/IMG_5.jpg"));
        assert_eq!(review, Some(ReviewReason::InvalidSourceChronology));
    }

    #[test]
    fn month_folder_spellings() {
        let month = |path: &str| source_chronology(Path::new(path));
        let august = Some(SourceChronology::Month { year: 2014, month: 8 });
        assert_eq!(month("/a/2014/2014-08/x.jpg"), august);
        assert_eq!(month("/a/2014/2014_08/x.jpg"), august);
        assert_eq!(month("/a/2014/201408/x.jpg"), august);
        assert_eq!(month("/a/2014/08/x.jpg"), august);
        assert_eq!(month("/a/2014/00/x.jpg"), Some(SourceChronology::Invalid));
        assert_eq!(month("/a/2014/summer/x.jpg"), None);
        assert_eq!(month("/a/1850/1850-08/x.jpg"), None);
        assert_eq!(month("/a/2014/x.jpg"), None);
    }

    #[test]
    fn quarantine_keeps_source_folders() {
        let path = quarantine_destination(
            Path::new("/lib"),
            "QUARANTINE_EXACT",
            Path::new("/Volumes/disk/photos/2019/b.jpg"),
        );
        assert_eq!(
            path,
            PathBuf::from("/lib/QUARANTINE_EXACT/Volumes/disk/photos/2019/b.jpg")
        );
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(
            with_suffix(Path::new("/x/IMG_1.JPG"), "abc"),
            PathBuf::from("/x/IMG_1-abc.JPG")
        );
        assert_eq!(with_suffix(Path::new("/x/noext"), "abc"), PathBuf::from("/x/noext-abc"));
    }

    #[test]
    fn collisions_use_hash_then_counter() {
        let hash = ContentHash::from_bytes([0xab; 32]);
        let mut allocator = PathAllocator::default();
        let desired = Path::new("/lib/2021/2021-07/a.jpg");
        let nothing_on_disk = |_: &Path| false;

        let first = allocator.claim(desired, &hash, nothing_on_disk).unwrap();
        let second = allocator.claim(desired, &hash, nothing_on_disk).unwrap();
        let third = allocator.claim(desired, &hash, nothing_on_disk).unwrap();

        assert_eq!(first, desired);
        assert_eq!(second, PathBuf::from("/lib/2021/2021-07/a-abababababab.jpg"));
        assert_eq!(third, PathBuf::from("/lib/2021/2021-07/a-abababababab-1.jpg"));
    }

    #[test]
    fn existing_files_count_as_taken() {
        let hash = ContentHash::from_bytes([0x01; 32]);
        let desired = Path::new("/lib/REVIEW/a.jpg");

        let path = free_path(desired, &hash, |p| p == desired).unwrap();

        assert_eq!(path, PathBuf::from("/lib/REVIEW/a-010101010101.jpg"));
    }
}
