//! Shared fixtures for integration tests.
//!
//! Fixture "photos" are small text files of `key=value` pairs separated by
//! `;`. `TaggedMetadata` and `TaggedDownsampler` read those pairs back, so a
//! test can pin capture dates, cameras, sizes and average hashes exactly.

#![allow(dead_code)]

use nolossia::core::config::{NolossiaConfig, WorkerStrategy};
use nolossia::core::fs::{EntryMetadata, FileSystem, ListedEntry, LocalFileSystem};
use nolossia::core::hasher::{hash_reader, Downsampler, LumaGrid};
use nolossia::core::manifest::ManifestStore;
use nolossia::core::metadata::{parse_exif_datetime, MetadataReader, PhotoMetadata};
use nolossia::core::record::{ContentHash, ImageFormat, Resolution};
use nolossia::core::session::MergeSession;
use nolossia::error::ExtractError;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

fn tags(bytes: &[u8]) -> Vec<(String, String)> {
    String::from_utf8_lossy(bytes)
        .split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn tag(bytes: &[u8], key: &str) -> Option<String> {
    tags(bytes)
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

/// Reads `date`, `camera` and `size` tags
pub struct TaggedMetadata;

impl MetadataReader for TaggedMetadata {
    fn read(&self, bytes: &[u8]) -> PhotoMetadata {
        let size = tag(bytes, "size").and_then(|s| {
            let (w, h) = s.split_once('x')?;
            Some((w.parse().ok()?, h.parse().ok()?))
        });
        PhotoMetadata {
            captured_at: tag(bytes, "date").and_then(|d| parse_exif_datetime(&d)),
            width: size.map(|(w, _)| w),
            height: size.map(|(_, h)| h),
            camera_make: None,
            camera_model: tag(bytes, "camera"),
            gps: None,
        }
    }
}

/// Turns an `ahash` tag into a grid that hashes back to the same bits
pub struct TaggedDownsampler;

impl Downsampler for TaggedDownsampler {
    fn dimensions(&self, _bytes: &[u8], _format: ImageFormat) -> Option<Resolution> {
        None
    }

    fn luma_grid(
        &self,
        path: &Path,
        bytes: &[u8],
        _format: ImageFormat,
    ) -> Result<LumaGrid, ExtractError> {
        let bits = tag(bytes, "ahash")
            .and_then(|h| u64::from_str_radix(&h, 16).ok())
            .ok_or_else(|| ExtractError::DecodeError {
                path: path.to_path_buf(),
                reason: "no ahash tag".into(),
            })?;
        let mut grid = [10u8; 64];
        for (index, cell) in grid.iter_mut().enumerate() {
            if bits & (1 << (63 - index)) != 0 {
                *cell = 200;
            }
        }
        Ok(grid)
    }
}

/// Write a tagged fixture and return its content hash
pub fn write_photo(path: &Path, body: &str) -> ContentHash {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
    hash_reader(body.as_bytes()).unwrap()
}

pub fn hash_of(path: &Path) -> ContentHash {
    hash_reader(std::fs::read(path).unwrap().as_slice()).unwrap()
}

pub fn config() -> NolossiaConfig {
    NolossiaConfig::default()
        .with_strategy(WorkerStrategy::Threads)
        .with_workers(2)
}

/// A session reading fixture tags instead of real EXIF and pixels
pub fn tagged_session<'a>(
    fs: &'a dyn FileSystem,
    manifest: &'a dyn ManifestStore,
) -> MergeSession<'a> {
    MergeSession::new(config(), fs, manifest)
        .with_metadata_reader(Box::new(TaggedMetadata))
        .with_downsampler(Box::new(TaggedDownsampler))
}

/// Delegates to `LocalFileSystem`, with knobs for failure injection
#[derive(Default)]
pub struct FaultyFs {
    inner: LocalFileSystem,
    moves: AtomicUsize,
    /// 1-based move that returns an I/O error
    pub fail_move: Option<usize>,
    /// 1-based move whose destination gets an extra byte after the move
    pub corrupt_move: Option<usize>,
    pub available: Option<u64>,
    /// Report free space as unsupported, like platforms without statvfs
    pub space_unknown: bool,
}

impl FaultyFs {
    pub fn failing_move(n: usize) -> Self {
        Self {
            fail_move: Some(n),
            ..Default::default()
        }
    }

    pub fn corrupting_move(n: usize) -> Self {
        Self {
            corrupt_move: Some(n),
            ..Default::default()
        }
    }

    pub fn with_available(bytes: u64) -> Self {
        Self {
            available: Some(bytes),
            ..Default::default()
        }
    }

    pub fn without_space_query() -> Self {
        Self {
            space_unknown: true,
            ..Default::default()
        }
    }
}

impl FileSystem for FaultyFs {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        self.inner.open_read(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<EntryMetadata> {
        self.inner.metadata(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<ListedEntry>> {
        self.inner.list_dir(path)
    }

    fn list_recursive(&self, root: &Path, follow_symlinks: bool) -> io::Result<Vec<ListedEntry>> {
        self.inner.list_recursive(root, follow_symlinks)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path)
    }

    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let n = self.moves.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_move == Some(n) {
            return Err(io::Error::other("simulated device failure"));
        }
        self.inner.move_file(from, to)?;
        if self.corrupt_move == Some(n) {
            let mut bytes = std::fs::read(to)?;
            bytes.push(0);
            std::fs::write(to, bytes)?;
        }
        Ok(())
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.inner.canonicalize(path)
    }

    fn available_space(&self, path: &Path) -> io::Result<u64> {
        if self.space_unknown {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "no statvfs here"));
        }
        match self.available {
            Some(bytes) => Ok(bytes),
            None => self.inner.available_space(path),
        }
    }
}
