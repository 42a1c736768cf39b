//! # Extractor Module
//!
//! Per-file, read-only analysis: one discovered file in, one `FileRecord`
//! (or one tagged failure) out.
//!
//! ## Steps
//! 1. Stat the file, read it once and digest the buffer in chunks
//! 2. Read embedded metadata (capture time, camera, GPS, dimensions)
//! 3. Downsample and average-hash the pixels, unless the image is too large
//!    or cannot be decoded
//! 4. Judge the capture time; implausible or missing times fall back to the
//!    modification time and mark the record unreliable
//!
//! Nothing here writes to the filesystem.

use crate::core::config::ExtractConfig;
use crate::core::fs::{EntryKind, FileSystem};
use crate::core::hasher::{average_hash, hash_reader, Downsampler};
use crate::core::metadata::{is_plausible, MetadataReader};
use crate::core::record::{FileRecord, ImageFormat};
use crate::core::scanner::DiscoveredFile;
use crate::error::ExtractError;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Why a file produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreadable,
    Unsupported,
}

/// A per-file failure; the scan continues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractFailure {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub reason: String,
}

impl ExtractFailure {
    fn from_error(error: ExtractError) -> Self {
        match error {
            ExtractError::Unsupported { path, .. } => {
                let reason = format!("unsupported format for {}", path.display());
                Self {
                    path,
                    kind: FailureKind::Unsupported,
                    reason,
                }
            }
            ExtractError::Unreadable { path, source } => Self {
                path,
                kind: FailureKind::Unreadable,
                reason: source.to_string(),
            },
            ExtractError::DecodeError { path, reason } => Self {
                path,
                kind: FailureKind::Unreadable,
                reason,
            },
            ExtractError::ImageTooLarge { path, pixels, limit } => Self {
                path,
                kind: FailureKind::Unreadable,
                reason: format!("{} pixels exceeds {}", pixels, limit),
            },
            ExtractError::WorkerFailed(reason) => Self {
                path: PathBuf::new(),
                kind: FailureKind::Unreadable,
                reason,
            },
        }
    }
}

/// One slot of extraction output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractOutcome {
    Record(FileRecord),
    Failed(ExtractFailure),
}

/// Why a record ends up in REVIEW
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    MissingExifTimestamp,
    TimestampUnreliable,
    /// The source sits under a year folder whose month folder is not 01-12
    InvalidSourceChronology,
}

impl ReviewReason {
    /// None when the record's capture time can be trusted
    pub fn for_record(record: &FileRecord) -> Option<Self> {
        match (record.captured_at, record.timestamp_reliable) {
            (_, true) => None,
            (None, false) => Some(ReviewReason::MissingExifTimestamp),
            (Some(_), false) => Some(ReviewReason::TimestampUnreliable),
        }
    }
}

/// Metadata & hash extractor
pub struct Extractor<'a> {
    fs: &'a dyn FileSystem,
    metadata: &'a dyn MetadataReader,
    downsampler: &'a dyn Downsampler,
    config: &'a ExtractConfig,
    now: NaiveDateTime,
}

impl<'a> Extractor<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        metadata: &'a dyn MetadataReader,
        downsampler: &'a dyn Downsampler,
        config: &'a ExtractConfig,
    ) -> Self {
        Self {
            fs,
            metadata,
            downsampler,
            config,
            now: Local::now().naive_local(),
        }
    }

    /// Pin the reference time used for plausibility checks
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    /// Pixel limit, forwarded to process workers
    pub fn max_pixels(&self) -> u64 {
        self.config.max_pixels
    }

    /// Analyze one file
    pub fn extract(&self, file: &DiscoveredFile, scan_index: usize) -> ExtractOutcome {
        match self.try_extract(&file.path, file.format, scan_index) {
            Ok(record) => ExtractOutcome::Record(record),
            Err(error) => {
                warn!("Skipping {}: {}", file.path.display(), error);
                ExtractOutcome::Failed(ExtractFailure::from_error(error))
            }
        }
    }

    fn try_extract(
        &self,
        path: &Path,
        format: ImageFormat,
        scan_index: usize,
    ) -> Result<FileRecord, ExtractError> {
        if !format.is_supported() {
            return Err(ExtractError::Unsupported {
                path: path.to_path_buf(),
                extension: path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            });
        }

        let unreadable = |source: std::io::Error| ExtractError::Unreadable {
            path: path.to_path_buf(),
            source,
        };

        let stat = self.fs.metadata(path).map_err(unreadable)?;
        if stat.kind != EntryKind::File {
            return Err(unreadable(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        // One read serves the digest, the metadata and the decoder
        let mut bytes = Vec::with_capacity(stat.len.min(64 * 1024 * 1024) as usize);
        self.fs
            .open_read(path)
            .and_then(|mut reader| reader.read_to_end(&mut bytes))
            .map_err(unreadable)?;
        let content_hash = hash_reader(bytes.as_slice()).map_err(unreadable)?;

        let exif = self.metadata.read(&bytes);
        let resolution = exif
            .resolution()
            .or_else(|| self.downsampler.dimensions(&bytes, format));

        let perceptual_hash = match resolution.map(|r| r.pixels()) {
            Some(pixels) if pixels > self.config.max_pixels => {
                warn!(
                    "{}",
                    ExtractError::ImageTooLarge {
                        path: path.to_path_buf(),
                        pixels,
                        limit: self.config.max_pixels,
                    }
                );
                None
            }
            _ => match self.downsampler.luma_grid(path, &bytes, format) {
                Ok(grid) => Some(average_hash(&grid)),
                Err(e) => {
                    debug!("No perceptual hash for {}: {}", path.display(), e);
                    None
                }
            },
        };

        let captured_at = exif.captured_at;
        let timestamp_reliable = captured_at
            .map(|t| is_plausible(t, self.now))
            .unwrap_or(false);
        if !timestamp_reliable {
            debug!(
                "Unreliable capture time for {} ({:?}), using modification time",
                path.display(),
                captured_at
            );
        }

        Ok(FileRecord {
            path: path.to_path_buf(),
            size: stat.len,
            modified: DateTime::<Utc>::from(stat.modified),
            captured_at,
            timestamp_reliable,
            camera: exif.camera_display(),
            gps: exif.gps,
            resolution,
            format,
            is_raw: format.is_raw(),
            content_hash,
            perceptual_hash,
            scan_index,
        })
    }
}
