//! # Scanner Module
//!
//! Discovers photo files in directories.
//!
//! ## Supported Formats
//! - JPEG (.jpg, .jpeg)
//! - PNG (.png)
//! - HEIC (.heic, .heif) - iPhone photos
//! - TIFF (.tiff, .tif)
//! - WebP (.webp)
//! - RAW (.dng, .nef, .cr2, .cr3, .arw, .rw2, .orf, .raf)
//!
//! Symlinks are never followed by default; they are counted as skipped.
//! Output order is deterministic: roots in argument order, then file names
//! sorted within each directory.
//!
//! ## Example
//! ```rust,ignore
//! use nolossia::core::scanner::{PhotoScanner, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(&LocalFileSystem, config.scan.clone());
//! let discovery = scanner.discover(&["/Users/photos".into()], &null_sender())?;
//! ```

mod filter;
mod walker;

pub use crate::core::config::ScanConfig;
pub use filter::{FilterDecision, ImageFilter};
pub use walker::WalkDirScanner;

use crate::core::record::ImageFormat;
use crate::error::ScanError;
use crate::events::EventSender;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A supported file found during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub format: ImageFormat,
}

/// How many files fell into each bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    pub supported: usize,
    pub unsupported: usize,
    /// Symlinks, special files and unreadable files
    pub skipped: usize,
}

/// Result of discovery
#[derive(Debug, Default)]
pub struct Discovery {
    /// Supported files in deterministic order
    pub files: Vec<DiscoveredFile>,
    pub counts: ScanCounts,
}

/// Trait for photo scanners
///
/// Implement this trait to create custom scanners (e.g., for testing).
pub trait PhotoScanner {
    /// Walk the given roots and return supported files with counts
    fn discover(&self, paths: &[PathBuf], events: &EventSender) -> Result<Discovery, ScanError>;
}
