//! # Record Module
//!
//! The immutable per-file record produced by extraction, and the small value
//! types it is built from.
//!
//! Hashes serialize as lowercase hex so plans and manifests stay readable.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Supported image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Heic,
    Tiff,
    WebP,
    Dng,
    Nef,
    Cr2,
    Cr3,
    Arw,
    Rw2,
    Orf,
    Raf,
    Unknown,
}

impl ImageFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            "png" => ImageFormat::Png,
            "heic" | "heif" => ImageFormat::Heic,
            "tiff" | "tif" => ImageFormat::Tiff,
            "webp" => ImageFormat::WebP,
            "dng" => ImageFormat::Dng,
            "nef" => ImageFormat::Nef,
            "cr2" => ImageFormat::Cr2,
            "cr3" => ImageFormat::Cr3,
            "arw" => ImageFormat::Arw,
            "rw2" => ImageFormat::Rw2,
            "orf" => ImageFormat::Orf,
            "raf" => ImageFormat::Raf,
            _ => ImageFormat::Unknown,
        }
    }

    /// Detect format from a path's extension
    pub fn from_path(path: &std::path::Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(ImageFormat::Unknown)
    }

    /// Check if this format is supported
    pub fn is_supported(&self) -> bool {
        !matches!(self, ImageFormat::Unknown)
    }

    /// Camera RAW containers
    pub fn is_raw(&self) -> bool {
        matches!(
            self,
            ImageFormat::Dng
                | ImageFormat::Nef
                | ImageFormat::Cr2
                | ImageFormat::Cr3
                | ImageFormat::Arw
                | ImageFormat::Rw2
                | ImageFormat::Orf
                | ImageFormat::Raf
        )
    }
}

/// Pixel dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Decimal-degree GPS position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// SHA-256 digest of a file's full content
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// 64 lowercase hex characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix used to disambiguate file names
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for ContentHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(&value).map_err(|e| e.to_string())?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| format!("content hash must be 32 bytes: {}", value))?;
        Ok(Self(array))
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

/// 64-bit average hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    pub fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Number of differing bits
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// 16 lowercase hex characters
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Debug for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PerceptualHash({})", self.to_hex())
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() != 16 {
            return Err(format!("perceptual hash must be 16 hex chars: {}", value));
        }
        u64::from_str_radix(&value, 16)
            .map(Self)
            .map_err(|e| e.to_string())
    }
}

impl From<PerceptualHash> for String {
    fn from(hash: PerceptualHash) -> Self {
        hash.to_hex()
    }
}

/// Everything extraction learned about one file.
///
/// Records are created once per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Filesystem modification time
    pub modified: DateTime<Utc>,
    /// Capture time from EXIF, as written by the camera
    pub captured_at: Option<NaiveDateTime>,
    /// True only when `captured_at` is present and plausible
    pub timestamp_reliable: bool,
    /// Camera make and model
    pub camera: Option<String>,
    pub gps: Option<GpsCoordinates>,
    pub resolution: Option<Resolution>,
    pub format: ImageFormat,
    pub is_raw: bool,
    pub content_hash: ContentHash,
    /// Absent when the image could not be decoded or was too large
    pub perceptual_hash: Option<PerceptualHash>,
    /// Position in deterministic scan order
    pub scan_index: usize,
}

impl FileRecord {
    /// The capture time, only when it can be trusted
    pub fn reliable_timestamp(&self) -> Option<NaiveDateTime> {
        if self.timestamp_reliable {
            self.captured_at
        } else {
            None
        }
    }

    /// Most reliable time available: EXIF when trusted, else the local mtime
    pub fn effective_timestamp(&self) -> NaiveDateTime {
        self.reliable_timestamp()
            .unwrap_or_else(|| self.modified.with_timezone(&Local).naive_local())
    }

    pub fn pixel_count(&self) -> u64 {
        self.resolution.map(|r| r.pixels()).unwrap_or(0)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
