//! The image-downsampling seam used for perceptual hashing.

use super::average::LumaGrid;
use super::fast_decode::FastDecoder;
use super::fast_resize::FastResizer;
use crate::core::record::{ImageFormat, Resolution};
use crate::error::ExtractError;
use std::path::Path;

/// Turns an encoded image into the luma grid the average hash is built from.
///
/// Implement this trait to substitute decoding (e.g., for testing).
pub trait Downsampler: Send + Sync {
    /// Pixel dimensions from the header, without a full decode
    fn dimensions(&self, bytes: &[u8], format: ImageFormat) -> Option<Resolution>;

    /// Decode and shrink to an 8x8 grayscale grid
    fn luma_grid(&self, path: &Path, bytes: &[u8], format: ImageFormat)
        -> Result<LumaGrid, ExtractError>;
}

/// `FastDecoder` + `FastResizer`
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDownsampler;

impl ImageDownsampler {
    pub fn new() -> Self {
        Self
    }
}

impl Downsampler for ImageDownsampler {
    fn dimensions(&self, bytes: &[u8], format: ImageFormat) -> Option<Resolution> {
        match format {
            ImageFormat::Heic => None,
            _ => FastDecoder::dimensions(bytes),
        }
    }

    fn luma_grid(
        &self,
        path: &Path,
        bytes: &[u8],
        format: ImageFormat,
    ) -> Result<LumaGrid, ExtractError> {
        let image = FastDecoder::decode(path, bytes, format)?;
        FastResizer::new()
            .luma_grid(&image)
            .map_err(|reason| ExtractError::DecodeError {
                path: path.to_path_buf(),
                reason,
            })
    }
}
