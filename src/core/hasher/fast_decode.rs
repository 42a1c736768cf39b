//! Fast image decoding with format-specific optimizations.
//!
//! Uses zune-jpeg for JPEG files (1.5-2x faster than image crate),
//! falls back to image crate for other formats. RAW containers are only
//! attempted through the TIFF path; most of them fail and the caller keeps
//! the record without a perceptual hash.

use crate::core::record::{ImageFormat, Resolution};
use crate::error::ExtractError;
use image::{DynamicImage, ImageBuffer, ImageReader, Luma, Rgb, Rgba};
use std::io::Cursor;
use std::path::Path;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

/// Fast image decoder that uses optimized decoders per format
pub struct FastDecoder;

impl FastDecoder {
    /// Decode an image from its bytes using the fastest available decoder.
    ///
    /// - JPEG: Uses zune-jpeg (1.5-2x faster)
    /// - HEIC/HEIF: Uses macOS `sips` when available
    /// - Other formats: Falls back to image crate
    pub fn decode(path: &Path, bytes: &[u8], format: ImageFormat) -> Result<DynamicImage, ExtractError> {
        match format {
            ImageFormat::Jpeg => {
                Self::decode_jpeg(path, bytes).or_else(|_| Self::decode_fallback(path, bytes))
            }
            ImageFormat::Heic => Self::decode_heic(path),
            _ => Self::decode_fallback(path, bytes),
        }
    }

    /// Read only the header to learn the pixel dimensions
    pub fn dimensions(bytes: &[u8]) -> Option<Resolution> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
            .map(|(width, height)| Resolution::new(width, height))
    }

    /// Fast JPEG decoding using zune-jpeg
    fn decode_jpeg(path: &Path, bytes: &[u8]) -> Result<DynamicImage, ExtractError> {
        let decode_error = |reason: String| ExtractError::DecodeError {
            path: path.to_path_buf(),
            reason,
        };

        // Configure decoder to output RGB
        let options = DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGB);
        let mut decoder = JpegDecoder::new_with_options(bytes, options);

        let pixels = decoder
            .decode()
            .map_err(|e| decode_error(format!("zune-jpeg decode failed: {:?}", e)))?;

        let info = decoder
            .info()
            .ok_or_else(|| decode_error("Failed to get image info".to_string()))?;

        let width = info.width as u32;
        let height = info.height as u32;

        // Get actual output colorspace after decoding
        let out_colorspace = decoder.get_output_colorspace().unwrap_or(ColorSpace::RGB);

        let image = match out_colorspace {
            ColorSpace::RGB => {
                let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels)
                        .ok_or_else(|| decode_error("Failed to create RGB buffer".to_string()))?;
                DynamicImage::ImageRgb8(buffer)
            }
            ColorSpace::RGBA => {
                let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels)
                        .ok_or_else(|| decode_error("Failed to create RGBA buffer".to_string()))?;
                DynamicImage::ImageRgba8(buffer)
            }
            ColorSpace::Luma => {
                let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels)
                        .ok_or_else(|| decode_error("Failed to create Luma buffer".to_string()))?;
                DynamicImage::ImageLuma8(buffer)
            }
            _ => return Self::decode_fallback(path, bytes),
        };

        Ok(image)
    }

    /// Native HEIC/HEIF decoding using macOS sips command
    #[cfg(target_os = "macos")]
    fn decode_heic(path: &Path) -> Result<DynamicImage, ExtractError> {
        use std::process::Command;

        let decode_error = |reason: String| ExtractError::DecodeError {
            path: path.to_path_buf(),
            reason,
        };

        let temp = tempfile::Builder::new()
            .prefix("nolossia_heic_")
            .suffix(".jpg")
            .tempfile()
            .map_err(|e| decode_error(format!("Failed to create temp file: {}", e)))?;

        let output = Command::new("sips")
            .arg("-s")
            .arg("format")
            .arg("jpeg")
            .arg(path)
            .arg("--out")
            .arg(temp.path())
            .output()
            .map_err(|e| decode_error(format!("Failed to run sips: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(decode_error(format!("sips conversion failed: {}", stderr)));
        }

        image::open(temp.path())
            .map_err(|e| decode_error(format!("Failed to read converted HEIC: {}", e)))
    }

    #[cfg(not(target_os = "macos"))]
    fn decode_heic(path: &Path) -> Result<DynamicImage, ExtractError> {
        Err(ExtractError::DecodeError {
            path: path.to_path_buf(),
            reason: "HEIC decoding is only supported on macOS".to_string(),
        })
    }

    /// Fallback to image crate for non-JPEG formats
    fn decode_fallback(path: &Path, bytes: &[u8]) -> Result<DynamicImage, ExtractError> {
        image::load_from_memory(bytes).map_err(|e| ExtractError::DecodeError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
