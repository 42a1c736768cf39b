//! # Hasher Module
//!
//! Computes the two hashes every record carries.
//!
//! ## Hashes
//! - **Content hash** - SHA-256 over the full file, streamed in 64 KiB chunks.
//!   Equal content hashes mean byte-identical files.
//! - **Average hash (aHash)** - 64 bits from an 8x8 luma grid. Small Hamming
//!   distances mean visually similar images.
//!
//! ## How the aHash works
//! 1. Decode the image (`FastDecoder`)
//! 2. Shrink it to an 8x8 grayscale grid (`FastResizer`)
//! 3. Set a bit for every cell brighter than the grid mean
//! 4. Pack the bits row-major, first cell in the most significant bit
//!
//! ## Performance Optimizations
//! - Uses `zune-jpeg` for 1.5-2x faster JPEG decoding
//! - Uses `fast_image_resize` for 5-14x faster SIMD-accelerated resizing
//!
//! ## Example
//! ```rust,ignore
//! use nolossia::core::hasher::{average_hash, Downsampler, ImageDownsampler};
//!
//! let grid = ImageDownsampler::new().luma_grid(&path, &bytes, format)?;
//! let hash = average_hash(&grid);
//! ```

mod average;
mod content;
mod downsample;
pub mod fast_decode;
pub mod fast_resize;

pub use average::{average_hash, LumaGrid, GRID_SIZE};
pub use content::{hash_file, hash_reader, CHUNK_SIZE};
pub use downsample::{Downsampler, ImageDownsampler};
