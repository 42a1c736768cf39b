//! SIMD box-filter shrink to the 8x8 luma grid.
//!
//! fast_image_resize picks AVX2/NEON at runtime. The box filter gives each
//! grid cell the mean of the source pixels it covers, which is what the
//! average hash expects.

use super::average::{LumaGrid, GRID_SIZE};
use fast_image_resize::{images::Image, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::DynamicImage;

/// Reusable grid builder; keeps the resizer's scratch buffers between calls
pub struct FastResizer {
    resizer: Resizer,
    options: ResizeOptions,
}

impl FastResizer {
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
            options: ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box)),
        }
    }

    /// Grayscale, then shrink to `GRID_SIZE` x `GRID_SIZE`.
    ///
    /// Errors are plain strings; the caller attaches the file path.
    pub fn luma_grid(&mut self, image: &DynamicImage) -> Result<LumaGrid, String> {
        // Luma first: one channel to resize instead of three
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(format!("image has no pixels ({}x{})", width, height));
        }

        let source = Image::from_vec_u8(width, height, gray.into_raw(), PixelType::U8)
            .map_err(|e| format!("bad luma buffer: {}", e))?;
        let mut target = Image::new(GRID_SIZE, GRID_SIZE, PixelType::U8);
        self.resizer
            .resize(&source, &mut target, &self.options)
            .map_err(|e| format!("resize failed: {}", e))?;

        let cells = target.into_vec();
        let mut grid = [0u8; 64];
        if cells.len() != grid.len() {
            return Err(format!("expected 64 cells, got {}", cells.len()));
        }
        grid.copy_from_slice(&cells);
        Ok(grid)
    }
}

impl Default for FastResizer {
    fn default() -> Self {
        Self::new()
    }
}
