//! Average Hash (aHash) over an 8x8 luma grid.
//!
//! A cell sets its bit when it is strictly brighter than the grid mean. The
//! comparison is done on integer sums so the result never depends on float
//! rounding.

use crate::core::record::PerceptualHash;

/// Grid edge length
pub const GRID_SIZE: u32 = 8;

/// 64 luma cells, row-major
pub type LumaGrid = [u8; 64];

/// Pack a luma grid into a 64-bit average hash
pub fn average_hash(grid: &LumaGrid) -> PerceptualHash {
    let total: u64 = grid.iter().map(|&cell| cell as u64).sum();
    let count = grid.len() as u64;

    let mut bits = 0u64;
    for (index, &cell) in grid.iter().enumerate() {
        // cell > total / count, without division
        if cell as u64 * count > total {
            bits |= 1 << (63 - index);
        }
    }
    PerceptualHash::new(bits)
}
