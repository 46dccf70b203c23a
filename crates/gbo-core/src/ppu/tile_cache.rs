//! Decoded tile pixels, kept in step with VRAM tile data.
//!
//! Each of the 384 tiles per bank is stored four times (plain, x-flip,
//! y-flip, both) as 64 two-bit colour indices, so renderers never extract
//! bit planes per pixel.

const TILES_PER_BANK: usize = 384;
const VARIANTS: usize = 4;
const TILE_PIXELS: usize = 64;

pub const FLIP_X: usize = 1;
pub const FLIP_Y: usize = 2;

#[derive(Debug, Clone)]
pub struct TileCache {
    pixels: Vec<u8>,
}

impl TileCache {
    pub fn new() -> Self {
        Self {
            pixels: vec![0; 2 * TILES_PER_BANK * VARIANTS * TILE_PIXELS],
        }
    }

    #[inline]
    fn base(bank: usize, tile: usize, flip: usize) -> usize {
        ((bank * TILES_PER_BANK + tile) * VARIANTS + flip) * TILE_PIXELS
    }

    /// Eight colour indices for row `y` of a tile variant.
    #[inline]
    pub fn row(&self, bank: usize, tile: usize, flip: usize, y: usize) -> &[u8] {
        let start = Self::base(bank, tile, flip) + y * 8;
        &self.pixels[start..start + 8]
    }

    /// Re-derive one row of a tile in all four variants from its two bit
    /// planes.
    pub fn update_row(&mut self, bank: usize, tile: usize, row: usize, lo: u8, hi: u8) {
        for flip in 0..VARIANTS {
            let dest_row = if flip & FLIP_Y != 0 { 7 - row } else { row };
            let start = Self::base(bank, tile, flip) + dest_row * 8;
            for x in 0..8 {
                let bit = if flip & FLIP_X != 0 { x } else { 7 - x };
                self.pixels[start + x] = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
            }
        }
    }

    /// Rebuild everything from a two-bank VRAM image.
    pub fn rebuild(&mut self, vram: &[u8]) {
        for bank in 0..2 {
            let bank_base = bank * 0x2000;
            if vram.len() < bank_base + 0x1800 {
                break;
            }
            for tile in 0..TILES_PER_BANK {
                for row in 0..8 {
                    let offset = bank_base + tile * 16 + row * 2;
                    self.update_row(bank, tile, row, vram[offset], vram[offset + 1]);
                }
            }
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_variants_mirror_rows() {
        let mut cache = TileCache::new();
        // Row 0: lo 0b1000_0001, hi 0b1000_0000 -> colours 3,0,0,0,0,0,0,1
        cache.update_row(0, 5, 0, 0x81, 0x80);
        assert_eq!(cache.row(0, 5, 0, 0), &[3, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(cache.row(0, 5, FLIP_X, 0), &[1, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(cache.row(0, 5, FLIP_Y, 7), &[3, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(cache.row(0, 5, FLIP_X | FLIP_Y, 7), &[1, 0, 0, 0, 0, 0, 0, 3]);
    }

    #[test]
    fn banks_are_independent() {
        let mut vram = vec![0u8; 0x4000];
        vram[0x2000] = 0xFF;
        let mut cache = TileCache::new();
        cache.rebuild(&vram);
        assert_eq!(cache.row(0, 0, 0, 0), &[0; 8]);
        assert_eq!(cache.row(1, 0, 0, 0), &[1; 8]);
    }
}
