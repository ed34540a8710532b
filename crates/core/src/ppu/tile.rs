//! Tile/pattern decoding for the handheld's character RAM.
//!
//! Characters are 8x8 pixels at 2 bits per pixel, 16 bytes per tile. Each row
//! is one little-endian 16-bit word with the leftmost pixel in the top two
//! bits:
//!
//! ```text
//! word = byte[2*y] | byte[2*y + 1] << 8
//! pixel(x) = (word >> (14 - 2*x)) & 3
//! ```
//!
//! Index 0 is transparent for every layer that uses these tiles.

/// Size of one character in bytes.
pub const TILE_BYTES: usize = 16;

/// Trait for decoding tile data into pixel indices.
pub trait TileDecoder {
    /// Decode a single pixel from a tile.
    ///
    /// Returns the palette index for the pixel at (`x`, `y`) within the tile,
    /// or 0 when the coordinates or the data are out of range.
    fn decode_pixel(&self, tile_data: &[u8], x: u8, y: u8) -> u8;

    /// Get the size of a single tile in bytes.
    fn tile_size(&self) -> usize;

    /// Decode one row, optionally mirrored horizontally.
    fn decode_row(&self, tile_data: &[u8], y: u8, flip_x: bool) -> [u8; 8] {
        let mut row = [0u8; 8];
        for (x, px) in row.iter_mut().enumerate() {
            let src_x = if flip_x { 7 - x } else { x };
            *px = self.decode_pixel(tile_data, src_x as u8, y);
        }
        row
    }
}

/// Packed 2bpp decoder (one 16-bit word per row).
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedTileDecoder;

impl TileDecoder for PackedTileDecoder {
    fn decode_pixel(&self, tile_data: &[u8], x: u8, y: u8) -> u8 {
        if tile_data.len() < TILE_BYTES || x > 7 || y > 7 {
            return 0;
        }
        let at = y as usize * 2;
        let word = u16::from_le_bytes([tile_data[at], tile_data[at + 1]]);
        ((word >> (14 - 2 * x as u16)) & 3) as u8
    }

    fn tile_size(&self) -> usize {
        TILE_BYTES
    }
}
