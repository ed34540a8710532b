//! Reusable PPU building blocks for tile-based video hardware.
//!
//! The handheld's display engine composes these: a tile decoder for its packed
//! 2bpp character format and palette views over raw palette RAM.

pub mod palette;
pub mod tile;

pub use palette::{Bgr444Palette, IndexedPalette, ShadePalette};
pub use tile::{PackedTileDecoder, TileDecoder, TILE_BYTES};
