//! Indexed palettes over raw palette memory.
//!
//! Palette RAM on the handheld is plain bytes inside the display engine's
//! address window. Rather than mirror it into a separate structure, the
//! palettes here are borrowed views that decode entries on lookup.
//!
//! - **Colour mode**: little-endian 12-bit BGR444 words
//! - **Monochrome (K1GE) mode**: 3-bit shades, 0 = lightest, 7 = darkest

use crate::graphics::ColorOps;

/// Maps colour indices to packed RGB565 values.
pub trait IndexedPalette {
    /// RGB565 colour for an index; out-of-range indices are black.
    fn get_color(&self, index: usize) -> u16;

    /// Get the number of colors in this palette.
    fn len(&self) -> usize;

    /// Check if the palette is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// View over little-endian BGR444 palette words.
#[derive(Debug, Clone, Copy)]
pub struct Bgr444Palette<'a> {
    raw: &'a [u8],
}

impl<'a> Bgr444Palette<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw }
    }

    /// Raw 12-bit colour word at `index`.
    pub fn raw_color(&self, index: usize) -> u16 {
        let at = index * 2;
        match self.raw.get(at..at + 2) {
            Some(pair) => u16::from_le_bytes([pair[0], pair[1]]) & 0x0FFF,
            None => 0,
        }
    }
}

impl IndexedPalette for Bgr444Palette<'_> {
    fn get_color(&self, index: usize) -> u16 {
        ColorOps::from_bgr444(self.raw_color(index))
    }

    fn len(&self) -> usize {
        self.raw.len() / 2
    }
}

/// View over 3-bit monochrome shade registers.
#[derive(Debug, Clone, Copy)]
pub struct ShadePalette<'a> {
    raw: &'a [u8],
}

impl<'a> ShadePalette<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw }
    }

    /// BGR444 grey for a 3-bit shade (0 = white, 7 = black).
    pub fn shade_to_bgr444(shade: u8) -> u16 {
        let level = ((7 - (shade & 7) as u16) * 15) / 7;
        level | (level << 4) | (level << 8)
    }

    /// Raw 12-bit grey for the shade stored at `index`.
    pub fn raw_color(&self, index: usize) -> u16 {
        Self::shade_to_bgr444(self.raw.get(index).copied().unwrap_or(7))
    }
}

impl IndexedPalette for ShadePalette<'_> {
    fn get_color(&self, index: usize) -> u16 {
        ColorOps::from_bgr444(self.raw_color(index))
    }

    fn len(&self) -> usize {
        self.raw.len()
    }
}
