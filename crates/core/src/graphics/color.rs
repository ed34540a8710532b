//! Color operation utilities for graphics rendering
//!
//! Output pixels are packed RGB565 (`rrrrrggggggbbbbb`). Source colours on the
//! handheld are 12-bit BGR444 words (`----bbbbggggrrrr`). All operations are
//! integer-only so rendered frames are bit-identical between runs.

/// Color operation utilities
pub struct ColorOps;

impl ColorOps {
    /// Expand a 12-bit BGR444 word to RGB565.
    ///
    /// ```
    /// use emu_core::graphics::ColorOps;
    ///
    /// assert_eq!(ColorOps::from_bgr444(0x0FFF), 0xFFFF);
    /// assert_eq!(ColorOps::from_bgr444(0x000F), 0xF800);
    /// ```
    #[inline]
    pub fn from_bgr444(color: u16) -> u16 {
        let r = color & 0x0F;
        let g = (color >> 4) & 0x0F;
        let b = (color >> 8) & 0x0F;
        let r5 = (r << 1) | (r >> 3);
        let g6 = (g << 2) | (g >> 2);
        let b5 = (b << 1) | (b >> 3);
        (r5 << 11) | (g6 << 5) | b5
    }

    /// Scale every channel of an RGB565 colour by `percent / 100`.
    ///
    /// `percent` above 100 is clamped, so this only ever darkens.
    #[inline]
    pub fn scale_brightness(color: u16, percent: u8) -> u16 {
        let p = percent.min(100) as u32;
        let r = ((Self::red(color) as u32 * p) / 100) as u16;
        let g = ((Self::green(color) as u32 * p) / 100) as u16;
        let b = ((Self::blue(color) as u32 * p) / 100) as u16;
        Self::from_rgb565(r, g, b)
    }

    /// Bitwise negative of a BGR444 colour (used by the display's NEG mode)
    #[inline]
    pub fn invert_bgr444(color: u16) -> u16 {
        !color & 0x0FFF
    }

    /// 5-bit red channel
    #[inline]
    pub fn red(color: u16) -> u16 {
        color >> 11
    }

    /// 6-bit green channel
    #[inline]
    pub fn green(color: u16) -> u16 {
        (color >> 5) & 0x3F
    }

    /// 5-bit blue channel
    #[inline]
    pub fn blue(color: u16) -> u16 {
        color & 0x1F
    }

    /// Pack 5/6/5-bit channels
    #[inline]
    pub fn from_rgb565(r: u16, g: u16, b: u16) -> u16 {
        ((r & 0x1F) << 11) | ((g & 0x3F) << 5) | (b & 0x1F)
    }
}
