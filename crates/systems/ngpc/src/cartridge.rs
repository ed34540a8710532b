//! Cartridge image validation and header parsing
//!
//! A cartridge image is the flat contents of one or two flash chips. The
//! first 2 MB are visible at CS0 (0x200000), anything beyond that at CS1
//! (0x800000). The first 0x40 bytes hold the header:
//!
//! ```text
//! 0x00..0x1C  licence string
//! 0x1C..0x20  start PC, u32 LE
//! 0x20..0x22  game id, u16 LE
//! 0x22        version
//! 0x23        0x10 = colour, 0x00 = monochrome
//! 0x24..0x30  title, ASCII padded with spaces
//! ```

use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HEADER_SIZE: usize = 0x40;

/// Largest image two 16 Mbit chips can hold
pub const MAX_CONTENT_SIZE: usize = 4 * 1024 * 1024;

/// Bytes visible through one chip select
pub const CHIP_WINDOW: usize = 0x20_0000;

pub const CS0_BASE: u32 = 0x20_0000;
pub const CS1_BASE: u32 = 0x80_0000;

const LICENCES: [&[u8; 28]; 2] = [b"COPYRIGHT BY SNK CORPORATION", b" LICENSED BY SNK CORPORATION"];

/// Reasons content cannot be loaded. Nothing is kept from a failed load.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("content image is empty")]
    Empty,

    #[error("content image is {len} bytes, shorter than the header")]
    TooSmall { len: usize },

    #[error("content image is {len} bytes, larger than the 4 MB maximum")]
    TooLarge { len: usize },

    #[error("start address {pc:#08X} is outside the cartridge")]
    BadEntryPoint { pc: u32 },

    #[error("save data is {actual} bytes but the flash image is {expected} bytes")]
    SaveSizeMismatch { expected: usize, actual: usize },
}

/// Parsed cartridge header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartridgeHeader {
    /// One of the two licence strings was present
    pub licensed: bool,
    pub entry_point: u32,
    pub game_id: u16,
    pub version: u8,
    /// Colour title; monochrome titles run in K1GE compatibility mode
    pub color: bool,
    pub title: String,
}

impl CartridgeHeader {
    /// Validate `image` and extract its header.
    pub fn parse(image: &[u8]) -> Result<Self, LoadError> {
        if image.is_empty() {
            return Err(LoadError::Empty);
        }
        if image.len() < HEADER_SIZE {
            return Err(LoadError::TooSmall { len: image.len() });
        }
        if image.len() > MAX_CONTENT_SIZE {
            return Err(LoadError::TooLarge { len: image.len() });
        }

        let licensed = LICENCES.iter().any(|l| &image[0..28] == l.as_slice());
        if !licensed {
            log(LogCategory::Bus, LogLevel::Warn, || {
                "cartridge header has no SNK licence string".to_string()
            });
        }

        let entry_point = u32::from_le_bytes([image[0x1C], image[0x1D], image[0x1E], image[0x1F]])
            & 0x00FF_FFFF;
        match content_offset(entry_point) {
            Some(offset) if offset < image.len() => {}
            _ => return Err(LoadError::BadEntryPoint { pc: entry_point }),
        }

        let title = image[0x24..0x30]
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { ' ' })
            .collect::<String>()
            .trim_end()
            .to_string();

        Ok(Self {
            licensed,
            entry_point,
            game_id: u16::from_le_bytes([image[0x20], image[0x21]]),
            version: image[0x22],
            color: image[0x23] == 0x10,
            title,
        })
    }
}

/// Offset into the flat content image for a CPU address, if it lies in a
/// chip-select window.
pub fn content_offset(addr: u32) -> Option<usize> {
    let window = CHIP_WINDOW as u32;
    if (CS0_BASE..CS0_BASE + window).contains(&addr) {
        Some((addr - CS0_BASE) as usize)
    } else if (CS1_BASE..CS1_BASE + window).contains(&addr) {
        Some((addr - CS1_BASE) as usize + CHIP_WINDOW)
    } else {
        None
    }
}
