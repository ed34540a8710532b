//! Neo Geo Pocket / Neo Geo Pocket Color emulator implementation
//!
//! This crate implements the handheld's main processor side: CPU, memory
//! bus, display, sound, timers and cartridge flash, plus a high-level
//! replacement for the system BIOS.
//!
//! # Architecture
//!
//! - **CPU**: Toshiba TLCS-900/H @ 6.144 MHz
//! - **Display**: K2GE (K1GE compatibility mode for monochrome titles), 160x152
//! - **Sound**: T6W28 PSG plus an 8-bit stereo DAC
//! - **RAM**: 12 KB work RAM, 4 KB shared sound RAM
//! - **Cartridge**: up to two 16 Mbit flash chips
//!
//! The sound CPU (Z80) is not executed. Its enable latch only decides
//! whether DAC output replaces or blends with the PSG.

pub mod bios;
pub mod bus;
pub mod cartridge;
pub mod config;
pub mod flash;
pub mod interrupts;
pub mod io;
pub mod k2ge;
pub mod rtc;
pub mod snapshot;
pub mod sound;
pub mod system;
pub mod timer;

pub use cartridge::{CartridgeHeader, LoadError};
pub use config::{ConfigError, CoreConfig, Language};
pub use system::{NgpcError, NgpcSystem};

/// Main CPU clock
pub const CPU_CLOCK_HZ: u32 = 6_144_000;

pub const FRAME_RATE_HZ: u32 = 60;

/// CPU states scheduled per host frame
pub const CYCLES_PER_FRAME: u32 = CPU_CLOCK_HZ / FRAME_RATE_HZ;

/// Joypad bits as read from SFR 0xB0
pub mod input {
    pub const BUTTON_UP: u8 = 0x01;
    pub const BUTTON_DOWN: u8 = 0x02;
    pub const BUTTON_LEFT: u8 = 0x04;
    pub const BUTTON_RIGHT: u8 = 0x08;
    pub const BUTTON_A: u8 = 0x10;
    pub const BUTTON_B: u8 = 0x20;
    pub const BUTTON_OPTION: u8 = 0x40;
}
