//! Cartridge flash memory
//!
//! Each chip select holds one NOR flash chip of 4, 8 or 16 Mbit. Reads return
//! array contents except in ID mode. Writes drive the JEDEC-style command
//! state machine:
//!
//! - `AA@5555, 55@2AAA, A0@5555, data@addr` program (bits only clear)
//! - `AA, 55, 80, AA, 55, 10@5555` chip erase
//! - `AA, 55, 80, AA, 55, 30@block` block erase
//! - `AA, 55, 90@5555` enter ID mode, `F0` leaves it
//! - `AA, 55, 9A@5555, any@block` protect a block
//!
//! The flat save image is CS0 followed by CS1.

use crate::cartridge::{LoadError, CHIP_WINDOW};
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

pub const MANUFACTURER_ID: u8 = 0x98;

const UNLOCK_ADDR1: u32 = 0x5555;
const UNLOCK_ADDR2: u32 = 0x2AAA;

/// Bytes in each boot-block sector after the 64 KB main blocks
const BOOT_BLOCKS: [u32; 4] = [0x8000, 0x2000, 0x2000, 0x4000];

/// Position in the command sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Command {
    Read,
    Unlock1,
    Unlock2,
    Program,
    EraseUnlock0,
    EraseUnlock1,
    EraseUnlock2,
    Protect,
}

/// One flash chip with its command state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashChip {
    data: Vec<u8>,
    command: Command,
    id_mode: bool,
    protected: Vec<bool>,
}

impl FlashChip {
    /// Build a chip big enough for `content`, padded with erased bytes.
    pub fn new(content: &[u8]) -> Self {
        let size = chip_size(content.len());
        let mut data = vec![0xFF; size];
        data[..content.len()].copy_from_slice(content);
        let blocks = block_layout(size).len();
        Self {
            data,
            command: Command::Read,
            id_mode: false,
            protected: vec![false; blocks],
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn device_id(&self) -> u8 {
        match self.data.len() {
            0x8_0000 => 0xAB,
            0x10_0000 => 0x2C,
            _ => 0x2F,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn read(&self, offset: u32) -> u8 {
        if self.id_mode {
            return match offset & 3 {
                0 => MANUFACTURER_ID,
                1 => self.device_id(),
                2 => self.block_index(offset).map_or(0, |b| self.protected[b] as u8),
                _ => 0xFF,
            };
        }
        self.data
            .get(offset as usize % self.data.len())
            .copied()
            .unwrap_or(0xFF)
    }

    /// Feed one bus write into the command state machine. Returns true when
    /// the array contents changed.
    pub fn write(&mut self, offset: u32, val: u8) -> bool {
        let offset = offset % self.data.len() as u32;
        let cmd_addr = offset & 0x7FFF;

        if val == 0xF0 && self.command != Command::Program {
            self.command = Command::Read;
            self.id_mode = false;
            return false;
        }

        let mut changed = false;
        self.command = match (self.command, cmd_addr, val) {
            (Command::Read, UNLOCK_ADDR1, 0xAA) => Command::Unlock1,
            (Command::Unlock1, UNLOCK_ADDR2, 0x55) => Command::Unlock2,
            (Command::Unlock2, UNLOCK_ADDR1, 0xA0) => Command::Program,
            (Command::Unlock2, UNLOCK_ADDR1, 0x80) => Command::EraseUnlock0,
            (Command::Unlock2, UNLOCK_ADDR1, 0x90) => {
                self.id_mode = true;
                Command::Read
            }
            (Command::Unlock2, UNLOCK_ADDR1, 0x9A) => Command::Protect,
            (Command::Program, _, _) => {
                changed = self.program(offset, val);
                Command::Read
            }
            (Command::EraseUnlock0, UNLOCK_ADDR1, 0xAA) => Command::EraseUnlock1,
            (Command::EraseUnlock1, UNLOCK_ADDR2, 0x55) => Command::EraseUnlock2,
            (Command::EraseUnlock2, UNLOCK_ADDR1, 0x10) => {
                changed = self.erase_chip();
                Command::Read
            }
            (Command::EraseUnlock2, _, 0x30) => {
                if let Some(block) = self.block_index(offset) {
                    changed = self.erase_block(block);
                }
                Command::Read
            }
            (Command::Protect, _, _) => {
                if let Some(block) = self.block_index(offset) {
                    self.protect_block(block);
                }
                Command::Read
            }
            (state, _, _) => {
                if state != Command::Read {
                    log(LogCategory::Flash, LogLevel::Debug, || {
                        format!("flash command {val:02X}@{offset:06X} aborted {state:?}")
                    });
                }
                Command::Read
            }
        };
        changed
    }

    /// Clear bits at `offset`. Protected blocks are left untouched.
    pub fn program(&mut self, offset: u32, val: u8) -> bool {
        let Some(block) = self.block_index(offset) else {
            return false;
        };
        if self.protected[block] {
            log(LogCategory::Flash, LogLevel::Warn, || {
                format!("program of protected block {block} at {offset:06X}")
            });
            return false;
        }
        let cell = &mut self.data[offset as usize];
        let old = *cell;
        *cell &= val;
        *cell != old
    }

    pub fn erase_block(&mut self, block: usize) -> bool {
        let layout = block_layout(self.data.len());
        let (Some(&(start, len)), Some(false)) = (layout.get(block), self.protected.get(block).copied())
        else {
            return false;
        };
        let range = &mut self.data[start as usize..(start + len) as usize];
        let changed = range.iter().any(|&b| b != 0xFF);
        range.fill(0xFF);
        changed
    }

    pub fn erase_chip(&mut self) -> bool {
        (0..self.protected.len()).fold(false, |changed, block| self.erase_block(block) | changed)
    }

    pub fn protect_block(&mut self, block: usize) {
        if let Some(p) = self.protected.get_mut(block) {
            *p = true;
        }
    }

    pub fn block_count(&self) -> usize {
        self.protected.len()
    }

    /// Sector containing `offset`
    pub fn block_index(&self, offset: u32) -> Option<usize> {
        block_layout(self.data.len())
            .iter()
            .position(|&(start, len)| offset >= start && offset < start + len)
    }

    fn reset_command(&mut self) {
        self.command = Command::Read;
        self.id_mode = false;
    }
}

/// Smallest supported chip that holds `len` bytes
fn chip_size(len: usize) -> usize {
    match len {
        0..=0x8_0000 => 0x8_0000,
        0x8_0001..=0x10_0000 => 0x10_0000,
        _ => CHIP_WINDOW,
    }
}

/// `(start, len)` of each erase sector in a chip of `size` bytes
pub fn block_layout(size: usize) -> Vec<(u32, u32)> {
    let size = size as u32;
    let main_end = size - 0x1_0000;
    let mut blocks: Vec<(u32, u32)> = (0..main_end).step_by(0x1_0000).map(|s| (s, 0x1_0000)).collect();
    let mut start = main_end;
    for len in BOOT_BLOCKS {
        blocks.push((start, len));
        start += len;
    }
    blocks
}

/// Both chip selects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    chips: Vec<FlashChip>,
    dirty: bool,
}

impl Flash {
    /// Split the content image across CS0 and, when needed, CS1.
    pub fn from_content(image: &[u8]) -> Self {
        let mut chips = vec![FlashChip::new(&image[..image.len().min(CHIP_WINDOW)])];
        if image.len() > CHIP_WINDOW {
            chips.push(FlashChip::new(&image[CHIP_WINDOW..]));
        }
        Self { chips, dirty: false }
    }

    pub fn chip_count(&self) -> usize {
        self.chips.len()
    }

    pub fn chip(&self, index: usize) -> Option<&FlashChip> {
        self.chips.get(index)
    }

    /// Bytes in the flat save image
    pub fn image_len(&self) -> usize {
        self.chips.iter().map(FlashChip::size).sum()
    }

    /// Flat save image, CS0 followed by CS1
    pub fn image(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.image_len());
        for chip in &self.chips {
            out.extend_from_slice(chip.data());
        }
        out
    }

    /// Replace every chip's contents with a previously flushed save image.
    pub fn load_save(&mut self, save: &[u8]) -> Result<(), LoadError> {
        if save.len() != self.image_len() {
            return Err(LoadError::SaveSizeMismatch {
                expected: self.image_len(),
                actual: save.len(),
            });
        }
        let mut at = 0;
        for chip in &mut self.chips {
            let len = chip.size();
            chip.data.copy_from_slice(&save[at..at + len]);
            chip.reset_command();
            at += len;
        }
        self.dirty = false;
        Ok(())
    }

    pub fn read(&self, chip: usize, offset: u32) -> u8 {
        self.chips.get(chip).map_or(0xFF, |c| c.read(offset))
    }

    pub fn write(&mut self, chip: usize, offset: u32, val: u8) {
        if let Some(c) = self.chips.get_mut(chip) {
            if c.write(offset, val) {
                self.dirty = true;
            }
        }
    }

    /// Program a run of bytes directly (BIOS FLASHWRITE).
    pub fn program_bytes(&mut self, chip: usize, offset: u32, bytes: &[u8]) {
        let Some(c) = self.chips.get_mut(chip) else {
            return;
        };
        let mut changed = false;
        for (i, &b) in bytes.iter().enumerate() {
            let at = offset as usize + i;
            if at < c.size() {
                changed |= c.program(at as u32, b);
            }
        }
        self.dirty |= changed;
    }

    pub fn erase_block(&mut self, chip: usize, block: usize) {
        if let Some(c) = self.chips.get_mut(chip) {
            self.dirty |= c.erase_block(block);
        }
    }

    pub fn erase_chip(&mut self, chip: usize) {
        if let Some(c) = self.chips.get_mut(chip) {
            self.dirty |= c.erase_chip();
        }
    }

    pub fn protect_block(&mut self, chip: usize, block: usize) {
        if let Some(c) = self.chips.get_mut(chip) {
            c.protect_block(block);
        }
    }

    /// Same chip count, sizes and sector tables as `other`
    pub fn same_layout(&self, other: &Flash) -> bool {
        self.chips.len() == other.chips.len()
            && self.chips.iter().zip(&other.chips).all(|(a, b)| {
                a.data.len() == b.data.len() && a.protected.len() == b.protected.len()
            })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Return the save image if anything changed since load or the last flush.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        log(LogCategory::Flash, LogLevel::Info, || {
            format!("flushing {} bytes of flash", self.image_len())
        });
        Some(self.image())
    }
}
