//! Special function registers (0x00-0x9F, 0xA4-0xFF)
//!
//! Owns the interrupt controller, timers, RTC, the joypad latch and the
//! sound-CPU control latches. Registers with no modelled behaviour read back
//! the last value written.

use crate::interrupts::InterruptController;
use crate::rtc::Rtc;
use crate::timer::Timers;
use serde::{Deserialize, Serialize};

pub const REG_INPUT: u8 = 0xB0;
/// Sound CPU enable: 0x55 runs it, 0xAA stops it
pub const REG_SOUND_ENABLE: u8 = 0xB8;
pub const REG_SOUND_BUS: u8 = 0xB9;
pub const REG_SOUND_NMI: u8 = 0xBA;
pub const REG_SOUND_COMM: u8 = 0xBC;

pub const SOUND_ON: u8 = 0x55;
pub const SOUND_OFF: u8 = 0xAA;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Io {
    pub interrupts: InterruptController,
    pub timers: Timers,
    pub rtc: Rtc,
    input: u8,
    sfr: Vec<u8>,
}

impl Io {
    pub fn new() -> Self {
        Self {
            interrupts: InterruptController::new(),
            timers: Timers::new(),
            rtc: Rtc::new(),
            input: 0,
            sfr: vec![0; 0x100],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn set_input(&mut self, buttons: u8) {
        self.input = buttons & 0x7F;
    }

    pub fn input(&self) -> u8 {
        self.input
    }

    /// DAC output replaces the PSG while the sound CPU is stopped
    pub fn dac_replaces_psg(&self) -> bool {
        self.sfr[REG_SOUND_ENABLE as usize] == SOUND_OFF
    }

    pub fn read(&self, addr: u8) -> u8 {
        match addr {
            0x20..=0x29 => self.timers.read(addr),
            0x70..=0x7A | 0x7C..=0x7F => self.interrupts.read(addr),
            0x90..=0x97 => self.rtc.read(addr),
            REG_INPUT => self.input,
            _ => self.sfr[addr as usize],
        }
    }

    pub fn write(&mut self, addr: u8, val: u8) {
        match addr {
            0x20..=0x29 => self.timers.write(addr, val),
            0x70..=0x7A | 0x7C..=0x7F => self.interrupts.write(addr, val),
            0x90..=0x97 => self.rtc.write(addr, val),
            REG_INPUT => {}
            _ => self.sfr[addr as usize] = val,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.sfr.len() == 0x100
    }

    /// Advance timers and the RTC
    pub fn tick(&mut self, cycles: u32, hblanks: u32) {
        self.timers.tick(cycles, hblanks, &mut self.interrupts);
        self.rtc.tick(cycles);
    }
}

impl Default for Io {
    fn default() -> Self {
        Self::new()
    }
}
