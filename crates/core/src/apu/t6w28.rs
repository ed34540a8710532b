//! Toshiba T6W28 programmable sound generator
//!
//! The T6W28 is an SN76489 with independent left and right attenuators. It is
//! programmed through two write-only ports that share the SN76489 latch/data
//! byte protocol:
//!
//! - **Left port**: tone periods (latch + data bytes) and left volumes
//! - **Right port**: noise control and right volumes
//!
//! # Architecture
//! - 3 square wave tone channels with 10-bit periods
//! - 1 noise channel (15-bit LFSR, white or periodic)
//! - 4-bit attenuation per channel and side (0 = loudest, 15 = off)
//!
//! One [`T6w28::tick`] corresponds to the chip's internal divide-by-16 clock.

use super::{AudioChip, StereoSample};
use serde::{Deserialize, Serialize};

/// Input clock of the chip on the handheld (CPU clock / 2).
pub const INPUT_CLOCK_HZ: u32 = 3_072_000;

/// Rate at which [`T6w28::tick`] is expected to be called.
pub const TICK_RATE_HZ: u32 = INPUT_CLOCK_HZ / 16;

const LFSR_RESET: u16 = 0x4000;

/// Amplitude per attenuation step, 2 dB apart, 15 = silent.
const VOLUME_TABLE: [i16; 16] = [
    4095, 3253, 2584, 2053, 1631, 1295, 1029, 817, 649, 516, 410, 325, 258, 205, 163, 0,
];

/// T6W28 register and generator state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct T6w28 {
    tone_period: [u16; 3],
    tone_counter: [u16; 3],
    tone_high: [bool; 3],

    noise_control: u8,
    noise_lfsr: u16,
    noise_counter: u16,
    noise_high: bool,

    volume_left: [u8; 4],
    volume_right: [u8; 4],

    latch_left: u8,
    latch_right: u8,
}

impl T6w28 {
    pub fn new() -> Self {
        Self {
            tone_period: [0; 3],
            tone_counter: [0; 3],
            tone_high: [false; 3],
            noise_control: 0,
            noise_lfsr: LFSR_RESET,
            noise_counter: 0,
            noise_high: false,
            volume_left: [0x0F; 4],
            volume_right: [0x0F; 4],
            latch_left: 0,
            latch_right: 0,
        }
    }

    /// Write a byte to the left port (tone periods, left volumes)
    pub fn write_left(&mut self, data: u8) {
        if data & 0x80 != 0 {
            let channel = (data >> 5) & 0x03;
            self.latch_left = channel;
            if data & 0x10 != 0 {
                self.volume_left[channel as usize] = data & 0x0F;
            } else if channel < 3 {
                let ch = channel as usize;
                self.tone_period[ch] = (self.tone_period[ch] & 0x3F0) | (data & 0x0F) as u16;
            }
        } else if self.latch_left < 3 {
            let ch = self.latch_left as usize;
            self.tone_period[ch] = (self.tone_period[ch] & 0x00F) | (((data & 0x3F) as u16) << 4);
        }
    }

    /// Write a byte to the right port (noise control, right volumes)
    pub fn write_right(&mut self, data: u8) {
        if data & 0x80 == 0 {
            // Period data bytes only reach the tone generators through the left port.
            return;
        }
        let channel = (data >> 5) & 0x03;
        self.latch_right = channel;
        if data & 0x10 != 0 {
            self.volume_right[channel as usize] = data & 0x0F;
        } else if channel == 3 {
            self.noise_control = data & 0x07;
            self.noise_lfsr = LFSR_RESET;
        }
    }

    /// Advance every generator by one divided clock
    pub fn tick(&mut self) {
        for i in 0..3 {
            if self.tone_counter[i] > 0 {
                self.tone_counter[i] -= 1;
            }
            if self.tone_counter[i] == 0 {
                self.tone_counter[i] = self.tone_period[i];
                // Periods 0 and 1 hold the output high; software uses this for PCM.
                self.tone_high[i] = self.tone_period[i] <= 1 || !self.tone_high[i];
            }
        }

        if self.noise_counter > 0 {
            self.noise_counter -= 1;
        }
        if self.noise_counter == 0 {
            self.noise_counter = match self.noise_control & 0x03 {
                0 => 0x10,
                1 => 0x20,
                2 => 0x40,
                _ => self.tone_period[2].max(1),
            };

            let feedback = if self.noise_control & 0x04 != 0 {
                (self.noise_lfsr ^ (self.noise_lfsr >> 1)) & 1
            } else {
                self.noise_lfsr & 1
            };
            self.noise_lfsr = (self.noise_lfsr >> 1) | (feedback << 14);
            self.noise_high = self.noise_lfsr & 1 != 0;
        }
    }

    /// Current mixed output of the four channels
    pub fn output(&self) -> StereoSample {
        let mut left: i16 = 0;
        let mut right: i16 = 0;
        let levels = [
            self.tone_high[0],
            self.tone_high[1],
            self.tone_high[2],
            self.noise_high,
        ];
        for (ch, high) in levels.into_iter().enumerate() {
            let l = VOLUME_TABLE[self.volume_left[ch] as usize];
            let r = VOLUME_TABLE[self.volume_right[ch] as usize];
            if high {
                left += l;
                right += r;
            } else {
                left -= l;
                right -= r;
            }
        }
        StereoSample { left, right }
    }

    /// True when at least one channel is audible on either side
    pub fn is_audible(&self) -> bool {
        self.volume_left
            .iter()
            .chain(self.volume_right.iter())
            .any(|&v| v != 0x0F)
    }

    pub fn tone_period(&self, channel: usize) -> u16 {
        self.tone_period[channel]
    }

    pub fn reset_state(&mut self) {
        *self = Self::new();
    }

    /// Every field holds a value the port protocol can produce
    pub fn is_well_formed(&self) -> bool {
        self.volume_left.iter().chain(self.volume_right.iter()).all(|&v| v <= 0x0F)
            && self.tone_period.iter().all(|&p| p <= 0x3FF)
            && self.latch_left <= 3
            && self.latch_right <= 3
            && self.noise_control <= 0x07
            && self.noise_lfsr <= 0x7FFF
    }
}

impl Default for T6w28 {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioChip for T6w28 {
    /// Port 0 is the right port (0xA0 on the bus), port 1 the left port (0xA1).
    fn write_register(&mut self, port: u16, val: u8) {
        match port & 1 {
            0 => self.write_right(val),
            _ => self.write_left(val),
        }
    }

    fn clock(&mut self) -> StereoSample {
        self.tick();
        self.output()
    }

    fn reset(&mut self) {
        self.reset_state();
    }

    fn tick_rate_hz(&self) -> u32 {
        TICK_RATE_HZ
    }
}
