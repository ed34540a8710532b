//! Audio chip trait for pluggable synthesizers.

use serde::{Deserialize, Serialize};

/// One stereo output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StereoSample {
    pub left: i16,
    pub right: i16,
}

impl StereoSample {
    pub const SILENCE: StereoSample = StereoSample { left: 0, right: 0 };

    /// Channel-wise saturating sum.
    pub fn saturating_add(self, other: StereoSample) -> StereoSample {
        StereoSample {
            left: self.left.saturating_add(other.left),
            right: self.right.saturating_add(other.right),
        }
    }
}

/// A register-programmed sound generator.
pub trait AudioChip {
    /// Write to a register port on the audio chip
    fn write_register(&mut self, port: u16, val: u8);

    /// Read from a register on the audio chip (if supported)
    fn read_register(&self, port: u16) -> u8 {
        let _ = port;
        0xFF
    }

    /// Advance the chip by one of its internal ticks and return its output
    fn clock(&mut self) -> StereoSample;

    /// Reset the chip to power-on state
    fn reset(&mut self);

    /// Frequency of `clock()` calls the chip expects, in Hz
    fn tick_rate_hz(&self) -> u32;
}
