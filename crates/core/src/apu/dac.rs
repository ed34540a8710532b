//! Software-driven 8-bit stereo DAC.

use super::StereoSample;
use serde::{Deserialize, Serialize};

/// Level that produces no output.
pub const DAC_MIDPOINT: u8 = 0x80;

/// Two unsigned 8-bit latches, one per speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dac {
    left: u8,
    right: u8,
}

impl Dac {
    pub fn new() -> Self {
        Self {
            left: DAC_MIDPOINT,
            right: DAC_MIDPOINT,
        }
    }

    pub fn write_left(&mut self, val: u8) {
        self.left = val;
    }

    pub fn write_right(&mut self, val: u8) {
        self.right = val;
    }

    pub fn left(&self) -> u8 {
        self.left
    }

    pub fn right(&self) -> u8 {
        self.right
    }

    /// True when either latch is away from the midpoint
    pub fn is_active(&self) -> bool {
        self.left != DAC_MIDPOINT || self.right != DAC_MIDPOINT
    }

    /// Signed output, scaled so full deflection is +/-8192.
    pub fn output(&self) -> StereoSample {
        StereoSample {
            left: level(self.left),
            right: level(self.right),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Dac {
    fn default() -> Self {
        Self::new()
    }
}

fn level(raw: u8) -> i16 {
    (raw as i16 - DAC_MIDPOINT as i16) << 6
}
