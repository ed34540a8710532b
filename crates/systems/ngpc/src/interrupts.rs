//! Interrupt controller (SFR 0x70-0x7A) and micro-DMA start vectors (0x7C-0x7F)
//!
//! Each interrupt source owns one nibble of a priority register: bits 2-0
//! hold its level (0 disables it, 7 is highest) and bit 3 is the request
//! latch. The low nibble of a register belongs to the first source listed
//! for it below, the high nibble to the second.
//!
//! Writing a 0 to a request bit clears it; writing a 1 has no effect.
//!
//! A source whose vector matches a channel's DMA start vector requests a
//! micro-DMA transfer instead of latching.

use emu_core::cpu_tlcs900h::InterruptRequest;
use serde::{Deserialize, Serialize};

pub const VECTOR_INT0: u8 = 0x28;
pub const VECTOR_VBLANK: u8 = 0x2C;
pub const VECTOR_INT5: u8 = 0x30;
pub const VECTOR_TIMER: [u8; 4] = [0x40, 0x44, 0x48, 0x4C];
pub const VECTOR_DMA_END: [u8; 4] = [0x74, 0x78, 0x7C, 0x80];

/// (priority register, high nibble, vector) per source
const SOURCES: [(usize, bool, u8); 22] = [
    (0, false, VECTOR_INT0),
    (0, true, 0x70), // INTAD
    (1, false, VECTOR_VBLANK),
    (1, true, VECTOR_INT5),
    (2, false, 0x34),
    (2, true, 0x38),
    (3, false, VECTOR_TIMER[0]),
    (3, true, VECTOR_TIMER[1]),
    (4, false, VECTOR_TIMER[2]),
    (4, true, VECTOR_TIMER[3]),
    (5, false, 0x50),
    (5, true, 0x54),
    (6, false, 0x58),
    (6, true, 0x5C),
    (7, false, 0x60),
    (7, true, 0x64),
    (8, false, 0x68),
    (8, true, 0x6C),
    (9, false, VECTOR_DMA_END[0]),
    (9, true, VECTOR_DMA_END[1]),
    (10, false, VECTOR_DMA_END[2]),
    (10, true, VECTOR_DMA_END[3]),
];

const PRIORITY_BASE: u8 = 0x70;
const DMA_VECTOR_BASE: u8 = 0x7C;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptController {
    priority: [u8; 11],
    dma_vectors: [u8; 4],
    dma_requests: [bool; 4],
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn source(vector: u8) -> Option<(usize, u8)> {
        SOURCES
            .iter()
            .find(|&&(_, _, v)| v == vector)
            .map(|&(reg, high, _)| (reg, if high { 4 } else { 0 }))
    }

    /// Latch a request for `vector`, or start micro-DMA if a channel is
    /// bound to it.
    pub fn raise(&mut self, vector: u8) {
        if let Some(ch) = self
            .dma_vectors
            .iter()
            .position(|&v| v != 0 && v as u32 * 4 == vector as u32)
        {
            self.dma_requests[ch] = true;
            return;
        }
        if let Some((reg, shift)) = Self::source(vector) {
            self.priority[reg] |= 0x08 << shift;
        }
    }

    /// Current level of the source for `vector`
    pub fn level(&self, vector: u8) -> u8 {
        Self::source(vector).map_or(0, |(reg, shift)| (self.priority[reg] >> shift) & 0x07)
    }

    /// Set the level of one source, keeping its request latch
    pub fn set_level(&mut self, vector: u8, level: u8) {
        if let Some((reg, shift)) = Self::source(vector) {
            let keep = self.priority[reg] & !(0x07 << shift);
            self.priority[reg] = keep | ((level & 0x07) << shift);
        }
    }

    pub fn is_requested(&self, vector: u8) -> bool {
        Self::source(vector).is_some_and(|(reg, shift)| self.priority[reg] & (0x08 << shift) != 0)
    }

    /// Highest latched request with a non-zero level of at least `mask`.
    /// Ties go to the lower vector.
    pub fn pending(&self, mask: u8) -> Option<InterruptRequest> {
        let mut best: Option<InterruptRequest> = None;
        for &(reg, high, vector) in &SOURCES {
            let nibble = if high { self.priority[reg] >> 4 } else { self.priority[reg] & 0x0F };
            let level = nibble & 0x07;
            if nibble & 0x08 == 0 || level == 0 || level < mask {
                continue;
            }
            if best.map_or(true, |b| level > b.level) {
                best = Some(InterruptRequest { vector, level });
            }
        }
        best
    }

    pub fn acknowledge(&mut self, vector: u8) {
        if let Some((reg, shift)) = Self::source(vector) {
            self.priority[reg] &= !(0x08 << shift);
        }
    }

    pub fn take_dma_request(&mut self) -> Option<usize> {
        let ch = self.dma_requests.iter().position(|&r| r)?;
        self.dma_requests[ch] = false;
        Some(ch)
    }

    /// A channel finished: unbind it and raise its end interrupt.
    pub fn dma_end(&mut self, channel: usize) {
        let channel = channel & 3;
        self.dma_vectors[channel] = 0;
        self.raise(VECTOR_DMA_END[channel]);
    }

    pub fn read(&self, addr: u8) -> u8 {
        match addr {
            0x70..=0x7A => self.priority[(addr - PRIORITY_BASE) as usize],
            0x7C..=0x7F => self.dma_vectors[(addr - DMA_VECTOR_BASE) as usize],
            _ => 0,
        }
    }

    pub fn write(&mut self, addr: u8, val: u8) {
        match addr {
            0x70..=0x7A => {
                let reg = &mut self.priority[(addr - PRIORITY_BASE) as usize];
                *reg = (val & 0x77) | (*reg & val & 0x88);
            }
            0x7C..=0x7F => self.dma_vectors[(addr - DMA_VECTOR_BASE) as usize] = val & 0x1F,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_and_pending() {
        let mut ic = InterruptController::new();
        ic.raise(VECTOR_VBLANK);
        // Level 0 disables the source
        assert_eq!(ic.pending(0), None);

        ic.write(0x71, 0x04);
        let req = ic.pending(0).unwrap();
        assert_eq!(req.vector, VECTOR_VBLANK);
        assert_eq!(req.level, 4);

        assert_eq!(ic.pending(5), None);
        ic.acknowledge(VECTOR_VBLANK);
        assert_eq!(ic.pending(0), None);
    }

    #[test]
    fn test_highest_level_wins() {
        let mut ic = InterruptController::new();
        ic.set_level(VECTOR_VBLANK, 4);
        ic.set_level(VECTOR_TIMER[0], 6);
        ic.raise(VECTOR_VBLANK);
        ic.raise(VECTOR_TIMER[0]);
        assert_eq!(ic.pending(0).unwrap().vector, VECTOR_TIMER[0]);

        ic.set_level(VECTOR_TIMER[0], 4);
        // Equal levels: lower vector first
        assert_eq!(ic.pending(0).unwrap().vector, VECTOR_VBLANK);
    }

    #[test]
    fn test_write_zero_clears_request() {
        let mut ic = InterruptController::new();
        ic.write(0x73, 0x33);
        ic.raise(VECTOR_TIMER[0]);
        ic.raise(VECTOR_TIMER[1]);
        assert_eq!(ic.read(0x73), 0xBB);

        // Writing 1 to the T1 request keeps it; writing 0 to T0 clears it
        ic.write(0x73, 0x83);
        assert_eq!(ic.read(0x73), 0x83);
        assert!(!ic.is_requested(VECTOR_TIMER[0]));
        assert!(ic.is_requested(VECTOR_TIMER[1]));
    }

    #[test]
    fn test_dma_start_vector_diverts_request() {
        let mut ic = InterruptController::new();
        ic.set_level(VECTOR_TIMER[0], 3);
        ic.write(0x7D, VECTOR_TIMER[0] / 4);
        ic.raise(VECTOR_TIMER[0]);
        assert_eq!(ic.pending(0), None);
        assert_eq!(ic.take_dma_request(), Some(1));
        assert_eq!(ic.take_dma_request(), None);

        ic.set_level(VECTOR_DMA_END[1], 2);
        ic.dma_end(1);
        assert_eq!(ic.read(0x7D), 0);
        assert_eq!(ic.pending(0).unwrap().vector, VECTOR_DMA_END[1]);
    }
}
