//! 8-bit timers 0-3
//!
//! # Registers
//!
//! - `0x20 TRUN`: bit n runs timer n, bit 7 runs the prescaler
//! - `0x22/0x23 TREG0/1`, `0x26/0x27 TREG2/3`: compare values (0 = 256)
//! - `0x24 T01MOD`: bits 1-0 timer 0 clock (TI0, T1, T4, T16),
//!   bits 3-2 timer 1 clock (TO0, T1, T16, T256)
//! - `0x28 T23MOD`: bits 1-0 timer 2 clock (none, T1, T4, T16),
//!   bits 3-2 timer 3 clock (TO2, T1, T16, T256)
//!
//! # Timing
//!
//! The prescaler taps T1, T4, T16 and T256 tick every 8, 32, 128 and 2048
//! CPU states. TI0 is the display's HBlank pulse. An up-counter that reaches
//! its compare value clears, raises INTTn and, for timers 0 and 2, clocks the
//! cascaded timer.

use crate::interrupts::{InterruptController, VECTOR_TIMER};
use serde::{Deserialize, Serialize};

/// CPU states per prescaler tap T1, T4, T16, T256
const TAP_PERIODS: [u32; 4] = [8, 32, 128, 2048];

/// Prescaler wraps at the slowest tap
const PRESCALER_WRAP: u32 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clock {
    Off,
    Tap(usize),
    /// TI0 for timer 0, the lower timer's match output for timers 1 and 3
    External,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timers {
    trun: u8,
    treg: [u8; 4],
    t01mod: u8,
    t23mod: u8,
    tffcr: u8,
    trdc: u8,
    counter: [u8; 4],
    prescaler: u32,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn read(&self, addr: u8) -> u8 {
        match addr {
            0x20 => self.trun,
            0x22 => self.treg[0],
            0x23 => self.treg[1],
            0x24 => self.t01mod,
            0x25 => self.tffcr,
            0x26 => self.treg[2],
            0x27 => self.treg[3],
            0x28 => self.t23mod,
            0x29 => self.trdc,
            _ => 0,
        }
    }

    pub fn write(&mut self, addr: u8, val: u8) {
        match addr {
            0x20 => {
                for n in 0..4 {
                    if val & (1 << n) == 0 {
                        self.counter[n] = 0;
                    }
                }
                if val & 0x80 == 0 {
                    self.prescaler = 0;
                }
                self.trun = val;
            }
            0x22 => self.treg[0] = val,
            0x23 => self.treg[1] = val,
            0x24 => self.t01mod = val,
            0x25 => self.tffcr = val,
            0x26 => self.treg[2] = val,
            0x27 => self.treg[3] = val,
            0x28 => self.t23mod = val,
            0x29 => self.trdc = val,
            _ => {}
        }
    }

    fn clock(&self, timer: usize) -> Clock {
        let mode = if timer < 2 { self.t01mod } else { self.t23mod };
        let lower = timer % 2 == 0;
        let select = if lower { mode & 3 } else { (mode >> 2) & 3 };
        match (lower, select) {
            (true, 0) if timer == 0 => Clock::External,
            (true, 0) => Clock::Off,
            (true, s) => Clock::Tap(s as usize - 1),
            (false, 0) => Clock::External,
            (false, 1) => Clock::Tap(0),
            (false, 2) => Clock::Tap(2),
            (false, _) => Clock::Tap(3),
        }
    }

    /// Add `ticks` input clocks to a timer; returns the number of matches.
    fn advance(&mut self, timer: usize, ticks: u32) -> u32 {
        if ticks == 0 || self.trun & (1 << timer) == 0 {
            return 0;
        }
        let period = match self.treg[timer] {
            0 => 256,
            n => n as u32,
        };
        let total = self.counter[timer] as u32 + ticks;
        self.counter[timer] = (total % period) as u8;
        total / period
    }

    /// Run for `cycles` CPU states during which `hblanks` TI0 pulses arrived.
    pub fn tick(&mut self, cycles: u32, hblanks: u32, interrupts: &mut InterruptController) {
        let mut taps = [0u32; 4];
        if self.trun & 0x80 != 0 {
            let before = self.prescaler;
            let after = before + cycles;
            for (tap, period) in taps.iter_mut().zip(TAP_PERIODS) {
                *tap = after / period - before / period;
            }
            self.prescaler = after % PRESCALER_WRAP;
        }

        let mut matches = [0u32; 4];
        for timer in 0..4 {
            let ticks = match self.clock(timer) {
                Clock::Off => 0,
                Clock::Tap(t) => taps[t],
                Clock::External if timer == 0 => hblanks,
                Clock::External => matches[timer - 1],
            };
            matches[timer] = self.advance(timer, ticks);
            if matches[timer] > 0 {
                interrupts.raise(VECTOR_TIMER[timer]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prescaled_timer_matches() {
        let mut timers = Timers::new();
        let mut ic = InterruptController::new();
        ic.set_level(VECTOR_TIMER[0], 1);

        // Timer 0 on T1 (8 states), compare 4 -> match every 32 states
        timers.write(0x24, 0x01);
        timers.write(0x22, 4);
        timers.write(0x20, 0x81);

        timers.tick(31, 0, &mut ic);
        assert!(!ic.is_requested(VECTOR_TIMER[0]));
        timers.tick(1, 0, &mut ic);
        assert!(ic.is_requested(VECTOR_TIMER[0]));
    }

    #[test]
    fn test_prescaler_must_run() {
        let mut timers = Timers::new();
        let mut ic = InterruptController::new();
        timers.write(0x24, 0x01);
        timers.write(0x22, 1);
        timers.write(0x20, 0x01);
        timers.tick(1000, 0, &mut ic);
        assert!(!ic.is_requested(VECTOR_TIMER[0]));
    }

    #[test]
    fn test_hblank_clocks_timer0() {
        let mut timers = Timers::new();
        let mut ic = InterruptController::new();
        timers.write(0x22, 2);
        timers.write(0x20, 0x01);
        timers.tick(10, 1, &mut ic);
        assert!(!ic.is_requested(VECTOR_TIMER[0]));
        timers.tick(10, 1, &mut ic);
        assert!(ic.is_requested(VECTOR_TIMER[0]));
    }

    #[test]
    fn test_cascade_into_timer1() {
        let mut timers = Timers::new();
        let mut ic = InterruptController::new();
        // Timer 0 on T1 compare 1, timer 1 counts timer 0 matches, compare 3
        timers.write(0x24, 0x01);
        timers.write(0x22, 1);
        timers.write(0x23, 3);
        timers.write(0x20, 0x83);

        timers.tick(16, 0, &mut ic);
        assert!(!ic.is_requested(VECTOR_TIMER[1]));
        timers.tick(8, 0, &mut ic);
        assert!(ic.is_requested(VECTOR_TIMER[1]));
    }

    #[test]
    fn test_stopping_clears_counter() {
        let mut timers = Timers::new();
        let mut ic = InterruptController::new();
        timers.write(0x28, 0x01);
        timers.write(0x26, 4);
        timers.write(0x20, 0x84);
        timers.tick(24, 0, &mut ic);
        timers.write(0x20, 0x80);
        timers.write(0x20, 0x84);
        timers.tick(8, 0, &mut ic);
        assert!(!ic.is_requested(VECTOR_TIMER[2]));
    }
}
