//! Sound engine: T6W28 plus DAC, resampled to the host rate
//!
//! The PSG is clocked once every 32 CPU states. Host samples are produced in
//! [`SoundEngine::step`] with an integer phase accumulator: each state adds
//! the emit rate, and a sample is emitted whenever the total passes the CPU
//! clock. The emit rate is the host rate rounded down to a whole number of
//! samples per frame, so one frame of CPU time yields exactly the count the
//! scheduler drains. Each sample is the box-filtered average of the PSG ticks
//! since the previous one, mixed with the DAC.
//!
//! Samples wait in a fixed-capacity ring until [`SoundEngine::render`]
//! drains them. The ring is part of the machine state, so a snapshot
//! restores pending audio too.

use crate::{CPU_CLOCK_HZ, FRAME_RATE_HZ};
use emu_core::apu::{AudioChip, Dac, StereoSample, T6w28};
use emu_core::frameskip::samples_per_frame;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// Stereo frames the ring can hold
pub const RING_CAPACITY: usize = 4096;

/// CPU states per PSG tick
const PSG_DIVIDER: u32 = CPU_CLOCK_HZ / emu_core::apu::t6w28::TICK_RATE_HZ;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundEngine {
    psg: T6w28,
    dac: Dac,
    sample_rate: u32,
    psg_phase: u32,
    sample_phase: u64,
    acc_left: i32,
    acc_right: i32,
    acc_count: u32,
    dac_replaces: bool,
    ring: Vec<StereoSample>,
    head: usize,
    len: usize,
    last: StereoSample,
}

impl SoundEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            psg: T6w28::new(),
            dac: Dac::new(),
            sample_rate: sample_rate.max(1),
            psg_phase: 0,
            sample_phase: 0,
            acc_left: 0,
            acc_right: 0,
            acc_count: 0,
            dac_replaces: false,
            ring: vec![StereoSample::SILENCE; RING_CAPACITY],
            head: 0,
            len: 0,
            last: StereoSample::SILENCE,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.sample_rate);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples emitted per second of CPU time: `samples_per_frame * FRAME_RATE_HZ`
    pub fn emit_rate(&self) -> u32 {
        samples_per_frame(self.sample_rate, FRAME_RATE_HZ) as u32 * FRAME_RATE_HZ
    }

    /// Port write at 0xA0-0xA3
    pub fn write_port(&mut self, port: u8, val: u8) {
        match port & 3 {
            0 => self.psg.write_register(0, val),
            1 => self.psg.write_register(1, val),
            2 => self.dac.write_left(val),
            _ => self.dac.write_right(val),
        }
    }

    /// Last DAC level; PSG ports are write-only
    pub fn read_port(&self, port: u8) -> u8 {
        match port & 3 {
            2 => self.dac.left(),
            3 => self.dac.right(),
            _ => 0xFF,
        }
    }

    pub fn set_dac_replaces(&mut self, replaces: bool) {
        self.dac_replaces = replaces;
    }

    /// Advance by `cycles` CPU states, queueing any host samples that fall due.
    pub fn step(&mut self, cycles: u32) {
        let rate = self.emit_rate().max(1) as u64;
        let clock = CPU_CLOCK_HZ as u64;
        let mut remaining = cycles;

        while remaining > 0 {
            let to_tick = PSG_DIVIDER - self.psg_phase;
            let to_sample = (clock - self.sample_phase).div_ceil(rate);
            let chunk = remaining.min(to_tick).min(to_sample.max(1) as u32);

            remaining -= chunk;
            self.psg_phase += chunk;
            self.sample_phase += chunk as u64 * rate;

            if self.psg_phase >= PSG_DIVIDER {
                self.psg_phase -= PSG_DIVIDER;
                let out = self.psg.clock();
                self.acc_left += out.left as i32;
                self.acc_right += out.right as i32;
                self.acc_count += 1;
            }
            if self.sample_phase >= clock {
                self.sample_phase -= clock;
                let sample = self.mix();
                self.push(sample);
            }
        }
    }

    fn mix(&mut self) -> StereoSample {
        let psg = if self.acc_count == 0 {
            self.psg.output()
        } else {
            let n = self.acc_count as i32;
            StereoSample {
                left: (self.acc_left / n) as i16,
                right: (self.acc_right / n) as i16,
            }
        };
        self.acc_left = 0;
        self.acc_right = 0;
        self.acc_count = 0;

        let dac = self.dac.output();
        if self.dac_replaces {
            dac
        } else {
            psg.saturating_add(dac)
        }
    }

    fn push(&mut self, sample: StereoSample) {
        let tail = (self.head + self.len) % RING_CAPACITY;
        self.ring[tail] = sample;
        if self.len == RING_CAPACITY {
            self.head = (self.head + 1) % RING_CAPACITY;
            log(LogCategory::Sound, LogLevel::Debug, || {
                "sample ring full, dropping oldest".to_string()
            });
        } else {
            self.len += 1;
        }
    }

    /// Samples waiting to be rendered
    pub fn queued(&self) -> usize {
        self.len
    }

    /// Drain `out.len() / 2` stereo frames as interleaved L/R. Underflow
    /// repeats the last sample.
    pub fn render(&mut self, out: &mut [i16]) {
        for frame in out.chunks_exact_mut(2) {
            if self.len > 0 {
                self.last = self.ring[self.head];
                self.head = (self.head + 1) % RING_CAPACITY;
                self.len -= 1;
            }
            frame[0] = self.last.left;
            frame[1] = self.last.right;
        }
    }

    pub fn psg(&self) -> &T6w28 {
        &self.psg
    }

    /// Ring indices, phases and PSG registers are in range for this engine's sample rate
    pub fn is_well_formed(&self, sample_rate: u32) -> bool {
        self.sample_rate == sample_rate
            && self.ring.len() == RING_CAPACITY
            && self.head < RING_CAPACITY
            && self.len <= RING_CAPACITY
            && self.psg_phase < PSG_DIVIDER
            && self.sample_phase < CPU_CLOCK_HZ as u64
            && self.psg.is_well_formed()
    }
}
