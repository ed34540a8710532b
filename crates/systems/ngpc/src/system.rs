//! Neo Geo Pocket main system implementation

use crate::bios;
use crate::bus::NgpBus;
use crate::cartridge::{CartridgeHeader, LoadError};
use crate::config::{ConfigError, CoreConfig};
use crate::flash::Flash;
use crate::k2ge::{SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::snapshot;
use crate::{CYCLES_PER_FRAME, FRAME_RATE_HZ};
use emu_core::cpu_tlcs900h::CpuTlcs900h;
use emu_core::frameskip::{samples_per_frame, AudioBufferStatus, FrameSkipper, SkipPolicy};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::snapshot::SnapshotError;
use emu_core::types::{AudioSample, Frame, FrameResult};
use emu_core::System;
use serde_json::Value;
use thiserror::Error;

/// NGPC emulator errors
#[derive(Debug, Error)]
pub enum NgpcError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Neo Geo Pocket / Neo Geo Pocket Color emulator
pub struct NgpcSystem {
    cpu: CpuTlcs900h<NgpBus>,
    header: CartridgeHeader,
    config: CoreConfig,
    skipper: FrameSkipper,
    audio_status: AudioBufferStatus,
    frame: Frame,
    audio: Vec<AudioSample>,
}

impl NgpcSystem {
    /// Validate a cartridge image, apply optional save data and boot it.
    pub fn load_content(image: &[u8], save: Option<&[u8]>, config: CoreConfig) -> Result<Self, NgpcError> {
        config.validate()?;
        let header = CartridgeHeader::parse(image)?;

        let mut flash = Flash::from_content(image);
        if let Some(save) = save {
            flash.load_save(save)?;
        }

        log(LogCategory::Bus, LogLevel::Info, || {
            format!(
                "loaded \"{}\" ({} bytes, {}, entry {:06X})",
                header.title,
                image.len(),
                if header.color { "colour" } else { "monochrome" },
                header.entry_point
            )
        });

        let mut system = Self {
            cpu: CpuTlcs900h::new(NgpBus::new(flash, config.sample_rate)),
            header,
            config,
            skipper: FrameSkipper::new(),
            audio_status: AudioBufferStatus::default(),
            frame: Frame::new(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32),
            audio: Vec::new(),
        };
        system.boot();
        Ok(system)
    }

    fn boot(&mut self) {
        self.cpu.reset();
        bios::boot(&mut self.cpu.memory, &mut self.cpu.regs, &self.header, self.config.language);
    }

    /// Run `budget` CPU states, paint unless the frame is skipped, and pull
    /// one frame's worth of audio.
    pub fn run_frame(&mut self, budget: u32, policy: &SkipPolicy) -> FrameResult {
        let skip = self.skipper.decide(policy, &self.audio_status);
        let cycles = self.cpu.execute(budget, skip);
        if !skip {
            self.paint();
        }

        let samples = samples_per_frame(self.config.sample_rate, FRAME_RATE_HZ);
        self.audio.resize(samples * 2, 0);
        self.cpu.memory.sound.render(&mut self.audio);

        FrameResult {
            painted: !skip,
            cycles,
        }
    }

    /// Copy the last completed display frame into the framebuffer.
    pub fn paint(&mut self) -> &Frame {
        self.cpu.memory.video.paint(&mut self.frame, self.config.dark_filter_level);
        &self.frame
    }

    /// 160x152 RGB565 pixels from the last paint
    pub fn read_framebuffer(&self) -> &Frame {
        &self.frame
    }

    /// Up to `count` interleaved stereo frames from the last `run_frame`
    pub fn read_audio(&self, count: usize) -> &[AudioSample] {
        &self.audio[..(count * 2).min(self.audio.len())]
    }

    /// Button state for the next frame, see [`crate::input`]
    pub fn poll_input(&mut self, buttons: u8) {
        self.cpu.memory.set_input(buttons);
    }

    /// Host audio buffer state used by the frame-skip policy
    pub fn set_audio_status(&mut self, status: AudioBufferStatus) {
        self.audio_status = status;
    }

    /// Snapshot size in bytes; constant for the loaded cartridge.
    /// Returns 0 and logs if the state cannot be encoded.
    pub fn snapshot_size(&self) -> usize {
        match self.try_snapshot_size() {
            Ok(size) => size,
            Err(e) => {
                log(LogCategory::Bus, LogLevel::Error, || format!("cannot size snapshot: {e}"));
                0
            }
        }
    }

    /// Like [`Self::snapshot_size`] but reports the encoding error
    pub fn try_snapshot_size(&self) -> Result<usize, SnapshotError> {
        snapshot::size(&self.cpu)
    }

    /// Write the full machine state into `buf`, which must be exactly
    /// `snapshot_size()` bytes.
    pub fn snapshot_save(&self, buf: &mut [u8]) -> Result<(), SnapshotError> {
        snapshot::save(&self.cpu, buf)
    }

    /// Restore a buffer from [`Self::snapshot_save`]. A failed load leaves
    /// the machine unchanged.
    pub fn snapshot_load(&mut self, buf: &[u8]) -> Result<(), SnapshotError> {
        snapshot::load(&mut self.cpu, buf)
    }

    /// Flat flash image to persist, if the game wrote to flash since load or
    /// the previous call.
    pub fn shutdown(&mut self) -> Option<Vec<u8>> {
        self.cpu.memory.flash.flush()
    }

    /// The game called the BIOS power-off routine
    pub fn shutdown_requested(&self) -> bool {
        self.cpu.memory.shutdown_requested()
    }

    /// Read-only view of the machine for inspection
    pub fn bus(&self) -> &NgpBus {
        &self.cpu.memory
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Total CPU states executed since boot
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    /// Get debug information
    pub fn debug_state(&self) -> Value {
        let regs = &self.cpu.regs;
        let bus = &self.cpu.memory;
        serde_json::json!({
            "title": self.header.title,
            "pc": format!("{:06X}", regs.pc),
            "sr": format!("{:04X}", regs.sr),
            "xsp": format!("{:06X}", regs.xsp()),
            "iff": regs.iff(),
            "halted": self.cpu.halted,
            "cycles": self.cpu.cycles,
            "raster_line": bus.video.line(),
            "video_frames": bus.video.frames(),
            "input": bus.input(),
            "queued_samples": bus.sound.queued(),
            "flash_dirty": bus.flash.is_dirty(),
            "shutdown_requested": bus.shutdown_requested(),
            "skipped_in_a_row": self.skipper.consecutive(),
        })
    }
}

impl System for NgpcSystem {
    type Error = NgpcError;

    /// Power cycle. Flash contents survive, as on hardware.
    fn reset(&mut self) {
        self.cpu.memory.reset();
        self.skipper.reset();
        self.audio.clear();
        self.boot();
    }

    fn step_frame(&mut self) -> Result<FrameResult, Self::Error> {
        let policy = self.config.skip_policy();
        Ok(self.run_frame(CYCLES_PER_FRAME, &policy))
    }

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn audio(&self) -> &[AudioSample] {
        &self.audio
    }

    fn state_size(&self) -> usize {
        self.snapshot_size()
    }

    fn save_state(&self, buf: &mut [u8]) -> Result<(), SnapshotError> {
        self.snapshot_save(buf)
    }

    fn load_state(&mut self, buf: &[u8]) -> Result<(), SnapshotError> {
        self.snapshot_load(buf)
    }

    fn supports_save_states(&self) -> bool {
        true
    }
}
