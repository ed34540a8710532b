//! Memory bus for the Neo Geo Pocket
//!
//! # Memory Map
//!
//! - `0x000000-0x00009F`: special function registers (I/O)
//! - `0x0000A0-0x0000A3`: sound ports (T6W28 right/left, DAC left/right)
//! - `0x0000A4-0x0000FF`: special function registers (I/O)
//! - `0x004000-0x006FFF`: work RAM (BIOS variables from 0x6C00)
//! - `0x007000-0x007FFF`: sound RAM shared with the sound CPU
//! - `0x008000-0x00BFFF`: K2GE registers and video memory
//! - `0x200000-0x3FFFFF`: cartridge flash, chip select 0
//! - `0x800000-0x9FFFFF`: cartridge flash, chip select 1 (when present)
//! - `0xFF0000-0xFFFFFF`: BIOS ROM
//!
//! Anything else reads as [`OPEN_BUS`] and ignores writes.
//!
//! Regions are held in an ordered table and looked up by binary search.
//! Device regions carry a [`Device`] record and the bus hands the access to
//! that engine; it never decodes device registers itself.

use crate::bios;
use crate::cartridge::{CHIP_WINDOW, CS0_BASE, CS1_BASE};
use crate::flash::Flash;
use crate::interrupts::VECTOR_VBLANK;
use crate::io::{Io, REG_SOUND_ENABLE};
use crate::k2ge::{K2ge, VIDEO_BASE, VIDEO_SIZE};
use crate::sound::SoundEngine;
use emu_core::cpu_tlcs900h::{InterruptRequest, MemoryTlcs900h, Registers, ADDRESS_MASK};
use emu_core::logging::{log, LogCategory, LogLevel};

/// Value read from unmapped addresses
pub const OPEN_BUS: u8 = 0xFF;

pub const WORK_RAM_BASE: u32 = 0x4000;
pub const WORK_RAM_SIZE: usize = 0x3000;
pub const SOUND_RAM_BASE: u32 = 0x7000;
pub const SOUND_RAM_SIZE: usize = 0x1000;
const SOUND_PORTS: u32 = 0xA0;

/// Engine that owns a device region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Io,
    Sound,
    Video,
}

/// Backing store for a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    WorkRam,
    SoundRam,
    /// Flash chip by chip-select index
    Flash(usize),
    Bios,
    Device(Device),
}

/// Inclusive address range and what backs it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u32,
    pub end: u32,
    pub kind: RegionKind,
}

impl Region {
    const fn new(start: u32, end: u32, kind: RegionKind) -> Self {
        Self { start, end, kind }
    }

    pub fn contains(&self, addr: u32) -> bool {
        (self.start..=self.end).contains(&addr)
    }
}

/// Region table for a cartridge with `chips` flash chips
fn memory_map(chips: usize) -> Vec<Region> {
    let window = CHIP_WINDOW as u32;
    let mut regions = vec![
        Region::new(0x0000, SOUND_PORTS - 1, RegionKind::Device(Device::Io)),
        Region::new(SOUND_PORTS, SOUND_PORTS + 3, RegionKind::Device(Device::Sound)),
        Region::new(SOUND_PORTS + 4, 0x00FF, RegionKind::Device(Device::Io)),
        Region::new(WORK_RAM_BASE, WORK_RAM_BASE + WORK_RAM_SIZE as u32 - 1, RegionKind::WorkRam),
        Region::new(SOUND_RAM_BASE, SOUND_RAM_BASE + SOUND_RAM_SIZE as u32 - 1, RegionKind::SoundRam),
        Region::new(VIDEO_BASE, VIDEO_BASE + VIDEO_SIZE as u32 - 1, RegionKind::Device(Device::Video)),
        Region::new(CS0_BASE, CS0_BASE + window - 1, RegionKind::Flash(0)),
    ];
    if chips > 1 {
        regions.push(Region::new(CS1_BASE, CS1_BASE + window - 1, RegionKind::Flash(1)));
    }
    regions.push(Region::new(bios::BIOS_BASE, ADDRESS_MASK, RegionKind::Bios));
    regions
}

/// Neo Geo Pocket memory bus. Owns every device by value.
#[derive(Debug, Clone)]
pub struct NgpBus {
    regions: Vec<Region>,
    pub work_ram: Vec<u8>,
    pub sound_ram: Vec<u8>,
    pub io: Io,
    pub sound: SoundEngine,
    pub video: K2ge,
    pub flash: Flash,
    bios: Vec<u8>,
    shutdown_requested: bool,
}

impl NgpBus {
    pub fn new(flash: Flash, sample_rate: u32) -> Self {
        Self {
            regions: memory_map(flash.chip_count()),
            work_ram: vec![0; WORK_RAM_SIZE],
            sound_ram: vec![0; SOUND_RAM_SIZE],
            io: Io::new(),
            sound: SoundEngine::new(sample_rate),
            video: K2ge::new(),
            flash,
            bios: bios::build_rom(),
            shutdown_requested: false,
        }
    }

    /// Power-on state for everything but flash
    pub fn reset(&mut self) {
        self.work_ram.fill(0);
        self.sound_ram.fill(0);
        self.io.reset();
        self.sound.reset();
        self.video.reset();
        self.shutdown_requested = false;
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Region claiming `addr`, if any
    pub fn region_at(&self, addr: u32) -> Option<&Region> {
        let i = self.regions.partition_point(|r| r.end < addr);
        self.regions.get(i).filter(|r| r.start <= addr)
    }

    pub fn set_input(&mut self, buttons: u8) {
        self.io.set_input(buttons);
    }

    pub fn input(&self) -> u8 {
        self.io.input()
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    /// The game asked the BIOS to power off
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub(crate) fn set_shutdown_requested(&mut self, requested: bool) {
        self.shutdown_requested = requested;
    }

    fn device_read(&self, device: Device, addr: u32) -> u8 {
        match device {
            Device::Io => self.io.read(addr as u8),
            Device::Sound => self.sound.read_port((addr - SOUND_PORTS) as u8),
            Device::Video => self.video.read((addr - VIDEO_BASE) as usize),
        }
    }

    fn device_write(&mut self, device: Device, addr: u32, val: u8) {
        match device {
            Device::Io => {
                self.io.write(addr as u8, val);
                if addr as u8 == REG_SOUND_ENABLE {
                    self.sound.set_dac_replaces(self.io.dac_replaces_psg());
                }
            }
            Device::Sound => self.sound.write_port((addr - SOUND_PORTS) as u8, val),
            Device::Video => self.video.write((addr - VIDEO_BASE) as usize, val),
        }
    }
}

impl MemoryTlcs900h for NgpBus {
    fn read8(&mut self, addr: u32) -> u8 {
        let addr = addr & ADDRESS_MASK;
        let Some(&Region { start, kind, .. }) = self.region_at(addr) else {
            return OPEN_BUS;
        };
        let offset = addr - start;
        match kind {
            RegionKind::WorkRam => self.work_ram[offset as usize],
            RegionKind::SoundRam => self.sound_ram[offset as usize],
            RegionKind::Flash(chip) => self.flash.read(chip, offset),
            RegionKind::Bios => self.bios[offset as usize],
            RegionKind::Device(device) => self.device_read(device, addr),
        }
    }

    fn write8(&mut self, addr: u32, val: u8) {
        let addr = addr & ADDRESS_MASK;
        let Some(&Region { start, kind, .. }) = self.region_at(addr) else {
            log(LogCategory::Bus, LogLevel::Trace, || {
                format!("write {val:02X} to unmapped {addr:06X}")
            });
            return;
        };
        let offset = addr - start;
        match kind {
            RegionKind::WorkRam => self.work_ram[offset as usize] = val,
            RegionKind::SoundRam => self.sound_ram[offset as usize] = val,
            RegionKind::Flash(chip) => self.flash.write(chip, offset, val),
            RegionKind::Bios => {}
            RegionKind::Device(device) => self.device_write(device, addr, val),
        }
    }

    fn tick(&mut self, cycles: u32) {
        let events = self.video.tick(cycles);
        self.io.tick(cycles, events.hblanks);
        if events.vblank_irq {
            self.io.interrupts.raise(VECTOR_VBLANK);
        }
        self.sound.step(cycles);
    }

    fn set_render_skip(&mut self, skip: bool) {
        self.video.set_render_skip(skip);
    }

    fn pending_interrupt(&mut self, mask: u8) -> Option<InterruptRequest> {
        self.io.interrupts.pending(mask)
    }

    fn acknowledge_interrupt(&mut self, vector: u8) {
        self.io.interrupts.acknowledge(vector);
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("interrupt {vector:02X} accepted")
        });
    }

    fn take_dma_request(&mut self) -> Option<usize> {
        self.io.interrupts.take_dma_request()
    }

    fn raise_dma_end(&mut self, channel: usize) {
        self.io.interrupts.dma_end(channel);
    }

    fn hle_trap(&mut self, regs: &mut Registers) -> Option<u32> {
        bios::trap(self, regs)
    }
}
