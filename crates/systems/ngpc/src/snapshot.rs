//! Machine snapshots
//!
//! The payload is every piece of mutable machine state in a fixed order:
//! CPU, work RAM, sound RAM, I/O devices, flash, sound engine, display.
//! Saving borrows the live state; loading decodes into owned values, checks
//! them against the running machine and only then swaps them in.

use crate::bus::NgpBus;
use crate::flash::Flash;
use crate::io::Io;
use crate::k2ge::K2ge;
use crate::sound::SoundEngine;
use emu_core::cpu_tlcs900h::{CpuState, CpuTlcs900h, ADDRESS_MASK};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::snapshot::{SnapshotError, SnapshotFormat};
use serde::{Deserialize, Serialize};

pub const FORMAT: SnapshotFormat = SnapshotFormat {
    magic: *b"NGPS",
    version: 1,
};

#[derive(Serialize)]
struct MachineStateRef<'a> {
    cpu: CpuState,
    work_ram: &'a [u8],
    sound_ram: &'a [u8],
    io: &'a Io,
    flash: &'a Flash,
    sound: &'a SoundEngine,
    video: &'a K2ge,
    shutdown: bool,
}

#[derive(Deserialize)]
struct MachineState {
    cpu: CpuState,
    work_ram: Vec<u8>,
    sound_ram: Vec<u8>,
    io: Io,
    flash: Flash,
    sound: SoundEngine,
    video: K2ge,
    shutdown: bool,
}

impl<'a> MachineStateRef<'a> {
    fn capture(cpu: &'a CpuTlcs900h<NgpBus>) -> Self {
        let bus = &cpu.memory;
        Self {
            cpu: cpu.save_state(),
            work_ram: &bus.work_ram,
            sound_ram: &bus.sound_ram,
            io: &bus.io,
            flash: &bus.flash,
            sound: &bus.sound,
            video: &bus.video,
            shutdown: bus.shutdown_requested(),
        }
    }
}

impl MachineState {
    /// Reject states whose shape cannot belong to the running machine.
    fn check(&self, bus: &NgpBus) -> Result<(), SnapshotError> {
        let mismatch = |what: &str| Err(SnapshotError::ContentMismatch(what.to_string()));
        if self.work_ram.len() != bus.work_ram.len() {
            return mismatch("work RAM size");
        }
        if self.sound_ram.len() != bus.sound_ram.len() {
            return mismatch("sound RAM size");
        }
        if !self.flash.same_layout(&bus.flash) {
            return mismatch("flash layout");
        }
        if !self.io.is_well_formed() {
            return mismatch("I/O registers");
        }
        if !self.sound.is_well_formed(bus.sound.sample_rate()) {
            return mismatch("sound engine");
        }
        if !self.video.is_well_formed() {
            return mismatch("display engine");
        }
        if self.cpu.regs.pc & !ADDRESS_MASK != 0 {
            return mismatch("program counter");
        }
        Ok(())
    }
}

/// Encoded size for the machine as it stands. Constant for a loaded cartridge.
pub fn size(cpu: &CpuTlcs900h<NgpBus>) -> Result<usize, SnapshotError> {
    FORMAT.encoded_len(&MachineStateRef::capture(cpu))
}

pub fn save(cpu: &CpuTlcs900h<NgpBus>, buf: &mut [u8]) -> Result<(), SnapshotError> {
    FORMAT.encode_into(&MachineStateRef::capture(cpu), buf)
}

/// Restore a snapshot. On error the machine is left as it was.
pub fn load(cpu: &mut CpuTlcs900h<NgpBus>, buf: &[u8]) -> Result<(), SnapshotError> {
    let state: MachineState = FORMAT.decode(buf)?;
    if let Err(err) = state.check(&cpu.memory) {
        log(LogCategory::Bus, LogLevel::Warn, || format!("rejected snapshot: {err}"));
        return Err(err);
    }

    cpu.load_state(&state.cpu);
    let bus = &mut cpu.memory;
    bus.work_ram = state.work_ram;
    bus.sound_ram = state.sound_ram;
    bus.io = state.io;
    bus.flash = state.flash;
    bus.sound = state.sound;
    bus.video = state.video;
    bus.set_shutdown_requested(state.shutdown);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::tests::test_image;
    use emu_core::cpu_tlcs900h::MemoryTlcs900h;
    use emu_core::snapshot::HEADER_SIZE;

    fn machine(len: usize) -> CpuTlcs900h<NgpBus> {
        CpuTlcs900h::new(NgpBus::new(Flash::from_content(&test_image(len)), 44_100))
    }

    #[test]
    fn test_round_trip_restores_state() {
        let mut cpu = machine(0x1000);
        cpu.regs.pc = 0x20_0040;
        cpu.memory.write8(0x4000, 0x5A);
        cpu.memory.write8(0x7000, 0xA5);
        cpu.memory.write8(0x8004, 100);
        cpu.memory.tick(515 * 3 + 7);

        let mut buf = vec![0; size(&cpu).unwrap()];
        save(&cpu, &mut buf).unwrap();

        let mut other = machine(0x1000);
        load(&mut other, &buf).unwrap();
        assert_eq!(other.regs.pc, 0x20_0040);
        assert_eq!(other.memory.read8(0x4000), 0x5A);
        assert_eq!(other.memory.read8(0x7000), 0xA5);
        assert_eq!(other.memory.read8(0x8004), 100);
        assert_eq!(other.memory.video.line(), 3);
        assert_eq!(other.memory.io, cpu.memory.io);
    }

    #[test]
    fn test_size_is_stable() {
        let mut cpu = machine(0x1000);
        let before = size(&cpu).unwrap();
        cpu.memory.tick(100_000);
        cpu.memory.write8(0x4100, 1);
        assert_eq!(size(&cpu).unwrap(), before);
        assert!(before > HEADER_SIZE + 0x4000);
    }

    #[test]
    fn test_rejects_other_cartridge() {
        let small = machine(0x1000);
        let buf = FORMAT.encode(&MachineStateRef::capture(&small)).unwrap();

        let mut large = machine(0x10_0000);
        large.memory.write8(0x4000, 0x33);
        let err = load(&mut large, &buf).unwrap_err();
        assert!(matches!(err, SnapshotError::ContentMismatch(_)));
        assert_eq!(large.memory.read8(0x4000), 0x33);
    }

    #[test]
    fn test_rejects_bad_header() {
        let cpu = machine(0x1000);
        let mut buf = vec![0; size(&cpu).unwrap()];
        save(&cpu, &mut buf).unwrap();

        let mut tagged = buf.clone();
        tagged[0] = b'X';
        let mut target = machine(0x1000);
        assert!(matches!(load(&mut target, &tagged), Err(SnapshotError::BadMagic { .. })));

        buf[4] = 9;
        assert!(matches!(load(&mut target, &buf), Err(SnapshotError::VersionMismatch { .. })));
        assert!(matches!(load(&mut target, &buf[..8]), Err(SnapshotError::SizeMismatch { .. })));
    }
}
