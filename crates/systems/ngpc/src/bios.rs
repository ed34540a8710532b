//! High-level BIOS
//!
//! The BIOS region holds a synthesized image instead of the system ROM.
//! Every entry of the vector table at 0xFFFF00 points at a small stub:
//!
//! ```text
//! 0x1F id 0x07    trap, then RETI
//! ```
//!
//! and every entry of the system call table at 0xFFFE00 at a stub ending in
//! RET instead. The trap opcode lands in [`trap`], which does the work and
//! either returns through the stub's tail or jumps to the game's handler.
//!
//! Interrupts are forwarded through the user vector table in work RAM at
//! 0x6FB8. SWI 1 is the system call entry; RW3 selects the call and RA3
//! receives the result.

use crate::bus::NgpBus;
use crate::cartridge::CartridgeHeader;
use crate::config::Language;
use crate::interrupts::{VECTOR_DMA_END, VECTOR_INT0, VECTOR_INT5, VECTOR_TIMER, VECTOR_VBLANK};
use crate::k2ge::{REG_BACKGROUND, REG_FRAME_RATE, REG_INT_CONTROL, REG_MODE, REG_WINDOW_H, REG_WINDOW_W, VIDEO_BASE};
use emu_core::cpu_tlcs900h::{MemoryTlcs900h, Registers, Width, ADDRESS_MASK, SR_RESET, VECTOR_BASE};
use emu_core::logging::{log, LogCategory, LogLevel};

pub const BIOS_BASE: u32 = 0xFF_0000;
pub const BIOS_SIZE: usize = 0x1_0000;

const INTERRUPT_STUBS: u32 = 0xFF_1000;
const CALL_STUBS: u32 = 0xFF_2000;
const DEFAULT_HANDLER: u32 = 0xFF_3000;
const CALL_TABLE: u32 = 0xFF_FE00;
const CALL_COUNT: u8 = 0x20;

const OP_TRAP: u8 = 0x1F;
const OP_RETI: u8 = 0x07;
const OP_RET: u8 = 0x0E;

/// Trap id bit marking a direct system call stub
const CALL_STUB_FLAG: u8 = 0x80;

/// States charged for a trap, matching the opcode's table entry
const TRAP_COST: u32 = 2;

pub const STACK_TOP: u32 = 0x6C00;
pub const USER_VECTORS: u32 = 0x6FB8;
pub const INPUT_MIRROR: u32 = 0x6F82;
pub const LANGUAGE: u32 = 0x6F87;
const CART_INFO: u32 = 0x6C00;
const BATTERY: u32 = 0x6F80;
const BOOT_MODE: u32 = 0x6F84;
const OS_VERSION: u32 = 0x6F91;
const DISPLAY_MODE: u32 = 0x6F95;

const USER_VECTOR_COUNT: u32 = 18;

/// Result code in RA3
const SYS_SUCCESS: u8 = 0;

/// Bank 3 registers as extended register codes
const RA3: u8 = 0x30;
const RW3: u8 = 0x31;
const RC3: u8 = 0x34;
const BC3: u8 = 0x34;
const RB3: u8 = 0x35;
const XDE3: u8 = 0x38;
const XHL3: u8 = 0x3C;

const SWI1_VECTOR: u8 = 0x04;

/// System calls reachable through SWI 1 or the call table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemCall {
    Shutdown,
    ClockGearSet,
    RtcGet,
    IntLevelSet,
    SysFontSet,
    FlashWrite,
    FlashAllErase,
    FlashErase,
    AlarmSet,
    AlarmDownSet,
    FlashProtect,
    GeModeSet,
}

impl SystemCall {
    pub fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0x00 => SystemCall::Shutdown,
            0x01 => SystemCall::ClockGearSet,
            0x02 => SystemCall::RtcGet,
            0x04 => SystemCall::IntLevelSet,
            0x05 => SystemCall::SysFontSet,
            0x06 => SystemCall::FlashWrite,
            0x07 => SystemCall::FlashAllErase,
            0x08 => SystemCall::FlashErase,
            0x09 => SystemCall::AlarmSet,
            0x0B => SystemCall::AlarmDownSet,
            0x0D => SystemCall::FlashProtect,
            0x0E => SystemCall::GeModeSet,
            _ => return None,
        })
    }
}

/// Slot in the user vector table for an interrupt vector
fn user_slot(vector: u8) -> Option<u32> {
    let slot = match vector {
        0x0C => 0,
        0x10 => 1,
        0x14 => 2,
        0x18 => 3,
        VECTOR_INT0 => 4,
        VECTOR_VBLANK => 5,
        VECTOR_INT5 => 6,
        0x40 => 7,
        0x44 => 8,
        0x48 => 9,
        0x4C => 10,
        0x6C => 11,
        0x68 => 12,
        0x74 => 14,
        0x78 => 15,
        0x7C => 16,
        0x80 => 17,
        _ => return None,
    };
    Some(USER_VECTORS + slot * 4)
}

/// Interrupt source numbers accepted by INTLVSET
fn intlvset_vector(source: u8) -> Option<u8> {
    match source {
        0 => Some(VECTOR_INT0),
        1 => Some(VECTOR_INT5),
        2..=5 => Some(VECTOR_TIMER[(source - 2) as usize]),
        6..=9 => Some(VECTOR_DMA_END[(source - 6) as usize]),
        _ => None,
    }
}

/// Build the 64 KB BIOS image
pub fn build_rom() -> Vec<u8> {
    let mut rom = vec![0xFF; BIOS_SIZE];
    let at = |addr: u32| (addr - BIOS_BASE) as usize;

    for vector in (0..0x100u32).step_by(4) {
        let stub = INTERRUPT_STUBS + vector;
        rom[at(stub)..at(stub) + 3].copy_from_slice(&[OP_TRAP, (vector / 4) as u8, OP_RETI]);
        let entry = at(VECTOR_BASE + vector);
        rom[entry..entry + 4].copy_from_slice(&stub.to_le_bytes());
    }

    for call in 0..CALL_COUNT as u32 {
        let stub = CALL_STUBS + call * 4;
        rom[at(stub)..at(stub) + 3].copy_from_slice(&[OP_TRAP, CALL_STUB_FLAG | call as u8, OP_RET]);
        let entry = at(CALL_TABLE + call * 4);
        rom[entry..entry + 4].copy_from_slice(&stub.to_le_bytes());
    }

    rom[at(DEFAULT_HANDLER)] = OP_RETI;
    rom
}

/// Handle the trap opcode. `regs.pc` points at the stub's id byte.
pub fn trap(bus: &mut NgpBus, regs: &mut Registers) -> Option<u32> {
    let opcode_at = regs.pc.wrapping_sub(1) & ADDRESS_MASK;
    if opcode_at < BIOS_BASE {
        return None;
    }
    let id = bus.read8(regs.pc);
    let tail = (regs.pc + 1) & ADDRESS_MASK;

    if id & CALL_STUB_FLAG != 0 {
        system_call(bus, regs, id & !CALL_STUB_FLAG);
        regs.pc = tail;
        return Some(TRAP_COST);
    }

    let vector = (id & 0x3F) << 2;
    if vector == SWI1_VECTOR {
        let call = regs.ext_read(RW3, Width::Byte) as u8;
        system_call(bus, regs, call);
        regs.pc = tail;
        return Some(TRAP_COST);
    }

    if vector == VECTOR_VBLANK {
        let input = bus.input();
        bus.write8(INPUT_MIRROR, input);
    }

    let handler = user_slot(vector).map_or(0, |slot| bus.read32(slot) & ADDRESS_MASK);
    regs.pc = if handler != 0 { handler } else { tail };
    Some(TRAP_COST)
}

fn system_call(bus: &mut NgpBus, regs: &mut Registers, index: u8) {
    let Some(call) = SystemCall::from_index(index) else {
        log(LogCategory::Stubs, LogLevel::Warn, || {
            format!("unknown BIOS call {index:02X}")
        });
        return;
    };
    log(LogCategory::Bios, LogLevel::Debug, || format!("BIOS call {call:?}"));

    let ra3 = regs.ext_read(RA3, Width::Byte) as u8;
    let rb3 = regs.ext_read(RB3, Width::Byte) as u8;
    let rc3 = regs.ext_read(RC3, Width::Byte) as u8;
    let chip = (ra3 & 1) as usize;

    match call {
        SystemCall::Shutdown => bus.request_shutdown(),
        SystemCall::ClockGearSet | SystemCall::AlarmSet | SystemCall::AlarmDownSet | SystemCall::GeModeSet => {}
        SystemCall::RtcGet => {
            let dest = regs.ext_read(XHL3, Width::Long);
            for (i, byte) in bus.io.rtc.registers().into_iter().enumerate() {
                bus.write8(dest.wrapping_add(i as u32), byte);
            }
        }
        SystemCall::IntLevelSet => match intlvset_vector(rc3) {
            Some(vector) => bus.io.interrupts.set_level(vector, rb3),
            None => log(LogCategory::Bios, LogLevel::Warn, || {
                format!("INTLVSET for unknown source {rc3}")
            }),
        },
        SystemCall::SysFontSet => log(LogCategory::Stubs, LogLevel::Info, || {
            "SYSFONTSET is not implemented".to_string()
        }),
        SystemCall::FlashWrite => {
            let count = regs.ext_read(BC3, Width::Word) * 256;
            let source = regs.ext_read(XHL3, Width::Long);
            let dest = regs.ext_read(XDE3, Width::Long);
            let bytes: Vec<u8> = (0..count).map(|i| bus.read8(source.wrapping_add(i))).collect();
            bus.flash.program_bytes(chip, dest, &bytes);
        }
        SystemCall::FlashAllErase => bus.flash.erase_chip(chip),
        SystemCall::FlashErase => bus.flash.erase_block(chip, rb3 as usize),
        SystemCall::FlashProtect => {
            for block in rb3 as usize..rb3 as usize + rc3 as usize {
                bus.flash.protect_block(chip, block);
            }
        }
    }
    regs.ext_write(RA3, Width::Byte, SYS_SUCCESS as u32);
}

/// Put the machine in the state the real BIOS leaves it in before jumping
/// to the cartridge.
pub fn boot(bus: &mut NgpBus, regs: &mut Registers, header: &CartridgeHeader, language: Language) {
    regs.pc = header.entry_point;
    regs.set_xsp(STACK_TOP);
    regs.load_sr(SR_RESET);

    bus.write32(CART_INFO, header.entry_point);
    bus.write16(CART_INFO + 4, header.game_id);
    bus.write8(CART_INFO + 6, header.version);
    for (i, byte) in header.title.bytes().take(12).enumerate() {
        bus.write8(CART_INFO + 8 + i as u32, byte);
    }

    bus.write8(BATTERY, 0xFF);
    bus.write8(BATTERY + 1, 0x03);
    bus.write8(BOOT_MODE, 0x40);
    bus.write8(LANGUAGE, language.bios_code());
    bus.write8(OS_VERSION, 0x10);
    bus.write8(DISPLAY_MODE, if header.color { 0x10 } else { 0x00 });
    for slot in 0..USER_VECTOR_COUNT {
        bus.write32(USER_VECTORS + slot * 4, DEFAULT_HANDLER);
    }

    let video = |offset: usize| VIDEO_BASE + offset as u32;
    bus.write8(video(REG_INT_CONTROL), 0xC0);
    bus.write8(video(REG_WINDOW_W), 160);
    bus.write8(video(REG_WINDOW_H), 152);
    bus.write8(video(REG_FRAME_RATE), 0xC6);
    bus.write8(video(REG_BACKGROUND), 0x80);
    if !header.color {
        bus.write8(video(REG_MODE), 0x80);
    }

    // VBlank at level 4
    bus.write8(0x71, 0x04);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::tests::test_image;
    use crate::flash::Flash;

    fn setup() -> (NgpBus, Registers) {
        let image = test_image(0x1000);
        let header = CartridgeHeader::parse(&image).unwrap();
        let mut bus = NgpBus::new(Flash::from_content(&image), 44_100);
        let mut regs = Registers::new();
        boot(&mut bus, &mut regs, &header, Language::English);
        (bus, regs)
    }

    /// Position `regs` as the CPU would after fetching the trap at `stub`.
    fn enter_stub(regs: &mut Registers, stub: u32) {
        regs.pc = stub + 1;
    }

    #[test]
    fn test_rom_layout() {
        let (mut bus, _) = setup();
        let stub = bus.read32(VECTOR_BASE + 0x2C);
        assert_eq!(stub, INTERRUPT_STUBS + 0x2C);
        assert_eq!(bus.read8(stub), OP_TRAP);
        assert_eq!(bus.read8(stub + 2), OP_RETI);

        let call = bus.read32(CALL_TABLE + 2 * 4);
        assert_eq!(bus.read8(call + 1), CALL_STUB_FLAG | 2);
        assert_eq!(bus.read8(call + 2), OP_RET);
    }

    #[test]
    fn test_boot_state() {
        let (mut bus, regs) = setup();
        assert_eq!(regs.pc, 0x20_0040);
        assert_eq!(regs.xsp(), STACK_TOP);
        assert_eq!(regs.iff(), 7);
        assert_eq!(bus.read8(LANGUAGE), 1);
        assert_eq!(bus.read8(DISPLAY_MODE), 0x10);
        assert_eq!(bus.read8(0x8000), 0xC0);
        assert_eq!(bus.read8(0x87E2), 0x00);
        assert_eq!(bus.io.interrupts.level(VECTOR_VBLANK), 4);
        assert_eq!(bus.read32(USER_VECTORS + 5 * 4), DEFAULT_HANDLER);
    }

    #[test]
    fn test_trap_outside_bios_is_undefined() {
        let (mut bus, mut regs) = setup();
        regs.pc = 0x20_0041;
        assert_eq!(trap(&mut bus, &mut regs), None);
    }

    #[test]
    fn test_vblank_jumps_to_user_handler() {
        let (mut bus, mut regs) = setup();
        bus.write32(USER_VECTORS + 5 * 4, 0x20_0100);
        bus.set_input(0x12);
        enter_stub(&mut regs, INTERRUPT_STUBS + VECTOR_VBLANK as u32);
        assert_eq!(trap(&mut bus, &mut regs), Some(TRAP_COST));
        assert_eq!(regs.pc, 0x20_0100);
        assert_eq!(bus.read8(INPUT_MIRROR), 0x12);
    }

    #[test]
    fn test_missing_handler_returns() {
        let (mut bus, mut regs) = setup();
        bus.write32(USER_VECTORS + 7 * 4, 0);
        let stub = INTERRUPT_STUBS + VECTOR_TIMER[0] as u32;
        enter_stub(&mut regs, stub);
        trap(&mut bus, &mut regs);
        assert_eq!(regs.pc, stub + 2);

        // Vectors without a user slot return too
        let stub = INTERRUPT_STUBS + 0x20;
        enter_stub(&mut regs, stub);
        trap(&mut bus, &mut regs);
        assert_eq!(regs.pc, stub + 2);
    }

    #[test]
    fn test_swi1_rtcget() {
        let (mut bus, mut regs) = setup();
        regs.ext_write(RW3, Width::Byte, 0x02);
        regs.ext_write(XHL3, Width::Long, 0x5000);
        regs.ext_write(RA3, Width::Byte, 0x77);
        enter_stub(&mut regs, INTERRUPT_STUBS + SWI1_VECTOR as u32);
        trap(&mut bus, &mut regs);
        assert_eq!(bus.read8(0x5001), 0x01);
        assert_eq!(bus.read8(0x5002), 0x01);
        assert_eq!(regs.ext_read(RA3, Width::Byte), SYS_SUCCESS as u32);
    }

    #[test]
    fn test_intlvset() {
        let (mut bus, mut regs) = setup();
        regs.ext_write(RB3, Width::Byte, 5);
        regs.ext_write(RC3, Width::Byte, 3);
        let stub = CALL_STUBS + 4 * 4;
        enter_stub(&mut regs, stub);
        trap(&mut bus, &mut regs);
        assert_eq!(bus.io.interrupts.level(VECTOR_TIMER[1]), 5);
        assert_eq!(regs.pc, stub + 2);
    }

    #[test]
    fn test_flash_calls() {
        let (mut bus, mut regs) = setup();
        bus.write8(0x5000, 0xA5);
        bus.write8(0x50FF, 0x5A);

        regs.ext_write(RA3, Width::Byte, 0);
        regs.ext_write(BC3, Width::Word, 1);
        regs.ext_write(XHL3, Width::Long, 0x5000);
        regs.ext_write(XDE3, Width::Long, 0x7_0000);
        regs.ext_write(RW3, Width::Byte, 0x06);
        enter_stub(&mut regs, INTERRUPT_STUBS + SWI1_VECTOR as u32);
        trap(&mut bus, &mut regs);
        assert_eq!(bus.read8(0x27_0000), 0xA5);
        assert_eq!(bus.read8(0x27_00FF), 0x5A);
        assert!(bus.flash.is_dirty());

        // Block 7 of a 512 KB chip is the 32 KB boot block at 0x70000
        regs.ext_write(RA3, Width::Byte, 0);
        regs.ext_write(RB3, Width::Byte, 7);
        regs.ext_write(RW3, Width::Byte, 0x08);
        enter_stub(&mut regs, INTERRUPT_STUBS + SWI1_VECTOR as u32);
        trap(&mut bus, &mut regs);
        assert_eq!(bus.read8(0x27_0000), 0xFF);
    }

    #[test]
    fn test_shutdown_call() {
        let (mut bus, mut regs) = setup();
        enter_stub(&mut regs, CALL_STUBS);
        trap(&mut bus, &mut regs);
        assert!(bus.shutdown_requested());
    }
}
