//! Helpers shared by the integration tests: a tiny assembler for the handful
//! of TLCS-900/H instructions the test cartridges need.

#![allow(dead_code)]

use emu_ngpc::{CoreConfig, NgpcSystem};

pub const ENTRY: u32 = 0x20_0040;

/// Background palette entry 0 in colour mode
pub const BACKGROUND_COLOR: u32 = 0x83E0;

#[derive(Default)]
pub struct Program {
    code: Vec<u8>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// EI n
    pub fn ei(mut self, level: u8) -> Self {
        self.code.extend_from_slice(&[0x06, level]);
        self
    }

    /// LD (n),n on the I/O page
    pub fn ld_io(mut self, addr: u8, val: u8) -> Self {
        self.code.extend_from_slice(&[0x08, addr, val]);
        self
    }

    /// LD (nnn),n
    pub fn ld_mem(mut self, addr: u32, val: u8) -> Self {
        let [lo, mid, hi, _] = addr.to_le_bytes();
        self.code.extend_from_slice(&[0xF2, lo, mid, hi, 0x00, val]);
        self
    }

    /// LDW (nnn),nn
    pub fn ldw_mem(mut self, addr: u32, val: u16) -> Self {
        let [lo, mid, hi, _] = addr.to_le_bytes();
        let [vlo, vhi] = val.to_le_bytes();
        self.code.extend_from_slice(&[0xF2, lo, mid, hi, 0x02, vlo, vhi]);
        self
    }

    /// Program one flash byte through the AMD command sequence.
    pub fn flash_program(self, addr: u32, val: u8) -> Self {
        let chip = addr & !0x1F_FFFF;
        self.ld_mem(chip + 0x5555, 0xAA)
            .ld_mem(chip + 0x2AAA, 0x55)
            .ld_mem(chip + 0x5555, 0xA0)
            .ld_mem(addr, val)
    }

    /// JR T,$
    pub fn spin(mut self) -> Self {
        self.code.extend_from_slice(&[0x68, 0xFE]);
        self
    }

    /// Wrap the program in a licensed colour cartridge of `len` bytes.
    pub fn cartridge(&self, len: usize) -> Vec<u8> {
        let mut image = vec![0xFF; len];
        image[0..28].copy_from_slice(b"COPYRIGHT BY SNK CORPORATION");
        image[0x1C..0x20].copy_from_slice(&ENTRY.to_le_bytes());
        image[0x20..0x22].copy_from_slice(&0x0042u16.to_le_bytes());
        image[0x22] = 1;
        image[0x23] = 0x10;
        image[0x24..0x30].copy_from_slice(b"INTEGRATION ");
        image[0x40..0x40 + self.code.len()].copy_from_slice(&self.code);
        image
    }
}

/// Red background, a steady DAC tone, VBlank interrupts on, then spin.
pub fn demo_program() -> Program {
    Program::new()
        .ei(0)
        .ldw_mem(BACKGROUND_COLOR, 0x000F)
        .ld_io(0xA2, 0xC0)
        .ld_io(0xA3, 0x40)
        .ld_io(0xB8, 0xAA)
        .spin()
}

pub fn boot(image: &[u8]) -> NgpcSystem {
    NgpcSystem::load_content(image, None, CoreConfig::default()).expect("load")
}

/// Frame and audio output of one scheduled frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub pixels: Vec<u16>,
    pub audio: Vec<i16>,
    pub painted: bool,
}

pub fn run(sys: &mut NgpcSystem, frames: usize, input: impl Fn(usize) -> u8) -> Vec<Output> {
    use emu_core::System;

    (0..frames)
        .map(|i| {
            sys.poll_input(input(i));
            let result = sys.step_frame().expect("frame");
            Output {
                pixels: sys.read_framebuffer().pixels.clone(),
                audio: sys.audio().to_vec(),
                painted: result.painted,
            }
        })
        .collect()
}
