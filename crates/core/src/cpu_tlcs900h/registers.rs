//! TLCS-900/H register file.
//!
//! Four banks of XWA/XBC/XDE/XHL (selected by RFP in SR) plus the shared
//! XIX/XIY/XIZ/XSP. Instructions address registers three ways:
//!
//! - **3-bit byte codes**: 0=W 1=A 2=B 3=C 4=D 5=E 6=H 7=L (current bank)
//! - **3-bit word/long codes**: 0=WA 1=BC 2=DE 3=HL 4=IX 5=IY 6=IZ 7=SP
//! - **8-bit extended codes**: any byte of any bank, see [`Registers::ext_read`]

use serde::{Deserialize, Serialize};

pub const FLAG_S: u8 = 0x80;
pub const FLAG_Z: u8 = 0x40;
pub const FLAG_H: u8 = 0x10;
pub const FLAG_V: u8 = 0x04;
pub const FLAG_N: u8 = 0x02;
pub const FLAG_C: u8 = 0x01;

/// SR after reset: system mode, IFF = 7, MAX, bank 0.
pub const SR_RESET: u16 = 0xF800;

const SR_IFF_SHIFT: u16 = 12;
const SR_RFP_SHIFT: u16 = 8;

/// Operand width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
    Long,
}

impl Width {
    pub const fn index(self) -> usize {
        match self {
            Width::Byte => 0,
            Width::Word => 1,
            Width::Long => 2,
        }
    }

    pub const fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Long => 4,
        }
    }

    pub const fn bits(self) -> u32 {
        self.bytes() * 8
    }

    pub const fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
            Width::Long => 0xFFFF_FFFF,
        }
    }

    pub const fn sign(self) -> u32 {
        match self {
            Width::Byte => 0x80,
            Width::Word => 0x8000,
            Width::Long => 0x8000_0000,
        }
    }

    /// Sign-extend a value of this width to 32 bits
    pub const fn sign_extend(self, v: u32) -> u32 {
        match self {
            Width::Byte => v as u8 as i8 as i32 as u32,
            Width::Word => v as u16 as i16 as i32 as u32,
            Width::Long => v,
        }
    }

    /// The width twice as wide, used by multiply and divide results
    pub const fn doubled(self) -> Width {
        match self {
            Width::Byte => Width::Word,
            _ => Width::Long,
        }
    }
}

/// One micro-DMA channel's control registers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmaChannel {
    pub source: u32,
    pub dest: u32,
    pub count: u16,
    pub mode: u8,
}

/// Storage location named by an extended register code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Bank(usize, usize),
    Index(usize),
}

/// Complete programmer-visible register state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// XWA, XBC, XDE, XHL for each of the four banks
    pub banks: [[u32; 4]; 4],
    /// XIX, XIY, XIZ, XSP
    pub index: [u32; 4],
    pub pc: u32,
    pub sr: u16,
    /// Shadow flag register swapped by `EX F,F'`
    pub f_alt: u8,
    pub dma: [DmaChannel; 4],
    pub int_nest: u16,
}

impl Registers {
    pub fn new() -> Self {
        Self {
            banks: [[0; 4]; 4],
            index: [0; 4],
            pc: 0,
            sr: SR_RESET,
            f_alt: 0,
            dma: [DmaChannel::default(); 4],
            int_nest: 0,
        }
    }

    pub fn flags(&self) -> u8 {
        self.sr as u8
    }

    pub fn set_flags(&mut self, f: u8) {
        self.sr = (self.sr & 0xFF00) | f as u16;
    }

    pub fn flag(&self, mask: u8) -> bool {
        self.flags() & mask != 0
    }

    pub fn set_flag(&mut self, mask: u8, on: bool) {
        let f = if on {
            self.flags() | mask
        } else {
            self.flags() & !mask
        };
        self.set_flags(f);
    }

    /// Interrupt mask level (0 = accept all, 7 = only level 7)
    pub fn iff(&self) -> u8 {
        ((self.sr >> SR_IFF_SHIFT) & 7) as u8
    }

    pub fn set_iff(&mut self, level: u8) {
        self.sr = (self.sr & !(7 << SR_IFF_SHIFT)) | (((level & 7) as u16) << SR_IFF_SHIFT);
    }

    /// Register file pointer (current bank)
    pub fn rfp(&self) -> usize {
        ((self.sr >> SR_RFP_SHIFT) & 3) as usize
    }

    pub fn set_rfp(&mut self, bank: u8) {
        self.sr = (self.sr & !(7 << SR_RFP_SHIFT)) | (((bank & 3) as u16) << SR_RFP_SHIFT);
    }

    /// Replace SR as a whole (POP SR, RETI); keeps unused RFP bit clear.
    pub fn load_sr(&mut self, sr: u16) {
        self.sr = sr & !(4 << SR_RFP_SHIFT);
    }

    pub fn xsp(&self) -> u32 {
        self.index[3]
    }

    pub fn set_xsp(&mut self, v: u32) {
        self.index[3] = v;
    }

    /// 32-bit register by 3-bit code
    pub fn reg32(&self, code: u8) -> u32 {
        let code = (code & 7) as usize;
        if code < 4 {
            self.banks[self.rfp()][code]
        } else {
            self.index[code - 4]
        }
    }

    pub fn set_reg32(&mut self, code: u8, v: u32) {
        let code = (code & 7) as usize;
        if code < 4 {
            let bank = self.rfp();
            self.banks[bank][code] = v;
        } else {
            self.index[code - 4] = v;
        }
    }

    pub fn reg16(&self, code: u8) -> u16 {
        self.reg32(code) as u16
    }

    pub fn set_reg16(&mut self, code: u8, v: u16) {
        let old = self.reg32(code);
        self.set_reg32(code, (old & 0xFFFF_0000) | v as u32);
    }

    /// Byte register by 3-bit code; even codes are the high byte of the pair.
    pub fn reg8(&self, code: u8) -> u8 {
        let pair = self.banks[self.rfp()][((code >> 1) & 3) as usize];
        if code & 1 == 0 {
            (pair >> 8) as u8
        } else {
            pair as u8
        }
    }

    pub fn set_reg8(&mut self, code: u8, v: u8) {
        let bank = self.rfp();
        let pair = &mut self.banks[bank][((code >> 1) & 3) as usize];
        if code & 1 == 0 {
            *pair = (*pair & 0xFFFF_00FF) | ((v as u32) << 8);
        } else {
            *pair = (*pair & 0xFFFF_FF00) | v as u32;
        }
    }

    pub fn reg(&self, code: u8, width: Width) -> u32 {
        match width {
            Width::Byte => self.reg8(code) as u32,
            Width::Word => self.reg16(code) as u32,
            Width::Long => self.reg32(code),
        }
    }

    pub fn set_reg(&mut self, code: u8, width: Width, v: u32) {
        match width {
            Width::Byte => self.set_reg8(code, v as u8),
            Width::Word => self.set_reg16(code, v as u16),
            Width::Long => self.set_reg32(code, v),
        }
    }

    fn ext_slot(&self, code: u8) -> Slot {
        let reg = ((code >> 2) & 3) as usize;
        match code {
            0x00..=0x3F => Slot::Bank((code >> 4) as usize, reg),
            0xD0..=0xDF => Slot::Bank((self.rfp() + 3) & 3, reg),
            0xF0..=0xFF => Slot::Index(reg),
            // 0xE0..=0xEF is the current bank; other codes are reserved and alias it.
            _ => Slot::Bank(self.rfp(), reg),
        }
    }

    fn slot(&mut self, slot: Slot) -> &mut u32 {
        match slot {
            Slot::Bank(bank, reg) => &mut self.banks[bank][reg],
            Slot::Index(reg) => &mut self.index[reg],
        }
    }

    fn ext_shift(code: u8, width: Width) -> u32 {
        match width {
            Width::Byte => (code & 3) as u32 * 8,
            Width::Word => (code & 2) as u32 * 8,
            Width::Long => 0,
        }
    }

    /// Read through an 8-bit extended register code.
    ///
    /// `0x00-0x3F` address bank `code >> 4`, `0xD0-0xDF` the previous bank,
    /// `0xE0-0xEF` the current bank and `0xF0-0xFF` XIX..XSP. Bits 3-2 pick
    /// the register and bits 1-0 the byte within it.
    pub fn ext_read(&self, code: u8, width: Width) -> u32 {
        let value = match self.ext_slot(code) {
            Slot::Bank(bank, reg) => self.banks[bank][reg],
            Slot::Index(reg) => self.index[reg],
        };
        (value >> Self::ext_shift(code, width)) & width.mask()
    }

    pub fn ext_write(&mut self, code: u8, width: Width, v: u32) {
        let shift = Self::ext_shift(code, width);
        let mask = width.mask() << shift;
        let slot = self.ext_slot(code);
        let cell = self.slot(slot);
        *cell = (*cell & !mask) | ((v << shift) & mask);
    }

    /// Read a control register (`LDC r,cr`)
    pub fn control_read(&self, cr: u8, width: Width) -> u32 {
        let ch = ((cr >> 2) & 3) as usize;
        let value = match cr {
            0x00..=0x0F => self.dma[ch].source,
            0x10..=0x1F => self.dma[ch].dest,
            0x20..=0x2F if cr & 2 == 0 => self.dma[ch].count as u32,
            0x20..=0x2F => self.dma[ch].mode as u32,
            0x3C..=0x3F => self.int_nest as u32,
            _ => 0,
        };
        value & width.mask()
    }

    /// Write a control register (`LDC cr,r`)
    pub fn control_write(&mut self, cr: u8, width: Width, v: u32) {
        let ch = ((cr >> 2) & 3) as usize;
        let v = v & width.mask();
        match cr {
            0x00..=0x0F => self.dma[ch].source = v & 0xFF_FFFF,
            0x10..=0x1F => self.dma[ch].dest = v & 0xFF_FFFF,
            0x20..=0x2F if cr & 2 == 0 => self.dma[ch].count = v as u16,
            0x20..=0x2F => self.dma[ch].mode = v as u8,
            0x3C..=0x3F => self.int_nest = v as u16,
            _ => {}
        }
    }

    /// Evaluate a 4-bit condition code against the current flags
    pub fn condition(&self, cc: u8) -> bool {
        let s = self.flag(FLAG_S);
        let z = self.flag(FLAG_Z);
        let v = self.flag(FLAG_V);
        let c = self.flag(FLAG_C);
        match cc & 0x0F {
            0x0 => false,
            0x1 => s ^ v,
            0x2 => (s ^ v) || z,
            0x3 => c || z,
            0x4 => v,
            0x5 => s,
            0x6 => z,
            0x7 => c,
            0x8 => true,
            0x9 => !(s ^ v),
            0xA => !((s ^ v) || z),
            0xB => !(c || z),
            0xC => !v,
            0xD => !s,
            0xE => !z,
            _ => !c,
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
