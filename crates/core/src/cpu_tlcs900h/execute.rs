//! Fetch, operand resolution and instruction semantics.

use super::alu::{self, AluOp, ShiftOp};
use super::decode::{
    Addr, DstOp, Primary, RegOp, SrcOp, DST_OPS, PRIMARY, REG_OPS, SRC_OPS, UNDEFINED_COST,
};
use super::registers::{Width, FLAG_C, FLAG_H, FLAG_N, FLAG_S, FLAG_V, FLAG_Z};
use super::{CpuTlcs900h, MemoryTlcs900h, ADDRESS_MASK, VECTOR_BASE};
use crate::logging::{log, LogCategory, LogLevel};

/// Register operand named by a prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegRef {
    /// 3-bit code in the current bank
    Code(u8),
    /// 8-bit extended code
    Ext(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MulDiv {
    Mul,
    Muls,
    Div,
    Divs,
}

const REG_A: u8 = 1;
const REG_BC: u8 = 1;

impl<M: MemoryTlcs900h> CpuTlcs900h<M> {
    // --- Fetch and memory helpers ---

    fn fetch8(&mut self) -> u8 {
        let v = self.memory.read8(self.regs.pc);
        self.regs.pc = (self.regs.pc + 1) & ADDRESS_MASK;
        v
    }

    fn fetch16(&mut self) -> u16 {
        let lo = self.fetch8() as u16;
        let hi = self.fetch8() as u16;
        lo | (hi << 8)
    }

    fn fetch24(&mut self) -> u32 {
        let lo = self.fetch16() as u32;
        let hi = self.fetch8() as u32;
        lo | (hi << 16)
    }

    fn fetch32(&mut self) -> u32 {
        let lo = self.fetch16() as u32;
        let hi = self.fetch16() as u32;
        lo | (hi << 16)
    }

    fn fetch_imm(&mut self, width: Width) -> u32 {
        match width {
            Width::Byte => self.fetch8() as u32,
            Width::Word => self.fetch16() as u32,
            Width::Long => self.fetch32(),
        }
    }

    pub(super) fn read_mem(&mut self, addr: u32, width: Width) -> u32 {
        let addr = addr & ADDRESS_MASK;
        match width {
            Width::Byte => self.memory.read8(addr) as u32,
            Width::Word => self.memory.read16(addr) as u32,
            Width::Long => self.memory.read32(addr),
        }
    }

    pub(super) fn write_mem(&mut self, addr: u32, width: Width, v: u32) {
        let addr = addr & ADDRESS_MASK;
        match width {
            Width::Byte => self.memory.write8(addr, v as u8),
            Width::Word => self.memory.write16(addr, v as u16),
            Width::Long => self.memory.write32(addr, v),
        }
    }

    fn push(&mut self, width: Width, v: u32) {
        let sp = self.regs.xsp().wrapping_sub(width.bytes());
        self.regs.set_xsp(sp);
        self.write_mem(sp, width, v);
    }

    fn pop(&mut self, width: Width) -> u32 {
        let sp = self.regs.xsp();
        let v = self.read_mem(sp, width);
        self.regs.set_xsp(sp.wrapping_add(width.bytes()));
        v
    }

    pub(super) fn push16(&mut self, v: u16) {
        self.push(Width::Word, v as u32);
    }

    pub(super) fn push32(&mut self, v: u32) {
        self.push(Width::Long, v);
    }

    fn jump_relative(&mut self, displacement: u32) {
        self.regs.pc = self.regs.pc.wrapping_add(displacement) & ADDRESS_MASK;
    }

    fn read_ref(&self, r: RegRef, width: Width) -> u32 {
        match r {
            RegRef::Code(code) => self.regs.reg(code, width),
            RegRef::Ext(code) => self.regs.ext_read(code, width),
        }
    }

    fn write_ref(&mut self, r: RegRef, width: Width, v: u32) {
        match r {
            RegRef::Code(code) => self.regs.set_reg(code, width, v),
            RegRef::Ext(code) => self.regs.ext_write(code, width, v),
        }
    }

    fn set_flags(&mut self, f: u8) {
        self.regs.set_flags(f);
    }

    fn undefined(&mut self, start: u32, bytes: &[u8]) -> u32 {
        log(LogCategory::Stubs, LogLevel::Warn, || {
            format!("undefined opcode {:02X?} at {:06X}", bytes, start)
        });
        UNDEFINED_COST
    }

    // --- Dispatch ---

    pub(super) fn execute_instruction(&mut self) -> u32 {
        let start = self.regs.pc;
        let opcode = self.fetch8();
        let desc = PRIMARY[opcode as usize];
        let base = desc.cycles[0] as u32;
        let code = opcode & 7;

        match desc.kind {
            Primary::Nop => base,
            Primary::PushSr => {
                let sr = self.regs.sr;
                self.push16(sr);
                base
            }
            Primary::PopSr => {
                let sr = self.pop(Width::Word) as u16;
                self.regs.load_sr(sr);
                base
            }
            Primary::Halt => {
                self.halted = true;
                base
            }
            Primary::Ei => {
                let level = self.fetch8();
                self.regs.set_iff(level);
                base
            }
            Primary::Reti => {
                let sr = self.pop(Width::Word) as u16;
                self.regs.pc = self.pop(Width::Long) & ADDRESS_MASK;
                self.regs.load_sr(sr);
                self.regs.int_nest = self.regs.int_nest.wrapping_sub(1);
                base
            }
            Primary::LdDirectByte => {
                let addr = self.fetch8() as u32;
                let v = self.fetch8();
                self.memory.write8(addr, v);
                base
            }
            Primary::PushImmByte => {
                let v = self.fetch8() as u32;
                self.push(Width::Byte, v);
                base
            }
            Primary::LdDirectWord => {
                let addr = self.fetch8() as u32;
                let v = self.fetch16();
                self.memory.write16(addr, v);
                base
            }
            Primary::PushImmWord => {
                let v = self.fetch16();
                self.push16(v);
                base
            }
            Primary::Incf => {
                let bank = self.regs.rfp() as u8;
                self.regs.set_rfp(bank.wrapping_add(1));
                base
            }
            Primary::Decf => {
                let bank = self.regs.rfp() as u8;
                self.regs.set_rfp(bank.wrapping_sub(1));
                base
            }
            Primary::Ret => {
                self.regs.pc = self.pop(Width::Long) & ADDRESS_MASK;
                base
            }
            Primary::Retd => {
                let d = Width::Word.sign_extend(self.fetch16() as u32);
                self.regs.pc = self.pop(Width::Long) & ADDRESS_MASK;
                let sp = self.regs.xsp().wrapping_add(d);
                self.regs.set_xsp(sp);
                base
            }
            Primary::Rcf => {
                let f = self.regs.flags() & !(FLAG_H | FLAG_N | FLAG_C);
                self.set_flags(f);
                base
            }
            Primary::Scf => {
                let f = (self.regs.flags() & !(FLAG_H | FLAG_N)) | FLAG_C;
                self.set_flags(f);
                base
            }
            Primary::Ccf => {
                let f = self.regs.flags();
                let h = if f & FLAG_C != 0 { FLAG_H } else { 0 };
                self.set_flags(((f & !(FLAG_H | FLAG_N)) | h) ^ FLAG_C);
                base
            }
            Primary::Zcf => {
                let f = self.regs.flags() & !(FLAG_N | FLAG_C);
                let c = if self.regs.flag(FLAG_Z) { 0 } else { FLAG_C };
                self.set_flags(f | c);
                base
            }
            Primary::PushA => {
                let a = self.regs.reg8(REG_A) as u32;
                self.push(Width::Byte, a);
                base
            }
            Primary::PopA => {
                let a = self.pop(Width::Byte) as u8;
                self.regs.set_reg8(REG_A, a);
                base
            }
            Primary::ExFlags => {
                let f = self.regs.flags();
                self.set_flags(self.regs.f_alt);
                self.regs.f_alt = f;
                base
            }
            Primary::Ldf => {
                let bank = self.fetch8();
                self.regs.set_rfp(bank);
                base
            }
            Primary::PushF => {
                let f = self.regs.flags() as u32;
                self.push(Width::Byte, f);
                base
            }
            Primary::PopF => {
                let f = self.pop(Width::Byte) as u8;
                self.set_flags(f);
                base
            }
            Primary::Jp16 => {
                self.regs.pc = self.fetch16() as u32;
                base
            }
            Primary::Jp24 => {
                self.regs.pc = self.fetch24();
                base
            }
            Primary::Call16 | Primary::Call24 => {
                let target = if desc.kind == Primary::Call16 {
                    self.fetch16() as u32
                } else {
                    self.fetch24()
                };
                let ret = self.regs.pc;
                self.push32(ret);
                self.regs.pc = target;
                base
            }
            Primary::Calr => {
                let d = Width::Word.sign_extend(self.fetch16() as u32);
                let ret = self.regs.pc;
                self.push32(ret);
                self.jump_relative(d);
                base
            }
            Primary::BiosTrap => match self.memory.hle_trap(&mut self.regs) {
                Some(cycles) => cycles,
                None => self.undefined(start, &[opcode]),
            },
            Primary::LdRegImm(width) => {
                let v = self.fetch_imm(width);
                self.regs.set_reg(code, width, v);
                base
            }
            Primary::PushReg(width) => {
                let v = self.regs.reg(code, width);
                self.push(width, v);
                base
            }
            Primary::PopReg(width) => {
                let v = self.pop(width);
                self.regs.set_reg(code, width, v);
                base
            }
            Primary::Jr | Primary::Jrl => {
                let d = if desc.kind == Primary::Jr {
                    Width::Byte.sign_extend(self.fetch8() as u32)
                } else {
                    Width::Word.sign_extend(self.fetch16() as u32)
                };
                if self.regs.condition(opcode) {
                    self.jump_relative(d);
                    base + desc.taken as u32
                } else {
                    base
                }
            }
            Primary::Src(width, addr) => {
                let ea = self.effective_address(opcode, addr);
                base + self.exec_src(opcode, width, ea, start)
            }
            Primary::Dst(addr) => {
                let ea = self.effective_address(opcode, addr);
                base + self.exec_dst(ea, start)
            }
            Primary::Reg(width) => base + self.exec_reg(RegRef::Code(code), width, start),
            Primary::ExtReg(width) => {
                let ext = self.fetch8();
                base + self.exec_reg(RegRef::Ext(ext), width, start)
            }
            Primary::Ldx => {
                self.fetch8();
                let addr = self.fetch8() as u32;
                self.fetch8();
                let v = self.fetch8();
                self.fetch8();
                self.memory.write8(addr, v);
                base
            }
            Primary::Swi => {
                let ret = self.regs.pc;
                self.push32(ret);
                let sr = self.regs.sr;
                self.push16(sr);
                self.regs.pc = self.memory.read32(VECTOR_BASE + code as u32 * 4) & ADDRESS_MASK;
                base
            }
            Primary::Undefined => self.undefined(start, &[opcode]),
        }
    }

    /// Resolve a memory operand, applying any pre-decrement or post-increment.
    fn effective_address(&mut self, opcode: u8, addr: Addr) -> u32 {
        let ea = match addr {
            Addr::Reg => self.regs.reg32(opcode & 7),
            Addr::RegDisp => {
                let d = Width::Byte.sign_extend(self.fetch8() as u32);
                self.regs.reg32(opcode & 7).wrapping_add(d)
            }
            Addr::Abs8 => self.fetch8() as u32,
            Addr::Abs16 => self.fetch16() as u32,
            Addr::Abs24 => self.fetch24(),
            Addr::Indexed => {
                let mode = self.fetch8();
                match mode & 3 {
                    0 => self.regs.ext_read(mode, Width::Long),
                    1 => {
                        let d = Width::Word.sign_extend(self.fetch16() as u32);
                        self.regs.ext_read(mode & 0xFC, Width::Long).wrapping_add(d)
                    }
                    _ if mode == 0x03 || mode == 0x07 => {
                        let base = self.fetch8();
                        let index = self.fetch8();
                        let index_width = if mode == 0x03 { Width::Byte } else { Width::Word };
                        let offset = index_width.sign_extend(self.regs.ext_read(index, index_width));
                        self.regs.ext_read(base, Width::Long).wrapping_add(offset)
                    }
                    _ => {
                        // PC-relative, as used by LDAR
                        let d = Width::Word.sign_extend(self.fetch16() as u32);
                        self.regs.pc.wrapping_add(d)
                    }
                }
            }
            Addr::PreDec | Addr::PostInc => {
                let mode = self.fetch8();
                let step = 1u32 << (mode & 3).min(2);
                let reg = mode & 0xFC;
                let current = self.regs.ext_read(reg, Width::Long);
                if addr == Addr::PreDec {
                    let v = current.wrapping_sub(step);
                    self.regs.ext_write(reg, Width::Long, v);
                    v
                } else {
                    self.regs.ext_write(reg, Width::Long, current.wrapping_add(step));
                    current
                }
            }
        };
        ea & ADDRESS_MASK
    }

    // --- Source memory ---

    fn exec_src(&mut self, prefix: u8, width: Width, ea: u32, start: u32) -> u32 {
        let second = self.fetch8();
        let desc = SRC_OPS[second as usize];
        if !desc.defined(width) {
            return self.undefined(start, &[prefix, second]);
        }
        let code = second & 7;
        let mut extra = 0;

        match desc.kind {
            SrcOp::Push => {
                let v = self.read_mem(ea, width);
                self.push(width, v);
            }
            SrcOp::Rld | SrcOp::Rrd => {
                let m = self.read_mem(ea, Width::Byte) as u8;
                let a = self.regs.reg8(REG_A);
                let (new_a, new_m) = if desc.kind == SrcOp::Rld {
                    ((a & 0xF0) | (m >> 4), (m << 4) | (a & 0x0F))
                } else {
                    ((a & 0xF0) | (m & 0x0F), ((a & 0x0F) << 4) | (m >> 4))
                };
                self.regs.set_reg8(REG_A, new_a);
                self.write_mem(ea, Width::Byte, new_m as u32);
                let c = self.regs.flags() & FLAG_C;
                let mut f = 0;
                alu::logic(&mut f, new_a as u32, Width::Byte, false);
                self.set_flags(f | c);
            }
            SrcOp::BlockLoad(decrement, repeat) => {
                extra = self.block_load(prefix, width, decrement, repeat, desc.taken as u32);
            }
            SrcOp::BlockCompare(decrement, repeat) => {
                extra = self.block_compare(prefix, width, decrement, repeat, desc.taken as u32);
            }
            SrcOp::LdToAbs16 => {
                let dest = self.fetch16() as u32;
                let v = self.read_mem(ea, width);
                self.write_mem(dest, width, v);
            }
            SrcOp::LdReg => {
                let v = self.read_mem(ea, width);
                self.regs.set_reg(code, width, v);
            }
            SrcOp::Ex => {
                let m = self.read_mem(ea, width);
                let r = self.regs.reg(code, width);
                self.write_mem(ea, width, r);
                self.regs.set_reg(code, width, m);
            }
            SrcOp::AluImm(op) => {
                let imm = self.fetch_imm(width);
                let m = self.read_mem(ea, width);
                let mut f = self.regs.flags();
                let r = alu::alu(&mut f, op, m, imm, width);
                self.set_flags(f);
                if op.writes_back() {
                    self.write_mem(ea, width, r);
                }
            }
            SrcOp::Mul | SrcOp::Muls | SrcOp::Div | SrcOp::Divs => {
                let operand = self.read_mem(ea, width);
                let kind = match desc.kind {
                    SrcOp::Mul => MulDiv::Mul,
                    SrcOp::Muls => MulDiv::Muls,
                    SrcOp::Div => MulDiv::Div,
                    _ => MulDiv::Divs,
                };
                self.mul_div(kind, RegRef::Code(code), width, operand);
            }
            SrcOp::Inc | SrcOp::Dec => {
                let n = if code == 0 { 8 } else { code as u32 };
                let m = self.read_mem(ea, width);
                let mut f = self.regs.flags();
                let r = if desc.kind == SrcOp::Inc {
                    alu::inc(&mut f, m, n, width)
                } else {
                    alu::dec(&mut f, m, n, width)
                };
                self.set_flags(f);
                self.write_mem(ea, width, r);
            }
            SrcOp::Shift(op) => {
                let m = self.read_mem(ea, width);
                let mut f = self.regs.flags();
                let r = alu::shift(&mut f, op, m, 1, width);
                self.set_flags(f);
                self.write_mem(ea, width, r);
            }
            SrcOp::AluRegMem(op) => {
                let a = self.regs.reg(code, width);
                let b = self.read_mem(ea, width);
                let mut f = self.regs.flags();
                let r = alu::alu(&mut f, op, a, b, width);
                self.set_flags(f);
                if op.writes_back() {
                    self.regs.set_reg(code, width, r);
                }
            }
            SrcOp::AluMemReg(op) => {
                let a = self.read_mem(ea, width);
                let b = self.regs.reg(code, width);
                let mut f = self.regs.flags();
                let r = alu::alu(&mut f, op, a, b, width);
                self.set_flags(f);
                if op.writes_back() {
                    self.write_mem(ea, width, r);
                }
            }
            SrcOp::Undefined => return self.undefined(start, &[prefix, second]),
        }

        desc.cost(width) as u32 + extra
    }

    /// LDI/LDIR/LDD/LDDR. `(XIX)` prefixes use XIX/XIY, everything else XDE/XHL.
    fn block_load(&mut self, prefix: u8, width: Width, decrement: bool, repeat: bool, taken: u32) -> u32 {
        let (dst, src) = if prefix & 7 == 5 { (4, 5) } else { (2, 3) };
        let step = if decrement {
            width.bytes().wrapping_neg()
        } else {
            width.bytes()
        };
        let mut extra = 0;

        loop {
            let s = self.regs.reg32(src);
            let d = self.regs.reg32(dst);
            let v = self.read_mem(s, width);
            self.write_mem(d, width, v);
            self.regs.set_reg32(src, s.wrapping_add(step));
            self.regs.set_reg32(dst, d.wrapping_add(step));
            let count = self.regs.reg16(REG_BC).wrapping_sub(1);
            self.regs.set_reg16(REG_BC, count);

            let mut f = self.regs.flags() & !(FLAG_H | FLAG_V | FLAG_N);
            if count != 0 {
                f |= FLAG_V;
            }
            self.set_flags(f);

            if !repeat || count == 0 {
                break;
            }
            extra += taken;
        }
        extra
    }

    /// CPI/CPIR/CPD/CPDR against A (byte) or WA (word)
    fn block_compare(&mut self, prefix: u8, width: Width, decrement: bool, repeat: bool, taken: u32) -> u32 {
        let ptr = prefix & 7;
        let step = if decrement {
            width.bytes().wrapping_neg()
        } else {
            width.bytes()
        };
        let mut extra = 0;

        loop {
            let p = self.regs.reg32(ptr);
            let m = self.read_mem(p, width);
            self.regs.set_reg32(ptr, p.wrapping_add(step));
            let count = self.regs.reg16(REG_BC).wrapping_sub(1);
            self.regs.set_reg16(REG_BC, count);

            let a = match width {
                Width::Byte => self.regs.reg8(REG_A) as u32,
                _ => self.regs.reg16(0) as u32,
            };
            let c = self.regs.flags() & FLAG_C;
            let mut f = 0;
            alu::sub(&mut f, a, m, false, width);
            f = (f & !(FLAG_V | FLAG_C)) | c;
            if count != 0 {
                f |= FLAG_V;
            }
            self.set_flags(f);

            if !repeat || count == 0 || f & FLAG_Z != 0 {
                break;
            }
            extra += taken;
        }
        extra
    }

    // --- Destination memory ---

    fn exec_dst(&mut self, ea: u32, start: u32) -> u32 {
        let second = self.fetch8();
        let desc = DST_OPS[second as usize];
        let code = second & 7;
        let mut extra = 0;

        match desc.kind {
            DstOp::LdImm(width) => {
                let v = self.fetch_imm(width);
                self.write_mem(ea, width, v);
            }
            DstOp::Pop(width) => {
                let v = self.pop(width);
                self.write_mem(ea, width, v);
            }
            DstOp::LdFromAbs16(width) => {
                let src = self.fetch16() as u32;
                let v = self.read_mem(src, width);
                self.write_mem(ea, width, v);
            }
            DstOp::Lda(width) => self.regs.set_reg(code, width, ea),
            DstOp::CarryA(op) => {
                let bit = self.regs.reg8(REG_A) as u32 & 7;
                self.carry_mem(op, ea, bit);
            }
            DstOp::LdReg(width) => {
                let v = self.regs.reg(code, width);
                self.write_mem(ea, width, v);
            }
            DstOp::CarryBit(op) => self.carry_mem(op, ea, code as u32),
            DstOp::Tset | DstOp::Res | DstOp::Set | DstOp::Chg | DstOp::Bit => {
                let m = self.read_mem(ea, Width::Byte);
                let mask = 1u32 << code;
                if matches!(desc.kind, DstOp::Tset | DstOp::Bit) {
                    self.bit_test(m & mask != 0);
                }
                let r = match desc.kind {
                    DstOp::Res => Some(m & !mask),
                    DstOp::Set | DstOp::Tset => Some(m | mask),
                    DstOp::Chg => Some(m ^ mask),
                    _ => None,
                };
                if let Some(r) = r {
                    self.write_mem(ea, Width::Byte, r);
                }
            }
            DstOp::Jp => {
                if self.regs.condition(second) {
                    self.regs.pc = ea;
                    extra = desc.taken as u32;
                }
            }
            DstOp::Call => {
                if self.regs.condition(second) {
                    let ret = self.regs.pc;
                    self.push32(ret);
                    self.regs.pc = ea;
                    extra = desc.taken as u32;
                }
            }
            DstOp::Ret => {
                if self.regs.condition(second) {
                    self.regs.pc = self.pop(Width::Long) & ADDRESS_MASK;
                    extra = desc.taken as u32;
                }
            }
            DstOp::Undefined => return self.undefined(start, &[second]),
        }

        desc.cost(Width::Byte) as u32 + extra
    }

    fn bit_test(&mut self, set: bool) {
        let mut f = (self.regs.flags() & !(FLAG_Z | FLAG_N)) | FLAG_H;
        if !set {
            f |= FLAG_Z;
        }
        self.set_flags(f);
    }

    /// ANDCF/ORCF/XORCF/LDCF/STCF on a value. Returns the new value for STCF.
    fn carry_op(&mut self, op: u8, value: u32, bit: u32) -> Option<u32> {
        let b = (value >> bit) & 1 != 0;
        let c = self.regs.flag(FLAG_C);
        match op {
            0 => self.regs.set_flag(FLAG_C, c && b),
            1 => self.regs.set_flag(FLAG_C, c || b),
            2 => self.regs.set_flag(FLAG_C, c ^ b),
            3 => self.regs.set_flag(FLAG_C, b),
            _ => {
                let mask = 1 << bit;
                return Some(if c { value | mask } else { value & !mask });
            }
        }
        None
    }

    fn carry_mem(&mut self, op: u8, ea: u32, bit: u32) {
        let m = self.read_mem(ea, Width::Byte);
        if let Some(r) = self.carry_op(op, m, bit) {
            self.write_mem(ea, Width::Byte, r);
        }
    }

    // --- Register ---

    fn exec_reg(&mut self, r: RegRef, width: Width, start: u32) -> u32 {
        let second = self.fetch8();
        let desc = REG_OPS[second as usize];
        if !desc.defined(width) {
            return self.undefined(start, &[second]);
        }
        let code = second & 7;
        let mut extra = 0;

        match desc.kind {
            RegOp::LdImm => {
                let v = self.fetch_imm(width);
                self.write_ref(r, width, v);
            }
            RegOp::Push => {
                let v = self.read_ref(r, width);
                self.push(width, v);
            }
            RegOp::Pop => {
                let v = self.pop(width);
                self.write_ref(r, width, v);
            }
            RegOp::Cpl => {
                let v = !self.read_ref(r, width);
                self.write_ref(r, width, v);
                let f = self.regs.flags() | FLAG_H | FLAG_N;
                self.set_flags(f);
            }
            RegOp::Neg => {
                let v = self.read_ref(r, width);
                let mut f = self.regs.flags();
                let res = alu::sub(&mut f, 0, v, false, width);
                self.set_flags(f);
                self.write_ref(r, width, res);
            }
            RegOp::MulImm | RegOp::MulsImm | RegOp::DivImm | RegOp::DivsImm => {
                let operand = self.fetch_imm(width);
                let kind = match desc.kind {
                    RegOp::MulImm => MulDiv::Mul,
                    RegOp::MulsImm => MulDiv::Muls,
                    RegOp::DivImm => MulDiv::Div,
                    _ => MulDiv::Divs,
                };
                self.mul_div(kind, r, width, operand);
            }
            RegOp::Link => {
                let d = Width::Word.sign_extend(self.fetch16() as u32);
                let v = self.read_ref(r, Width::Long);
                self.push32(v);
                let sp = self.regs.xsp();
                self.write_ref(r, Width::Long, sp);
                self.regs.set_xsp(sp.wrapping_add(d));
            }
            RegOp::Unlk => {
                let frame = self.read_ref(r, Width::Long);
                self.regs.set_xsp(frame);
                let v = self.pop(Width::Long);
                self.write_ref(r, Width::Long, v);
            }
            RegOp::Bs1f | RegOp::Bs1b => {
                let v = self.read_ref(r, Width::Word) as u16;
                if v == 0 {
                    self.regs.set_flag(FLAG_V, true);
                } else {
                    let bit = if desc.kind == RegOp::Bs1f {
                        v.trailing_zeros()
                    } else {
                        15 - v.leading_zeros()
                    };
                    self.regs.set_reg8(REG_A, bit as u8);
                    self.regs.set_flag(FLAG_V, false);
                }
            }
            RegOp::Daa => {
                let v = self.read_ref(r, Width::Byte) as u8;
                let mut f = self.regs.flags();
                let res = alu::daa(&mut f, v);
                self.set_flags(f);
                self.write_ref(r, Width::Byte, res as u32);
            }
            RegOp::Extz | RegOp::Exts => {
                let half = if width == Width::Word {
                    Width::Byte
                } else {
                    Width::Word
                };
                let v = self.read_ref(r, width) & half.mask();
                let v = if desc.kind == RegOp::Exts {
                    half.sign_extend(v)
                } else {
                    v
                };
                self.write_ref(r, width, v);
            }
            RegOp::Paa => {
                let v = self.read_ref(r, width);
                if v & 1 != 0 {
                    self.write_ref(r, width, v.wrapping_add(1));
                }
            }
            RegOp::Mirr => {
                let v = self.read_ref(r, Width::Word) as u16;
                self.write_ref(r, Width::Word, v.reverse_bits() as u32);
            }
            RegOp::Mula => {
                // XRR += (XDE) * (XHL), signed; XHL -= 2
                let xde = self.regs.reg32(2);
                let xhl = self.regs.reg32(3);
                let a = self.read_mem(xde, Width::Word);
                let b = self.read_mem(xhl, Width::Word);
                self.regs.set_reg32(3, xhl.wrapping_sub(2));
                let product = alu::multiply(a, b, Width::Word, true);
                let (target, _) = widen(r, width);
                let acc = self.read_ref(target, Width::Long);
                let sum = acc.wrapping_add(product);
                let overflow = (acc ^ sum) & (product ^ sum) & 0x8000_0000 != 0;
                self.write_ref(target, Width::Long, sum);
                let mut f = self.regs.flags() & !(FLAG_S | FLAG_Z | FLAG_V);
                if sum & 0x8000_0000 != 0 {
                    f |= FLAG_S;
                }
                if sum == 0 {
                    f |= FLAG_Z;
                }
                if overflow {
                    f |= FLAG_V;
                }
                self.set_flags(f);
            }
            RegOp::Djnz => {
                let d = Width::Byte.sign_extend(self.fetch8() as u32);
                let v = self.read_ref(r, width).wrapping_sub(1) & width.mask();
                self.write_ref(r, width, v);
                if v != 0 {
                    self.jump_relative(d);
                    extra = desc.taken as u32;
                }
            }
            RegOp::CarryImm(op) => {
                let bit = self.fetch8() as u32 & 0x0F;
                self.carry_reg(op, r, width, bit);
            }
            RegOp::CarryA(op) => {
                let bit = self.regs.reg8(REG_A) as u32 & 0x0F;
                self.carry_reg(op, r, width, bit);
            }
            RegOp::LdcToControl => {
                let cr = self.fetch8();
                let v = self.read_ref(r, width);
                self.regs.control_write(cr, width, v);
            }
            RegOp::LdcFromControl => {
                let cr = self.fetch8();
                let v = self.regs.control_read(cr, width);
                self.write_ref(r, width, v);
            }
            RegOp::Res | RegOp::Set | RegOp::Chg | RegOp::Bit | RegOp::Tset => {
                let bit = self.fetch8() as u32 & (width.bits() - 1);
                let v = self.read_ref(r, width);
                let mask = 1u32 << bit;
                if matches!(desc.kind, RegOp::Bit | RegOp::Tset) {
                    self.bit_test(v & mask != 0);
                }
                let res = match desc.kind {
                    RegOp::Res => Some(v & !mask),
                    RegOp::Set | RegOp::Tset => Some(v | mask),
                    RegOp::Chg => Some(v ^ mask),
                    _ => None,
                };
                if let Some(res) = res {
                    self.write_ref(r, width, res);
                }
            }
            RegOp::Minc(n) | RegOp::Mdec(n) => {
                // The immediate holds the modulus minus the step.
                let imm = self.fetch16() as u32;
                let n = n as u32;
                let modulus = imm + n;
                let v = self.read_ref(r, Width::Word);
                let res = if let RegOp::Minc(_) = desc.kind {
                    if v % modulus == imm {
                        v.wrapping_sub(imm)
                    } else {
                        v.wrapping_add(n)
                    }
                } else if v % modulus == 0 {
                    v.wrapping_add(imm)
                } else {
                    v.wrapping_sub(n)
                };
                self.write_ref(r, Width::Word, res);
            }
            RegOp::Mul | RegOp::Muls | RegOp::Div | RegOp::Divs => {
                let operand = self.read_ref(r, width);
                let kind = match desc.kind {
                    RegOp::Mul => MulDiv::Mul,
                    RegOp::Muls => MulDiv::Muls,
                    RegOp::Div => MulDiv::Div,
                    _ => MulDiv::Divs,
                };
                self.mul_div(kind, RegRef::Code(code), width, operand);
            }
            RegOp::Inc | RegOp::Dec => {
                let n = if code == 0 { 8 } else { code as u32 };
                let v = self.read_ref(r, width);
                let res = if width == Width::Byte {
                    let mut f = self.regs.flags();
                    let res = if desc.kind == RegOp::Inc {
                        alu::inc(&mut f, v, n, width)
                    } else {
                        alu::dec(&mut f, v, n, width)
                    };
                    self.set_flags(f);
                    res
                } else if desc.kind == RegOp::Inc {
                    v.wrapping_add(n)
                } else {
                    v.wrapping_sub(n)
                };
                self.write_ref(r, width, res);
            }
            RegOp::Scc => {
                let v = self.regs.condition(second) as u32;
                self.write_ref(r, width, v);
            }
            RegOp::AluReg(op) => {
                let a = self.regs.reg(code, width);
                let b = self.read_ref(r, width);
                let mut f = self.regs.flags();
                let res = alu::alu(&mut f, op, a, b, width);
                self.set_flags(f);
                if op.writes_back() {
                    self.regs.set_reg(code, width, res);
                }
            }
            RegOp::LdToCode => {
                let v = self.read_ref(r, width);
                self.regs.set_reg(code, width, v);
            }
            RegOp::LdFromCode => {
                let v = self.regs.reg(code, width);
                self.write_ref(r, width, v);
            }
            RegOp::LdImm3 => self.write_ref(r, width, code as u32),
            RegOp::Ex => {
                let a = self.regs.reg(code, width);
                let b = self.read_ref(r, width);
                self.regs.set_reg(code, width, b);
                self.write_ref(r, width, a);
            }
            RegOp::AluImm(op) => {
                let imm = self.fetch_imm(width);
                self.alu_ref(op, r, width, imm);
            }
            RegOp::CpImm3 => self.alu_ref(AluOp::Cp, r, width, code as u32),
            RegOp::ShiftImm(op) => {
                let count = self.fetch8() as u32 & 0x0F;
                self.shift_ref(op, r, width, count);
            }
            RegOp::ShiftA(op) => {
                let count = self.regs.reg8(REG_A) as u32 & 0x0F;
                self.shift_ref(op, r, width, count);
            }
            RegOp::Undefined => return self.undefined(start, &[second]),
        }

        desc.cost(width) as u32 + extra
    }

    fn alu_ref(&mut self, op: AluOp, r: RegRef, width: Width, b: u32) {
        let a = self.read_ref(r, width);
        let mut f = self.regs.flags();
        let res = alu::alu(&mut f, op, a, b, width);
        self.set_flags(f);
        if op.writes_back() {
            self.write_ref(r, width, res);
        }
    }

    /// A count of 0 shifts sixteen times.
    fn shift_ref(&mut self, op: ShiftOp, r: RegRef, width: Width, count: u32) {
        let count = if count == 0 { 16 } else { count };
        let v = self.read_ref(r, width);
        let mut f = self.regs.flags();
        let res = alu::shift(&mut f, op, v, count, width);
        self.set_flags(f);
        self.write_ref(r, width, res);
    }

    /// Bit numbers beyond the operand width leave everything unchanged.
    fn carry_reg(&mut self, op: u8, r: RegRef, width: Width, bit: u32) {
        if bit >= width.bits() {
            return;
        }
        let v = self.read_ref(r, width);
        if let Some(res) = self.carry_op(op, v, bit) {
            self.write_ref(r, width, res);
        }
    }

    fn mul_div(&mut self, kind: MulDiv, target: RegRef, width: Width, operand: u32) {
        let (target, wide) = widen(target, width);
        let current = self.read_ref(target, wide);
        match kind {
            MulDiv::Mul | MulDiv::Muls => {
                let product = alu::multiply(current, operand, width, kind == MulDiv::Muls);
                self.write_ref(target, wide, product);
            }
            MulDiv::Div | MulDiv::Divs => {
                let d = alu::divide(current, operand, width, kind == MulDiv::Divs);
                self.write_ref(target, wide, d.quotient | (d.remainder << width.bits()));
                self.regs.set_flag(FLAG_V, d.overflow);
            }
        }
    }
}

/// The double-width register holding `r`: byte codes name their word pair,
/// word codes their 32-bit register.
fn widen(r: RegRef, width: Width) -> (RegRef, Width) {
    match (r, width) {
        (RegRef::Code(code), Width::Byte) => (RegRef::Code((code >> 1) & 3), Width::Word),
        (RegRef::Code(code), _) => (RegRef::Code(code), Width::Long),
        (RegRef::Ext(code), Width::Byte) => (RegRef::Ext(code & !1), Width::Word),
        (RegRef::Ext(code), _) => (RegRef::Ext(code & !3), Width::Long),
    }
}
