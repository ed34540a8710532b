//! Instruction descriptor tables.
//!
//! Decoding is two-level. The first byte is looked up in [`PRIMARY`]; most
//! entries are complete instructions, the rest are operand prefixes that
//! name a register or memory operand and select one of three second-byte
//! tables: [`REG_OPS`], [`SRC_OPS`] or [`DST_OPS`].
//!
//! Each descriptor carries the base state count for every operand width.
//! The prefix entry's count covers the addressing-mode cost, so the cost of
//! a prefixed instruction is `prefix + second`. A width entry of 0 marks an
//! encoding that is undefined at that width; executing it costs
//! [`UNDEFINED_COST`] on top of the prefix and does nothing else.

use super::alu::{AluOp, ShiftOp};
use super::registers::Width;

/// States charged for an undefined encoding.
///
/// Undefined opcodes act as no-ops; the charge has not been measured on
/// hardware.
pub const UNDEFINED_COST: u32 = 2;

/// One table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpDesc<K: Copy> {
    pub mnemonic: &'static str,
    pub kind: K,
    /// Base states for byte, word and long operands (0 = undefined)
    pub cycles: [u8; 3],
    /// Extra states when a branch is taken or a block transfer repeats
    pub taken: u8,
}

impl<K: Copy> OpDesc<K> {
    pub const fn cost(&self, width: Width) -> u8 {
        self.cycles[width.index()]
    }

    pub const fn defined(&self, width: Width) -> bool {
        self.cycles[width.index()] != 0
    }
}

const fn op<K: Copy>(mnemonic: &'static str, kind: K, cycles: [u8; 3]) -> OpDesc<K> {
    OpDesc {
        mnemonic,
        kind,
        cycles,
        taken: 0,
    }
}

const fn flat<K: Copy>(mnemonic: &'static str, kind: K, c: u8) -> OpDesc<K> {
    op(mnemonic, kind, [c, c, c])
}

const fn branch<K: Copy>(mnemonic: &'static str, kind: K, cycles: [u8; 3], taken: u8) -> OpDesc<K> {
    OpDesc {
        mnemonic,
        kind,
        cycles,
        taken,
    }
}

/// Memory addressing modes named by a prefix byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addr {
    /// `(XRR)`, register in the low three bits of the prefix
    Reg,
    /// `(XRR+d8)`
    RegDisp,
    /// `(#8)`
    Abs8,
    /// `(#16)`
    Abs16,
    /// `(#24)`
    Abs24,
    /// Mode byte follows: `(r32)`, `(r32+d16)`, `(r32+r8)`, `(r32+r16)`
    /// or the PC-relative form used by LDAR
    Indexed,
    /// `(-r32)`
    PreDec,
    /// `(r32+)`
    PostInc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primary {
    Nop,
    PushSr,
    PopSr,
    Halt,
    Ei,
    Reti,
    LdDirectByte,
    PushImmByte,
    LdDirectWord,
    PushImmWord,
    Incf,
    Decf,
    Ret,
    Retd,
    Rcf,
    Scf,
    Ccf,
    Zcf,
    PushA,
    PopA,
    ExFlags,
    Ldf,
    PushF,
    PopF,
    Jp16,
    Jp24,
    Call16,
    Call24,
    Calr,
    /// Reserved opcode used as the firmware trap
    BiosTrap,
    LdRegImm(Width),
    PushReg(Width),
    PopReg(Width),
    Jr,
    Jrl,
    Src(Width, Addr),
    Dst(Addr),
    Reg(Width),
    ExtReg(Width),
    Ldx,
    Swi,
    Undefined,
}

/// Second byte after a register prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegOp {
    LdImm,
    Push,
    Pop,
    Cpl,
    Neg,
    MulImm,
    MulsImm,
    DivImm,
    DivsImm,
    Link,
    Unlk,
    Bs1f,
    Bs1b,
    Daa,
    Extz,
    Exts,
    Paa,
    Mirr,
    Mula,
    Djnz,
    /// ANDCF/ORCF/XORCF/LDCF/STCF with an immediate bit number
    CarryImm(u8),
    /// Same group with the bit number in A
    CarryA(u8),
    LdcToControl,
    LdcFromControl,
    Res,
    Set,
    Chg,
    Bit,
    Tset,
    Minc(u8),
    Mdec(u8),
    Mul,
    Muls,
    Div,
    Divs,
    Inc,
    Dec,
    Scc,
    AluReg(AluOp),
    /// `LD R,r`
    LdToCode,
    /// `LD r,R`
    LdFromCode,
    LdImm3,
    Ex,
    AluImm(AluOp),
    CpImm3,
    ShiftImm(ShiftOp),
    ShiftA(ShiftOp),
    Undefined,
}

/// Second byte after a source-memory prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcOp {
    Push,
    Rld,
    Rrd,
    /// LDI/LDIR/LDD/LDDR: (decrement, repeat)
    BlockLoad(bool, bool),
    /// CPI/CPIR/CPD/CPDR: (decrement, repeat)
    BlockCompare(bool, bool),
    LdToAbs16,
    LdReg,
    Ex,
    AluImm(AluOp),
    Mul,
    Muls,
    Div,
    Divs,
    Inc,
    Dec,
    Shift(ShiftOp),
    /// `op R,(mem)`
    AluRegMem(AluOp),
    /// `op (mem),R`
    AluMemReg(AluOp),
    Undefined,
}

/// Second byte after a destination-memory prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstOp {
    LdImm(Width),
    Pop(Width),
    LdFromAbs16(Width),
    Lda(Width),
    CarryA(u8),
    LdReg(Width),
    /// Carry-flag bit operations with bit number in the opcode
    CarryBit(u8),
    Tset,
    Res,
    Set,
    Chg,
    Bit,
    Jp,
    Call,
    Ret,
    Undefined,
}

const P_UNDEF: OpDesc<Primary> = flat("?", Primary::Undefined, 0);
const R_UNDEF: OpDesc<RegOp> = flat("?", RegOp::Undefined, 0);
const S_UNDEF: OpDesc<SrcOp> = flat("?", SrcOp::Undefined, 0);
const D_UNDEF: OpDesc<DstOp> = flat("?", DstOp::Undefined, 0);

const fn width_of(base: u8) -> Width {
    match base {
        0 => Width::Byte,
        1 => Width::Word,
        _ => Width::Long,
    }
}

const fn build_primary() -> [OpDesc<Primary>; 256] {
    let mut t = [P_UNDEF; 256];

    t[0x00] = flat("NOP", Primary::Nop, 2);
    t[0x02] = flat("PUSH SR", Primary::PushSr, 4);
    t[0x03] = flat("POP SR", Primary::PopSr, 6);
    t[0x05] = flat("HALT", Primary::Halt, 6);
    t[0x06] = flat("EI", Primary::Ei, 5);
    t[0x07] = flat("RETI", Primary::Reti, 12);
    t[0x08] = flat("LD (n),n", Primary::LdDirectByte, 5);
    t[0x09] = flat("PUSH n", Primary::PushImmByte, 4);
    t[0x0A] = flat("LDW (n),nn", Primary::LdDirectWord, 6);
    t[0x0B] = flat("PUSHW nn", Primary::PushImmWord, 5);
    t[0x0C] = flat("INCF", Primary::Incf, 2);
    t[0x0D] = flat("DECF", Primary::Decf, 2);
    t[0x0E] = flat("RET", Primary::Ret, 9);
    t[0x0F] = flat("RETD", Primary::Retd, 9);
    t[0x10] = flat("RCF", Primary::Rcf, 2);
    t[0x11] = flat("SCF", Primary::Scf, 2);
    t[0x12] = flat("CCF", Primary::Ccf, 2);
    t[0x13] = flat("ZCF", Primary::Zcf, 2);
    t[0x14] = flat("PUSH A", Primary::PushA, 3);
    t[0x15] = flat("POP A", Primary::PopA, 4);
    t[0x16] = flat("EX F,F'", Primary::ExFlags, 2);
    t[0x17] = flat("LDF", Primary::Ldf, 2);
    t[0x18] = flat("PUSH F", Primary::PushF, 3);
    t[0x19] = flat("POP F", Primary::PopF, 4);
    t[0x1A] = flat("JP nn", Primary::Jp16, 7);
    t[0x1B] = flat("JP nnn", Primary::Jp24, 7);
    t[0x1C] = flat("CALL nn", Primary::Call16, 12);
    t[0x1D] = flat("CALL nnn", Primary::Call24, 12);
    t[0x1E] = flat("CALR", Primary::Calr, 12);
    t[0x1F] = flat("BIOS", Primary::BiosTrap, 2);

    let mut i = 0;
    while i < 8 {
        t[0x20 + i] = flat("LD R,n", Primary::LdRegImm(Width::Byte), 2);
        t[0x28 + i] = flat("PUSH RR", Primary::PushReg(Width::Word), 3);
        t[0x30 + i] = flat("LD RR,nn", Primary::LdRegImm(Width::Word), 3);
        t[0x38 + i] = flat("PUSH XRR", Primary::PushReg(Width::Long), 5);
        t[0x40 + i] = flat("LD XRR,nnnn", Primary::LdRegImm(Width::Long), 5);
        t[0x48 + i] = flat("POP RR", Primary::PopReg(Width::Word), 4);
        t[0x58 + i] = flat("POP XRR", Primary::PopReg(Width::Long), 6);
        i += 1;
    }

    let mut i = 0;
    while i < 16 {
        t[0x60 + i] = branch("JR cc", Primary::Jr, [4, 4, 4], 4);
        t[0x70 + i] = branch("JRL cc", Primary::Jrl, [4, 4, 4], 4);
        i += 1;
    }

    // Source-memory prefixes by register: 80/90/A0 (XRR), 88/98/A8 (XRR+d)
    let mut w = 0;
    while w < 3 {
        let width = width_of(w as u8);
        let mut r = 0;
        while r < 8 {
            t[0x80 + w * 0x10 + r] = flat("src (r)", Primary::Src(width, Addr::Reg), 0);
            t[0x88 + w * 0x10 + r] = flat("src (r+d)", Primary::Src(width, Addr::RegDisp), 1);
            r += 1;
        }
        w += 1;
    }

    let mut r = 0;
    while r < 8 {
        t[0xB0 + r] = flat("dst (r)", Primary::Dst(Addr::Reg), 0);
        t[0xB8 + r] = flat("dst (r+d)", Primary::Dst(Addr::RegDisp), 1);
        r += 1;
    }

    // C0/D0/E0 rows: absolute and register-indirect source modes, then
    // extended and short register prefixes.
    let mut w = 0;
    while w < 3 {
        let width = width_of(w as u8);
        let base = 0xC0 + w * 0x10;
        t[base] = flat("src (n)", Primary::Src(width, Addr::Abs8), 0);
        t[base + 1] = flat("src (nn)", Primary::Src(width, Addr::Abs16), 1);
        t[base + 2] = flat("src (nnn)", Primary::Src(width, Addr::Abs24), 2);
        t[base + 3] = flat("src (mem)", Primary::Src(width, Addr::Indexed), 1);
        t[base + 4] = flat("src (-r)", Primary::Src(width, Addr::PreDec), 1);
        t[base + 5] = flat("src (r+)", Primary::Src(width, Addr::PostInc), 1);
        t[base + 7] = flat("reg r", Primary::ExtReg(width), 1);
        let mut r = 0;
        while r < 8 {
            t[base + 8 + r] = flat("reg R", Primary::Reg(width), 0);
            r += 1;
        }
        w += 1;
    }

    t[0xF0] = flat("dst (n)", Primary::Dst(Addr::Abs8), 0);
    t[0xF1] = flat("dst (nn)", Primary::Dst(Addr::Abs16), 1);
    t[0xF2] = flat("dst (nnn)", Primary::Dst(Addr::Abs24), 2);
    t[0xF3] = flat("dst (mem)", Primary::Dst(Addr::Indexed), 1);
    t[0xF4] = flat("dst (-r)", Primary::Dst(Addr::PreDec), 1);
    t[0xF5] = flat("dst (r+)", Primary::Dst(Addr::PostInc), 1);
    t[0xF7] = flat("LDX", Primary::Ldx, 8);

    let mut i = 0;
    while i < 8 {
        t[0xF8 + i] = flat("SWI", Primary::Swi, 16);
        i += 1;
    }

    t
}

const fn build_reg() -> [OpDesc<RegOp>; 256] {
    let mut t = [R_UNDEF; 256];

    t[0x03] = op("LD r,#", RegOp::LdImm, [3, 4, 6]);
    t[0x04] = op("PUSH r", RegOp::Push, [4, 4, 6]);
    t[0x05] = op("POP r", RegOp::Pop, [5, 5, 7]);
    t[0x06] = op("CPL r", RegOp::Cpl, [2, 2, 0]);
    t[0x07] = op("NEG r", RegOp::Neg, [2, 2, 0]);
    t[0x08] = op("MUL rr,#", RegOp::MulImm, [12, 15, 0]);
    t[0x09] = op("MULS rr,#", RegOp::MulsImm, [10, 13, 0]);
    t[0x0A] = op("DIV rr,#", RegOp::DivImm, [15, 23, 0]);
    t[0x0B] = op("DIVS rr,#", RegOp::DivsImm, [18, 26, 0]);
    t[0x0C] = op("LINK r,d", RegOp::Link, [0, 0, 8]);
    t[0x0D] = op("UNLK r", RegOp::Unlk, [0, 0, 7]);
    t[0x0E] = op("BS1F A,r", RegOp::Bs1f, [0, 3, 0]);
    t[0x0F] = op("BS1B A,r", RegOp::Bs1b, [0, 3, 0]);
    t[0x10] = op("DAA r", RegOp::Daa, [4, 0, 0]);
    t[0x12] = op("EXTZ r", RegOp::Extz, [0, 3, 3]);
    t[0x13] = op("EXTS r", RegOp::Exts, [0, 3, 3]);
    t[0x14] = op("PAA r", RegOp::Paa, [0, 4, 4]);
    t[0x16] = op("MIRR r", RegOp::Mirr, [0, 3, 0]);
    t[0x19] = op("MULA r", RegOp::Mula, [0, 19, 0]);
    t[0x1C] = branch("DJNZ r,d", RegOp::Djnz, [7, 7, 0], 4);

    let mut i = 0;
    while i < 5 {
        t[0x20 + i] = op("?CF #,r", RegOp::CarryImm(i as u8), [3, 3, 0]);
        t[0x28 + i] = op("?CF A,r", RegOp::CarryA(i as u8), [3, 3, 0]);
        i += 1;
    }

    t[0x2E] = flat("LDC cr,r", RegOp::LdcToControl, 3);
    t[0x2F] = flat("LDC r,cr", RegOp::LdcFromControl, 3);
    t[0x30] = op("RES #,r", RegOp::Res, [3, 3, 0]);
    t[0x31] = op("SET #,r", RegOp::Set, [3, 3, 0]);
    t[0x32] = op("CHG #,r", RegOp::Chg, [3, 3, 0]);
    t[0x33] = op("BIT #,r", RegOp::Bit, [3, 3, 0]);
    t[0x34] = op("TSET #,r", RegOp::Tset, [4, 4, 0]);
    t[0x38] = op("MINC1", RegOp::Minc(1), [0, 5, 0]);
    t[0x39] = op("MINC2", RegOp::Minc(2), [0, 5, 0]);
    t[0x3A] = op("MINC4", RegOp::Minc(4), [0, 5, 0]);
    t[0x3C] = op("MDEC1", RegOp::Mdec(1), [0, 4, 0]);
    t[0x3D] = op("MDEC2", RegOp::Mdec(2), [0, 4, 0]);
    t[0x3E] = op("MDEC4", RegOp::Mdec(4), [0, 4, 0]);

    let mut i = 0;
    while i < 8 {
        t[0x40 + i] = op("MUL RR,r", RegOp::Mul, [11, 14, 0]);
        t[0x48 + i] = op("MULS RR,r", RegOp::Muls, [9, 12, 0]);
        t[0x50 + i] = op("DIV RR,r", RegOp::Div, [15, 23, 0]);
        t[0x58 + i] = op("DIVS RR,r", RegOp::Divs, [18, 26, 0]);
        t[0x60 + i] = flat("INC #,r", RegOp::Inc, 2);
        t[0x68 + i] = flat("DEC #,r", RegOp::Dec, 2);
        t[0x88 + i] = flat("LD R,r", RegOp::LdToCode, 2);
        t[0x98 + i] = flat("LD r,R", RegOp::LdFromCode, 2);
        t[0xA8 + i] = flat("LD r,#3", RegOp::LdImm3, 2);
        t[0xB8 + i] = op("EX R,r", RegOp::Ex, [3, 3, 0]);
        t[0xC8 + i] = op("ALU r,#", RegOp::AluImm(AluOp::from_index(i as u8)), [3, 4, 6]);
        t[0xD8 + i] = op("CP r,#3", RegOp::CpImm3, [2, 2, 0]);
        t[0xE8 + i] = flat("SHIFT #,r", RegOp::ShiftImm(ShiftOp::from_index(i as u8)), 3);
        t[0xF8 + i] = flat("SHIFT A,r", RegOp::ShiftA(ShiftOp::from_index(i as u8)), 3);
        i += 1;
    }

    let mut i = 0;
    while i < 16 {
        t[0x70 + i] = op("SCC cc,r", RegOp::Scc, [2, 2, 0]);
        i += 1;
    }

    // ALU R,r rows: 80 ADD, 90 ADC, A0 SUB, B0 SBC, C0 AND, D0 XOR, E0 OR, F0 CP
    let mut row = 0;
    while row < 8 {
        let mut i = 0;
        while i < 8 {
            t[0x80 + row * 0x10 + i] = flat("ALU R,r", RegOp::AluReg(AluOp::from_index(row as u8)), 2);
            i += 1;
        }
        row += 1;
    }

    t
}

const fn build_src() -> [OpDesc<SrcOp>; 256] {
    let mut t = [S_UNDEF; 256];

    t[0x04] = op("PUSH (mem)", SrcOp::Push, [6, 6, 0]);
    t[0x06] = op("RLD A,(mem)", SrcOp::Rld, [12, 0, 0]);
    t[0x07] = op("RRD A,(mem)", SrcOp::Rrd, [12, 0, 0]);
    t[0x10] = op("LDI", SrcOp::BlockLoad(false, false), [10, 10, 0]);
    t[0x11] = branch("LDIR", SrcOp::BlockLoad(false, true), [10, 10, 0], 10);
    t[0x12] = op("LDD", SrcOp::BlockLoad(true, false), [10, 10, 0]);
    t[0x13] = branch("LDDR", SrcOp::BlockLoad(true, true), [10, 10, 0], 10);
    t[0x14] = op("CPI", SrcOp::BlockCompare(false, false), [8, 8, 0]);
    t[0x15] = branch("CPIR", SrcOp::BlockCompare(false, true), [8, 8, 0], 8);
    t[0x16] = op("CPD", SrcOp::BlockCompare(true, false), [8, 8, 0]);
    t[0x17] = branch("CPDR", SrcOp::BlockCompare(true, true), [8, 8, 0], 8);
    t[0x19] = op("LD (nn),(mem)", SrcOp::LdToAbs16, [8, 8, 0]);

    let mut i = 0;
    while i < 8 {
        t[0x20 + i] = op("LD R,(mem)", SrcOp::LdReg, [4, 4, 6]);
        t[0x30 + i] = op("EX (mem),R", SrcOp::Ex, [6, 6, 0]);
        t[0x38 + i] = if i == 7 {
            op("CP (mem),#", SrcOp::AluImm(AluOp::Cp), [6, 7, 0])
        } else {
            op("ALU (mem),#", SrcOp::AluImm(AluOp::from_index(i as u8)), [7, 8, 0])
        };
        t[0x40 + i] = op("MUL RR,(mem)", SrcOp::Mul, [14, 17, 0]);
        t[0x48 + i] = op("MULS RR,(mem)", SrcOp::Muls, [12, 15, 0]);
        t[0x50 + i] = op("DIV RR,(mem)", SrcOp::Div, [18, 26, 0]);
        t[0x58 + i] = op("DIVS RR,(mem)", SrcOp::Divs, [21, 29, 0]);
        t[0x60 + i] = op("INC #,(mem)", SrcOp::Inc, [6, 6, 0]);
        t[0x68 + i] = op("DEC #,(mem)", SrcOp::Dec, [6, 6, 0]);
        t[0x78 + i] = op("SHIFT (mem)", SrcOp::Shift(ShiftOp::from_index(i as u8)), [6, 6, 0]);
        i += 1;
    }

    let mut row = 0;
    while row < 8 {
        let alu = AluOp::from_index(row as u8);
        let store = if row == 7 { [4, 4, 6] } else { [6, 6, 10] };
        let mut i = 0;
        while i < 8 {
            t[0x80 + row * 0x10 + i] = op("ALU R,(mem)", SrcOp::AluRegMem(alu), [4, 4, 6]);
            t[0x88 + row * 0x10 + i] = op("ALU (mem),R", SrcOp::AluMemReg(alu), store);
            i += 1;
        }
        row += 1;
    }

    t
}

const fn build_dst() -> [OpDesc<DstOp>; 256] {
    let mut t = [D_UNDEF; 256];

    t[0x00] = flat("LD (mem),#", DstOp::LdImm(Width::Byte), 5);
    t[0x02] = flat("LDW (mem),##", DstOp::LdImm(Width::Word), 6);
    t[0x04] = flat("POP (mem)", DstOp::Pop(Width::Byte), 6);
    t[0x06] = flat("POPW (mem)", DstOp::Pop(Width::Word), 6);
    t[0x14] = flat("LD (mem),(nn)", DstOp::LdFromAbs16(Width::Byte), 8);
    t[0x16] = flat("LDW (mem),(nn)", DstOp::LdFromAbs16(Width::Word), 8);

    let mut i = 0;
    while i < 8 {
        t[0x20 + i] = flat("LDA RR,mem", DstOp::Lda(Width::Word), 4);
        t[0x30 + i] = flat("LDA XRR,mem", DstOp::Lda(Width::Long), 4);
        t[0x40 + i] = flat("LD (mem),R", DstOp::LdReg(Width::Byte), 4);
        t[0x50 + i] = flat("LDW (mem),R", DstOp::LdReg(Width::Word), 4);
        t[0x60 + i] = flat("LDL (mem),R", DstOp::LdReg(Width::Long), 6);
        t[0x80 + i] = flat("ANDCF #,(mem)", DstOp::CarryBit(0), 6);
        t[0x88 + i] = flat("ORCF #,(mem)", DstOp::CarryBit(1), 6);
        t[0x90 + i] = flat("XORCF #,(mem)", DstOp::CarryBit(2), 6);
        t[0x98 + i] = flat("LDCF #,(mem)", DstOp::CarryBit(3), 6);
        t[0xA0 + i] = flat("STCF #,(mem)", DstOp::CarryBit(4), 7);
        t[0xA8 + i] = flat("TSET #,(mem)", DstOp::Tset, 8);
        t[0xB0 + i] = flat("RES #,(mem)", DstOp::Res, 7);
        t[0xB8 + i] = flat("SET #,(mem)", DstOp::Set, 7);
        t[0xC0 + i] = flat("CHG #,(mem)", DstOp::Chg, 7);
        t[0xC8 + i] = flat("BIT #,(mem)", DstOp::Bit, 6);
        i += 1;
    }

    let mut i = 0;
    while i < 5 {
        t[0x28 + i] = flat("?CF A,(mem)", DstOp::CarryA(i as u8), if i == 4 { 7 } else { 6 });
        i += 1;
    }

    let mut i = 0;
    while i < 16 {
        t[0xD0 + i] = branch("JP cc,mem", DstOp::Jp, [4, 4, 4], 2);
        t[0xE0 + i] = branch("CALL cc,mem", DstOp::Call, [6, 6, 6], 6);
        t[0xF0 + i] = branch("RET cc", DstOp::Ret, [6, 6, 6], 6);
        i += 1;
    }

    t
}

pub static PRIMARY: [OpDesc<Primary>; 256] = build_primary();
pub static REG_OPS: [OpDesc<RegOp>; 256] = build_reg();
pub static SRC_OPS: [OpDesc<SrcOp>; 256] = build_src();
pub static DST_OPS: [OpDesc<DstOp>; 256] = build_dst();
