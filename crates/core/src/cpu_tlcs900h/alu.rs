//! Arithmetic and logic with TLCS-900/H flag rules.
//!
//! Every function takes the current F byte, returns the result and writes the
//! new flags back. H is only defined for byte and word operations.

use super::registers::{Width, FLAG_C, FLAG_H, FLAG_N, FLAG_S, FLAG_V, FLAG_Z};

/// The eight two-operand ALU operations, in encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    pub const fn from_index(i: u8) -> AluOp {
        match i & 7 {
            0 => AluOp::Add,
            1 => AluOp::Adc,
            2 => AluOp::Sub,
            3 => AluOp::Sbc,
            4 => AluOp::And,
            5 => AluOp::Xor,
            6 => AluOp::Or,
            _ => AluOp::Cp,
        }
    }

    /// CP only sets flags
    pub const fn writes_back(self) -> bool {
        !matches!(self, AluOp::Cp)
    }
}

/// Rotates and shifts, in encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Sll,
    Srl,
}

impl ShiftOp {
    pub const fn from_index(i: u8) -> ShiftOp {
        match i & 7 {
            0 => ShiftOp::Rlc,
            1 => ShiftOp::Rrc,
            2 => ShiftOp::Rl,
            3 => ShiftOp::Rr,
            4 => ShiftOp::Sla,
            5 => ShiftOp::Sra,
            6 => ShiftOp::Sll,
            _ => ShiftOp::Srl,
        }
    }
}

/// Even parity of the low `width` bits
pub fn parity(v: u32, width: Width) -> bool {
    (v & width.mask()).count_ones() % 2 == 0
}

fn sz(r: u32, width: Width) -> u8 {
    let mut f = 0;
    if r & width.sign() != 0 {
        f |= FLAG_S;
    }
    if r & width.mask() == 0 {
        f |= FLAG_Z;
    }
    f
}

fn half(a: u32, b: u32, r: u32, width: Width) -> u8 {
    if width != Width::Long && (a ^ b ^ r) & 0x10 != 0 {
        FLAG_H
    } else {
        0
    }
}

pub fn add(f: &mut u8, a: u32, b: u32, carry_in: bool, width: Width) -> u32 {
    let mask = width.mask();
    let (a, b) = (a & mask, b & mask);
    let sum = a as u64 + b as u64 + carry_in as u64;
    let r = sum as u32 & mask;

    let mut nf = sz(r, width) | half(a, b, r, width);
    if (a ^ r) & (b ^ r) & width.sign() != 0 {
        nf |= FLAG_V;
    }
    if sum > mask as u64 {
        nf |= FLAG_C;
    }
    *f = nf;
    r
}

pub fn sub(f: &mut u8, a: u32, b: u32, borrow_in: bool, width: Width) -> u32 {
    let mask = width.mask();
    let (a, b) = (a & mask, b & mask);
    let r = (a as u64)
        .wrapping_sub(b as u64)
        .wrapping_sub(borrow_in as u64) as u32
        & mask;

    let mut nf = sz(r, width) | half(a, b, r, width) | FLAG_N;
    if (a ^ b) & (a ^ r) & width.sign() != 0 {
        nf |= FLAG_V;
    }
    if (a as u64) < b as u64 + borrow_in as u64 {
        nf |= FLAG_C;
    }
    *f = nf;
    r
}

/// Flags for AND/OR/XOR results; AND also sets H.
pub fn logic(f: &mut u8, r: u32, width: Width, set_half: bool) -> u32 {
    let r = r & width.mask();
    let mut nf = sz(r, width);
    if set_half {
        nf |= FLAG_H;
    }
    if parity(r, width) {
        nf |= FLAG_V;
    }
    *f = nf;
    r
}

/// Apply a two-operand operation. CP returns `a` unchanged.
pub fn alu(f: &mut u8, op: AluOp, a: u32, b: u32, width: Width) -> u32 {
    let carry = *f & FLAG_C != 0;
    match op {
        AluOp::Add => add(f, a, b, false, width),
        AluOp::Adc => add(f, a, b, carry, width),
        AluOp::Sub => sub(f, a, b, false, width),
        AluOp::Sbc => sub(f, a, b, carry, width),
        AluOp::And => logic(f, a & b, width, true),
        AluOp::Xor => logic(f, a ^ b, width, false),
        AluOp::Or => logic(f, a | b, width, false),
        AluOp::Cp => {
            sub(f, a, b, false, width);
            a & width.mask()
        }
    }
}

/// INC keeps C. Word and long INC on registers leave all flags alone.
pub fn inc(f: &mut u8, a: u32, n: u32, width: Width) -> u32 {
    let c = *f & FLAG_C;
    let r = add(f, a, n, false, width);
    *f = (*f & !FLAG_C) | c;
    r
}

/// DEC keeps C.
pub fn dec(f: &mut u8, a: u32, n: u32, width: Width) -> u32 {
    let c = *f & FLAG_C;
    let r = sub(f, a, n, false, width);
    *f = (*f & !FLAG_C) | c;
    r
}

/// Rotate or shift `count` times (1..=16).
pub fn shift(f: &mut u8, op: ShiftOp, v: u32, count: u32, width: Width) -> u32 {
    let mask = width.mask();
    let top = width.bits() - 1;
    let mut r = v & mask;
    let mut carry = *f & FLAG_C != 0;

    for _ in 0..count {
        let msb = (r >> top) & 1 != 0;
        let lsb = r & 1 != 0;
        r = match op {
            ShiftOp::Rlc => ((r << 1) | msb as u32) & mask,
            ShiftOp::Rrc => (r >> 1) | ((lsb as u32) << top),
            ShiftOp::Rl => ((r << 1) | carry as u32) & mask,
            ShiftOp::Rr => (r >> 1) | ((carry as u32) << top),
            ShiftOp::Sla | ShiftOp::Sll => (r << 1) & mask,
            ShiftOp::Sra => (r >> 1) | (r & width.sign()),
            ShiftOp::Srl => r >> 1,
        };
        carry = match op {
            ShiftOp::Rlc | ShiftOp::Rl | ShiftOp::Sla | ShiftOp::Sll => msb,
            _ => lsb,
        };
    }

    let mut nf = sz(r, width);
    if parity(r, width) {
        nf |= FLAG_V;
    }
    if carry {
        nf |= FLAG_C;
    }
    *f = nf;
    r
}

/// Decimal adjust after BCD add or subtract
pub fn daa(f: &mut u8, a: u8) -> u8 {
    let n = *f & FLAG_N != 0;
    let h = *f & FLAG_H != 0;
    let mut carry = *f & FLAG_C != 0;
    let low = a & 0x0F;

    let mut correction = 0u8;
    if h || (!n && low > 9) {
        correction |= 0x06;
    }
    if carry || (!n && a > 0x99) {
        correction |= 0x60;
        carry = true;
    }

    let r = if n {
        a.wrapping_sub(correction)
    } else {
        a.wrapping_add(correction)
    };

    let half = if n { h && low < 6 } else { low > 9 };
    let mut nf = sz(r as u32, Width::Byte) | (*f & FLAG_N);
    if half {
        nf |= FLAG_H;
    }
    if parity(r as u32, Width::Byte) {
        nf |= FLAG_V;
    }
    if carry {
        nf |= FLAG_C;
    }
    *f = nf;
    r
}

/// Outcome of a DIV/DIVS. `overflow` maps to V.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Division {
    pub quotient: u32,
    pub remainder: u32,
    pub overflow: bool,
}

/// Divide a double-width dividend by a `width` divisor.
///
/// Division by zero sets overflow, yields an all-ones quotient and leaves
/// the dividend's low half as the remainder.
pub fn divide(dividend: u32, divisor: u32, width: Width, signed: bool) -> Division {
    let mask = width.mask();
    let divisor = divisor & mask;
    if divisor == 0 {
        return Division {
            quotient: mask,
            remainder: dividend & mask,
            overflow: true,
        };
    }

    if signed {
        let wide = width.doubled();
        let n = wide.sign_extend(dividend & wide.mask()) as i32 as i64;
        let d = width.sign_extend(divisor) as i32 as i64;
        let q = n / d;
        let r = n % d;
        let limit = (width.sign() as i64) - 1;
        Division {
            quotient: q as u32 & mask,
            remainder: r as u32 & mask,
            overflow: q > limit || q < -limit - 1,
        }
    } else {
        let n = dividend as u64;
        let q = n / divisor as u64;
        let r = n % divisor as u64;
        Division {
            quotient: q as u32 & mask,
            remainder: r as u32 & mask,
            overflow: q > mask as u64,
        }
    }
}

/// Multiply two `width` operands into a double-width product
pub fn multiply(a: u32, b: u32, width: Width, signed: bool) -> u32 {
    if signed {
        let a = width.sign_extend(a & width.mask()) as i32;
        let b = width.sign_extend(b & width.mask()) as i32;
        a.wrapping_mul(b) as u32
    } else {
        (a & width.mask()).wrapping_mul(b & width.mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_flags() {
        let mut f = 0;
        assert_eq!(add(&mut f, 0xFF, 0x01, false, Width::Byte), 0x00);
        assert_eq!(f, FLAG_Z | FLAG_H | FLAG_C);

        assert_eq!(add(&mut f, 0x7F, 0x01, false, Width::Byte), 0x80);
        assert_eq!(f, FLAG_S | FLAG_H | FLAG_V);

        assert_eq!(add(&mut f, 0xFFFF, 0x0001, true, Width::Word), 0x0001);
        assert_eq!(f & FLAG_C, FLAG_C);
    }

    #[test]
    fn test_long_add_has_no_half_carry() {
        let mut f = 0;
        add(&mut f, 0x0F, 0x01, false, Width::Long);
        assert_eq!(f & FLAG_H, 0);
    }

    #[test]
    fn test_sub_flags() {
        let mut f = 0;
        assert_eq!(sub(&mut f, 0x00, 0x01, false, Width::Byte), 0xFF);
        assert_eq!(f, FLAG_S | FLAG_H | FLAG_N | FLAG_C);

        assert_eq!(sub(&mut f, 0x80, 0x01, false, Width::Byte), 0x7F);
        assert_eq!(f, FLAG_H | FLAG_V | FLAG_N);

        assert_eq!(sub(&mut f, 5, 5, false, Width::Long), 0);
        assert_eq!(f, FLAG_Z | FLAG_N);
    }

    #[test]
    fn test_cp_preserves_operand() {
        let mut f = 0;
        assert_eq!(alu(&mut f, AluOp::Cp, 0x10, 0x20, Width::Byte), 0x10);
        assert_ne!(f & FLAG_C, 0);
    }

    #[test]
    fn test_logic_parity() {
        let mut f = 0;
        logic(&mut f, 0x03, Width::Byte, false);
        assert_eq!(f, FLAG_V);
        logic(&mut f, 0x01, Width::Byte, true);
        assert_eq!(f, FLAG_H);
        logic(&mut f, 0, Width::Word, false);
        assert_eq!(f, FLAG_Z | FLAG_V);
    }

    #[test]
    fn test_inc_dec_keep_carry() {
        let mut f = FLAG_C;
        assert_eq!(inc(&mut f, 0xFF, 1, Width::Byte), 0);
        assert_eq!(f & (FLAG_Z | FLAG_C), FLAG_Z | FLAG_C);
        let mut f = 0;
        assert_eq!(dec(&mut f, 0, 1, Width::Byte), 0xFF);
        assert_eq!(f & FLAG_C, 0);
    }

    #[test]
    fn test_shifts() {
        let mut f = 0;
        assert_eq!(shift(&mut f, ShiftOp::Rlc, 0x81, 1, Width::Byte), 0x03);
        assert_ne!(f & FLAG_C, 0);
        assert_eq!(shift(&mut f, ShiftOp::Sra, 0x80, 1, Width::Byte), 0xC0);
        assert_eq!(f & FLAG_C, 0);
        assert_eq!(shift(&mut f, ShiftOp::Srl, 0x8001, 1, Width::Word), 0x4000);
        assert_ne!(f & FLAG_C, 0);
        let mut f = FLAG_C;
        assert_eq!(shift(&mut f, ShiftOp::Rl, 0x00, 1, Width::Byte), 0x01);
        assert_eq!(shift(&mut f, ShiftOp::Sla, 0x01, 4, Width::Byte), 0x10);
    }

    #[test]
    fn test_daa() {
        let mut f = 0;
        let sum = add(&mut f, 0x19, 0x28, false, Width::Byte);
        assert_eq!(daa(&mut f, sum as u8), 0x47);
        let mut f = 0;
        let sum = add(&mut f, 0x99, 0x01, false, Width::Byte);
        assert_eq!(daa(&mut f, sum as u8), 0x00);
        assert_ne!(f & FLAG_C, 0);
        let mut f = 0;
        let diff = sub(&mut f, 0x42, 0x15, false, Width::Byte);
        assert_eq!(daa(&mut f, diff as u8), 0x27);
    }

    #[test]
    fn test_divide() {
        let d = divide(1000, 7, Width::Byte, false);
        assert_eq!(d, Division { quotient: 142, remainder: 6, overflow: false });

        let d = divide(0x1000, 2, Width::Byte, false);
        assert!(d.overflow);

        let d = divide(5, 0, Width::Word, false);
        assert!(d.overflow);
        assert_eq!(d.quotient, 0xFFFF);

        // -7 / 2 = -3 remainder -1
        let d = divide(0xFFF9, 2, Width::Byte, true);
        assert_eq!(d.quotient, 0xFD);
        assert_eq!(d.remainder, 0xFF);
        assert!(!d.overflow);
    }

    #[test]
    fn test_multiply() {
        assert_eq!(multiply(0xFF, 0xFF, Width::Byte, false), 0xFE01);
        assert_eq!(multiply(0xFF, 0x02, Width::Byte, true) & 0xFFFF, 0xFFFE);
        assert_eq!(multiply(0x1234, 0x10, Width::Word, false), 0x12340);
    }
}
