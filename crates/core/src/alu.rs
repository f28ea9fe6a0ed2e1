//! SREG flag computation for the arithmetic, logic and shift instructions.
//!
//! Each helper computes the 8- or 16-bit result, updates exactly the flags the
//! AVR instruction set manual lists for that instruction class, and returns
//! the result for write-back. Flags the manual marks as unaffected are left
//! alone. Formulas are written over individual result/operand bits the way
//! the manual states them (`Rd7`, `Rr3`, `R7` ...).

use crate::flags::StatusFlags;

#[inline(always)]
fn bit(v: u8, n: u8) -> u8 {
    (v >> n) & 1
}

/// ADD / ADC (and LSL / ROL, which are ADD/ADC Rd,Rd).
pub fn add(f: &mut StatusFlags, rd: u8, rr: u8, carry_in: bool) -> u8 {
    let r = rd.wrapping_add(rr).wrapping_add(carry_in as u8);
    let (rd3, rr3, r3) = (bit(rd, 3), bit(rr, 3), bit(r, 3));
    let (rd7, rr7, r7) = (bit(rd, 7), bit(rr, 7), bit(r, 7));
    f.h = ((rd3 & rr3) | (rr3 & (r3 ^ 1)) | ((r3 ^ 1) & rd3)) != 0;
    f.v = ((rd7 & rr7 & (r7 ^ 1)) | ((rd7 ^ 1) & (rr7 ^ 1) & r7)) != 0;
    f.c = ((rd7 & rr7) | (rr7 & (r7 ^ 1)) | ((r7 ^ 1) & rd7)) != 0;
    f.n = r7 != 0;
    f.z = r == 0;
    f.update_sign();
    r
}

/// SUB / SUBI / SBC / SBCI / CP / CPC / CPI / NEG.
///
/// With `chain_z` set (SBC, SBCI, CPC) Z can only be cleared: it stays set
/// when the result is zero and Z was already set, so that a multi-byte
/// subtract or compare reports zero only if every byte was zero.
pub fn sub(f: &mut StatusFlags, rd: u8, rr: u8, borrow_in: bool, chain_z: bool) -> u8 {
    let r = rd.wrapping_sub(rr).wrapping_sub(borrow_in as u8);
    let (rd3, rr3, r3) = (bit(rd, 3), bit(rr, 3), bit(r, 3));
    let (rd7, rr7, r7) = (bit(rd, 7), bit(rr, 7), bit(r, 7));
    f.h = (((rd3 ^ 1) & rr3) | (rr3 & r3) | (r3 & (rd3 ^ 1))) != 0;
    f.v = ((rd7 & (rr7 ^ 1) & (r7 ^ 1)) | ((rd7 ^ 1) & rr7 & r7)) != 0;
    f.c = (((rd7 ^ 1) & rr7) | (rr7 & r7) | (r7 & (rd7 ^ 1))) != 0;
    f.n = r7 != 0;
    f.z = if chain_z { r == 0 && f.z } else { r == 0 };
    f.update_sign();
    r
}

/// NEG: two's complement, 0x00 - Rd.
///
/// The subtract formulas with Rd = 0 reduce to the manual's NEG rules:
/// H = R3 + Rd3, V = (R == 0x80), C = (R != 0).
pub fn neg(f: &mut StatusFlags, rd: u8) -> u8 {
    sub(f, 0, rd, false, false)
}

/// AND / ANDI / OR / ORI / EOR and their aliases. V cleared, C and H untouched.
pub fn logic(f: &mut StatusFlags, r: u8) -> u8 {
    f.v = false;
    f.n = bit(r, 7) != 0;
    f.z = r == 0;
    f.update_sign();
    r
}

/// COM: one's complement. C set, V cleared.
pub fn com(f: &mut StatusFlags, rd: u8) -> u8 {
    let r = logic(f, !rd);
    f.c = true;
    r
}

/// INC: C and H untouched, V set only on 0x7F -> 0x80.
pub fn inc(f: &mut StatusFlags, rd: u8) -> u8 {
    let r = rd.wrapping_add(1);
    f.v = rd == 0x7F;
    f.n = bit(r, 7) != 0;
    f.z = r == 0;
    f.update_sign();
    r
}

/// DEC: C and H untouched, V set only on 0x80 -> 0x7F.
pub fn dec(f: &mut StatusFlags, rd: u8) -> u8 {
    let r = rd.wrapping_sub(1);
    f.v = rd == 0x80;
    f.n = bit(r, 7) != 0;
    f.z = r == 0;
    f.update_sign();
    r
}

/// Common tail of the right shifts: C = bit shifted out, V = N ^ C.
#[inline(always)]
fn shift_right_flags(f: &mut StatusFlags, rd: u8, r: u8) -> u8 {
    f.c = bit(rd, 0) != 0;
    f.n = bit(r, 7) != 0;
    f.v = f.n ^ f.c;
    f.z = r == 0;
    f.update_sign();
    r
}

/// LSL: bit 7 -> C, bit 0 cleared.
pub fn lsl(f: &mut StatusFlags, rd: u8) -> u8 {
    add(f, rd, rd, false)
}

/// ROL: bit 7 -> C, old C -> bit 0.
pub fn rol(f: &mut StatusFlags, rd: u8) -> u8 {
    let c = f.c;
    add(f, rd, rd, c)
}

/// LSR: bit 0 -> C, bit 7 cleared (so N = 0).
pub fn lsr(f: &mut StatusFlags, rd: u8) -> u8 {
    shift_right_flags(f, rd, rd >> 1)
}

/// ROR: bit 0 -> C, old C -> bit 7.
pub fn ror(f: &mut StatusFlags, rd: u8) -> u8 {
    let r = (rd >> 1) | ((f.c as u8) << 7);
    shift_right_flags(f, rd, r)
}

/// ASR: bit 0 -> C, bit 7 held.
pub fn asr(f: &mut StatusFlags, rd: u8) -> u8 {
    let r = ((rd as i8) >> 1) as u8;
    shift_right_flags(f, rd, r)
}

/// SWAP has no flag effect.
#[inline(always)]
pub fn swap(rd: u8) -> u8 {
    rd.rotate_left(4)
}

/// ADIW on a 16-bit pair. H untouched.
pub fn adiw(f: &mut StatusFlags, rd: u16, k: u8) -> u16 {
    let r = rd.wrapping_add(k as u16);
    let rdh7 = (rd >> 15) as u8;
    let r15 = (r >> 15) as u8;
    f.v = ((rdh7 ^ 1) & r15) != 0;
    f.c = ((r15 ^ 1) & rdh7) != 0;
    f.n = r15 != 0;
    f.z = r == 0;
    f.update_sign();
    r
}

/// SBIW on a 16-bit pair. H untouched.
pub fn sbiw(f: &mut StatusFlags, rd: u16, k: u8) -> u16 {
    let r = rd.wrapping_sub(k as u16);
    let rdh7 = (rd >> 15) as u8;
    let r15 = (r >> 15) as u8;
    f.v = (rdh7 & (r15 ^ 1)) != 0;
    f.c = (r15 & (rdh7 ^ 1)) != 0;
    f.n = r15 != 0;
    f.z = r == 0;
    f.update_sign();
    r
}

/// Multiply result flags. `product` is the raw 16-bit product; for the
/// fractional forms the result is shifted left one place and C comes from
/// bit 15 before the shift.
pub fn multiply(f: &mut StatusFlags, product: u16, fractional: bool) -> u16 {
    let r = if fractional { product << 1 } else { product };
    f.c = product & 0x8000 != 0;
    f.z = r == 0;
    r
}
