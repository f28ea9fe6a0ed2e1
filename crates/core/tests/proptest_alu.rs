//! Property-based tests for arithmetic, logic and shift flag rules.
//!
//! The logic and subtract formulas are also checked exhaustively over all
//! 256 x 256 operand pairs, since that space is small.

use avr_core::{Instruction, Machine, StatusFlags};
use proptest::prelude::*;

fn setup(rd: u8, rr: u8, sreg: u8) -> Machine {
    let mut m = Machine::new();
    load(&mut m, rd, rr, sreg);
    m
}

fn load(m: &mut Machine, rd: u8, rr: u8, sreg: u8) {
    m.regs.set(16, rd).unwrap();
    m.regs.set(17, rr).unwrap();
    m.cpu.sreg = StatusFlags::from_bits(sreg);
}

fn check_logic(inst: Instruction, expected: u8, before: StatusFlags, m: &Machine) -> Result<(), TestCaseError> {
    let f = m.cpu.sreg;
    prop_assert_eq!(m.regs.get(16).unwrap(), expected, "{:?}", inst);
    prop_assert_eq!(f.z, expected == 0);
    prop_assert_eq!(f.n, expected & 0x80 != 0);
    prop_assert!(!f.v);
    prop_assert_eq!(f.s, f.n);
    prop_assert_eq!(f.c, before.c);
    prop_assert_eq!(f.h, before.h);
    prop_assert_eq!(f.t, before.t);
    prop_assert_eq!(f.i, before.i);
    Ok(())
}

#[test]
fn logic_flags_all_pairs() {
    let mut m = Machine::new();
    for rd in 0..=255u8 {
        for rr in 0..=255u8 {
            for (inst, expected) in [
                (Instruction::And { d: 16, r: 17 }, rd & rr),
                (Instruction::Or { d: 16, r: 17 }, rd | rr),
                (Instruction::Eor { d: 16, r: 17 }, rd ^ rr),
            ] {
                load(&mut m, rd, rr, 0b0110_1001);
                let before = m.cpu.sreg;
                m.execute(inst).unwrap();
                check_logic(inst, expected, before, &m).unwrap();
            }
        }
    }
}

#[test]
fn sub_flags_all_pairs() {
    let mut m = Machine::new();
    for rd in 0..=255u8 {
        for rr in 0..=255u8 {
            load(&mut m, rd, rr, 0);
            m.execute(Instruction::Sub { d: 16, r: 17 }).unwrap();
            let r = rd.wrapping_sub(rr);
            let f = m.cpu.sreg;
            let (rd7, rr7, r7) = (rd >> 7 & 1, rr >> 7 & 1, r >> 7 & 1);
            let v = (rd7 & (rr7 ^ 1) & (r7 ^ 1)) | ((rd7 ^ 1) & rr7 & r7);
            assert_eq!(m.regs.get(16).unwrap(), r);
            assert_eq!(f.v, v == 1, "V for {:02X}-{:02X}", rd, rr);
            assert_eq!(f.c, rr > rd, "C for {:02X}-{:02X}", rd, rr);
            assert_eq!(f.z, r == 0);
            assert_eq!(f.n, r7 == 1);
            assert_eq!(f.s, f.n ^ f.v);
            assert_eq!(f.h, (rr & 0x0F) > (rd & 0x0F));
        }
    }
}

#[test]
fn add_flags_all_pairs() {
    let mut m = Machine::new();
    for rd in 0..=255u8 {
        for rr in 0..=255u8 {
            load(&mut m, rd, rr, 0);
            m.execute(Instruction::Add { d: 16, r: 17 }).unwrap();
            let f = m.cpu.sreg;
            let r = rd.wrapping_add(rr);
            assert_eq!(m.regs.get(16).unwrap(), r);
            assert_eq!(f.c, rd as u16 + rr as u16 > 0xFF);
            assert_eq!(f.h, (rd & 0x0F) + (rr & 0x0F) > 0x0F);
            assert_eq!(f.v, (rd as i8).checked_add(rr as i8).is_none());
            assert_eq!(f.s, f.n ^ f.v);
        }
    }
}

proptest! {
    /// Property: CLR then TST leaves the register at zero with Z=1, N=V=S=0
    #[test]
    fn prop_clr_then_tst(value in any::<u8>(), d in 0u8..32, sreg in any::<u8>()) {
        let mut m = Machine::new();
        m.regs.set(d, value).unwrap();
        m.cpu.sreg = StatusFlags::from_bits(sreg);
        m.execute(Instruction::Clr { d }).unwrap();
        m.execute(Instruction::Tst { d }).unwrap();
        let f = m.cpu.sreg;
        prop_assert_eq!(m.regs.get(d).unwrap(), 0);
        prop_assert!(f.z && !f.n && !f.v && !f.s);
    }

    /// Property: LSL carries out bit 7 and doubles modulo 256
    #[test]
    fn prop_lsl_carry(value in any::<u8>(), sreg in any::<u8>()) {
        let mut m = setup(value, 0, sreg);
        m.execute(Instruction::Lsl { d: 16 }).unwrap();
        let f = m.cpu.sreg;
        prop_assert_eq!(m.regs.get(16).unwrap(), value << 1);
        prop_assert_eq!(f.c, value & 0x80 != 0);
        prop_assert_eq!(f.h, value & 0x08 != 0);
        prop_assert_eq!(f.v, f.n ^ f.c);
    }

    /// Property: LSR carries out bit 0 and always clears N
    #[test]
    fn prop_lsr_carry(value in any::<u8>(), sreg in any::<u8>()) {
        let mut m = setup(value, 0, sreg);
        m.execute(Instruction::Lsr { d: 16 }).unwrap();
        let f = m.cpu.sreg;
        prop_assert_eq!(m.regs.get(16).unwrap(), value >> 1);
        prop_assert_eq!(f.c, value & 0x01 != 0);
        prop_assert!(!f.n);
        prop_assert_eq!(f.v, f.c);
        prop_assert_eq!(f.s, f.v);
    }

    /// Property: ROL then ROR restores the register and the carry
    #[test]
    fn prop_rol_ror_fixed_point(value in any::<u8>(), carry in any::<bool>()) {
        let mut m = setup(value, 0, 0);
        m.cpu.sreg.c = carry;
        m.execute(Instruction::Rol { d: 16 }).unwrap();
        m.execute(Instruction::Ror { d: 16 }).unwrap();
        prop_assert_eq!(m.regs.get(16).unwrap(), value);
        prop_assert_eq!(m.cpu.sreg.c, carry);

        m.execute(Instruction::Ror { d: 16 }).unwrap();
        m.execute(Instruction::Rol { d: 16 }).unwrap();
        prop_assert_eq!(m.regs.get(16).unwrap(), value);
        prop_assert_eq!(m.cpu.sreg.c, carry);
    }

    /// Property: ASR keeps the sign bit
    #[test]
    fn prop_asr_sign(value in any::<u8>()) {
        let mut m = setup(value, 0, 0);
        m.execute(Instruction::Asr { d: 16 }).unwrap();
        prop_assert_eq!(m.regs.get(16).unwrap(), ((value as i8) >> 1) as u8);
        prop_assert_eq!(m.cpu.sreg.c, value & 1 != 0);
    }

    /// Property: SWAP twice is the identity and never touches SREG
    #[test]
    fn prop_swap_involution(value in any::<u8>(), sreg in any::<u8>()) {
        let mut m = setup(value, 0, sreg);
        m.execute(Instruction::Swap { d: 16 }).unwrap();
        prop_assert_eq!(m.regs.get(16).unwrap(), value.rotate_left(4));
        m.execute(Instruction::Swap { d: 16 }).unwrap();
        prop_assert_eq!(m.regs.get(16).unwrap(), value);
        prop_assert_eq!(m.cpu.sreg.bits(), sreg);
    }

    /// Property: SUB/SBC chain over two bytes equals a 16-bit subtraction
    #[test]
    fn prop_sub_sbc_chain(a in any::<u16>(), b in any::<u16>()) {
        let mut m = Machine::new();
        m.regs.set_pair(24, a).unwrap();
        m.regs.set_pair(26, b).unwrap();
        m.execute(Instruction::Sub { d: 24, r: 26 }).unwrap();
        m.execute(Instruction::Sbc { d: 25, r: 27 }).unwrap();
        let r = a.wrapping_sub(b);
        prop_assert_eq!(m.regs.pair(24).unwrap(), r);
        prop_assert_eq!(m.cpu.sreg.c, b > a);
        prop_assert_eq!(m.cpu.sreg.z, r == 0);
        prop_assert_eq!(m.cpu.sreg.n, r & 0x8000 != 0);
    }

    /// Property: CP/CPC over two bytes compares without writing back
    #[test]
    fn prop_cp_cpc_chain(a in any::<u16>(), b in any::<u16>()) {
        let mut m = Machine::new();
        m.regs.set_pair(24, a).unwrap();
        m.regs.set_pair(26, b).unwrap();
        m.execute(Instruction::Cp { d: 24, r: 26 }).unwrap();
        m.execute(Instruction::Cpc { d: 25, r: 27 }).unwrap();
        prop_assert_eq!(m.regs.pair(24).unwrap(), a);
        prop_assert_eq!(m.cpu.sreg.c, b > a);
        prop_assert_eq!(m.cpu.sreg.z, a == b);
    }

    /// Property: ADD/ADC over two bytes equals a 16-bit addition
    #[test]
    fn prop_add_adc_chain(a in any::<u16>(), b in any::<u16>()) {
        let mut m = Machine::new();
        m.regs.set_pair(24, a).unwrap();
        m.regs.set_pair(26, b).unwrap();
        m.execute(Instruction::Add { d: 24, r: 26 }).unwrap();
        m.execute(Instruction::Adc { d: 25, r: 27 }).unwrap();
        prop_assert_eq!(m.regs.pair(24).unwrap(), a.wrapping_add(b));
        prop_assert_eq!(m.cpu.sreg.c, a as u32 + b as u32 > 0xFFFF);
    }

    /// Property: ADIW then SBIW with the same constant is the identity
    #[test]
    fn prop_adiw_sbiw(v in any::<u16>(), k in 0u8..64, pair in prop::sample::select(vec![24u8, 26, 28, 30])) {
        let mut m = Machine::new();
        m.regs.set_pair(pair, v).unwrap();
        m.execute(Instruction::Adiw { d: pair, k }).unwrap();
        prop_assert_eq!(m.regs.pair(pair).unwrap(), v.wrapping_add(k as u16));
        prop_assert_eq!(m.cpu.sreg.c, v as u32 + k as u32 > 0xFFFF);
        m.execute(Instruction::Sbiw { d: pair, k }).unwrap();
        prop_assert_eq!(m.regs.pair(pair).unwrap(), v);
    }

    /// Property: MUL family products land in R1:R0 with C = bit 15
    #[test]
    fn prop_mul_family(a in any::<u8>(), b in any::<u8>()) {
        let mut m = setup(a, b, 0);
        m.execute(Instruction::Mul { d: 16, r: 17 }).unwrap();
        let p = a as u16 * b as u16;
        prop_assert_eq!(m.regs.pair(0).unwrap(), p);
        prop_assert_eq!(m.cpu.sreg.c, p & 0x8000 != 0);
        prop_assert_eq!(m.cpu.sreg.z, p == 0);

        m.execute(Instruction::Muls { d: 16, r: 17 }).unwrap();
        prop_assert_eq!(m.regs.pair(0).unwrap() as i16, a as i8 as i16 * b as i8 as i16);

        m.execute(Instruction::Fmul { d: 16, r: 17 }).unwrap();
        prop_assert_eq!(m.regs.pair(0).unwrap(), p << 1);
        prop_assert_eq!(m.cpu.sreg.c, p & 0x8000 != 0);
    }

    /// Property: NEG equals subtraction from zero
    #[test]
    fn prop_neg(value in any::<u8>()) {
        let mut m = setup(value, 0, 0);
        m.execute(Instruction::Neg { d: 16 }).unwrap();
        prop_assert_eq!(m.regs.get(16).unwrap(), value.wrapping_neg());
        prop_assert_eq!(m.cpu.sreg.c, value != 0);
        prop_assert_eq!(m.cpu.sreg.v, value == 0x80);
    }

    /// Property: an out-of-range register leaves every flag and PC untouched
    #[test]
    fn prop_invalid_register_is_atomic(d in 32u8..=255, sreg in any::<u8>()) {
        let mut m = Machine::new();
        m.cpu.sreg = StatusFlags::from_bits(sreg);
        prop_assert!(m.execute(Instruction::Add { d, r: 0 }).is_err(), "ADD with d={} should error", d);
        prop_assert!(m.execute(Instruction::Inc { d }).is_err(), "INC with d={} should error", d);
        prop_assert!(m.execute(Instruction::Cpi { d, k: 0 }).is_err(), "CPI with d={} should error", d);
        prop_assert_eq!(m.cpu.sreg.bits(), sreg);
        prop_assert_eq!(m.cpu.pc, 0);
    }
}

#[test]
fn lsl_example() {
    let mut m = setup(0b1000_0001, 0, 0);
    m.execute(Instruction::Lsl { d: 16 }).unwrap();
    assert_eq!(m.regs.get(16).unwrap(), 0b0000_0010);
    assert!(m.cpu.sreg.c);
    assert!(!m.cpu.sreg.z);
    assert!(!m.cpu.sreg.n);
}
