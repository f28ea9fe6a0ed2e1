//! AVR status register (SREG).
//!
//! The eight condition flags are kept as named booleans rather than a packed
//! byte so that every instruction handler states exactly which flags it
//! touches. [`StatusFlags::bits`] and [`StatusFlags::from_bits`] convert to and
//! from the `I T H S V N Z C` (bit 7..0) layout seen through the I/O-mapped
//! SREG register at data address 0x5F.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Operand, Result};

/// One SREG flag, numbered by its bit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Carry
    C = 0,
    /// Zero
    Z = 1,
    /// Negative
    N = 2,
    /// Two's complement overflow
    V = 3,
    /// Sign, N ^ V
    S = 4,
    /// Half carry
    H = 5,
    /// Transfer bit (BST/BLD)
    T = 6,
    /// Global interrupt enable
    I = 7,
}

impl Flag {
    pub const ALL: [Flag; 8] = [
        Flag::C, Flag::Z, Flag::N, Flag::V,
        Flag::S, Flag::H, Flag::T, Flag::I,
    ];

    /// Look up a flag by its 3-bit SREG index (BRBS/BRBC/BSET/BCLR operand).
    pub fn from_index(s: u8) -> Result<Flag> {
        Flag::ALL
            .get(s as usize)
            .copied()
            .ok_or(CoreError::InvalidOperand { kind: Operand::Flag, value: s as u32 })
    }

    #[inline(always)]
    pub fn index(self) -> u8 {
        self as u8
    }
}

/// Status register: C Z N V S H T I.
///
/// S is stored, not derived on read. Arithmetic helpers recompute it with
/// [`StatusFlags::update_sign`] after touching N or V; BSET/BCLR and OUT to
/// SREG may leave it inconsistent with N ^ V, as the hardware does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    pub c: bool,
    pub z: bool,
    pub n: bool,
    pub v: bool,
    pub s: bool,
    pub h: bool,
    pub t: bool,
    pub i: bool,
}

impl StatusFlags {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::C => self.c,
            Flag::Z => self.z,
            Flag::N => self.n,
            Flag::V => self.v,
            Flag::S => self.s,
            Flag::H => self.h,
            Flag::T => self.t,
            Flag::I => self.i,
        }
    }

    #[inline(always)]
    pub fn set(&mut self, flag: Flag, value: bool) {
        let slot = match flag {
            Flag::C => &mut self.c,
            Flag::Z => &mut self.z,
            Flag::N => &mut self.n,
            Flag::V => &mut self.v,
            Flag::S => &mut self.s,
            Flag::H => &mut self.h,
            Flag::T => &mut self.t,
            Flag::I => &mut self.i,
        };
        *slot = value;
    }

    /// S <- N ^ V
    #[inline(always)]
    pub fn update_sign(&mut self) {
        self.s = self.n ^ self.v;
    }

    /// Pack into the hardware byte layout (I at bit 7, C at bit 0).
    pub fn bits(&self) -> u8 {
        Flag::ALL
            .iter()
            .filter(|&&f| self.get(f))
            .fold(0u8, |acc, &f| acc | (1 << f.index()))
    }

    pub fn from_bits(bits: u8) -> Self {
        let mut flags = StatusFlags::default();
        for f in Flag::ALL {
            flags.set(f, bits & (1 << f.index()) != 0);
        }
        flags
    }
}

/// Formats as `ITHSVNZC`, upper case for set flags and lower case for clear.
impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flag in Flag::ALL.iter().rev() {
            let name = match flag {
                Flag::C => 'C',
                Flag::Z => 'Z',
                Flag::N => 'N',
                Flag::V => 'V',
                Flag::S => 'S',
                Flag::H => 'H',
                Flag::T => 'T',
                Flag::I => 'I',
            };
            let shown = if self.get(*flag) { name } else { name.to_ascii_lowercase() };
            write!(f, "{}", shown)?;
        }
        Ok(())
    }
}
