//! General-purpose register file R0–R31.
//!
//! R26:R27, R28:R29 and R30:R31 double as the X, Y and Z pointers (low byte
//! at the even index). [`Pointer`] is the 16-bit view over those slots used
//! by indirect loads and stores; [`RegisterFile::pair`] covers the other
//! word-wide operands (MOVW, ADIW/SBIW).

use crate::{CoreError, Operand, Result, REG_COUNT};

/// Indirect address register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pointer {
    /// R27:R26
    X,
    /// R29:R28
    Y,
    /// R31:R30
    Z,
}

impl Pointer {
    /// Index of the low byte in the register file.
    #[inline(always)]
    pub fn low(self) -> usize {
        match self {
            Pointer::X => 26,
            Pointer::Y => 28,
            Pointer::Z => 30,
        }
    }
}

#[inline(always)]
fn check_reg(r: u8) -> Result<usize> {
    if (r as usize) < REG_COUNT {
        Ok(r as usize)
    } else {
        Err(CoreError::InvalidOperand { kind: Operand::Register, value: r as u32 })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    regs: [u8; REG_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn get(&self, r: u8) -> Result<u8> {
        Ok(self.regs[check_reg(r)?])
    }

    #[inline(always)]
    pub fn set(&mut self, r: u8, v: u8) -> Result<()> {
        self.regs[check_reg(r)?] = v;
        Ok(())
    }

    /// Read the 16-bit pair Rlo+1:Rlo. `lo` must be even.
    pub fn pair(&self, lo: u8) -> Result<u16> {
        let base = Self::check_pair(lo)?;
        Ok(self.regs[base] as u16 | ((self.regs[base + 1] as u16) << 8))
    }

    /// Write both halves of Rlo+1:Rlo in one step.
    pub fn set_pair(&mut self, lo: u8, v: u16) -> Result<()> {
        let base = Self::check_pair(lo)?;
        self.regs[base] = v as u8;
        self.regs[base + 1] = (v >> 8) as u8;
        Ok(())
    }

    #[inline(always)]
    pub fn pointer(&self, p: Pointer) -> u16 {
        let base = p.low();
        self.regs[base] as u16 | ((self.regs[base + 1] as u16) << 8)
    }

    #[inline(always)]
    pub fn set_pointer(&mut self, p: Pointer, v: u16) {
        let base = p.low();
        self.regs[base] = v as u8;
        self.regs[base + 1] = (v >> 8) as u8;
    }

    pub fn as_bytes(&self) -> &[u8; REG_COUNT] {
        &self.regs
    }

    pub fn from_bytes(regs: [u8; REG_COUNT]) -> Self {
        RegisterFile { regs }
    }

    fn check_pair(lo: u8) -> Result<usize> {
        let base = check_reg(lo)?;
        if base % 2 != 0 {
            return Err(CoreError::InvalidOperand { kind: Operand::RegisterPair, value: lo as u32 });
        }
        Ok(base)
    }
}
