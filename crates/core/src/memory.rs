//! Data space and program memory.
//!
//! Instruction handlers never index memory directly. Every data access goes
//! through [`Machine::read_data`] / [`Machine::write_data`], which resolve the
//! architectural aliases (register file at 0x00–0x1F, SREG and SP at
//! 0x5D–0x5F) and hand everything else to a [`Bus`]. A host that models
//! peripherals supplies its own `Bus`; [`Memory`] is the flat default.

use crate::config::MachineConfig;
use crate::flags::StatusFlags;
use crate::{CoreError, Machine, Operand, Result};
use crate::{IO_OFFSET, REG_COUNT, SPH_ADDR, SPL_ADDR, SREG_ADDR};

/// Byte-level access to data space and program memory.
///
/// `read` takes `&mut self` so that implementations can model
/// read-sensitive I/O registers. Out-of-range addresses are reported, not
/// wrapped.
pub trait Bus {
    fn read(&mut self, addr: u16) -> Result<u8>;
    fn write(&mut self, addr: u16, value: u8) -> Result<()>;
    /// Read one byte of program memory (LPM uses byte addresses).
    fn read_program_byte(&self, byte_addr: u32) -> Result<u8>;
    /// Write one program word (SPM uses word addresses).
    fn write_program_word(&mut self, word_addr: u32, value: u16) -> Result<()>;
}

/// Flat data-space image plus flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    /// Unified data space: register shadow (0x00-0x1F) + I/O (0x20-0xFF) + SRAM
    pub data: Vec<u8>,
    /// Program memory (flash)
    pub flash: Vec<u8>,
}

impl Memory {
    pub fn new(config: &MachineConfig) -> Self {
        Memory {
            data: vec![0u8; config.data_size],
            flash: vec![0u8; config.flash_size],
        }
    }

    /// Copy a raw program image to the start of flash.
    pub fn load_program(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > self.flash.len() {
            return Err(CoreError::InvalidOperand {
                kind: Operand::ProgramAddress,
                value: image.len() as u32,
            });
        }
        self.flash[..image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Read a little-endian program word at a word address.
    pub fn read_program_word(&self, word_addr: u32) -> Result<u16> {
        let lo = self.read_program_byte(word_addr * 2)?;
        let hi = self.read_program_byte(word_addr * 2 + 1)?;
        Ok(lo as u16 | ((hi as u16) << 8))
    }

    fn check_data(&self, addr: u16) -> Result<usize> {
        let a = addr as usize;
        if a < self.data.len() {
            Ok(a)
        } else {
            Err(CoreError::InvalidOperand { kind: Operand::DataAddress, value: addr as u32 })
        }
    }
}

impl Bus for Memory {
    #[inline(always)]
    fn read(&mut self, addr: u16) -> Result<u8> {
        let a = self.check_data(addr)?;
        Ok(self.data[a])
    }

    #[inline(always)]
    fn write(&mut self, addr: u16, value: u8) -> Result<()> {
        let a = self.check_data(addr)?;
        self.data[a] = value;
        Ok(())
    }

    fn read_program_byte(&self, byte_addr: u32) -> Result<u8> {
        self.flash
            .get(byte_addr as usize)
            .copied()
            .ok_or(CoreError::InvalidOperand { kind: Operand::ProgramAddress, value: byte_addr })
    }

    fn write_program_word(&mut self, word_addr: u32, value: u16) -> Result<()> {
        let a = word_addr as usize * 2;
        if a + 1 >= self.flash.len() {
            return Err(CoreError::InvalidOperand { kind: Operand::ProgramAddress, value: word_addr });
        }
        self.flash[a] = value as u8;
        self.flash[a + 1] = (value >> 8) as u8;
        Ok(())
    }
}

// ---- Data-space view of the machine ----

impl<B: Bus> Machine<B> {
    /// Read a byte from data space.
    pub fn read_data(&mut self, addr: u16) -> Result<u8> {
        match addr {
            a if (a as usize) < REG_COUNT => self.regs.get(a as u8),
            SREG_ADDR => Ok(self.cpu.sreg.bits()),
            SPH_ADDR => Ok((self.cpu.sp >> 8) as u8),
            SPL_ADDR => Ok(self.cpu.sp as u8),
            _ => self.bus.read(addr),
        }
    }

    /// Write a byte to data space.
    ///
    /// Writes to SREG, SPH and SPL update the CPU state they alias.
    pub fn write_data(&mut self, addr: u16, value: u8) -> Result<()> {
        match addr {
            a if (a as usize) < REG_COUNT => self.regs.set(a as u8, value),
            SREG_ADDR => {
                self.cpu.sreg = StatusFlags::from_bits(value);
                Ok(())
            }
            SPH_ADDR => {
                self.cpu.sp = (self.cpu.sp & 0x00FF) | ((value as u16) << 8);
                Ok(())
            }
            SPL_ADDR => {
                self.cpu.sp = (self.cpu.sp & 0xFF00) | value as u16;
                Ok(())
            }
            _ => self.bus.write(addr, value),
        }
    }

    /// Translate an I/O-space address (IN/OUT, SBI/CBI, SBIC/SBIS) to data space.
    ///
    /// `limit` is the exclusive upper bound of the instruction's I/O field:
    /// 64 for IN/OUT, 32 for the bit instructions.
    #[inline(always)]
    pub(crate) fn io_addr(a: u8, limit: u8) -> Result<u16> {
        if a < limit {
            Ok(a as u16 + IO_OFFSET)
        } else {
            Err(CoreError::InvalidOperand { kind: Operand::IoAddress, value: a as u32 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_bounds() {
        let cfg = MachineConfig::default();
        let mut mem = Memory::new(&cfg);
        mem.write(0x0AFF, 0x42).unwrap();
        assert_eq!(mem.read(0x0AFF).unwrap(), 0x42);
        assert_eq!(
            mem.read(0x0B00),
            Err(CoreError::InvalidOperand { kind: Operand::DataAddress, value: 0x0B00 })
        );
        assert!(mem.write(0xFFFF, 0).is_err());
    }

    #[test]
    fn test_program_word() {
        let mut mem = Memory::new(&MachineConfig::default());
        mem.load_program(&[0x0C, 0x94, 0x34, 0x12]).unwrap();
        assert_eq!(mem.read_program_word(0).unwrap(), 0x940C);
        assert_eq!(mem.read_program_word(1).unwrap(), 0x1234);

        mem.write_program_word(2, 0xBEEF).unwrap();
        assert_eq!(mem.flash[4], 0xEF);
        assert_eq!(mem.flash[5], 0xBE);
        assert!(mem.write_program_word(16 * 1024, 0).is_err());
    }

    #[test]
    fn test_load_program_too_large() {
        let mut mem = Memory::new(&MachineConfig::default());
        let image = vec![0u8; 32 * 1024 + 1];
        assert!(mem.load_program(&image).is_err());
    }

    #[test]
    fn test_data_space_aliases() {
        let mut m = Machine::new();
        m.write_data(0x05, 0x77).unwrap();
        assert_eq!(m.regs.get(5).unwrap(), 0x77);
        assert_eq!(m.read_data(0x05).unwrap(), 0x77);

        m.write_data(SREG_ADDR, 0x81).unwrap();
        assert!(m.cpu.sreg.i && m.cpu.sreg.c && !m.cpu.sreg.z);

        m.write_data(SPH_ADDR, 0x08).unwrap();
        m.write_data(SPL_ADDR, 0x10).unwrap();
        assert_eq!(m.cpu.sp, 0x0810);
        assert_eq!(m.read_data(SPL_ADDR).unwrap(), 0x10);

        m.write_data(0x0200, 0xAA).unwrap();
        assert_eq!(m.bus.data[0x0200], 0xAA);
    }

    #[test]
    fn test_io_addr() {
        assert_eq!(Machine::<Memory>::io_addr(0x3F, 64).unwrap(), SREG_ADDR);
        assert!(Machine::<Memory>::io_addr(32, 32).is_err());
    }
}
