//! Memory geometry of the simulated part.
//!
//! | Address Range        | Content                          |
//! |----------------------|----------------------------------|
//! | 0x0000–0x001F        | Register file shadow R0–R31      |
//! | 0x0020–0x005F        | I/O registers (IN/OUT space)     |
//! | 0x0060–0x00FF        | Extended I/O                     |
//! | `ram_start`–RAMEND   | SRAM; the stack grows down from RAMEND |

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result, IO_SIZE, REG_COUNT};

/// ATmega32u4 SRAM: 2.5 KB
pub const SRAM_SIZE_32U4: usize = 2 * 1024 + 512;
/// ATmega328P SRAM: 2 KB
pub const SRAM_SIZE_328P: usize = 2 * 1024;
/// Flash size shared by both presets: 32 KB
pub const FLASH_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Total data space in bytes (registers + I/O + SRAM)
    pub data_size: usize,
    /// First SRAM address; the stack may not grow below it
    pub ram_start: u16,
    /// Program memory size in bytes
    pub flash_size: usize,
}

impl MachineConfig {
    /// ATmega32u4 (Arduboy, Leonardo)
    pub fn atmega32u4() -> Self {
        MachineConfig {
            data_size: REG_COUNT + IO_SIZE + SRAM_SIZE_32U4,
            ram_start: (REG_COUNT + IO_SIZE) as u16,
            flash_size: FLASH_SIZE,
        }
    }

    /// ATmega328P (Arduino Uno)
    pub fn atmega328p() -> Self {
        MachineConfig {
            data_size: REG_COUNT + IO_SIZE + SRAM_SIZE_328P,
            ram_start: (REG_COUNT + IO_SIZE) as u16,
            flash_size: FLASH_SIZE,
        }
    }

    /// RAMEND: highest data address, where SP points after reset.
    pub fn stack_top(&self) -> u16 {
        self.data_size.saturating_sub(1) as u16
    }

    /// Number of 16-bit program words.
    pub fn program_words(&self) -> u32 {
        (self.flash_size / 2) as u32
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_size > 0x1_0000 {
            return Err(CoreError::InvalidConfig(format!(
                "data space of {} bytes exceeds 16-bit addressing", self.data_size)));
        }
        if (self.ram_start as usize) < REG_COUNT + IO_SIZE || (self.ram_start as usize) >= self.data_size {
            return Err(CoreError::InvalidConfig(format!(
                "ram_start 0x{:04X} outside 0x{:04X}..0x{:04X}",
                self.ram_start, REG_COUNT + IO_SIZE, self.data_size)));
        }
        if self.flash_size < 2 || self.flash_size % 2 != 0 || self.flash_size > 0x2_0000 {
            return Err(CoreError::InvalidConfig(format!(
                "flash size {} must be an even byte count up to 128 KB", self.flash_size)));
        }
        Ok(())
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::atmega32u4()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let c = MachineConfig::atmega32u4();
        assert_eq!(c.data_size, 0x0B00);
        assert_eq!(c.stack_top(), 0x0AFF);
        assert_eq!(c.ram_start, 0x0100);
        assert!(c.validate().is_ok());

        let c = MachineConfig::atmega328p();
        assert_eq!(c.stack_top(), 0x08FF);
        assert_eq!(c.program_words(), 16 * 1024);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let mut c = MachineConfig::default();
        c.ram_start = 0x40;
        assert!(matches!(c.validate(), Err(CoreError::InvalidConfig(_))));

        let mut c = MachineConfig::default();
        c.data_size = 0x2_0000;
        assert!(c.validate().is_err());

        let mut c = MachineConfig::default();
        c.flash_size = 3;
        assert!(c.validate().is_err());

        let c = MachineConfig { data_size: 0, ..MachineConfig::default() };
        assert_eq!(c.stack_top(), 0);
        assert!(c.validate().is_err());
    }
}
