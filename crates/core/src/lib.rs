//! # avr-core
//!
//! Instruction execution core for 8-bit AVR microcontrollers (ATmega32u4,
//! ATmega328P geometry presets).
//!
//! The core is handed already-decoded [`Instruction`] values and applies them
//! to a [`Machine`]: register file, status flags, stack and data space. Every
//! handler finishes by computing the next program counter, so after each
//! [`Machine::execute`] the PC alone tells the fetch loop what runs next.
//! Decoding raw program words, peripheral behavior and cycle timing belong to
//! the host.
//!
//! ## Architecture
//!
//! - [`Machine`]: CPU, registers, bus and memory geometry
//! - [`Cpu`]: PC, SP, SREG and sleep state
//! - [`StatusFlags`]: SREG as eight named flags
//! - [`RegisterFile`]: R0–R31 with the X/Y/Z [`Pointer`] view
//! - [`Bus`] / [`Memory`]: data space and program memory behind the core
//! - [`alu`]: bit-exact SREG formulas per instruction class
//! - [`program`]: pre-decoded program listing and step/run loop
//! - [`snapshot`]: serializable machine state for deterministic replay
//! - [`rewind`]: snapshot ring buffer for stepping backwards
//! - [`debugger`]: watchpoint bus adapter and RAM viewer
//!
//! ## Errors
//!
//! Operand indices outside the architectural range, unmodeled operations and
//! stack pointer excursions past the stack region are reported as
//! [`CoreError`] before the failing instruction touches flags or PC.

use std::fmt;

use log::debug;
use thiserror::Error;

pub mod alu;
pub mod config;
pub mod cpu;
pub mod debugger;
pub mod flags;
pub mod instruction;
pub mod memory;
pub mod program;
pub mod registers;
pub mod rewind;
pub mod snapshot;

pub use config::MachineConfig;
pub use cpu::{Cpu, Flow};
pub use debugger::{WatchBus, WatchKind};
pub use flags::{Flag, StatusFlags};
pub use instruction::{Instruction, PointerMode};
pub use memory::{Bus, Memory};
pub use program::Program;
pub use registers::{Pointer, RegisterFile};
pub use rewind::RewindBuffer;
pub use snapshot::{Snapshot, SnapshotError};

/// Number of general-purpose registers (R0–R31)
pub const REG_COUNT: usize = 32;
/// I/O + extended I/O register space size (0x20..0xFF)
pub const IO_SIZE: usize = 224;
/// Offset between I/O-space addresses (IN/OUT) and data-space addresses
pub const IO_OFFSET: u16 = 0x20;

// I/O register addresses (data space addresses, not I/O addresses)
pub const SREG_ADDR: u16 = 0x5F;
pub const SPH_ADDR: u16 = 0x5E;
pub const SPL_ADDR: u16 = 0x5D;

/// Kind of operand rejected by [`CoreError::InvalidOperand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register,
    RegisterPair,
    Flag,
    Bit,
    IoAddress,
    DataAddress,
    ProgramAddress,
    Pointer,
    Displacement,
    Immediate,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operand::Register => "register",
            Operand::RegisterPair => "register pair",
            Operand::Flag => "flag",
            Operand::Bit => "bit",
            Operand::IoAddress => "I/O address",
            Operand::DataAddress => "data address",
            Operand::ProgramAddress => "program address",
            Operand::Pointer => "pointer",
            Operand::Displacement => "displacement",
            Operand::Immediate => "immediate",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid {kind} operand 0x{value:X}")]
    InvalidOperand { kind: Operand, value: u32 },
    #[error("unimplemented operation: {0}")]
    UnimplementedOperation(String),
    #[error("stack overflow (SP=0x{sp:04X})")]
    StackOverflow { sp: u16 },
    #[error("stack underflow (SP=0x{sp:04X})")]
    StackUnderflow { sp: u16 },
    #[error("invalid machine configuration: {0}")]
    InvalidConfig(String),
}

/// Complete state of one simulated AVR.
///
/// All mutation goes through `&mut self`, so a `Machine` has a single writer
/// by construction. Several independent machines can coexist.
pub struct Machine<B: Bus = Memory> {
    pub cpu: Cpu,
    pub regs: RegisterFile,
    pub bus: B,
    config: MachineConfig,
}

impl Machine<Memory> {
    /// Create an ATmega32u4-sized machine in reset state.
    pub fn new() -> Self {
        let config = MachineConfig::default();
        Machine::assemble(config, Memory::new(&config))
    }

    /// Create a machine with flat memory sized by `config`.
    pub fn with_config(config: MachineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Machine::assemble(config, Memory::new(&config)))
    }

    /// Reset CPU, registers and data space. Program memory is preserved.
    pub fn reset(&mut self) {
        self.bus.data.fill(0);
        self.reset_cpu();
    }
}

impl<B: Bus> Machine<B> {
    /// Wrap a host-provided bus. The caller is responsible for `config`
    /// describing the bus geometry; `config` itself must pass
    /// [`MachineConfig::validate`].
    pub fn with_bus(config: MachineConfig, bus: B) -> Result<Self> {
        config.validate()?;
        Ok(Machine::assemble(config, bus))
    }

    fn assemble(config: MachineConfig, bus: B) -> Self {
        Machine {
            cpu: Cpu::new(config.stack_top()),
            regs: RegisterFile::new(),
            bus,
            config,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Reset CPU and register file: flags clear, PC = 0, SP = RAMEND.
    pub fn reset_cpu(&mut self) {
        self.cpu = Cpu::new(self.config.stack_top());
        self.regs = RegisterFile::new();
        debug!("reset: SP=0x{:04X}", self.cpu.sp);
    }

    /// Enter an interrupt between two instructions.
    ///
    /// When I is set: wake from sleep, push the return PC, clear I and jump to
    /// `vector` (word address). Returns `Ok(false)` without touching state
    /// when interrupts are disabled.
    pub fn interrupt(&mut self, vector: u16) -> Result<bool> {
        if !self.cpu.sreg.i {
            return Ok(false);
        }
        let pc = self.cpu.pc;
        self.push_word(pc)?;
        self.cpu.sreg.i = false;
        self.cpu.sleeping = false;
        self.cpu.pc = vector;
        debug!("interrupt: vector=0x{:04X} return=0x{:04X}", vector, pc);
        Ok(true)
    }

    /// Format a register dump with R0-R31, PC, SP, SREG and the pointers.
    pub fn dump_regs(&self) -> String {
        let mut s = String::new();
        for (i, v) in self.regs.as_bytes().iter().enumerate() {
            if i % 8 == 0 && i > 0 { s.push('\n'); }
            s.push_str(&format!("R{:2}={:02X} ", i, v));
        }
        s.push_str(&format!("\nPC={:04X} SP={:04X} SREG={} (0x{:02X})",
            self.cpu.pc, self.cpu.sp, self.cpu.sreg, self.cpu.sreg.bits()));
        s.push_str(&format!("\nX={:04X} Y={:04X} Z={:04X}",
            self.regs.pointer(Pointer::X),
            self.regs.pointer(Pointer::Y),
            self.regs.pointer(Pointer::Z)));
        s
    }
}

impl Default for Machine<Memory> {
    fn default() -> Self {
        Self::new()
    }
}
