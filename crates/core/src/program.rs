//! Pre-decoded program listing and the fetch/execute loop.
//!
//! A [`Program`] lays decoded instructions out at their word addresses: a
//! two-word instruction (JMP, CALL, LDS, STS) occupies its own slot plus an
//! operand slot. Skips always advance PC by two words, so a skip over a
//! two-word instruction lands on its operand slot. [`Machine::step`] steps
//! past such a slot before executing, the way the hardware fetch stage
//! re-synchronises.

use log::{debug, trace};

use crate::cpu::Flow;
use crate::instruction::Instruction;
use crate::memory::Bus;
use crate::{CoreError, Machine, Operand, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Op(Instruction),
    /// Second word of a two-word instruction
    Operand,
}

/// Decoded instructions addressed by program word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    slots: Vec<Slot>,
}

impl Program {
    pub fn new(insts: impl IntoIterator<Item = Instruction>) -> Self {
        let mut slots = Vec::new();
        for inst in insts {
            slots.push(Slot::Op(inst));
            for _ in 1..inst.words() {
                slots.push(Slot::Operand);
            }
        }
        Program { slots }
    }

    /// Program length in words.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Instruction at word address `pc`, or `None` for an operand slot.
    pub fn fetch(&self, pc: u16) -> Result<Option<Instruction>> {
        match self.slots.get(pc as usize) {
            Some(Slot::Op(inst)) => Ok(Some(*inst)),
            Some(Slot::Operand) => Ok(None),
            None => Err(CoreError::InvalidOperand { kind: Operand::ProgramAddress, value: pc as u32 }),
        }
    }

    /// Word address of the `n`th instruction in listing order.
    pub fn address_of(&self, n: usize) -> Option<u16> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Slot::Op(_)))
            .nth(n)
            .map(|(addr, _)| addr as u16)
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Program::new(iter)
    }
}

impl<B: Bus> Machine<B> {
    /// Fetch the instruction at PC and execute it. A PC resting on an
    /// operand word moves forward to the next instruction, but only once
    /// that instruction has executed.
    pub fn step(&mut self, program: &Program) -> Result<Flow> {
        let start = self.cpu.pc;
        let mut pc = start;
        loop {
            match program.fetch(pc)? {
                Some(inst) => {
                    self.cpu.pc = pc;
                    let result = self.execute(inst);
                    if result.is_err() {
                        self.cpu.pc = start;
                    }
                    return result;
                }
                None => {
                    trace!("0x{:04X}: operand word, resync", pc);
                    pc = pc.wrapping_add(1);
                }
            }
        }
    }

    /// Step until `max_steps` instructions have run or the CPU sleeps.
    ///
    /// Returns the number of instructions executed. An error stops the loop
    /// with the failing instruction's state intact.
    pub fn run(&mut self, program: &Program, max_steps: usize) -> Result<usize> {
        let mut steps = 0;
        while steps < max_steps && !self.cpu.sleeping {
            self.step(program)?;
            steps += 1;
        }
        debug!("run: {} steps, PC=0x{:04X}, sleeping={}", steps, self.cpu.pc, self.cpu.sleeping);
        Ok(steps)
    }
}
