//! AVR CPU state and instruction execution.
//!
//! [`Machine::execute`] runs one decoded [`Instruction`] to completion.
//! Handlers validate and read all operands first, compute the result on a
//! scratch copy of SREG, then commit register/memory writes and flags
//! together. The program counter is written last from the handler's
//! verdict (fall through, skip one word, or jump), so a failing instruction
//! leaves flags and PC exactly as they were.
//!
//! Flag computation follows the AVR instruction set manual, including the
//! carry-chain behavior of SBC/SBCI/CPC where Z is only ever cleared.

use log::{trace, warn};

use crate::alu;
use crate::flags::{Flag, StatusFlags};
use crate::instruction::{Instruction, PointerMode};
use crate::memory::Bus;
use crate::registers::Pointer;
use crate::{CoreError, Machine, Operand, Result};

/// CPU state for the AVR core.
///
/// The register file lives beside it in [`Machine::regs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cpu {
    /// Program counter (word address, not byte address)
    pub pc: u16,
    /// Stack pointer (byte address in data space)
    pub sp: u16,
    /// Status register
    pub sreg: StatusFlags,
    /// True when SLEEP instruction has been executed (woken by interrupt)
    pub sleeping: bool,
}

impl Cpu {
    pub fn new(sp: u16) -> Self {
        Cpu { pc: 0, sp, sreg: StatusFlags::default(), sleeping: false }
    }
}

/// How an executed instruction left the program counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// PC advanced by a fixed width (including a taken skip)
    Sequential,
    /// PC was set by the instruction (taken branch, jump, call, return)
    Transferred,
}

/// Next-PC verdict of a single handler.
enum Next {
    Fall,
    Skip,
    Goto(u16),
}

#[inline(always)]
fn check_bit(b: u8) -> Result<u8> {
    if b < 8 {
        Ok(b)
    } else {
        Err(CoreError::InvalidOperand { kind: Operand::Bit, value: b as u32 })
    }
}

/// ADIW/SBIW operate on R25:R24, X, Y or Z with K in 0..=63.
#[inline(always)]
fn check_word_operands(d: u8, k: u8) -> Result<()> {
    if !matches!(d, 24 | 26 | 28 | 30) {
        return Err(CoreError::InvalidOperand { kind: Operand::RegisterPair, value: d as u32 });
    }
    if k > 63 {
        return Err(CoreError::InvalidOperand { kind: Operand::Immediate, value: k as u32 });
    }
    Ok(())
}

/// LDD/STD: Y or Z base, q in 0..=63.
#[inline(always)]
fn check_displacement(ptr: Pointer, q: u8) -> Result<()> {
    if ptr == Pointer::X {
        return Err(CoreError::InvalidOperand { kind: Operand::Pointer, value: 26 });
    }
    if q > 63 {
        return Err(CoreError::InvalidOperand { kind: Operand::Displacement, value: q as u32 });
    }
    Ok(())
}

/// PC + k + 1
#[inline(always)]
fn relative(pc: u16, k: i16) -> u16 {
    pc.wrapping_add(1).wrapping_add(k as u16)
}

/// Effective address and pointer value after the access.
#[inline(always)]
fn indirect(p: u16, mode: PointerMode) -> (u16, u16) {
    match mode {
        PointerMode::Plain => (p, p),
        PointerMode::PostInc => (p, p.wrapping_add(1)),
        PointerMode::PreDec => {
            let a = p.wrapping_sub(1);
            (a, a)
        }
    }
}

impl<B: Bus> Machine<B> {
    /// Execute a single decoded AVR instruction.
    ///
    /// On success the PC holds the next instruction's address; on error no
    /// flag or PC update has taken place.
    pub fn execute(&mut self, inst: Instruction) -> Result<Flow> {
        let pc = self.cpu.pc;
        trace!("0x{:04X}: {:?}", pc, inst);
        let next = match self.dispatch(inst, pc) {
            Ok(next) => next,
            Err(e) => {
                warn!("0x{:04X}: {:?} failed: {}", pc, inst, e);
                return Err(e);
            }
        };
        let width = inst.words() as u16;
        let (target, flow) = match next {
            Next::Fall => (pc.wrapping_add(width), Flow::Sequential),
            Next::Skip => (pc.wrapping_add(width + 1), Flow::Sequential),
            Next::Goto(t) => (t, Flow::Transferred),
        };
        self.cpu.pc = target;
        Ok(flow)
    }

    fn dispatch(&mut self, inst: Instruction, pc: u16) -> Result<Next> {
        match inst {
            Instruction::Nop => Ok(Next::Fall),

            // -- Arithmetic --
            Instruction::Add { d, r } => {
                let rr = self.regs.get(r)?;
                self.modify(d, |f, rd| alu::add(f, rd, rr, false))
            }
            Instruction::Adc { d, r } => {
                let rr = self.regs.get(r)?;
                let c = self.cpu.sreg.c;
                self.modify(d, |f, rd| alu::add(f, rd, rr, c))
            }
            Instruction::Adiw { d, k } => self.modify_word(d, k, alu::adiw),
            Instruction::Sub { d, r } => {
                let rr = self.regs.get(r)?;
                self.modify(d, |f, rd| alu::sub(f, rd, rr, false, false))
            }
            Instruction::Subi { d, k } => self.modify(d, |f, rd| alu::sub(f, rd, k, false, false)),
            Instruction::Sbc { d, r } => {
                let rr = self.regs.get(r)?;
                let c = self.cpu.sreg.c;
                // Flags use the original Rr, not Rr + C; the result already has C
                self.modify(d, |f, rd| alu::sub(f, rd, rr, c, true))
            }
            Instruction::Sbci { d, k } => {
                let c = self.cpu.sreg.c;
                self.modify(d, |f, rd| alu::sub(f, rd, k, c, true))
            }
            Instruction::Sbiw { d, k } => self.modify_word(d, k, alu::sbiw),
            Instruction::Neg { d } => self.modify(d, alu::neg),
            Instruction::Inc { d } => self.modify(d, alu::inc),
            Instruction::Dec { d } => self.modify(d, alu::dec),
            Instruction::Mul { d, r } => {
                let p = self.regs.get(d)? as u16 * self.regs.get(r)? as u16;
                self.product(p, false)
            }
            Instruction::Muls { d, r } => {
                let p = (self.regs.get(d)? as i8 as i16) * (self.regs.get(r)? as i8 as i16);
                self.product(p as u16, false)
            }
            Instruction::Mulsu { d, r } => {
                let p = (self.regs.get(d)? as i8 as i16) * (self.regs.get(r)? as i16);
                self.product(p as u16, false)
            }
            Instruction::Fmul { d, r } => {
                let p = self.regs.get(d)? as u16 * self.regs.get(r)? as u16;
                self.product(p, true)
            }
            Instruction::Fmuls { d, r } => {
                let p = (self.regs.get(d)? as i8 as i16) * (self.regs.get(r)? as i8 as i16);
                self.product(p as u16, true)
            }
            Instruction::Fmulsu { d, r } => {
                let p = (self.regs.get(d)? as i8 as i16) * (self.regs.get(r)? as i16);
                self.product(p as u16, true)
            }

            // -- Logic --
            Instruction::And { d, r } => {
                let rr = self.regs.get(r)?;
                self.modify(d, |f, rd| alu::logic(f, rd & rr))
            }
            Instruction::Andi { d, k } => self.modify(d, |f, rd| alu::logic(f, rd & k)),
            Instruction::Cbr { d, k } => self.modify(d, |f, rd| alu::logic(f, rd & !k)),
            Instruction::Or { d, r } => {
                let rr = self.regs.get(r)?;
                self.modify(d, |f, rd| alu::logic(f, rd | rr))
            }
            Instruction::Ori { d, k } | Instruction::Sbr { d, k } => {
                self.modify(d, |f, rd| alu::logic(f, rd | k))
            }
            Instruction::Eor { d, r } => {
                let rr = self.regs.get(r)?;
                self.modify(d, |f, rd| alu::logic(f, rd ^ rr))
            }
            Instruction::Clr { d } => self.modify(d, |f, rd| alu::logic(f, rd ^ rd)),
            Instruction::Com { d } => self.modify(d, alu::com),
            Instruction::Tst { d } => {
                let rd = self.regs.get(d)?;
                alu::logic(&mut self.cpu.sreg, rd & rd);
                Ok(Next::Fall)
            }
            Instruction::Ser { d } => {
                self.regs.set(d, 0xFF)?;
                Ok(Next::Fall)
            }

            // -- Compare --
            Instruction::Cp { d, r } => {
                let (rd, rr) = (self.regs.get(d)?, self.regs.get(r)?);
                alu::sub(&mut self.cpu.sreg, rd, rr, false, false);
                Ok(Next::Fall)
            }
            Instruction::Cpc { d, r } => {
                let (rd, rr) = (self.regs.get(d)?, self.regs.get(r)?);
                let c = self.cpu.sreg.c;
                alu::sub(&mut self.cpu.sreg, rd, rr, c, true);
                Ok(Next::Fall)
            }
            Instruction::Cpi { d, k } => {
                let rd = self.regs.get(d)?;
                alu::sub(&mut self.cpu.sreg, rd, k, false, false);
                Ok(Next::Fall)
            }

            // -- Shift/rotate --
            Instruction::Lsl { d } => self.modify(d, alu::lsl),
            Instruction::Lsr { d } => self.modify(d, alu::lsr),
            Instruction::Rol { d } => self.modify(d, alu::rol),
            Instruction::Ror { d } => self.modify(d, alu::ror),
            Instruction::Asr { d } => self.modify(d, alu::asr),
            Instruction::Swap { d } => self.modify(d, |_, rd| alu::swap(rd)),

            // -- Branch --
            Instruction::Rjmp { k } => Ok(Next::Goto(relative(pc, k))),
            Instruction::Ijmp => Ok(Next::Goto(self.check_target(self.regs.pointer(Pointer::Z) as u32)?)),
            Instruction::Jmp { k } => Ok(Next::Goto(self.check_target(k)?)),
            Instruction::Rcall { k } => {
                self.push_word(pc.wrapping_add(1))?;
                Ok(Next::Goto(relative(pc, k)))
            }
            Instruction::Icall => {
                let target = self.check_target(self.regs.pointer(Pointer::Z) as u32)?;
                self.push_word(pc.wrapping_add(1))?;
                Ok(Next::Goto(target))
            }
            Instruction::Call { k } => {
                let target = self.check_target(k)?;
                self.push_word(pc.wrapping_add(2))?;
                Ok(Next::Goto(target))
            }
            Instruction::Ret => Ok(Next::Goto(self.pop_word()?)),
            Instruction::Reti => {
                let ret = self.pop_word()?;
                self.cpu.sreg.i = true;
                Ok(Next::Goto(ret))
            }
            Instruction::Cpse { d, r } => {
                let (rd, rr) = (self.regs.get(d)?, self.regs.get(r)?);
                Ok(if rd == rr { Next::Skip } else { Next::Fall })
            }
            Instruction::Sbrc { r, b } => {
                let b = check_bit(b)?;
                let v = self.regs.get(r)?;
                Ok(if v & (1 << b) == 0 { Next::Skip } else { Next::Fall })
            }
            Instruction::Sbrs { r, b } => {
                let b = check_bit(b)?;
                let v = self.regs.get(r)?;
                Ok(if v & (1 << b) != 0 { Next::Skip } else { Next::Fall })
            }
            Instruction::Sbic { a, b } => {
                let addr = Self::io_addr(a, 32)?;
                let b = check_bit(b)?;
                let v = self.read_data(addr)?;
                Ok(if v & (1 << b) == 0 { Next::Skip } else { Next::Fall })
            }
            Instruction::Sbis { a, b } => {
                let addr = Self::io_addr(a, 32)?;
                let b = check_bit(b)?;
                let v = self.read_data(addr)?;
                Ok(if v & (1 << b) != 0 { Next::Skip } else { Next::Fall })
            }
            Instruction::Brbs { s, k } => {
                let flag = Flag::from_index(s)?;
                Ok(if self.cpu.sreg.get(flag) { Next::Goto(relative(pc, k as i16)) } else { Next::Fall })
            }
            Instruction::Brbc { s, k } => {
                let flag = Flag::from_index(s)?;
                Ok(if !self.cpu.sreg.get(flag) { Next::Goto(relative(pc, k as i16)) } else { Next::Fall })
            }

            // -- Data transfer --
            Instruction::Mov { d, r } => {
                let v = self.regs.get(r)?;
                self.regs.set(d, v)?;
                Ok(Next::Fall)
            }
            Instruction::Movw { d, r } => {
                let v = self.regs.pair(r)?;
                self.regs.set_pair(d, v)?;
                Ok(Next::Fall)
            }
            Instruction::Ldi { d, k } => {
                self.regs.set(d, k)?;
                Ok(Next::Fall)
            }
            Instruction::Lds { d, k } => {
                self.regs.get(d)?;
                let v = self.read_data(k)?;
                self.regs.set(d, v)?;
                Ok(Next::Fall)
            }
            Instruction::Sts { k, r } => {
                let v = self.regs.get(r)?;
                self.write_data(k, v)?;
                Ok(Next::Fall)
            }
            Instruction::Ld { d, ptr, mode } => {
                self.regs.get(d)?;
                let (addr, after) = indirect(self.regs.pointer(ptr), mode);
                let v = self.read_data(addr)?;
                self.regs.set_pointer(ptr, after);
                self.regs.set(d, v)?;
                Ok(Next::Fall)
            }
            Instruction::Ldd { d, ptr, q } => {
                check_displacement(ptr, q)?;
                self.regs.get(d)?;
                let addr = self.regs.pointer(ptr).wrapping_add(q as u16);
                let v = self.read_data(addr)?;
                self.regs.set(d, v)?;
                Ok(Next::Fall)
            }
            Instruction::St { ptr, mode, r } => {
                let v = self.regs.get(r)?;
                let (addr, after) = indirect(self.regs.pointer(ptr), mode);
                self.write_data(addr, v)?;
                self.regs.set_pointer(ptr, after);
                Ok(Next::Fall)
            }
            Instruction::Std { ptr, q, r } => {
                check_displacement(ptr, q)?;
                let v = self.regs.get(r)?;
                let addr = self.regs.pointer(ptr).wrapping_add(q as u16);
                self.write_data(addr, v)?;
                Ok(Next::Fall)
            }
            Instruction::Lpm { d, post_inc } => {
                self.regs.get(d)?;
                let z = self.regs.pointer(Pointer::Z);
                let v = self.bus.read_program_byte(z as u32)?;
                self.regs.set(d, v)?;
                if post_inc {
                    self.regs.set_pointer(Pointer::Z, z.wrapping_add(1));
                }
                Ok(Next::Fall)
            }
            Instruction::Spm => {
                let z = self.regs.pointer(Pointer::Z);
                let word = self.regs.pair(0)?;
                self.bus.write_program_word((z >> 1) as u32, word)?;
                Ok(Next::Fall)
            }
            Instruction::Push { r } => {
                let v = self.regs.get(r)?;
                self.push_byte(v)?;
                Ok(Next::Fall)
            }
            Instruction::Pop { d } => {
                self.regs.get(d)?;
                let v = self.pop_byte()?;
                self.regs.set(d, v)?;
                Ok(Next::Fall)
            }
            Instruction::In { d, a } => {
                let addr = Self::io_addr(a, 64)?;
                self.regs.get(d)?;
                let v = self.read_data(addr)?;
                self.regs.set(d, v)?;
                Ok(Next::Fall)
            }
            Instruction::Out { a, r } => {
                let addr = Self::io_addr(a, 64)?;
                let v = self.regs.get(r)?;
                self.write_data(addr, v)?;
                Ok(Next::Fall)
            }

            // -- Bit and SREG --
            Instruction::Bset { s } => {
                let flag = Flag::from_index(s)?;
                self.cpu.sreg.set(flag, true);
                Ok(Next::Fall)
            }
            Instruction::Bclr { s } => {
                let flag = Flag::from_index(s)?;
                self.cpu.sreg.set(flag, false);
                Ok(Next::Fall)
            }
            Instruction::Bst { d, b } => {
                let b = check_bit(b)?;
                let v = self.regs.get(d)?;
                self.cpu.sreg.t = (v >> b) & 1 != 0;
                Ok(Next::Fall)
            }
            Instruction::Bld { d, b } => {
                let b = check_bit(b)?;
                let t = self.cpu.sreg.t;
                self.modify(d, |_, rd| if t { rd | (1 << b) } else { rd & !(1 << b) })
            }
            Instruction::Sbi { a, b } => self.write_io_bit(a, b, true),
            Instruction::Cbi { a, b } => self.write_io_bit(a, b, false),

            // -- Misc --
            Instruction::Sleep => {
                self.cpu.sleeping = true;
                Ok(Next::Fall)
            }
            Instruction::Wdr | Instruction::Break => Ok(Next::Fall),
            Instruction::Des { .. } => Err(CoreError::UnimplementedOperation("DES".into())),
            Instruction::Unknown(w) => {
                Err(CoreError::UnimplementedOperation(format!("opcode 0x{:04X}", w)))
            }
        }
    }

    /// Read-modify-write of Rd with the flags committed together with the result.
    fn modify(&mut self, d: u8, op: impl FnOnce(&mut StatusFlags, u8) -> u8) -> Result<Next> {
        let rd = self.regs.get(d)?;
        let mut sreg = self.cpu.sreg;
        let res = op(&mut sreg, rd);
        self.regs.set(d, res)?;
        self.cpu.sreg = sreg;
        Ok(Next::Fall)
    }

    /// ADIW/SBIW on a register pair.
    fn modify_word(&mut self, d: u8, k: u8, op: fn(&mut StatusFlags, u16, u8) -> u16) -> Result<Next> {
        check_word_operands(d, k)?;
        let v = self.regs.pair(d)?;
        let mut sreg = self.cpu.sreg;
        let res = op(&mut sreg, v, k);
        self.regs.set_pair(d, res)?;
        self.cpu.sreg = sreg;
        Ok(Next::Fall)
    }

    /// Multiply family: result to R1:R0.
    fn product(&mut self, p: u16, fractional: bool) -> Result<Next> {
        let mut sreg = self.cpu.sreg;
        let res = alu::multiply(&mut sreg, p, fractional);
        self.regs.set_pair(0, res)?;
        self.cpu.sreg = sreg;
        Ok(Next::Fall)
    }

    /// SBI/CBI: one bit of a low I/O register, SREG untouched.
    fn write_io_bit(&mut self, a: u8, b: u8, value: bool) -> Result<Next> {
        let addr = Self::io_addr(a, 32)?;
        let b = check_bit(b)?;
        let v = self.read_data(addr)?;
        let v = if value { v | (1 << b) } else { v & !(1 << b) };
        self.write_data(addr, v)?;
        Ok(Next::Fall)
    }

    /// Absolute and indirect jump targets must lie inside program memory.
    fn check_target(&self, k: u32) -> Result<u16> {
        if k < self.config().program_words() {
            Ok(k as u16)
        } else {
            Err(CoreError::InvalidOperand { kind: Operand::ProgramAddress, value: k })
        }
    }

    // ---- Stack primitives ----

    /// Store at SP, then SP - 1.
    pub fn push_byte(&mut self, v: u8) -> Result<()> {
        let sp = self.cpu.sp;
        let (floor, top) = (self.config().ram_start, self.config().stack_top());
        if sp < floor || sp > top {
            return Err(CoreError::StackOverflow { sp });
        }
        self.bus.write(sp, v)?;
        self.cpu.sp = sp.wrapping_sub(1);
        Ok(())
    }

    /// SP + 1, then load from SP.
    pub fn pop_byte(&mut self) -> Result<u8> {
        let sp = self.cpu.sp;
        let (floor, top) = (self.config().ram_start as u32, self.config().stack_top() as u32);
        let new_sp = sp as u32 + 1;
        if new_sp < floor || new_sp > top {
            return Err(CoreError::StackUnderflow { sp });
        }
        let v = self.bus.read(new_sp as u16)?;
        self.cpu.sp = new_sp as u16;
        Ok(v)
    }

    /// Push a return address: low byte first, so the high byte ends up at
    /// the lower address.
    pub fn push_word(&mut self, val: u16) -> Result<()> {
        let sp = self.cpu.sp;
        let (floor, top) = (self.config().ram_start, self.config().stack_top());
        if sp <= floor || sp > top {
            return Err(CoreError::StackOverflow { sp });
        }
        self.bus.write(sp, val as u8)?;
        self.bus.write(sp.wrapping_sub(1), (val >> 8) as u8)?;
        self.cpu.sp = sp.wrapping_sub(2);
        Ok(())
    }

    /// Pop a return address pushed by [`push_word`](Self::push_word).
    pub fn pop_word(&mut self) -> Result<u16> {
        let sp = self.cpu.sp;
        let (floor, top) = (self.config().ram_start as u32, self.config().stack_top() as u32);
        let (hi_addr, lo_addr) = (sp as u32 + 1, sp as u32 + 2);
        if hi_addr < floor || lo_addr > top {
            return Err(CoreError::StackUnderflow { sp });
        }
        let hi = self.bus.read(hi_addr as u16)?;
        let lo = self.bus.read(lo_addr as u16)?;
        self.cpu.sp = lo_addr as u16;
        Ok((hi as u16) << 8 | lo as u16)
    }
}
