//! Decoded AVR operations.
//!
//! The core is handed instructions that an external decoder has already
//! pulled apart into operands. Register fields `d` and `r` are 0–31, `k` is
//! an immediate constant, address or signed offset, `a` is an I/O-space
//! address (0–63), `b` a bit number and `s` an SREG flag index. Operands are
//! range-checked at execution time, not here.
//!
//! Assembler aliases that the hardware encodes as another instruction
//! (LSL, ROL, CLR, TST, SBR, CBR, SER) get their own variants so that a
//! decoder or test can name them directly. The named conditional branches
//! and the SEx/CLx flag instructions are provided as constructors over
//! BRBS/BRBC and BSET/BCLR.

use crate::flags::Flag;
use crate::registers::Pointer;

/// How an indirect load/store moves its pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerMode {
    /// `X`: pointer unchanged
    Plain,
    /// `X+`: access, then pointer + 1
    PostInc,
    /// `-X`: pointer - 1, then access
    PreDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    // Arithmetic
    Add { d: u8, r: u8 },
    Adc { d: u8, r: u8 },
    Adiw { d: u8, k: u8 },
    Sub { d: u8, r: u8 },
    Subi { d: u8, k: u8 },
    Sbc { d: u8, r: u8 },
    Sbci { d: u8, k: u8 },
    Sbiw { d: u8, k: u8 },
    Neg { d: u8 },
    Inc { d: u8 },
    Dec { d: u8 },
    Mul { d: u8, r: u8 },
    Muls { d: u8, r: u8 },
    Mulsu { d: u8, r: u8 },
    Fmul { d: u8, r: u8 },
    Fmuls { d: u8, r: u8 },
    Fmulsu { d: u8, r: u8 },
    // Logic
    And { d: u8, r: u8 },
    Andi { d: u8, k: u8 },
    Or { d: u8, r: u8 },
    Ori { d: u8, k: u8 },
    Eor { d: u8, r: u8 },
    Sbr { d: u8, k: u8 },
    Cbr { d: u8, k: u8 },
    Com { d: u8 },
    Tst { d: u8 },
    Clr { d: u8 },
    Ser { d: u8 },
    // Compare
    Cp { d: u8, r: u8 },
    Cpc { d: u8, r: u8 },
    Cpi { d: u8, k: u8 },
    // Shift/rotate
    Lsl { d: u8 },
    Lsr { d: u8 },
    Rol { d: u8 },
    Ror { d: u8 },
    Asr { d: u8 },
    Swap { d: u8 },
    // Branch
    Rjmp { k: i16 },
    Ijmp,
    Jmp { k: u32 },
    Rcall { k: i16 },
    Icall,
    Call { k: u32 },
    Ret,
    Reti,
    Cpse { d: u8, r: u8 },
    Sbrc { r: u8, b: u8 },
    Sbrs { r: u8, b: u8 },
    Sbic { a: u8, b: u8 },
    Sbis { a: u8, b: u8 },
    Brbs { s: u8, k: i8 },
    Brbc { s: u8, k: i8 },
    // Data transfer
    Mov { d: u8, r: u8 },
    Movw { d: u8, r: u8 },
    Ldi { d: u8, k: u8 },
    Lds { d: u8, k: u16 },
    Sts { k: u16, r: u8 },
    Ld { d: u8, ptr: Pointer, mode: PointerMode },
    Ldd { d: u8, ptr: Pointer, q: u8 },
    St { ptr: Pointer, mode: PointerMode, r: u8 },
    Std { ptr: Pointer, q: u8, r: u8 },
    Lpm { d: u8, post_inc: bool },
    Spm,
    Push { r: u8 },
    Pop { d: u8 },
    In { d: u8, a: u8 },
    Out { a: u8, r: u8 },
    // Bit and SREG
    Bset { s: u8 },
    Bclr { s: u8 },
    Bst { d: u8, b: u8 },
    Bld { d: u8, b: u8 },
    Sbi { a: u8, b: u8 },
    Cbi { a: u8, b: u8 },
    // Misc
    Sleep,
    Wdr,
    Break,
    /// DES round (XMEGA only); recognized but not modeled
    Des { k: u8 },
    /// An opcode word the decoder could not classify
    Unknown(u16),
}

impl Instruction {
    /// Instruction width in program words.
    pub fn words(&self) -> u8 {
        match self {
            Instruction::Jmp { .. }
            | Instruction::Call { .. }
            | Instruction::Lds { .. }
            | Instruction::Sts { .. } => 2,
            _ => 1,
        }
    }

    // --- SREG aliases ---

    pub const fn set_flag(f: Flag) -> Self { Instruction::Bset { s: f as u8 } }
    pub const fn clear_flag(f: Flag) -> Self { Instruction::Bclr { s: f as u8 } }

    pub const fn sec() -> Self { Self::set_flag(Flag::C) }
    pub const fn clc() -> Self { Self::clear_flag(Flag::C) }
    pub const fn sez() -> Self { Self::set_flag(Flag::Z) }
    pub const fn clz() -> Self { Self::clear_flag(Flag::Z) }
    pub const fn sen() -> Self { Self::set_flag(Flag::N) }
    pub const fn cln() -> Self { Self::clear_flag(Flag::N) }
    pub const fn sev() -> Self { Self::set_flag(Flag::V) }
    pub const fn clv() -> Self { Self::clear_flag(Flag::V) }
    pub const fn ses() -> Self { Self::set_flag(Flag::S) }
    pub const fn cls() -> Self { Self::clear_flag(Flag::S) }
    pub const fn seh() -> Self { Self::set_flag(Flag::H) }
    pub const fn clh() -> Self { Self::clear_flag(Flag::H) }
    pub const fn set() -> Self { Self::set_flag(Flag::T) }
    pub const fn clt() -> Self { Self::clear_flag(Flag::T) }
    pub const fn sei() -> Self { Self::set_flag(Flag::I) }
    pub const fn cli() -> Self { Self::clear_flag(Flag::I) }

    // --- Conditional branch aliases ---

    pub const fn branch_if_set(f: Flag, k: i8) -> Self { Instruction::Brbs { s: f as u8, k } }
    pub const fn branch_if_clear(f: Flag, k: i8) -> Self { Instruction::Brbc { s: f as u8, k } }

    pub const fn brcs(k: i8) -> Self { Self::branch_if_set(Flag::C, k) }
    pub const fn brcc(k: i8) -> Self { Self::branch_if_clear(Flag::C, k) }
    pub const fn brlo(k: i8) -> Self { Self::branch_if_set(Flag::C, k) }
    pub const fn brsh(k: i8) -> Self { Self::branch_if_clear(Flag::C, k) }
    pub const fn breq(k: i8) -> Self { Self::branch_if_set(Flag::Z, k) }
    pub const fn brne(k: i8) -> Self { Self::branch_if_clear(Flag::Z, k) }
    pub const fn brmi(k: i8) -> Self { Self::branch_if_set(Flag::N, k) }
    pub const fn brpl(k: i8) -> Self { Self::branch_if_clear(Flag::N, k) }
    pub const fn brvs(k: i8) -> Self { Self::branch_if_set(Flag::V, k) }
    pub const fn brvc(k: i8) -> Self { Self::branch_if_clear(Flag::V, k) }
    pub const fn brlt(k: i8) -> Self { Self::branch_if_set(Flag::S, k) }
    pub const fn brge(k: i8) -> Self { Self::branch_if_clear(Flag::S, k) }
    pub const fn brhs(k: i8) -> Self { Self::branch_if_set(Flag::H, k) }
    pub const fn brhc(k: i8) -> Self { Self::branch_if_clear(Flag::H, k) }
    pub const fn brts(k: i8) -> Self { Self::branch_if_set(Flag::T, k) }
    pub const fn brtc(k: i8) -> Self { Self::branch_if_clear(Flag::T, k) }
    pub const fn brie(k: i8) -> Self { Self::branch_if_set(Flag::I, k) }
    pub const fn brid(k: i8) -> Self { Self::branch_if_clear(Flag::I, k) }
}
