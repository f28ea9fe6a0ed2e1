//! Snapshot history for stepping backwards.
//!
//! A [`RewindBuffer`] keeps the last `capacity` snapshots, oldest at the
//! front. [`Machine::step_recorded`] records one every `interval`
//! instructions; [`Machine::rewind`] restores them newest first.

use std::collections::VecDeque;

use crate::cpu::Flow;
use crate::memory::Memory;
use crate::program::Program;
use crate::snapshot::{Snapshot, SnapshotError};
use crate::Machine;

/// Bounded snapshot history.
pub struct RewindBuffer {
    history: VecDeque<Snapshot>,
    capacity: usize,
    interval: u32,
    /// Instructions left before the next snapshot is due
    countdown: u32,
}

impl RewindBuffer {
    /// Keep up to `capacity` snapshots, one per `interval` instructions.
    /// Both are clamped to at least 1.
    pub fn new(capacity: usize, interval: u32) -> Self {
        let interval = interval.max(1);
        RewindBuffer {
            history: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            interval,
            countdown: interval,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Count one instruction. True when a snapshot is due.
    fn due(&mut self) -> bool {
        self.countdown -= 1;
        if self.countdown == 0 {
            self.countdown = self.interval;
            true
        } else {
            false
        }
    }

    /// Append a snapshot, evicting the oldest once `capacity` is reached.
    pub fn record(&mut self, snap: Snapshot) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(snap);
    }

    /// Remove and return the newest snapshot.
    pub fn take_latest(&mut self) -> Option<Snapshot> {
        self.history.pop_back()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.history.back()
    }

    /// The furthest point a rewind can reach.
    pub fn oldest(&self) -> Option<&Snapshot> {
        self.history.front()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop all snapshots and restart the interval count.
    pub fn clear(&mut self) {
        self.history.clear();
        self.countdown = self.interval;
    }

    /// Approximate heap and inline bytes held by stored snapshots.
    pub fn memory_usage(&self) -> usize {
        self.history
            .iter()
            .map(|s| std::mem::size_of::<Snapshot>() + s.data.len() + s.flash.len())
            .sum()
    }
}

impl Machine<Memory> {
    /// [`step`](Machine::step), recording a snapshot into `history` every
    /// `history.interval()` instructions (taken before the instruction runs).
    pub fn step_recorded(&mut self, program: &Program, history: &mut RewindBuffer) -> crate::Result<Flow> {
        if history.due() {
            history.record(self.save_snapshot());
        }
        self.step(program)
    }

    /// Restore the newest recorded snapshot. Returns false when the history
    /// is empty.
    pub fn rewind(&mut self, history: &mut RewindBuffer) -> Result<bool, SnapshotError> {
        match history.take_latest() {
            Some(snap) => {
                self.restore_snapshot(&snap)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Instruction;

    fn snap_at(pc: u16) -> Snapshot {
        Snapshot {
            pc, sp: 0x0AFF, sreg: 0, sleeping: false,
            registers: [0; 32], data: vec![0; 32], flash: vec![0; 16],
        }
    }

    #[test]
    fn test_newest_first() {
        let mut rb = RewindBuffer::new(3, 1);
        for pc in 1..=3 {
            rb.record(snap_at(pc));
        }
        assert_eq!(rb.latest().map(|s| s.pc), Some(3));
        assert_eq!(rb.oldest().map(|s| s.pc), Some(1));
        assert_eq!(rb.take_latest().map(|s| s.pc), Some(3));
        assert_eq!(rb.take_latest().map(|s| s.pc), Some(2));
        assert_eq!(rb.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut rb = RewindBuffer::new(2, 1);
        for pc in 1..=5 {
            rb.record(snap_at(pc));
        }
        assert_eq!(rb.len(), rb.capacity());
        assert_eq!(rb.oldest().map(|s| s.pc), Some(4));
        assert_eq!(rb.take_latest().map(|s| s.pc), Some(5));
        assert_eq!(rb.take_latest().map(|s| s.pc), Some(4));
        assert!(rb.take_latest().is_none());
        assert!(rb.oldest().is_none());
    }

    #[test]
    fn test_zero_sizes_clamped() {
        let mut rb = RewindBuffer::new(0, 0);
        assert_eq!((rb.capacity(), rb.interval()), (1, 1));
        assert!(rb.due());
        assert!(rb.due());
    }

    #[test]
    fn test_interval_spacing() {
        let program = Program::new(vec![Instruction::Inc { d: 16 }; 10]);
        let mut m = Machine::new();
        let mut history = RewindBuffer::new(16, 4);
        for _ in 0..9 {
            m.step_recorded(&program, &mut history).unwrap();
        }
        // due before the 4th and 8th instruction
        assert_eq!(history.len(), 2);
        assert_eq!(history.oldest().map(|s| s.pc), Some(3));
        assert_eq!(history.latest().map(|s| s.pc), Some(7));

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.memory_usage(), 0);
        for _ in 0..3 {
            assert!(!history.due());
        }
        assert!(history.due());
    }

    #[test]
    fn test_rewind_machine() {
        let program = Program::new([
            Instruction::Inc { d: 16 },
            Instruction::Inc { d: 16 },
            Instruction::Inc { d: 16 },
            Instruction::Sleep,
        ]);
        let mut m = Machine::new();
        let mut history = RewindBuffer::new(8, 1);
        for _ in 0..3 {
            m.step_recorded(&program, &mut history).unwrap();
        }
        assert_eq!(m.regs.get(16).unwrap(), 3);
        assert!(history.memory_usage() >= m.bus.data.len() * 3);

        assert!(m.rewind(&mut history).unwrap());
        assert_eq!(m.regs.get(16).unwrap(), 2);
        assert_eq!(m.cpu.pc, 2);
        assert!(m.rewind(&mut history).unwrap());
        assert!(m.rewind(&mut history).unwrap());
        assert_eq!(m.regs.get(16).unwrap(), 0);
        assert_eq!(m.cpu.pc, 0);
        assert!(!m.rewind(&mut history).unwrap());
    }
}
