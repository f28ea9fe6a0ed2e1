//! Debugging facilities.
//!
//! - **Watchpoints**: [`WatchBus`] wraps any [`Bus`] and records data-space
//!   reads/writes at watched addresses
//! - **RAM Viewer**: hex + ASCII dump of a data-space region
//!
//! Register-file and SREG/SP aliases are resolved by the machine before the
//! bus is reached, so watchpoints see I/O, SRAM and stack traffic only.

use log::debug;

use crate::cpu::Flow;
use crate::memory::Bus;
use crate::program::Program;
use crate::{Machine, Result};

/// Watchpoint trigger type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Write,
    Read,
    ReadWrite,
}

/// A data-space watchpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchpoint {
    pub addr: u16,
    pub kind: WatchKind,
    /// Only trigger on a write of this value
    pub value_match: Option<u8>,
    pub hits: u64,
    pub enabled: bool,
}

/// Watchpoint trigger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchHit {
    /// Watchpoint index
    pub index: usize,
    pub addr: u16,
    /// Value before the access. For writes this is read back from the inner
    /// bus only when a watchpoint matches.
    pub old_val: u8,
    /// New value (for writes, same as old for reads)
    pub new_val: u8,
    pub access: WatchKind,
}

/// A [`Bus`] adapter that checks watchpoints on every data access.
pub struct WatchBus<B: Bus> {
    pub inner: B,
    pub watchpoints: Vec<Watchpoint>,
    hit: Option<WatchHit>,
}

impl<B: Bus> WatchBus<B> {
    pub fn new(inner: B) -> Self {
        WatchBus { inner, watchpoints: Vec::new(), hit: None }
    }

    /// Add a watchpoint. Returns its index.
    pub fn add_watchpoint(&mut self, addr: u16, kind: WatchKind) -> usize {
        let idx = self.watchpoints.len();
        self.watchpoints.push(Watchpoint { addr, kind, value_match: None, hits: 0, enabled: true });
        idx
    }

    pub fn remove_watchpoint(&mut self, idx: usize) -> bool {
        if idx < self.watchpoints.len() {
            self.watchpoints.remove(idx);
            true
        } else { false }
    }

    /// Take pending watchpoint hit (returns and clears it).
    pub fn take_hit(&mut self) -> Option<WatchHit> {
        self.hit.take()
    }

    pub fn has_hit(&self) -> bool {
        self.hit.is_some()
    }

    /// Format watchpoints list.
    pub fn list_watchpoints(&self) -> String {
        if self.watchpoints.is_empty() { return "No watchpoints set.\n".into(); }
        let mut s = String::new();
        for (i, wp) in self.watchpoints.iter().enumerate() {
            let k = match wp.kind {
                WatchKind::Write => "W",
                WatchKind::Read => "R",
                WatchKind::ReadWrite => "RW",
            };
            let en = if wp.enabled { " " } else { "!" };
            let vm = wp.value_match.map(|v| format!(" =0x{:02X}", v)).unwrap_or_default();
            s.push_str(&format!("  [{}]{} 0x{:04X} {}  hits={}{}\n", i, en, wp.addr, k, wp.hits, vm));
        }
        s
    }

    fn triggers(wp: &Watchpoint, addr: u16, new_val: u8, access: WatchKind) -> bool {
        if !wp.enabled || wp.addr != addr { return false; }
        match access {
            WatchKind::Write => wp.kind != WatchKind::Read && wp.value_match.map_or(true, |v| v == new_val),
            _ => wp.kind != WatchKind::Write,
        }
    }

    fn check(&mut self, addr: u16, old_val: u8, new_val: u8, access: WatchKind) {
        for (i, wp) in self.watchpoints.iter_mut().enumerate() {
            if !Self::triggers(wp, addr, new_val, access) { continue; }
            wp.hits += 1;
            if self.hit.is_none() {
                self.hit = Some(WatchHit { index: i, addr, old_val, new_val, access });
            }
        }
    }
}

impl<B: Bus> Bus for WatchBus<B> {
    fn read(&mut self, addr: u16) -> Result<u8> {
        let val = self.inner.read(addr)?;
        self.check(addr, val, val, WatchKind::Read);
        Ok(val)
    }

    fn write(&mut self, addr: u16, value: u8) -> Result<()> {
        let watched = self.watchpoints.iter()
            .any(|wp| Self::triggers(wp, addr, value, WatchKind::Write));
        if !watched {
            return self.inner.write(addr, value);
        }
        let old = self.inner.read(addr)?;
        self.inner.write(addr, value)?;
        self.check(addr, old, value, WatchKind::Write);
        Ok(())
    }

    fn read_program_byte(&self, byte_addr: u32) -> Result<u8> {
        self.inner.read_program_byte(byte_addr)
    }

    fn write_program_word(&mut self, word_addr: u32, value: u16) -> Result<()> {
        self.inner.write_program_word(word_addr, value)
    }
}

impl<B: Bus> Machine<WatchBus<B>> {
    /// Run until a watchpoint triggers, the CPU sleeps, or `max_steps`
    /// instructions have executed. The triggering instruction has completed.
    pub fn run_until_watch(&mut self, program: &Program, max_steps: usize) -> Result<Option<WatchHit>> {
        for _ in 0..max_steps {
            if self.cpu.sleeping { break; }
            let flow: Flow = self.step(program)?;
            if let Some(hit) = self.bus.take_hit() {
                debug!("watchpoint [{}] 0x{:04X} {:?} at PC=0x{:04X} ({:?})",
                    hit.index, hit.addr, hit.access, self.cpu.pc, flow);
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}

// ─── RAM Viewer ─────────────────────────────────────────────────────────────

/// Format a hex + ASCII dump of data space, 16 bytes per line.
pub fn dump_ram(data: &[u8], start: u16, length: u16) -> String {
    let mut s = String::new();
    let end = (start as usize + length as usize).min(data.len());
    let mut addr = start as usize;
    while addr < end {
        let line_end = (addr + 16).min(end);
        s.push_str(&format!("{:04X}: ", addr));
        for i in addr..addr + 16 {
            if i < line_end {
                s.push_str(&format!("{:02X} ", data[i]));
            } else {
                s.push_str("   ");
            }
            if i == addr + 7 { s.push(' '); }
        }
        s.push(' ');
        for &c in &data[addr..line_end] {
            s.push(if (0x20..0x7F).contains(&c) { c as char } else { '.' });
        }
        s.push('\n');
        addr += 16;
    }
    s
}

/// Format only the bytes that differ between two data-space images.
pub fn dump_ram_diff(old: &[u8], new: &[u8], start: u16, length: u16) -> String {
    let mut s = String::new();
    let end = (start as usize + length as usize).min(old.len().min(new.len()));
    for i in start as usize..end {
        if old[i] != new[i] {
            s.push_str(&format!("  0x{:04X}: {:02X} -> {:02X}\n", i, old[i], new[i]));
        }
    }
    if s.is_empty() { s.push_str("  (no changes)\n"); }
    s
}
