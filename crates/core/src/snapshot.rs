//! Machine state snapshots.
//!
//! A [`Snapshot`] captures everything the core mutates: registers, SREG, PC,
//! SP, the sleep flag, the data-space image and program memory. Restoring a
//! snapshot and replaying the same instructions reproduces the same state.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "AVRS"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flags::StatusFlags;
use crate::memory::Memory;
use crate::registers::RegisterFile;
use crate::{Machine, REG_COUNT};

/// Magic bytes identifying a snapshot file.
const MAGIC: &[u8; 4] = b"AVRS";
/// Current snapshot format version.
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("snapshot decompress error: {0}")]
    Decompress(String),
    #[error("not a snapshot (bad magic)")]
    BadMagic,
    #[error("unsupported snapshot version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("snapshot too small ({0} bytes)")]
    TooSmall(usize),
    #[error("snapshot geometry mismatch: {0}")]
    GeometryMismatch(String),
}

/// A frozen copy of machine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// CPU: pc, sp, sreg, sleeping
    pub pc: u16,
    pub sp: u16,
    pub sreg: u8,
    pub sleeping: bool,
    pub registers: [u8; REG_COUNT],
    /// Full data-space (register shadow + I/O + SRAM)
    pub data: Vec<u8>,
    /// Program memory
    pub flash: Vec<u8>,
}

impl Snapshot {
    /// Encode with header and deflate compression.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let payload = bincode::serialize(self)?;
        let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

        let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    /// Decode, verifying magic and version.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SnapshotError> {
        if data.len() < HEADER_LEN {
            return Err(SnapshotError::TooSmall(data.len()));
        }
        if &data[0..4] != MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != FORMAT_VERSION {
            return Err(SnapshotError::Version { found: version, expected: FORMAT_VERSION });
        }
        let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
            .map_err(|e| SnapshotError::Decompress(format!("{:?}", e)))?;
        Ok(bincode::deserialize(&decompressed)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SnapshotError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SnapshotError> {
        let data = std::fs::read(path)?;
        Snapshot::from_bytes(&data)
    }
}

impl Machine<Memory> {
    pub fn save_snapshot(&self) -> Snapshot {
        Snapshot {
            pc: self.cpu.pc,
            sp: self.cpu.sp,
            sreg: self.cpu.sreg.bits(),
            sleeping: self.cpu.sleeping,
            registers: *self.regs.as_bytes(),
            data: self.bus.data.clone(),
            flash: self.bus.flash.clone(),
        }
    }

    /// Restore state from a snapshot taken on a machine of the same geometry.
    pub fn restore_snapshot(&mut self, snap: &Snapshot) -> Result<(), SnapshotError> {
        if snap.data.len() != self.bus.data.len() || snap.flash.len() != self.bus.flash.len() {
            return Err(SnapshotError::GeometryMismatch(format!(
                "snapshot data={} flash={}, machine data={} flash={}",
                snap.data.len(),
                snap.flash.len(),
                self.bus.data.len(),
                self.bus.flash.len()
            )));
        }
        self.cpu.pc = snap.pc;
        self.cpu.sp = snap.sp;
        self.cpu.sreg = StatusFlags::from_bits(snap.sreg);
        self.cpu.sleeping = snap.sleeping;
        self.regs = RegisterFile::from_bytes(snap.registers);
        self.bus.data.copy_from_slice(&snap.data);
        self.bus.flash.copy_from_slice(&snap.flash);
        debug!("restored snapshot: PC=0x{:04X} SP=0x{:04X}", snap.pc, snap.sp);
        Ok(())
    }
}
