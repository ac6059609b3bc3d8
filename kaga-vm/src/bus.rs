//! System bus: routes the simulated program's memory accesses to RAM
//! segments and the MMIO register file, and synchronously notifies
//! subscribed watchers of matching accesses.
//!
//! The adapter core never polls; everything it does is a reaction to a
//! notification delivered from here.

use std::sync::Arc;

use thiserror::Error;

use crate::dram::Dram;
use crate::regs::{RegisterFile, MMIO_SIZE};
use crate::Trap;

/// Default segment bases, matching the memory configuration of the
/// simulator this adapter was built for.
pub const TEXT_BASE: u64 = 0x0040_0000;
pub const DATA_BASE: u64 = 0x1001_0000;
pub const KERNEL_TEXT_BASE: u64 = 0x8000_0000;
pub const MMIO_BASE: u64 = 0xffff_0000;

const DEFAULT_SEGMENT_SIZE: u64 = 0x1_0000;

/// Host-configuration errors. These are unrecoverable: a bus that cannot be
/// built must abort the session rather than risk corrupting memory.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MMIO base {0:#x} is not word-aligned")]
    UnalignedMmioBase(u64),

    #[error("MMIO window at {0:#x} overlaps a RAM segment")]
    MmioOverlapsRam(u64),
}

/// Address-space layout for the simulated program plus the MMIO window.
#[derive(Debug, Clone)]
pub struct MemoryLayout {
    pub text_base: u64,
    pub text_size: u64,
    pub kernel_text_base: u64,
    pub kernel_text_size: u64,
    pub data_base: u64,
    pub data_size: u64,
    pub mmio_base: u64,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            text_base: TEXT_BASE,
            text_size: DEFAULT_SEGMENT_SIZE,
            kernel_text_base: KERNEL_TEXT_BASE,
            kernel_text_size: DEFAULT_SEGMENT_SIZE,
            data_base: DATA_BASE,
            data_size: DEFAULT_SEGMENT_SIZE,
            mmio_base: MMIO_BASE,
        }
    }
}

impl MemoryLayout {
    /// True if `addr` falls inside an executable segment (user or kernel
    /// text). Only fetches from these regions count toward command delays.
    pub fn in_exec(&self, addr: u64) -> bool {
        (addr >= self.text_base && addr < self.text_base + self.text_size)
            || (addr >= self.kernel_text_base
                && addr < self.kernel_text_base + self.kernel_text_size)
    }

    fn ranges(&self) -> [(u64, u64); 3] {
        [
            (self.text_base, self.text_size),
            (self.kernel_text_base, self.kernel_text_size),
            (self.data_base, self.data_size),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mmio_base % 4 != 0 {
            return Err(ConfigError::UnalignedMmioBase(self.mmio_base));
        }
        for (base, size) in self.ranges() {
            if self.mmio_base < base + size && base < self.mmio_base + MMIO_SIZE {
                return Err(ConfigError::MmioOverlapsRam(self.mmio_base));
            }
        }
        Ok(())
    }
}

/// What kind of access a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// A synchronous access notification delivered to watchers.
#[derive(Debug, Clone, Copy)]
pub struct AccessNotice {
    pub addr: u64,
    pub len: u64,
    pub kind: AccessKind,
}

/// Callback handle invoked by the bus dispatcher on every access that falls
/// inside one of the subscribed ranges.
pub trait BusWatcher: Send + Sync {
    fn on_access(&self, notice: AccessNotice);
}

/// The system bus: RAM segments, the MMIO register window and the watcher
/// subscription table.
pub struct SystemBus {
    pub layout: MemoryLayout,
    segments: Vec<Dram>,
    regs: Arc<RegisterFile>,
    watchers: Vec<(u64, u64, Arc<dyn BusWatcher>)>,
}

impl SystemBus {
    pub fn new(layout: MemoryLayout, regs: Arc<RegisterFile>) -> Result<Self, ConfigError> {
        layout.validate()?;
        let segments = layout
            .ranges()
            .into_iter()
            .map(|(base, size)| Dram::new(base, size as usize))
            .collect();
        Ok(Self { layout, segments, regs, watchers: Vec::new() })
    }

    /// Subscribe `watcher` to every access whose address lies in
    /// `[lo, hi]` (inclusive).
    pub fn subscribe(&mut self, lo: u64, hi: u64, watcher: Arc<dyn BusWatcher>) {
        log::trace!("[BUS] watcher subscribed to {:#x}..={:#x}", lo, hi);
        self.watchers.push((lo, hi, watcher));
    }

    fn notify(&self, addr: u64, len: u64, kind: AccessKind) {
        for (lo, hi, watcher) in &self.watchers {
            if addr >= *lo && addr <= *hi {
                watcher.on_access(AccessNotice { addr, len, kind });
            }
        }
    }

    fn segment(&self, addr: u64) -> Option<(usize, usize)> {
        for (i, seg) in self.segments.iter().enumerate() {
            if let Some(off) = seg.offset(addr) {
                return Some((i, off));
            }
        }
        None
    }

    fn mmio_offset(&self, addr: u64) -> Option<u64> {
        if addr >= self.layout.mmio_base && addr < self.layout.mmio_base + MMIO_SIZE {
            Some(addr - self.layout.mmio_base)
        } else {
            None
        }
    }

    fn load(&mut self, addr: u64, size: u64) -> Result<u64, Trap> {
        let val = if let Some((i, off)) = self.segment(addr) {
            let seg = &self.segments[i];
            match size {
                1 => seg.load_8(off).map(|v| v as u64),
                2 => seg.load_16(off).map(|v| v as u64),
                4 => seg.load_32(off).map(|v| v as u64),
                _ => return Err(Trap::Fatal(format!("Unsupported bus load size: {}", size))),
            }
            .map_err(|_| Trap::LoadAccessFault(addr))?
        } else if let Some(off) = self.mmio_offset(addr) {
            self.regs.load(off, size).map_err(|_| Trap::LoadAccessFault(addr))?
        } else {
            return Err(Trap::LoadAccessFault(addr));
        };
        self.notify(addr, size, AccessKind::Read);
        Ok(val)
    }

    fn store(&mut self, addr: u64, size: u64, value: u64) -> Result<(), Trap> {
        if let Some((i, off)) = self.segment(addr) {
            let seg = &mut self.segments[i];
            match size {
                1 => seg.store_8(off, value as u8),
                2 => seg.store_16(off, value as u16),
                4 => seg.store_32(off, value as u32),
                _ => return Err(Trap::Fatal(format!("Unsupported bus store size: {}", size))),
            }
            .map_err(|_| Trap::StoreAccessFault(addr))?;
        } else if let Some(off) = self.mmio_offset(addr) {
            self.regs.store(off, size, value).map_err(|_| Trap::StoreAccessFault(addr))?;
        } else {
            return Err(Trap::StoreAccessFault(addr));
        }
        self.notify(addr, size, AccessKind::Write);
        Ok(())
    }

    pub fn read8(&mut self, addr: u64) -> Result<u8, Trap> {
        self.load(addr, 1).map(|v| v as u8)
    }

    pub fn read16(&mut self, addr: u64) -> Result<u16, Trap> {
        if addr % 2 != 0 {
            return Err(Trap::LoadAddressMisaligned(addr));
        }
        self.load(addr, 2).map(|v| v as u16)
    }

    pub fn read32(&mut self, addr: u64) -> Result<u32, Trap> {
        if addr % 4 != 0 {
            return Err(Trap::LoadAddressMisaligned(addr));
        }
        self.load(addr, 4).map(|v| v as u32)
    }

    pub fn write8(&mut self, addr: u64, val: u8) -> Result<(), Trap> {
        self.store(addr, 1, val as u64)
    }

    pub fn write16(&mut self, addr: u64, val: u16) -> Result<(), Trap> {
        if addr % 2 != 0 {
            return Err(Trap::StoreAddressMisaligned(addr));
        }
        self.store(addr, 2, val as u64)
    }

    pub fn write32(&mut self, addr: u64, val: u32) -> Result<(), Trap> {
        if addr % 4 != 0 {
            return Err(Trap::StoreAddressMisaligned(addr));
        }
        self.store(addr, 4, val as u64)
    }

    /// Instruction fetch. Only defined for the executable segments; the
    /// resulting read notification is what advances command delays.
    pub fn fetch_u32(&mut self, addr: u64) -> Result<u32, Trap> {
        if addr % 4 != 0 {
            return Err(Trap::InstructionAddressMisaligned(addr));
        }
        if !self.layout.in_exec(addr) {
            return Err(Trap::InstructionAccessFault(addr));
        }
        self.read32(addr).map_err(|e| match e {
            Trap::LoadAccessFault(a) => Trap::InstructionAccessFault(a),
            Trap::LoadAddressMisaligned(a) => Trap::InstructionAddressMisaligned(a),
            other => other,
        })
    }

    /// Write a program image into the user text segment.
    pub fn load_text(&mut self, image: &[u8]) -> Result<(), Trap> {
        let base = self.layout.text_base;
        let (i, off) = self.segment(base).ok_or(Trap::StoreAccessFault(base))?;
        self.segments[i]
            .write_bytes(off, image)
            .map_err(|_| Trap::StoreAccessFault(base))
    }
}
