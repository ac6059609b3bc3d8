//! The four-word MMIO register file shared by the simulated program and the
//! host UI thread.
//!
//! All register offsets are relative to the configurable MMIO base. Words
//! are little-endian byte-addressable, so the command's top byte `b0` sits
//! at `ADAPTER_DATA + 3`.
//!
//! Every read-modify-write helper here runs under a single lock acquisition;
//! that is the mutual-exclusion discipline both actors (bus dispatch on the
//! CPU thread, keyboard/reset on the UI thread) rely on.

use std::sync::Mutex;

use crate::dram::MemoryError;

/// Register offsets within the MMIO window.
pub const RECEIVER_CONTROL: u64 = 0x0;
pub const RECEIVER_DATA: u64 = 0x4;
pub const ADAPTER_STATUS: u64 = 0x8;
pub const ADAPTER_DATA: u64 = 0xc;

/// Size of the MMIO window in bytes.
pub const MMIO_SIZE: u64 = 0x10;

/// Ready flag, low bit of receiver-control and adapter-status.
pub const READY: u32 = 0x1;
/// Persistent per-register interrupt-enable flag (bit 1).
pub const INTR_ENABLE: u32 = 0x2;

/// Interior-mutable register file; shared via `Arc` between the system bus,
/// the adapter and the keyboard handler.
pub struct RegisterFile {
    words: Mutex<[u32; 4]>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self { words: Mutex::new([0; 4]) }
    }

    fn index(offset: u64) -> Option<usize> {
        if offset < MMIO_SIZE && offset % 4 == 0 {
            Some((offset / 4) as usize)
        } else {
            None
        }
    }

    /// Load from the register window. Sub-word reads extract little-endian
    /// byte lanes from the containing word.
    pub fn load(&self, offset: u64, size: u64) -> Result<u64, MemoryError> {
        if offset >= MMIO_SIZE {
            return Err(MemoryError::OutOfBounds(offset));
        }
        let words = self.words.lock().unwrap();
        let word = words[(offset / 4) as usize];
        let shift = (offset % 4) * 8;
        match size {
            1 => Ok(((word >> shift) & 0xff) as u64),
            2 if offset % 2 == 0 => Ok(((word >> shift) & 0xffff) as u64),
            4 if offset % 4 == 0 => Ok(word as u64),
            _ => Err(MemoryError::InvalidAlignment(offset)),
        }
    }

    /// Store into the register window, merging sub-word writes into the
    /// containing word's little-endian byte lanes.
    pub fn store(&self, offset: u64, size: u64, value: u64) -> Result<(), MemoryError> {
        if offset >= MMIO_SIZE {
            return Err(MemoryError::OutOfBounds(offset));
        }
        let mut words = self.words.lock().unwrap();
        let idx = (offset / 4) as usize;
        let shift = (offset % 4) * 8;
        match size {
            1 => {
                words[idx] = (words[idx] & !(0xff << shift)) | (((value & 0xff) as u32) << shift);
            }
            2 if offset % 2 == 0 => {
                words[idx] =
                    (words[idx] & !(0xffff << shift)) | (((value & 0xffff) as u32) << shift);
            }
            4 if offset % 4 == 0 => {
                words[idx] = value as u32;
            }
            _ => return Err(MemoryError::InvalidAlignment(offset)),
        }
        Ok(())
    }

    /// Read a whole register word.
    pub fn read_word(&self, offset: u64) -> u32 {
        let idx = Self::index(offset).expect("word-aligned register offset");
        self.words.lock().unwrap()[idx]
    }

    /// Overwrite a whole register word.
    pub fn write_word(&self, offset: u64, value: u32) {
        let idx = Self::index(offset).expect("word-aligned register offset");
        self.words.lock().unwrap()[idx] = value;
    }

    pub fn is_ready(&self, offset: u64) -> bool {
        self.read_word(offset) & READY != 0
    }

    /// Set the ready bit, preserving every other bit (the interrupt-enable
    /// flag in particular). Returns the updated register value.
    pub fn set_ready(&self, offset: u64) -> u32 {
        let idx = Self::index(offset).expect("word-aligned register offset");
        let mut words = self.words.lock().unwrap();
        words[idx] |= READY;
        words[idx]
    }

    /// Clear the ready bit, keeping only the interrupt-enable flag.
    /// Returns the updated register value.
    pub fn clear_ready(&self, offset: u64) -> u32 {
        let idx = Self::index(offset).expect("word-aligned register offset");
        let mut words = self.words.lock().unwrap();
        words[idx] &= INTR_ENABLE;
        words[idx]
    }

    /// Keystroke delivery: set the receiver-control ready bit (preserving
    /// interrupt-enable) and store the data byte into receiver-data as one
    /// atomic register-file update. Returns the updated control value, which
    /// is what the keyboard interrupt guard tests.
    pub fn push_key(&self, data: u32) -> u32 {
        let mut words = self.words.lock().unwrap();
        let control = words[(RECEIVER_CONTROL / 4) as usize] | READY;
        words[(RECEIVER_CONTROL / 4) as usize] = control;
        words[(RECEIVER_DATA / 4) as usize] = data;
        control
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_updates_preserve_interrupt_enable() {
        let regs = RegisterFile::new();
        regs.write_word(ADAPTER_STATUS, INTR_ENABLE);
        assert_eq!(regs.set_ready(ADAPTER_STATUS), INTR_ENABLE | READY);
        assert_eq!(regs.clear_ready(ADAPTER_STATUS), INTR_ENABLE);
    }

    #[test]
    fn byte_store_merges_into_word() {
        let regs = RegisterFile::new();
        regs.write_word(ADAPTER_DATA, 0x1122_3344);
        // Top byte of the little-endian word lives at offset +3.
        regs.store(ADAPTER_DATA + 3, 1, 0xd1).unwrap();
        assert_eq!(regs.read_word(ADAPTER_DATA), 0xd122_3344);
        assert_eq!(regs.load(ADAPTER_DATA + 3, 1).unwrap(), 0xd1);
    }

    #[test]
    fn push_key_is_one_atomic_update() {
        let regs = RegisterFile::new();
        regs.write_word(RECEIVER_CONTROL, INTR_ENABLE);
        let control = regs.push_key(0x61);
        assert_eq!(control, INTR_ENABLE | READY);
        assert_eq!(regs.read_word(RECEIVER_CONTROL), control);
        assert_eq!(regs.read_word(RECEIVER_DATA), 0x61);
    }

    #[test]
    fn misaligned_halfword_access_is_rejected() {
        let regs = RegisterFile::new();
        assert!(regs.load(RECEIVER_DATA + 1, 2).is_err());
        assert!(regs.store(RECEIVER_DATA + 1, 2, 0).is_err());
    }
}
