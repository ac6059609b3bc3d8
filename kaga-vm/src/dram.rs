//! Byte-addressable RAM segments backing the simulated program's address
//! space (user text, kernel text, data).

use thiserror::Error;

/// Device-local memory access errors.
///
/// These are mapped into architectural traps (`Trap`) by the system bus.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Out-of-bounds memory access at {0:#x}")]
    OutOfBounds(u64),

    #[error("Invalid or misaligned access at {0:#x}")]
    InvalidAlignment(u64),
}

/// A single RAM segment with a fixed base address.
pub struct Dram {
    pub base: u64,
    pub data: Vec<u8>,
}

impl Dram {
    /// Create a segment of `size` bytes at `base`, zero-initialised.
    pub fn new(base: u64, size: usize) -> Self {
        Self { base, data: vec![0; size] }
    }

    /// Translate an absolute address into an offset within this segment.
    pub fn offset(&self, addr: u64) -> Option<usize> {
        if addr >= self.base {
            let off = (addr - self.base) as usize;
            if off < self.data.len() {
                return Some(off);
            }
        }
        None
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.offset(addr).is_some()
    }

    fn check_bounds(&self, offset: usize, size: usize) -> Result<usize, MemoryError> {
        let end = offset
            .checked_add(size)
            .ok_or(MemoryError::OutOfBounds(offset as u64))?;
        if end > self.data.len() {
            return Err(MemoryError::OutOfBounds(offset as u64));
        }
        Ok(offset)
    }

    pub fn load_8(&self, offset: usize) -> Result<u8, MemoryError> {
        let off = self.check_bounds(offset, 1)?;
        Ok(self.data[off])
    }

    pub fn load_16(&self, offset: usize) -> Result<u16, MemoryError> {
        let off = self.check_bounds(offset, 2)?;
        let bytes: [u8; 2] = self.data[off..off + 2].try_into().unwrap();
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn load_32(&self, offset: usize) -> Result<u32, MemoryError> {
        let off = self.check_bounds(offset, 4)?;
        let bytes: [u8; 4] = self.data[off..off + 4].try_into().unwrap();
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn store_8(&mut self, offset: usize, value: u8) -> Result<(), MemoryError> {
        let off = self.check_bounds(offset, 1)?;
        self.data[off] = value;
        Ok(())
    }

    pub fn store_16(&mut self, offset: usize, value: u16) -> Result<(), MemoryError> {
        let off = self.check_bounds(offset, 2)?;
        self.data[off..off + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn store_32(&mut self, offset: usize, value: u32) -> Result<(), MemoryError> {
        let off = self.check_bounds(offset, 4)?;
        self.data[off..off + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Write an arbitrary slice into the segment starting at `offset`.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        let off = self.check_bounds(offset, data.len())?;
        self.data[off..off + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_word_access() {
        let mut seg = Dram::new(0x0040_0000, 64);
        seg.store_32(0, 0xd151_1ff0).unwrap();
        assert_eq!(seg.load_8(3).unwrap(), 0xd1);
        assert_eq!(seg.load_32(0).unwrap(), 0xd151_1ff0);
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let seg = Dram::new(0, 8);
        assert!(seg.load_32(6).is_err());
        assert!(seg.offset(9).is_none());
        assert!(seg.contains(7));
    }
}
