//! Trait representing the memory interface required by the 65C816 core.
//!
//! Positions are view-relative. Multi-byte accesses are little-endian and are
//! checked as a whole before any byte is touched.

use crate::error::Result;

pub trait CpuBus {
    /// Number of addressable bytes in this view.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails unless every byte in `[pos, pos + count)` is reachable.
    fn check_range(&self, pos: u32, count: usize) -> Result<()>;

    fn read_u8(&self, pos: u32) -> Result<u8>;
    fn write_u8(&mut self, pos: u32, value: u8) -> Result<()>;

    fn read_u16(&self, pos: u32) -> Result<u16> {
        self.check_range(pos, 2)?;
        let lo = self.read_u8(pos)? as u16;
        let hi = self.read_u8(pos.wrapping_add(1))? as u16;
        Ok((hi << 8) | lo)
    }

    fn read_u24(&self, pos: u32) -> Result<u32> {
        self.check_range(pos, 3)?;
        let lo = self.read_u8(pos)? as u32;
        let mid = self.read_u8(pos.wrapping_add(1))? as u32;
        let hi = self.read_u8(pos.wrapping_add(2))? as u32;
        Ok((hi << 16) | (mid << 8) | lo)
    }

    fn write_u16(&mut self, pos: u32, value: u16) -> Result<()> {
        self.check_range(pos, 2)?;
        self.write_u8(pos, (value & 0xFF) as u8)?;
        self.write_u8(pos.wrapping_add(1), (value >> 8) as u8)
    }

    fn write_u24(&mut self, pos: u32, value: u32) -> Result<()> {
        self.check_range(pos, 3)?;
        self.write_u8(pos, (value & 0xFF) as u8)?;
        self.write_u8(pos.wrapping_add(1), (value >> 8) as u8)?;
        self.write_u8(pos.wrapping_add(2), (value >> 16) as u8)
    }

    fn read_block(&self, pos: u32, buffer: &mut [u8]) -> Result<()> {
        self.check_range(pos, buffer.len())?;
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = self.read_u8(pos.wrapping_add(i as u32))?;
        }
        Ok(())
    }

    fn write_block(&mut self, pos: u32, buffer: &[u8]) -> Result<()> {
        self.check_range(pos, buffer.len())?;
        for (i, &byte) in buffer.iter().enumerate() {
            self.write_u8(pos.wrapping_add(i as u32), byte)?;
        }
        Ok(())
    }
}
