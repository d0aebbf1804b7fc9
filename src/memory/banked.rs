//! Bank-aware view over the two working-RAM banks.
//!
//! Banks 0x7E and 0x7F address WRAM directly. Every other bank only reaches
//! WRAM through its low half (0x0000-0x7FFF, mirrored onto bank 0x7E); its high
//! half is ROM space and cannot be accessed through this view.

use crate::cpu_bus::CpuBus;
use crate::error::{CpuError, Result};

use super::MemoryBin;

pub const WRAM_FIRST_BANK: u32 = 0x7E;
pub const WRAM_BANK_SIZE: usize = 0x1_0000;
pub const ROM_SPACE_START: u32 = 0x8000;

#[derive(Debug, Clone)]
pub struct BankedMemoryBin {
    wram: MemoryBin,
}

impl BankedMemoryBin {
    /// `wram` must cover the working-RAM banks (up to two banks are mapped).
    pub fn new(wram: MemoryBin) -> Self {
        Self { wram }
    }

    pub fn wram(&self) -> &MemoryBin {
        &self.wram
    }

    /// Maps a 24-bit bus address onto an offset inside the WRAM view.
    pub fn resolve(&self, address: u32) -> Result<u32> {
        let address = address & 0xFF_FFFF;
        let bank = address >> 16;
        let low = address & 0xFFFF;
        let offset = match bank {
            WRAM_FIRST_BANK | 0x7F => ((bank - WRAM_FIRST_BANK) << 16) | low,
            _ if low >= ROM_SPACE_START => return Err(CpuError::AccessViolation { address }),
            _ => low,
        };
        self.wram.check_range(offset, 1)?;
        Ok(offset)
    }
}

impl CpuBus for BankedMemoryBin {
    fn len(&self) -> usize {
        self.wram.len()
    }

    fn check_range(&self, pos: u32, count: usize) -> Result<()> {
        for i in 0..count.max(1) {
            self.resolve(pos.wrapping_add(i as u32))?;
        }
        Ok(())
    }

    fn read_u8(&self, pos: u32) -> Result<u8> {
        let offset = self.resolve(pos)?;
        self.wram.read_u8(offset)
    }

    fn write_u8(&mut self, pos: u32, value: u8) -> Result<()> {
        let offset = self.resolve(pos)?;
        self.wram.write_u8(offset, value)
    }
}
