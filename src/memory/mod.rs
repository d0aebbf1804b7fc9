//! Flat memory container plus bounds-checked views into it.
//!
//! A [`MemoryContainer`] owns every byte of the emulated address space (ROM and
//! RAM regions concatenated). Views share the container and only carry an
//! offset and a length, so cloning a view is cheap and a view can be handed to
//! a worker thread while the loader keeps its own handle.

mod banked;


pub use banked::{BankedMemoryBin, ROM_SPACE_START, WRAM_BANK_SIZE, WRAM_FIRST_BANK};

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cpu_bus::CpuBus;
use crate::error::{CpuError, Result};

/// Smallest container accepted: direct page plus the emulation-mode stack page.
pub const MIN_CONTAINER_SIZE: usize = 0x200;
/// 64 MiB addressable ceiling.
pub const MAX_CONTAINER_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MemoryContainer {
    data: Arc<RwLock<Vec<u8>>>,
    size: usize,
}

impl MemoryContainer {
    pub fn new(size: usize) -> Result<Self> {
        if !(MIN_CONTAINER_SIZE..=MAX_CONTAINER_SIZE).contains(&size) {
            return Err(CpuError::InvalidOperation(format!(
                "container size 0x{:X} must be within 0x{:X}..=0x{:X}",
                size, MIN_CONTAINER_SIZE, MAX_CONTAINER_SIZE
            )));
        }
        Ok(Self {
            data: Arc::new(RwLock::new(vec![0; size])),
            size,
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Copies an externally loaded image verbatim, starting at `offset`.
    pub fn load(&self, offset: usize, image: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(image.len())
            .filter(|&end| end <= self.size)
            .ok_or(CpuError::OutOfRange {
                position: offset.saturating_add(image.len()) as u64,
                length: self.size,
            })?;
        self.write_guard()[offset..end].copy_from_slice(image);
        log::debug!("loaded 0x{:X} bytes at 0x{:06X}", image.len(), offset);
        Ok(())
    }

    /// View over the whole container.
    pub fn view(&self) -> MemoryBin {
        MemoryBin {
            container: self.clone(),
            start: 0,
            length: self.size,
        }
    }

    // Views are only mutated by the single active interpreter, so a poisoned
    // lock still holds consistent bytes.
    fn read_guard(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounds-checked window into a [`MemoryContainer`].
#[derive(Debug, Clone)]
pub struct MemoryBin {
    container: MemoryContainer,
    start: usize,
    length: usize,
}

impl MemoryBin {
    pub fn new(container: &MemoryContainer, start: usize, length: usize) -> Result<Self> {
        let fits = start < container.len()
            && start
                .checked_add(length)
                .map_or(false, |end| end <= container.len());
        if !fits {
            return Err(CpuError::OutOfRange {
                position: start as u64 + length as u64,
                length: container.len(),
            });
        }
        Ok(Self {
            container: container.clone(),
            start,
            length,
        })
    }

    /// Narrower view relative to this one.
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        let end = offset.checked_add(length);
        if offset >= self.length || end.map_or(true, |end| end > self.length) {
            return Err(CpuError::OutOfRange {
                position: offset as u64 + length as u64,
                length: self.length,
            });
        }
        Self::new(&self.container, self.start + offset, length)
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn container(&self) -> &MemoryContainer {
        &self.container
    }

    fn absolute(&self, pos: u32, count: usize) -> Result<usize> {
        self.check_range(pos, count)?;
        Ok(self.start + pos as usize)
    }
}

impl CpuBus for MemoryBin {
    fn len(&self) -> usize {
        self.length
    }

    fn check_range(&self, pos: u32, count: usize) -> Result<()> {
        let pos = pos as u64;
        if pos >= self.length as u64 {
            return Err(CpuError::OutOfRange {
                position: pos,
                length: self.length,
            });
        }
        let last = pos + count.max(1) as u64 - 1;
        if last >= self.length as u64 {
            return Err(CpuError::OutOfRange {
                position: last,
                length: self.length,
            });
        }
        Ok(())
    }

    fn read_u8(&self, pos: u32) -> Result<u8> {
        let at = self.absolute(pos, 1)?;
        Ok(self.container.read_guard()[at])
    }

    fn write_u8(&mut self, pos: u32, value: u8) -> Result<()> {
        let at = self.absolute(pos, 1)?;
        self.container.write_guard()[at] = value;
        Ok(())
    }

    fn read_u16(&self, pos: u32) -> Result<u16> {
        let at = self.absolute(pos, 2)?;
        let data = self.container.read_guard();
        Ok(u16::from_le_bytes([data[at], data[at + 1]]))
    }

    fn read_u24(&self, pos: u32) -> Result<u32> {
        let at = self.absolute(pos, 3)?;
        let data = self.container.read_guard();
        Ok(u32::from_le_bytes([data[at], data[at + 1], data[at + 2], 0]))
    }

    fn write_u16(&mut self, pos: u32, value: u16) -> Result<()> {
        let at = self.absolute(pos, 2)?;
        self.container.write_guard()[at..at + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_u24(&mut self, pos: u32, value: u32) -> Result<()> {
        let at = self.absolute(pos, 3)?;
        self.container.write_guard()[at..at + 3].copy_from_slice(&value.to_le_bytes()[..3]);
        Ok(())
    }

    fn read_block(&self, pos: u32, buffer: &mut [u8]) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let at = self.absolute(pos, buffer.len())?;
        buffer.copy_from_slice(&self.container.read_guard()[at..at + buffer.len()]);
        Ok(())
    }

    fn write_block(&mut self, pos: u32, buffer: &[u8]) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let at = self.absolute(pos, buffer.len())?;
        self.container.write_guard()[at..at + buffer.len()].copy_from_slice(buffer);
        Ok(())
    }
}
