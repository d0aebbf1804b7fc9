//! Register snapshots and the bounded execution trace.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cpu::CpuState;
use crate::instructions::InstructionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSnapshot {
    pub a: u16,
    pub b: u8,
    pub x: u16,
    pub y: u16,
    pub sp: u16,
    pub dp: u16,
    pub db: u8,
    pub pb: u8,
    pub pc: u16,
    pub p: u8,
    pub emulation: bool,
    pub instructions: u64,
}

impl From<&CpuState> for RegisterSnapshot {
    fn from(state: &CpuState) -> Self {
        Self {
            a: state.a,
            b: state.b,
            x: state.x,
            y: state.y,
            sp: state.sp,
            dp: state.dp,
            db: state.db,
            pb: state.pb,
            pc: state.pc,
            p: state.status_byte(),
            emulation: state.emulation_mode,
            instructions: state.instructions,
        }
    }
}

impl fmt::Display for RegisterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A:{:04X} X:{:04X} Y:{:04X} S:{:04X} D:{:04X} DB:{:02X} P:{:02X} E:{}",
            self.a,
            self.x,
            self.y,
            self.sp,
            self.dp,
            self.db,
            self.p,
            self.emulation as u8
        )
    }
}

/// One executed instruction with the registers as they were right before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub offset: u32,
    pub opcode: u8,
    pub text: String,
    pub registers: RegisterSnapshot,
}

impl TraceEntry {
    pub fn new(record: &InstructionRecord, state: &CpuState) -> Self {
        Self {
            offset: record.offset,
            opcode: record.instruction.code,
            text: record.text(),
            registers: RegisterSnapshot::from(state),
        }
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:04X}: {:<16} | {}",
            self.registers.pb,
            self.registers.pc,
            self.text,
            self.registers
        )
    }
}

/// Keeps the most recent `capacity` entries; zero capacity records nothing.
#[derive(Debug, Clone, Default)]
pub struct TraceBuffer {
    entries: VecDeque<TraceEntry>,
    capacity: usize,
}

impl TraceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn push(&mut self, entry: TraceEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    /// The last `count` entries, oldest first.
    pub fn recent(&self, count: usize) -> Vec<TraceEntry> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::AddressingMode;
    use crate::instructions::{Instruction, Opcode};

    fn entry(offset: u32) -> TraceEntry {
        let record = InstructionRecord {
            offset,
            instruction: Instruction::new(0xEA, Opcode::Nop, AddressingMode::Implied),
            operand1: 0,
            operand2: 0,
            operand_len: 0,
        };
        TraceEntry::new(&record, &CpuState::new())
    }

    #[test]
    fn test_buffer_drops_oldest() {
        let mut buffer = TraceBuffer::new(2);
        buffer.push(entry(0));
        buffer.push(entry(1));
        buffer.push(entry(2));

        let offsets: Vec<u32> = buffer.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![1, 2]);
        assert_eq!(buffer.recent(1)[0].offset, 2);
    }

    #[test]
    fn test_disabled_buffer_stays_empty() {
        let mut buffer = TraceBuffer::new(0);
        buffer.push(entry(0));
        assert!(buffer.is_empty());
        assert!(!buffer.is_enabled());
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = RegisterSnapshot::from(&CpuState::new());
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: RegisterSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert!(json.contains("\"emulation\":true"));
    }

    #[test]
    fn test_entry_display() {
        let text = entry(0).to_string();
        assert!(text.starts_with("00:0000: NOP"));
        assert!(text.contains("S:0100"));
    }
}
