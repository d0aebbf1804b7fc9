//! Batch disassembly of a memory view.
//!
//! Decoding never executes anything: the same view can be walked any number of
//! times and yields the same records.

use crate::cpu::DecodeContext;
use crate::cpu_bus::CpuBus;
use crate::error::Result;
use crate::instructions::{DispatchTable, InstructionRecord, Opcode};

/// Walks a view one instruction at a time, starting at a given offset.
///
/// The iterator ends when the view is exhausted, or right after yielding the
/// first error.
pub struct Disassembler<'a, B: CpuBus> {
    table: &'a DispatchTable,
    bus: &'a B,
    offset: u32,
    ctx: DecodeContext,
    follow_width_changes: bool,
    emulation_mode: bool,
    failed: bool,
}

impl<'a, B: CpuBus> Disassembler<'a, B> {
    pub fn new(table: &'a DispatchTable, bus: &'a B, start: u32, ctx: DecodeContext) -> Self {
        Self {
            table,
            bus,
            offset: start,
            ctx,
            follow_width_changes: false,
            emulation_mode: false,
            failed: false,
        }
    }

    /// Apply REP/SEP operands to the decode context as they are passed, so
    /// later immediates are read at the width the program selected.
    pub fn follow_width_changes(mut self, follow: bool) -> Self {
        self.follow_width_changes = follow;
        self
    }

    /// Code runs in emulation mode, where REP cannot widen M or X. Only
    /// matters when following width changes.
    pub fn emulation_mode(mut self, emulation: bool) -> Self {
        self.emulation_mode = emulation;
        self
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn context(&self) -> DecodeContext {
        self.ctx
    }

    fn track(&mut self, record: &InstructionRecord) {
        if self.emulation_mode {
            return;
        }
        let bits = record.operand1 as u8;
        match record.instruction.opcode {
            Opcode::Rep => {
                self.ctx.m &= bits & 0x20 == 0;
                self.ctx.x &= bits & 0x10 == 0;
            }
            Opcode::Sep => {
                self.ctx.m |= bits & 0x20 != 0;
                self.ctx.x |= bits & 0x10 != 0;
            }
            _ => {}
        }
    }
}

impl<B: CpuBus> Iterator for Disassembler<'_, B> {
    type Item = Result<InstructionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset as usize >= self.bus.len() {
            return None;
        }

        match self.table.decode_at(self.bus, &mut self.offset, self.ctx) {
            Ok(record) => {
                if self.follow_width_changes {
                    self.track(&record);
                }
                Some(Ok(record))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Decodes every instruction from `start` to the end of the view.
///
/// A final instruction whose operands run past the end of the view fails the
/// whole call with `OutOfRange`.
pub fn decode_all<B: CpuBus>(
    table: &DispatchTable,
    bus: &B,
    start: u32,
    ctx: DecodeContext,
) -> Result<Vec<InstructionRecord>> {
    let records = Disassembler::new(table, bus, start, ctx).collect::<Result<Vec<_>>>()?;
    log::debug!(
        "decoded {} instructions from offset {:06X}",
        records.len(),
        start
    );
    Ok(records)
}

/// One line per record: offset followed by the assembly text.
pub fn listing(records: &[InstructionRecord]) -> String {
    records
        .iter()
        .map(|record| record.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CpuError;
    use crate::memory::{MemoryBin, MemoryContainer};

    fn view_of(program: &[u8]) -> MemoryBin {
        let mem = MemoryContainer::new(0x200).unwrap();
        mem.load(0, program).unwrap();
        MemoryBin::new(&mem, 0, program.len().max(1)).unwrap()
    }

    #[test]
    fn test_decode_all_offsets_and_text() {
        let table = DispatchTable::standard().unwrap();
        // CLC; LDA #$42; STA $7E0010; RTS
        let bus = view_of(&[0x18, 0xA9, 0x42, 0x8F, 0x10, 0x00, 0x7E, 0x60]);

        let records = decode_all(&table, &bus, 0, DecodeContext::default()).unwrap();
        let offsets: Vec<u32> = records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 1, 3, 7]);
        assert_eq!(records[1].text(), "LDA #$42");
        assert_eq!(records[2].text(), "STA $7E0010");
        assert_eq!(
            listing(&records),
            "000000  CLC\n000001  LDA #$42\n000003  STA $7E0010\n000007  RTS"
        );
    }

    #[test]
    fn test_decode_is_repeatable() {
        let table = DispatchTable::standard().unwrap();
        let bus = view_of(&[0xEA, 0xE8, 0xCA]);
        let first = decode_all(&table, &bus, 0, DecodeContext::default()).unwrap();
        let second = decode_all(&table, &bus, 0, DecodeContext::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_truncated_tail_is_out_of_range() {
        let table = DispatchTable::standard().unwrap();
        // NOP; LDA $12 with the operand missing
        let bus = view_of(&[0xEA, 0xAD, 0x12]);
        assert!(matches!(
            decode_all(&table, &bus, 0, DecodeContext::default()),
            Err(CpuError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_invalid_bytes_still_listed() {
        let table = DispatchTable::build(&[(0xEA, Opcode::Nop, crate::addressing::AddressingMode::Implied)])
            .unwrap();
        let bus = view_of(&[0xEA, 0x00]);
        let records = decode_all(&table, &bus, 0, DecodeContext::default()).unwrap();
        assert_eq!(records[1].text(), ".byte $00");
    }

    #[test]
    fn test_follow_width_changes() {
        let table = DispatchTable::standard().unwrap();
        // REP #$20; LDA #$1234; SEP #$20; LDA #$56
        let bus = view_of(&[0xC2, 0x20, 0xA9, 0x34, 0x12, 0xE2, 0x20, 0xA9, 0x56]);

        let records: Vec<_> = Disassembler::new(&table, &bus, 0, DecodeContext::default())
            .follow_width_changes(true)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records[1].text(), "LDA #$1234");
        assert_eq!(records[3].text(), "LDA #$56");
    }

    #[test]
    fn test_rep_keeps_eight_bit_widths_in_emulation_mode() {
        let table = DispatchTable::standard().unwrap();
        // REP #$30; LDA #$34; LDX #$12
        let bus = view_of(&[0xC2, 0x30, 0xA9, 0x34, 0xA2, 0x12]);

        let records: Vec<_> = Disassembler::new(&table, &bus, 0, DecodeContext::default())
            .follow_width_changes(true)
            .emulation_mode(true)
            .collect::<Result<_>>()
            .unwrap();
        let text: Vec<String> = records.iter().map(|r| r.text()).collect();
        assert_eq!(text, vec!["REP #$30", "LDA #$34", "LDX #$12"]);
    }

    #[test]
    fn test_iterator_yields_records_before_truncation() {
        let table = DispatchTable::standard().unwrap();
        // NOP; INX; LDA $12 with the operand missing
        let bus = view_of(&[0xEA, 0xE8, 0xAD, 0x12]);

        let mut records = Disassembler::new(&table, &bus, 0, DecodeContext::default());
        assert_eq!(records.next().unwrap().unwrap().text(), "NOP");
        assert_eq!(records.next().unwrap().unwrap().text(), "INX");
        assert!(matches!(records.next(), Some(Err(CpuError::OutOfRange { .. }))));
        assert!(records.next().is_none());
    }
}
