//! The standard 65C816 instruction registry and the byte-indexed dispatch table.

use std::collections::HashMap;

use super::{Instruction, InstructionRecord, Opcode};
use crate::addressing::AddressingMode;
use crate::cpu::DecodeContext;
use crate::cpu_bus::CpuBus;
use crate::error::{CpuError, Result};

use crate::addressing::AddressingMode as M;
use super::Opcode as O;

/// One registration: leading byte, operation and addressing mode.
pub type Registration = (u8, Opcode, AddressingMode);

/// Every documented 65C816 encoding, indexed by leading byte.
pub const REGISTRY: &[Registration] = &[
    // $00-$0F
    (0x00, O::Brk, M::Immediate),
    (0x01, O::Ora, M::DirectIndexedIndirect),
    (0x02, O::Cop, M::Immediate),
    (0x03, O::Ora, M::StackRelative),
    (0x04, O::Tsb, M::Direct),
    (0x05, O::Ora, M::Direct),
    (0x06, O::Asl, M::Direct),
    (0x07, O::Ora, M::DirectIndirectLong),
    (0x08, O::Php, M::Implied),
    (0x09, O::Ora, M::Immediate),
    (0x0A, O::Asl, M::Accumulator),
    (0x0B, O::Phd, M::Implied),
    (0x0C, O::Tsb, M::Absolute),
    (0x0D, O::Ora, M::Absolute),
    (0x0E, O::Asl, M::Absolute),
    (0x0F, O::Ora, M::AbsoluteLong),
    // $10-$1F
    (0x10, O::Bpl, M::ProgramCounterRelative),
    (0x11, O::Ora, M::DirectIndirectIndexed),
    (0x12, O::Ora, M::DirectIndirect),
    (0x13, O::Ora, M::StackRelativeIndirectIndexed),
    (0x14, O::Trb, M::Direct),
    (0x15, O::Ora, M::DirectIndexedX),
    (0x16, O::Asl, M::DirectIndexedX),
    (0x17, O::Ora, M::DirectIndirectIndexedLong),
    (0x18, O::Clc, M::Implied),
    (0x19, O::Ora, M::AbsoluteIndexedY),
    (0x1A, O::Inc, M::Accumulator),
    (0x1B, O::Tcs, M::Implied),
    (0x1C, O::Trb, M::Absolute),
    (0x1D, O::Ora, M::AbsoluteIndexedX),
    (0x1E, O::Asl, M::AbsoluteIndexedX),
    (0x1F, O::Ora, M::AbsoluteLongIndexedX),
    // $20-$2F
    (0x20, O::Jsr, M::Absolute),
    (0x21, O::And, M::DirectIndexedIndirect),
    (0x22, O::Jsl, M::AbsoluteLong),
    (0x23, O::And, M::StackRelative),
    (0x24, O::Bit, M::Direct),
    (0x25, O::And, M::Direct),
    (0x26, O::Rol, M::Direct),
    (0x27, O::And, M::DirectIndirectLong),
    (0x28, O::Plp, M::Implied),
    (0x29, O::And, M::Immediate),
    (0x2A, O::Rol, M::Accumulator),
    (0x2B, O::Pld, M::Implied),
    (0x2C, O::Bit, M::Absolute),
    (0x2D, O::And, M::Absolute),
    (0x2E, O::Rol, M::Absolute),
    (0x2F, O::And, M::AbsoluteLong),
    // $30-$3F
    (0x30, O::Bmi, M::ProgramCounterRelative),
    (0x31, O::And, M::DirectIndirectIndexed),
    (0x32, O::And, M::DirectIndirect),
    (0x33, O::And, M::StackRelativeIndirectIndexed),
    (0x34, O::Bit, M::DirectIndexedX),
    (0x35, O::And, M::DirectIndexedX),
    (0x36, O::Rol, M::DirectIndexedX),
    (0x37, O::And, M::DirectIndirectIndexedLong),
    (0x38, O::Sec, M::Implied),
    (0x39, O::And, M::AbsoluteIndexedY),
    (0x3A, O::Dec, M::Accumulator),
    (0x3B, O::Tsc, M::Implied),
    (0x3C, O::Bit, M::AbsoluteIndexedX),
    (0x3D, O::And, M::AbsoluteIndexedX),
    (0x3E, O::Rol, M::AbsoluteIndexedX),
    (0x3F, O::And, M::AbsoluteLongIndexedX),
    // $40-$4F
    (0x40, O::Rti, M::Implied),
    (0x41, O::Eor, M::DirectIndexedIndirect),
    (0x42, O::Wdm, M::Immediate),
    (0x43, O::Eor, M::StackRelative),
    (0x44, O::Mvp, M::BlockMove),
    (0x45, O::Eor, M::Direct),
    (0x46, O::Lsr, M::Direct),
    (0x47, O::Eor, M::DirectIndirectLong),
    (0x48, O::Pha, M::Implied),
    (0x49, O::Eor, M::Immediate),
    (0x4A, O::Lsr, M::Accumulator),
    (0x4B, O::Phk, M::Implied),
    (0x4C, O::Jmp, M::Absolute),
    (0x4D, O::Eor, M::Absolute),
    (0x4E, O::Lsr, M::Absolute),
    (0x4F, O::Eor, M::AbsoluteLong),
    // $50-$5F
    (0x50, O::Bvc, M::ProgramCounterRelative),
    (0x51, O::Eor, M::DirectIndirectIndexed),
    (0x52, O::Eor, M::DirectIndirect),
    (0x53, O::Eor, M::StackRelativeIndirectIndexed),
    (0x54, O::Mvn, M::BlockMove),
    (0x55, O::Eor, M::DirectIndexedX),
    (0x56, O::Lsr, M::DirectIndexedX),
    (0x57, O::Eor, M::DirectIndirectIndexedLong),
    (0x58, O::Cli, M::Implied),
    (0x59, O::Eor, M::AbsoluteIndexedY),
    (0x5A, O::Phy, M::Implied),
    (0x5B, O::Tcd, M::Implied),
    (0x5C, O::Jml, M::AbsoluteLong),
    (0x5D, O::Eor, M::AbsoluteIndexedX),
    (0x5E, O::Lsr, M::AbsoluteIndexedX),
    (0x5F, O::Eor, M::AbsoluteLongIndexedX),
    // $60-$6F
    (0x60, O::Rts, M::Implied),
    (0x61, O::Adc, M::DirectIndexedIndirect),
    (0x62, O::Per, M::ProgramCounterRelativeLong),
    (0x63, O::Adc, M::StackRelative),
    (0x64, O::Stz, M::Direct),
    (0x65, O::Adc, M::Direct),
    (0x66, O::Ror, M::Direct),
    (0x67, O::Adc, M::DirectIndirectLong),
    (0x68, O::Pla, M::Implied),
    (0x69, O::Adc, M::Immediate),
    (0x6A, O::Ror, M::Accumulator),
    (0x6B, O::Rtl, M::Implied),
    (0x6C, O::Jmp, M::AbsoluteIndirect),
    (0x6D, O::Adc, M::Absolute),
    (0x6E, O::Ror, M::Absolute),
    (0x6F, O::Adc, M::AbsoluteLong),
    // $70-$7F
    (0x70, O::Bvs, M::ProgramCounterRelative),
    (0x71, O::Adc, M::DirectIndirectIndexed),
    (0x72, O::Adc, M::DirectIndirect),
    (0x73, O::Adc, M::StackRelativeIndirectIndexed),
    (0x74, O::Stz, M::DirectIndexedX),
    (0x75, O::Adc, M::DirectIndexedX),
    (0x76, O::Ror, M::DirectIndexedX),
    (0x77, O::Adc, M::DirectIndirectIndexedLong),
    (0x78, O::Sei, M::Implied),
    (0x79, O::Adc, M::AbsoluteIndexedY),
    (0x7A, O::Ply, M::Implied),
    (0x7B, O::Tdc, M::Implied),
    (0x7C, O::Jmp, M::AbsoluteIndexedIndirect),
    (0x7D, O::Adc, M::AbsoluteIndexedX),
    (0x7E, O::Ror, M::AbsoluteIndexedX),
    (0x7F, O::Adc, M::AbsoluteLongIndexedX),
    // $80-$8F
    (0x80, O::Bra, M::ProgramCounterRelative),
    (0x81, O::Sta, M::DirectIndexedIndirect),
    (0x82, O::Brl, M::ProgramCounterRelativeLong),
    (0x83, O::Sta, M::StackRelative),
    (0x84, O::Sty, M::Direct),
    (0x85, O::Sta, M::Direct),
    (0x86, O::Stx, M::Direct),
    (0x87, O::Sta, M::DirectIndirectLong),
    (0x88, O::Dey, M::Implied),
    (0x89, O::Bit, M::Immediate),
    (0x8A, O::Txa, M::Implied),
    (0x8B, O::Phb, M::Implied),
    (0x8C, O::Sty, M::Absolute),
    (0x8D, O::Sta, M::Absolute),
    (0x8E, O::Stx, M::Absolute),
    (0x8F, O::Sta, M::AbsoluteLong),
    // $90-$9F
    (0x90, O::Bcc, M::ProgramCounterRelative),
    (0x91, O::Sta, M::DirectIndirectIndexed),
    (0x92, O::Sta, M::DirectIndirect),
    (0x93, O::Sta, M::StackRelativeIndirectIndexed),
    (0x94, O::Sty, M::DirectIndexedX),
    (0x95, O::Sta, M::DirectIndexedX),
    (0x96, O::Stx, M::DirectIndexedY),
    (0x97, O::Sta, M::DirectIndirectIndexedLong),
    (0x98, O::Tya, M::Implied),
    (0x99, O::Sta, M::AbsoluteIndexedY),
    (0x9A, O::Txs, M::Implied),
    (0x9B, O::Txy, M::Implied),
    (0x9C, O::Stz, M::Absolute),
    (0x9D, O::Sta, M::AbsoluteIndexedX),
    (0x9E, O::Stz, M::AbsoluteIndexedX),
    (0x9F, O::Sta, M::AbsoluteLongIndexedX),
    // $A0-$AF
    (0xA0, O::Ldy, M::Immediate),
    (0xA1, O::Lda, M::DirectIndexedIndirect),
    (0xA2, O::Ldx, M::Immediate),
    (0xA3, O::Lda, M::StackRelative),
    (0xA4, O::Ldy, M::Direct),
    (0xA5, O::Lda, M::Direct),
    (0xA6, O::Ldx, M::Direct),
    (0xA7, O::Lda, M::DirectIndirectLong),
    (0xA8, O::Tay, M::Implied),
    (0xA9, O::Lda, M::Immediate),
    (0xAA, O::Tax, M::Implied),
    (0xAB, O::Plb, M::Implied),
    (0xAC, O::Ldy, M::Absolute),
    (0xAD, O::Lda, M::Absolute),
    (0xAE, O::Ldx, M::Absolute),
    (0xAF, O::Lda, M::AbsoluteLong),
    // $B0-$BF
    (0xB0, O::Bcs, M::ProgramCounterRelative),
    (0xB1, O::Lda, M::DirectIndirectIndexed),
    (0xB2, O::Lda, M::DirectIndirect),
    (0xB3, O::Lda, M::StackRelativeIndirectIndexed),
    (0xB4, O::Ldy, M::DirectIndexedX),
    (0xB5, O::Lda, M::DirectIndexedX),
    (0xB6, O::Ldx, M::DirectIndexedY),
    (0xB7, O::Lda, M::DirectIndirectIndexedLong),
    (0xB8, O::Clv, M::Implied),
    (0xB9, O::Lda, M::AbsoluteIndexedY),
    (0xBA, O::Tsx, M::Implied),
    (0xBB, O::Tyx, M::Implied),
    (0xBC, O::Ldy, M::AbsoluteIndexedX),
    (0xBD, O::Lda, M::AbsoluteIndexedX),
    (0xBE, O::Ldx, M::AbsoluteIndexedY),
    (0xBF, O::Lda, M::AbsoluteLongIndexedX),
    // $C0-$CF
    (0xC0, O::Cpy, M::Immediate),
    (0xC1, O::Cmp, M::DirectIndexedIndirect),
    (0xC2, O::Rep, M::Immediate),
    (0xC3, O::Cmp, M::StackRelative),
    (0xC4, O::Cpy, M::Direct),
    (0xC5, O::Cmp, M::Direct),
    (0xC6, O::Dec, M::Direct),
    (0xC7, O::Cmp, M::DirectIndirectLong),
    (0xC8, O::Iny, M::Implied),
    (0xC9, O::Cmp, M::Immediate),
    (0xCA, O::Dex, M::Implied),
    (0xCB, O::Wai, M::Implied),
    (0xCC, O::Cpy, M::Absolute),
    (0xCD, O::Cmp, M::Absolute),
    (0xCE, O::Dec, M::Absolute),
    (0xCF, O::Cmp, M::AbsoluteLong),
    // $D0-$DF
    (0xD0, O::Bne, M::ProgramCounterRelative),
    (0xD1, O::Cmp, M::DirectIndirectIndexed),
    (0xD2, O::Cmp, M::DirectIndirect),
    (0xD3, O::Cmp, M::StackRelativeIndirectIndexed),
    (0xD4, O::Pei, M::DirectIndirect),
    (0xD5, O::Cmp, M::DirectIndexedX),
    (0xD6, O::Dec, M::DirectIndexedX),
    (0xD7, O::Cmp, M::DirectIndirectIndexedLong),
    (0xD8, O::Cld, M::Implied),
    (0xD9, O::Cmp, M::AbsoluteIndexedY),
    (0xDA, O::Phx, M::Implied),
    (0xDB, O::Stp, M::Implied),
    (0xDC, O::Jml, M::AbsoluteIndirectLong),
    (0xDD, O::Cmp, M::AbsoluteIndexedX),
    (0xDE, O::Dec, M::AbsoluteIndexedX),
    (0xDF, O::Cmp, M::AbsoluteLongIndexedX),
    // $E0-$EF
    (0xE0, O::Cpx, M::Immediate),
    (0xE1, O::Sbc, M::DirectIndexedIndirect),
    (0xE2, O::Sep, M::Immediate),
    (0xE3, O::Sbc, M::StackRelative),
    (0xE4, O::Cpx, M::Direct),
    (0xE5, O::Sbc, M::Direct),
    (0xE6, O::Inc, M::Direct),
    (0xE7, O::Sbc, M::DirectIndirectLong),
    (0xE8, O::Inx, M::Implied),
    (0xE9, O::Sbc, M::Immediate),
    (0xEA, O::Nop, M::Implied),
    (0xEB, O::Xba, M::Implied),
    (0xEC, O::Cpx, M::Absolute),
    (0xED, O::Sbc, M::Absolute),
    (0xEE, O::Inc, M::Absolute),
    (0xEF, O::Sbc, M::AbsoluteLong),
    // $F0-$FF
    (0xF0, O::Beq, M::ProgramCounterRelative),
    (0xF1, O::Sbc, M::DirectIndirectIndexed),
    (0xF2, O::Sbc, M::DirectIndirect),
    (0xF3, O::Sbc, M::StackRelativeIndirectIndexed),
    (0xF4, O::Pea, M::Absolute),
    (0xF5, O::Sbc, M::DirectIndexedX),
    (0xF6, O::Inc, M::DirectIndexedX),
    (0xF7, O::Sbc, M::DirectIndirectIndexedLong),
    (0xF8, O::Sed, M::Implied),
    (0xF9, O::Sbc, M::AbsoluteIndexedY),
    (0xFA, O::Plx, M::Implied),
    (0xFB, O::Xce, M::Implied),
    (0xFC, O::Jsr, M::AbsoluteIndexedIndirect),
    (0xFD, O::Sbc, M::AbsoluteIndexedX),
    (0xFE, O::Inc, M::AbsoluteIndexedX),
    (0xFF, O::Sbc, M::AbsoluteLongIndexedX),
];

/// Maps each leading byte to its instruction.
///
/// Bytes without a registration resolve to [`Instruction::invalid`], so lookup
/// never fails. The reverse index serves the encoder.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    entries: Vec<Instruction>,
    encodings: HashMap<(Opcode, AddressingMode), u8>,
}

impl DispatchTable {
    /// Builds a table from `registry`. Two registrations for the same byte are
    /// a construction error.
    pub fn build(registry: &[Registration]) -> Result<Self> {
        let mut entries: Vec<Instruction> = (0..=255u8).map(Instruction::invalid).collect();
        let mut encodings = HashMap::with_capacity(registry.len());

        for &(code, opcode, mode) in registry {
            if opcode == Opcode::Invalid {
                return Err(CpuError::InvalidOperation(format!(
                    "byte ${:02X} cannot be registered as the invalid sentinel",
                    code
                )));
            }
            let slot = &mut entries[code as usize];
            if slot.is_valid() {
                return Err(CpuError::InvalidOperation(format!(
                    "byte ${:02X} registered for both {} and {}",
                    code, slot.opcode, opcode
                )));
            }
            *slot = Instruction::new(code, opcode, mode);
            encodings.entry((opcode, mode)).or_insert(code);
        }

        log::debug!(
            "dispatch table built with {} of 256 bytes mapped",
            registry.len()
        );
        Ok(Self { entries, encodings })
    }

    /// The full 65C816 instruction set.
    pub fn standard() -> Result<Self> {
        Self::build(REGISTRY)
    }

    #[inline]
    pub fn get(&self, code: u8) -> &Instruction {
        &self.entries[code as usize]
    }

    /// Number of bytes with a real instruction behind them.
    pub fn registered(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_valid()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.entries.iter()
    }

    /// Exact `(opcode, mode)` lookup.
    pub fn find(&self, opcode: Opcode, mode: AddressingMode) -> Option<&Instruction> {
        self.encodings
            .get(&(opcode, mode))
            .map(|&code| self.get(code))
    }

    /// Every registered encoding of `opcode`.
    pub fn encodings_of(&self, opcode: Opcode) -> impl Iterator<Item = &Instruction> {
        self.entries
            .iter()
            .filter(move |entry| entry.is_valid() && entry.opcode == opcode)
    }

    /// Decodes the instruction whose leading byte sits at `offset` and moves
    /// `offset` past its operands.
    pub fn decode_at<B: CpuBus>(
        &self,
        bus: &B,
        offset: &mut u32,
        ctx: DecodeContext,
    ) -> Result<InstructionRecord> {
        let start = *offset;
        let instruction = *self.get(bus.read_u8(start)?);
        let mut cursor = start.wrapping_add(1);
        let (operand1, operand2) = instruction.decode(bus, &mut cursor, ctx)?;
        *offset = cursor;

        Ok(InstructionRecord {
            offset: start,
            instruction,
            operand1,
            operand2,
            operand_len: cursor.wrapping_sub(start).wrapping_sub(1) as u8,
        })
    }
}
