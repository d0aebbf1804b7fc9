//! Instruction writer used to synthesize programs for tests and diagnostics.

use crate::addressing::AddressingMode;
use crate::cpu::{Cpu, DecodeContext, HookFn};
use crate::cpu_bus::CpuBus;
use crate::error::{CpuError, Result};
use crate::instructions::{DispatchTable, Instruction, Opcode};

/// Width of the operand bytes that follow the leading byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandWidth {
    None,
    Byte,
    Word,
    Long,
}

impl OperandWidth {
    pub fn len(self) -> usize {
        match self {
            OperandWidth::None => 0,
            OperandWidth::Byte => 1,
            OperandWidth::Word => 2,
            OperandWidth::Long => 3,
        }
    }

    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            0 => Some(OperandWidth::None),
            1 => Some(OperandWidth::Byte),
            2 => Some(OperandWidth::Word),
            3 => Some(OperandWidth::Long),
            _ => None,
        }
    }
}

/// Finds the encoding for `opcode` under `mode`. An opcode with a single
/// encoding matches regardless of `mode`.
pub fn lookup(table: &DispatchTable, opcode: Opcode, mode: AddressingMode) -> Result<Instruction> {
    if let Some(instruction) = table.find(opcode, mode) {
        return Ok(*instruction);
    }

    let mut encodings = table.encodings_of(opcode);
    match (encodings.next(), encodings.next()) {
        (Some(only), None) => Ok(*only),
        (None, _) => Err(CpuError::InvalidOperation(format!(
            "no instruction registered for {}",
            opcode
        ))),
        (Some(_), Some(_)) => Err(CpuError::InvalidOperation(format!(
            "{} has no {:?} encoding",
            opcode, mode
        ))),
    }
}

/// An immediate fits when some M/X setting decodes it at `width`; REP, SEP,
/// BRK, COP and WDM only ever take one byte.
fn immediate_fits(opcode: Opcode, width: OperandWidth) -> bool {
    [DecodeContext::new(true, true), DecodeContext::new(false, false)]
        .into_iter()
        .any(|ctx| opcode.immediate_len(ctx) == Some(width.len()))
}

/// Writes one instruction at `offset` and advances it past the bytes written.
///
/// Block moves always emit the destination bank (`operand2`) then the source
/// bank (`operand1`), mirroring what the decoder reads back.
#[allow(clippy::too_many_arguments)]
pub fn write_instruction<B: CpuBus>(
    table: &DispatchTable,
    bus: &mut B,
    offset: &mut u32,
    opcode: Opcode,
    mode: AddressingMode,
    width: OperandWidth,
    operand1: u32,
    operand2: u32,
) -> Result<()> {
    let instruction = lookup(table, opcode, mode)?;

    let fits = match instruction.mode.fixed_operand_len() {
        Some(len) => instruction.mode == AddressingMode::BlockMove || len == width.len(),
        None => immediate_fits(instruction.opcode, width),
    };
    if !fits {
        return Err(CpuError::InvalidOperation(format!(
            "{:?} operand does not fit {} {:?}",
            width, instruction.opcode, instruction.mode
        )));
    }
    let operand_len = instruction
        .mode
        .fixed_operand_len()
        .unwrap_or_else(|| width.len());

    let start = *offset;
    bus.check_range(start, 1 + operand_len)?;
    bus.write_u8(start, instruction.code)?;
    let at = start.wrapping_add(1);
    match (instruction.mode, operand_len) {
        (_, 0) => {}
        (AddressingMode::BlockMove, _) => {
            bus.write_u8(at, operand2 as u8)?;
            bus.write_u8(at.wrapping_add(1), operand1 as u8)?;
        }
        (_, 1) => bus.write_u8(at, operand1 as u8)?,
        (_, 2) => bus.write_u16(at, operand1 as u16)?,
        _ => bus.write_u24(at, operand1 & 0xFF_FFFF)?,
    }

    *offset = start.wrapping_add(1 + operand_len as u32);
    Ok(())
}

/// Registers `hook` in the processor's first free slot and emits `WDM #slot+1`
/// referencing it. Returns the zero-based slot index.
pub fn write_hook<B: CpuBus>(
    table: &DispatchTable,
    bus: &mut B,
    offset: &mut u32,
    cpu: &mut Cpu,
    hook: HookFn,
) -> Result<usize> {
    let index = cpu.hooks_mut().register(hook)?;
    let written = write_instruction(
        table,
        bus,
        offset,
        Opcode::Wdm,
        AddressingMode::Immediate,
        OperandWidth::Byte,
        index as u32 + 1,
        0,
    );
    if let Err(err) = written {
        cpu.hooks_mut().remove(index);
        return Err(err);
    }
    Ok(index)
}

/// Small program builder over [`write_instruction`] for tests and tools.
pub struct Assembler<'a, B: CpuBus> {
    table: &'a DispatchTable,
    bus: &'a mut B,
    offset: u32,
}

impl<'a, B: CpuBus> Assembler<'a, B> {
    pub fn new(table: &'a DispatchTable, bus: &'a mut B, start: u32) -> Self {
        Self {
            table,
            bus,
            offset: start,
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn implied(&mut self, opcode: Opcode) -> Result<&mut Self> {
        self.emit(opcode, AddressingMode::Implied, OperandWidth::None, 0, 0)
    }

    pub fn imm8(&mut self, opcode: Opcode, value: u8) -> Result<&mut Self> {
        self.emit(opcode, AddressingMode::Immediate, OperandWidth::Byte, value as u32, 0)
    }

    pub fn imm16(&mut self, opcode: Opcode, value: u16) -> Result<&mut Self> {
        self.emit(opcode, AddressingMode::Immediate, OperandWidth::Word, value as u32, 0)
    }

    /// Any other mode; the width comes from the mode itself.
    pub fn op(&mut self, opcode: Opcode, mode: AddressingMode, operand: u32) -> Result<&mut Self> {
        let width = mode
            .fixed_operand_len()
            .and_then(OperandWidth::from_len)
            .ok_or(CpuError::NotSupported {
                mode,
                what: "encoding without an explicit width",
            })?;
        self.emit(opcode, mode, width, operand, 0)
    }

    pub fn block_move(&mut self, opcode: Opcode, source: u8, destination: u8) -> Result<&mut Self> {
        self.emit(
            opcode,
            AddressingMode::BlockMove,
            OperandWidth::Word,
            source as u32,
            destination as u32,
        )
    }

    pub fn hook(&mut self, cpu: &mut Cpu, hook: HookFn) -> Result<usize> {
        write_hook(self.table, self.bus, &mut self.offset, cpu, hook)
    }

    fn emit(
        &mut self,
        opcode: Opcode,
        mode: AddressingMode,
        width: OperandWidth,
        operand1: u32,
        operand2: u32,
    ) -> Result<&mut Self> {
        write_instruction(
            self.table,
            self.bus,
            &mut self.offset,
            opcode,
            mode,
            width,
            operand1,
            operand2,
        )?;
        Ok(self)
    }
}
