//! The instruction catalog.
//!
//! Every instruction is an `(opcode, addressing mode)` pair registered under a
//! fixed leading byte. Decoding, execution and formatting are attached to the
//! pair; the [`DispatchTable`] maps each of the 256 leading bytes to exactly one
//! instruction, with unmapped bytes falling back to an invalid-instruction
//! sentinel.

mod ops;
mod table;

#[cfg(test)]
mod tests;

pub use table::{DispatchTable, Registration, REGISTRY};

use std::fmt;

use crate::addressing::AddressingMode;
use crate::cpu::{Cpu, DecodeContext};
use crate::cpu_bus::CpuBus;
use crate::error::{CpuError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Bra,
    Brk,
    Brl,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cop,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jml,
    Jmp,
    Jsl,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Mvn,
    Mvp,
    Nop,
    Ora,
    Pea,
    Pei,
    Per,
    Pha,
    Phb,
    Phd,
    Phk,
    Php,
    Phx,
    Phy,
    Pla,
    Plb,
    Pld,
    Plp,
    Plx,
    Ply,
    Rep,
    Rol,
    Ror,
    Rti,
    Rtl,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sep,
    Sta,
    Stp,
    Stx,
    Sty,
    Stz,
    Tax,
    Tay,
    Tcd,
    Tcs,
    Tdc,
    Trb,
    Tsb,
    Tsc,
    Tsx,
    Txa,
    Txs,
    Txy,
    Tya,
    Tyx,
    Wai,
    /// Reserved opcode, repurposed as the instrumentation hook.
    Wdm,
    Xba,
    Xce,
    /// Sentinel for leading bytes without a registered instruction.
    Invalid,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Adc => "ADC",
            And => "AND",
            Asl => "ASL",
            Bcc => "BCC",
            Bcs => "BCS",
            Beq => "BEQ",
            Bit => "BIT",
            Bmi => "BMI",
            Bne => "BNE",
            Bpl => "BPL",
            Bra => "BRA",
            Brk => "BRK",
            Brl => "BRL",
            Bvc => "BVC",
            Bvs => "BVS",
            Clc => "CLC",
            Cld => "CLD",
            Cli => "CLI",
            Clv => "CLV",
            Cmp => "CMP",
            Cop => "COP",
            Cpx => "CPX",
            Cpy => "CPY",
            Dec => "DEC",
            Dex => "DEX",
            Dey => "DEY",
            Eor => "EOR",
            Inc => "INC",
            Inx => "INX",
            Iny => "INY",
            Jml => "JML",
            Jmp => "JMP",
            Jsl => "JSL",
            Jsr => "JSR",
            Lda => "LDA",
            Ldx => "LDX",
            Ldy => "LDY",
            Lsr => "LSR",
            Mvn => "MVN",
            Mvp => "MVP",
            Nop => "NOP",
            Ora => "ORA",
            Pea => "PEA",
            Pei => "PEI",
            Per => "PER",
            Pha => "PHA",
            Phb => "PHB",
            Phd => "PHD",
            Phk => "PHK",
            Php => "PHP",
            Phx => "PHX",
            Phy => "PHY",
            Pla => "PLA",
            Plb => "PLB",
            Pld => "PLD",
            Plp => "PLP",
            Plx => "PLX",
            Ply => "PLY",
            Rep => "REP",
            Rol => "ROL",
            Ror => "ROR",
            Rti => "RTI",
            Rtl => "RTL",
            Rts => "RTS",
            Sbc => "SBC",
            Sec => "SEC",
            Sed => "SED",
            Sei => "SEI",
            Sep => "SEP",
            Sta => "STA",
            Stp => "STP",
            Stx => "STX",
            Sty => "STY",
            Stz => "STZ",
            Tax => "TAX",
            Tay => "TAY",
            Tcd => "TCD",
            Tcs => "TCS",
            Tdc => "TDC",
            Trb => "TRB",
            Tsb => "TSB",
            Tsc => "TSC",
            Tsx => "TSX",
            Txa => "TXA",
            Txs => "TXS",
            Txy => "TXY",
            Tya => "TYA",
            Tyx => "TYX",
            Wai => "WAI",
            Wdm => "WDM",
            Xba => "XBA",
            Xce => "XCE",
            Invalid => "???",
        }
    }

    /// Width of an immediate operand, if the opcode takes one.
    pub fn immediate_len(self, ctx: DecodeContext) -> Option<usize> {
        use Opcode::*;
        let width = |eight_bit: bool| if eight_bit { 1 } else { 2 };
        match self {
            Adc | And | Bit | Cmp | Eor | Lda | Ora | Sbc => Some(width(ctx.m)),
            Cpx | Cpy | Ldx | Ldy => Some(width(ctx.x)),
            Brk | Cop | Rep | Sep | Wdm => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    /// Leading byte this instruction is registered under.
    pub code: u8,
    pub opcode: Opcode,
    pub mode: AddressingMode,
}

impl Instruction {
    pub const fn new(code: u8, opcode: Opcode, mode: AddressingMode) -> Self {
        Self { code, opcode, mode }
    }

    /// Sentinel carrying the raw byte for diagnostics.
    pub const fn invalid(code: u8) -> Self {
        Self {
            code,
            opcode: Opcode::Invalid,
            mode: AddressingMode::Implied,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.opcode != Opcode::Invalid
    }

    pub fn has_operands(&self) -> bool {
        self.is_valid() && self.mode.has_operands()
    }

    /// Operand bytes following the leading byte under `ctx`.
    pub fn operand_len(&self, ctx: DecodeContext) -> Result<usize> {
        if !self.is_valid() {
            return Ok(0);
        }
        match self.mode.fixed_operand_len() {
            Some(len) => Ok(len),
            None => self.opcode.immediate_len(ctx).ok_or(CpuError::NotSupported {
                mode: self.mode,
                what: "decoding an immediate operand",
            }),
        }
    }

    /// Reads the operands that follow the leading byte and advances `offset`
    /// past them. Block moves yield `(source bank, destination bank)`.
    pub fn decode<B: CpuBus>(
        &self,
        bus: &B,
        offset: &mut u32,
        ctx: DecodeContext,
    ) -> Result<(u32, u32)> {
        let len = self.operand_len(ctx)?;
        let operands = match (self.mode, len) {
            (_, 0) => (0, 0),
            (AddressingMode::BlockMove, _) => {
                bus.check_range(*offset, 2)?;
                let destination = bus.read_u8(*offset)? as u32;
                let source = bus.read_u8(offset.wrapping_add(1))? as u32;
                (source, destination)
            }
            (_, 1) => (bus.read_u8(*offset)? as u32, 0),
            (_, 2) => (bus.read_u16(*offset)? as u32, 0),
            _ => (bus.read_u24(*offset)?, 0),
        };
        *offset = offset.wrapping_add(len as u32);
        Ok(operands)
    }

    /// Applies the instruction to the processor and memory.
    pub fn execute<B: CpuBus>(
        &self,
        operand1: u32,
        operand2: u32,
        cpu: &mut Cpu,
        bus: &mut B,
    ) -> Result<()> {
        ops::execute(self, operand1, operand2, cpu, bus)
    }

    /// Assembly-style text. `operand_len` is the decoded operand width.
    pub fn format(&self, operand1: u32, operand2: u32, operand_len: usize) -> String {
        use AddressingMode::*;

        if !self.is_valid() {
            return format!(".byte ${:02X}", self.code);
        }

        let value = hex(operand1, operand_len);
        let operand = match self.mode {
            Implied => String::new(),
            Accumulator => "A".to_string(),
            Immediate => format!("#{}", value),
            Direct | Absolute | AbsoluteLong | ProgramCounterRelative
            | ProgramCounterRelativeLong => value,
            DirectIndexedX | AbsoluteIndexedX | AbsoluteLongIndexedX => format!("{}, x", value),
            DirectIndexedY | AbsoluteIndexedY => format!("{}, y", value),
            DirectIndirect | AbsoluteIndirect => format!("({})", value),
            DirectIndexedIndirect | AbsoluteIndexedIndirect => format!("({}, x)", value),
            DirectIndirectIndexed => format!("({}), y", value),
            DirectIndirectLong | AbsoluteIndirectLong => format!("[{}]", value),
            DirectIndirectIndexedLong => format!("[{}], y", value),
            StackRelative => format!("{}, s", value),
            StackRelativeIndirectIndexed => format!("({}, s), y", value),
            BlockMove => format!("{}, {}", hex(operand1, 1), hex(operand2, 1)),
        };

        if operand.is_empty() {
            self.opcode.mnemonic().to_string()
        } else {
            format!("{} {}", self.opcode.mnemonic(), operand)
        }
    }
}

fn hex(value: u32, len: usize) -> String {
    match len {
        0 | 1 => format!("${:02X}", value & 0xFF),
        2 => format!("${:04X}", value & 0xFFFF),
        _ => format!("${:06X}", value & 0xFF_FFFF),
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionRecord {
    /// Position of the leading byte within the decoded view.
    pub offset: u32,
    pub instruction: Instruction,
    pub operand1: u32,
    pub operand2: u32,
    /// Operand bytes consumed by the decode step.
    pub operand_len: u8,
}

impl InstructionRecord {
    /// Total encoded size including the leading byte.
    pub fn len(&self) -> usize {
        1 + self.operand_len as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn text(&self) -> String {
        self.instruction
            .format(self.operand1, self.operand2, self.operand_len as usize)
    }
}

impl fmt::Display for InstructionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}  {}", self.offset, self.text())
    }
}
