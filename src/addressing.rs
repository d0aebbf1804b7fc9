//! Addressing modes and effective-address resolution.
//!
//! Resolution takes an operand that has already been decoded at the right width
//! and turns it into a 24-bit address, or for immediate operands into the value
//! itself. Direct-page and stack addresses stay in bank 0.

use crate::cpu::{full_address, CpuState};
use crate::cpu_bus::CpuBus;
use crate::error::{CpuError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// No operand. Examples: CLC, PHA, RTS.
    Implied,
    /// Operates on the accumulator. Example: ASL A.
    Accumulator,
    /// Constant operand; width comes from M, X or the instruction itself.
    Immediate,
    /// `$12`
    Direct,
    /// `$12, x`
    DirectIndexedX,
    /// `$12, y`
    DirectIndexedY,
    /// `($12)`
    DirectIndirect,
    /// `($12, x)`
    DirectIndexedIndirect,
    /// `($12), y`
    DirectIndirectIndexed,
    /// `[$12]`
    DirectIndirectLong,
    /// `[$12], y`
    DirectIndirectIndexedLong,
    /// `$1234`
    Absolute,
    /// `$1234, x`
    AbsoluteIndexedX,
    /// `$1234, y`
    AbsoluteIndexedY,
    /// `$123456`
    AbsoluteLong,
    /// `$123456, x`
    AbsoluteLongIndexedX,
    /// `($1234)`, JMP only.
    AbsoluteIndirect,
    /// `($1234, x)`, JMP/JSR only.
    AbsoluteIndexedIndirect,
    /// `[$1234]`, JML only.
    AbsoluteIndirectLong,
    /// `$12, s`
    StackRelative,
    /// `($12, s), y`
    StackRelativeIndirectIndexed,
    /// Signed 8-bit branch displacement.
    ProgramCounterRelative,
    /// Signed 16-bit displacement (BRL, PER).
    ProgramCounterRelativeLong,
    /// Source and destination banks of MVN/MVP.
    BlockMove,
}

impl AddressingMode {
    /// Operand bytes for every mode except `Immediate`, whose width depends on
    /// the instruction and the decode context.
    pub fn fixed_operand_len(self) -> Option<usize> {
        use AddressingMode::*;
        match self {
            Implied | Accumulator => Some(0),
            Immediate => None,
            Direct
            | DirectIndexedX
            | DirectIndexedY
            | DirectIndirect
            | DirectIndexedIndirect
            | DirectIndirectIndexed
            | DirectIndirectLong
            | DirectIndirectIndexedLong
            | StackRelative
            | StackRelativeIndirectIndexed
            | ProgramCounterRelative => Some(1),
            Absolute
            | AbsoluteIndexedX
            | AbsoluteIndexedY
            | AbsoluteIndirect
            | AbsoluteIndexedIndirect
            | AbsoluteIndirectLong
            | ProgramCounterRelativeLong
            | BlockMove => Some(2),
            AbsoluteLong | AbsoluteLongIndexedX => Some(3),
        }
    }

    pub fn has_operands(self) -> bool {
        self.fixed_operand_len() != Some(0)
    }
}

/// A resolved operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Address(u32),
    Value(u32),
}

/// Resolves `operand` to an address, or hands back the value for immediates.
pub fn resolve<B: CpuBus>(
    mode: AddressingMode,
    operand: u32,
    state: &CpuState,
    bus: &B,
) -> Result<Operand> {
    match mode {
        AddressingMode::Immediate => Ok(Operand::Value(operand)),
        _ => effective_address(mode, operand, state, bus).map(Operand::Address),
    }
}

/// Direct page: the operand alone in emulation mode, `operand + D` otherwise.
#[inline]
pub fn direct(state: &CpuState, operand: u32) -> u32 {
    if state.emulation_mode {
        operand & 0xFFFF
    } else {
        (operand + state.dp as u32) & 0xFFFF
    }
}

/// Data-bank relative: the operand alone in emulation mode, `operand | DBR << 16` otherwise.
#[inline]
pub fn absolute(state: &CpuState, operand: u32) -> u32 {
    if state.emulation_mode {
        operand & 0xFFFF
    } else {
        full_address(state.db, operand as u16)
    }
}

#[inline]
fn long(address: u32) -> u32 {
    address & 0xFF_FFFF
}

pub fn effective_address<B: CpuBus>(
    mode: AddressingMode,
    operand: u32,
    state: &CpuState,
    bus: &B,
) -> Result<u32> {
    use AddressingMode::*;

    let x = state.x_index() as u32;
    let y = state.y_index() as u32;

    let address = match mode {
        Direct => direct(state, operand),
        DirectIndexedX => (direct(state, operand) + x) & 0xFFFF,
        DirectIndexedY => (direct(state, operand) + y) & 0xFFFF,
        DirectIndirect => {
            let pointer = bus.read_u16(direct(state, operand))?;
            absolute(state, pointer as u32)
        }
        DirectIndexedIndirect => {
            let pointer = bus.read_u16((direct(state, operand) + x) & 0xFFFF)?;
            absolute(state, pointer as u32)
        }
        DirectIndirectIndexed => {
            let pointer = bus.read_u16(direct(state, operand))?;
            long(absolute(state, pointer as u32) + y)
        }
        DirectIndirectLong => bus.read_u24(direct(state, operand))?,
        DirectIndirectIndexedLong => long(bus.read_u24(direct(state, operand))? + y),
        Absolute => absolute(state, operand),
        AbsoluteIndexedX => long(absolute(state, operand) + x),
        AbsoluteIndexedY => long(absolute(state, operand) + y),
        AbsoluteLong => long(operand),
        AbsoluteLongIndexedX => long(operand + x),
        AbsoluteIndirect => {
            let target = bus.read_u16(operand & 0xFFFF)?;
            full_address(state.pb, target)
        }
        AbsoluteIndexedIndirect => {
            let pointer = full_address(state.pb, (operand + x) as u16);
            full_address(state.pb, bus.read_u16(pointer)?)
        }
        AbsoluteIndirectLong => bus.read_u24(operand & 0xFFFF)?,
        StackRelative => (state.sp as u32 + operand) & 0xFFFF,
        StackRelativeIndirectIndexed => {
            let pointer = bus.read_u16((state.sp as u32 + operand) & 0xFFFF)?;
            long(absolute(state, pointer as u32) + y)
        }
        ProgramCounterRelative => {
            let target = state.pc.wrapping_add(operand as u8 as i8 as u16);
            full_address(state.pb, target)
        }
        ProgramCounterRelativeLong => {
            full_address(state.pb, state.pc.wrapping_add(operand as u16))
        }
        Implied | Accumulator | Immediate | BlockMove => {
            return Err(CpuError::NotSupported {
                mode,
                what: "effective address resolution",
            })
        }
    };
    Ok(address)
}
