//! Error type shared by memory views, the instruction catalog and the interpreter.

use thiserror::Error;

use crate::addressing::AddressingMode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    /// A read or write touched a byte outside `[0, length)` of a memory view.
    #[error("position 0x{position:06X} is outside of a view of 0x{length:X} bytes")]
    OutOfRange { position: u64, length: usize },

    /// A banked view resolved the access into ROM space.
    #[error("access violation at 0x{address:06X} (ROM space is not reachable through a banked view)")]
    AccessViolation { address: u32 },

    /// The addressing mode cannot be used for the requested operation.
    #[error("{what} is not supported for addressing mode {mode:?}")]
    NotSupported {
        mode: AddressingMode,
        what: &'static str,
    },

    /// Usage errors: table collisions, encoder mismatches, double starts, full hook table.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The decoded byte has no instruction mapped to it.
    #[error("unrecognized instruction 0x{opcode:02X}")]
    UnrecognizedInstruction { opcode: u8 },
}

pub type Result<T> = std::result::Result<T, CpuError>;
