//! 65C816 processor core: memory views, addressing, the instruction catalog,
//! a disassembler, an instruction writer and an interpreter loop.

pub mod addressing;
pub mod cpu;
pub mod cpu_bus;
pub mod debug_flags;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod instructions;
pub mod interpreter;
pub mod memory;
pub mod trace;

pub use addressing::AddressingMode;
pub use cpu::{Cpu, CpuState, DecodeContext, StatusFlags};
pub use cpu_bus::CpuBus;
pub use decoder::{decode_all, Disassembler};
pub use encoder::{write_hook, write_instruction, Assembler, OperandWidth};
pub use error::{CpuError, Result};
pub use instructions::{DispatchTable, Instruction, InstructionRecord, Opcode};
pub use interpreter::{
    CancelToken, ErrorPolicy, Interpreter, InterpreterConfig, RunState, StopReason,
};
pub use memory::{BankedMemoryBin, MemoryBin, MemoryContainer};
pub use trace::{RegisterSnapshot, TraceBuffer, TraceEntry};
