//! Instruction decode pipeline: bit-pattern table, operand extraction and
//! block-graph construction.

/// A64 integer instruction patterns.
pub mod a64;
/// Basic-block graph construction.
pub mod block;
/// Mnemonics, operand layouts and decoded instructions.
pub mod opcode;
/// Bit-pattern decode table.
pub mod table;

pub use a64::A64_PATTERNS;
pub use block::{decode_function, Block};
pub use opcode::{
    decode_bit_mask, CompareOperand, ControlFlow, ExtendType, IndexMode, InstName, MemOffset,
    OpCode, OperandLayout, Operands, ShiftType,
};
pub use table::{DecodeTable, DecodeTableBuilder, InstDescriptor, PatternError};
