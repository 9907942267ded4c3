//! Intermediate representation produced from decoded blocks and consumed by
//! code-generation backends.
//!
//! Values are side-effect free expression trees evaluated against the
//! register file and the locals of one subroutine invocation. Statements
//! perform register, flag, memory and host-service effects in order. Every
//! block ends with exactly one [`Terminator`].

use std::fmt;
use std::sync::Arc;

use super::sub::TranslatedSub;
use crate::fault::FaultReason;
use crate::state::{Condition, RegisterOperand, SystemRegister};

/// Operation width. 32-bit operations read the low halves of their inputs
/// and zero-extend their result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    /// 32-bit.
    W32,
    /// 64-bit.
    W64,
}

impl Width {
    /// `W64` when `sf` is set.
    #[must_use]
    pub const fn from_sf(sf: bool) -> Self {
        if sf {
            Self::W64
        } else {
            Self::W32
        }
    }

    /// Number of bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }

    /// All-ones mask of the width.
    #[must_use]
    pub const fn mask(self) -> u64 {
        match self {
            Self::W32 => 0xFFFF_FFFF,
            Self::W64 => u64::MAX,
        }
    }
}

/// A subroutine-local temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Local(pub u32);

/// Single-operand operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum UnaryOp {
    Not,
    Neg,
    CountLeadingZeros,
    CountLeadingSigns,
    ReverseBits,
    /// Byte swap within each 16-bit half-word.
    Rev16,
    /// Byte swap within each 32-bit word.
    Rev32,
    /// Byte swap of the whole operand.
    Rev64,
    SignExtend8,
    SignExtend16,
    SignExtend32,
    ZeroExtend8,
    ZeroExtend16,
    ZeroExtend32,
    /// 1 when the operand is zero, else 0.
    IsZero,
    /// NZCV nibble with N and Z taken from the operand and C, V clear.
    LogicalFlags,
}

/// Two-operand operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    /// Shifts take the amount modulo the width.
    ShiftLeft,
    ShiftRightLogical,
    ShiftRightArithmetic,
    RotateRight,
    Multiply,
    /// High 64 bits of the unsigned 128-bit product.
    MultiplyHighUnsigned,
    /// High 64 bits of the signed 128-bit product.
    MultiplyHighSigned,
    /// Division by zero yields zero.
    DivideUnsigned,
    /// Division by zero yields zero; overflow wraps.
    DivideSigned,
    /// 1 when equal, else 0.
    Equal,
}

/// Side-effect free expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Constant.
    Const(u64),
    /// Temporary.
    Local(Local),
    /// Register read; `Zr` reads zero.
    Reg(RegisterOperand),
    /// Current NZCV as a nibble (`N` in bit 3).
    Flags,
    /// 1 when the condition holds on the current flags, else 0.
    Condition(Condition),
    /// System register read.
    System(SystemRegister),
    /// Unary operation at a width.
    Unary(UnaryOp, Width, Box<Value>),
    /// Binary operation at a width.
    Binary(BinaryOp, Width, Box<Value>, Box<Value>),
    /// `if condition != 0 { taken } else { not_taken }`.
    Select(Box<Value>, Box<Value>, Box<Value>),
}

impl Value {
    /// Unary operation.
    #[must_use]
    pub fn unary(op: UnaryOp, width: Width, value: Self) -> Self {
        Self::Unary(op, width, Box::new(value))
    }

    /// Binary operation.
    #[must_use]
    pub fn binary(op: BinaryOp, width: Width, lhs: Self, rhs: Self) -> Self {
        Self::Binary(op, width, Box::new(lhs), Box::new(rhs))
    }

    /// Selection on a non-zero condition value.
    #[must_use]
    pub fn select(condition: Self, taken: Self, not_taken: Self) -> Self {
        Self::Select(Box::new(condition), Box::new(taken), Box::new(not_taken))
    }
}

/// Effectful operation executed in block order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Stores a value into a temporary.
    Assign(Local, Value),
    /// Writes a register, zero-extending 32-bit results.
    SetRegister {
        /// Destination; writes to `Zr` are dropped.
        reg: RegisterOperand,
        /// Result width.
        width: Width,
        /// Written value.
        value: Value,
    },
    /// Replaces NZCV with a nibble value.
    SetFlags(Value),
    /// `lhs + rhs + carry` at `width`, writing the sum and optionally the
    /// resulting NZCV nibble into temporaries.
    AddWithCarry {
        /// Sum.
        result: Local,
        /// NZCV of the addition.
        flags: Option<Local>,
        /// Operation width.
        width: Width,
        /// First addend.
        lhs: Value,
        /// Second addend.
        rhs: Value,
        /// Carry in, 0 or 1.
        carry: Value,
    },
    /// Writes a system register.
    SetSystem {
        /// Destination.
        reg: SystemRegister,
        /// Written value.
        value: Value,
    },
    /// Zero-extending load of `1 << size` bytes.
    Load {
        /// Destination.
        dst: Local,
        /// Access size as log2 bytes.
        size: u8,
        /// Guest address.
        address: Value,
    },
    /// Store of the low `1 << size` bytes.
    Store {
        /// Access size as log2 bytes.
        size: u8,
        /// Guest address.
        address: Value,
        /// Stored value.
        value: Value,
    },
    /// Load that also arms the exclusive monitor.
    LoadExclusive {
        /// Destination.
        dst: Local,
        /// Access size as log2 bytes.
        size: u8,
        /// Guest address.
        address: Value,
    },
    /// Store that succeeds only while the monitor still holds; writes 0 to
    /// `status` on success and 1 on failure.
    StoreExclusive {
        /// Success flag.
        status: Local,
        /// Access size as log2 bytes.
        size: u8,
        /// Guest address.
        address: Value,
        /// Stored value.
        value: Value,
    },
    /// Disarms the exclusive monitor.
    ClearExclusive,
    /// Full memory barrier.
    Barrier,
    /// Host service request.
    SupervisorCall {
        /// `SVC` immediate.
        imm: u16,
        /// Address of the `SVC` instruction.
        address: u64,
    },
}

/// Where a branch continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockTarget {
    /// Block of the same subroutine.
    Block(usize),
    /// Backward branch within the subroutine; leaves to the dispatcher with
    /// `address` when a stop has been requested.
    Loop {
        /// Target block.
        index: usize,
        /// Guest address of the target block.
        address: u64,
    },
    /// Leaves the subroutine, returning `address` to the dispatcher.
    Exit(u64),
}

/// Callee of a direct call.
#[derive(Clone)]
pub enum CallTarget {
    /// Already translated; invoked without a cache lookup.
    Direct(Arc<TranslatedSub>),
    /// Resolved through the dispatcher when executed.
    Indirect(u64),
}

impl fmt::Debug for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(sub) => write!(f, "Direct({:#x})", sub.address()),
            Self::Indirect(address) => write!(f, "Indirect({address:#x})"),
        }
    }
}

impl CallTarget {
    /// Guest address of the callee.
    #[must_use]
    pub fn address(&self) -> u64 {
        match self {
            Self::Direct(sub) => sub.address(),
            Self::Indirect(address) => *address,
        }
    }
}

/// How a block hands off control.
#[derive(Debug, Clone)]
pub enum Terminator {
    /// Unconditional transfer.
    Jump(BlockTarget),
    /// Two-way transfer on a non-zero condition value.
    Branch {
        /// Condition value.
        condition: Value,
        /// Target when non-zero.
        taken: BlockTarget,
        /// Target when zero.
        not_taken: BlockTarget,
    },
    /// Calls a subroutine and continues at `next` if it returns to
    /// `return_address`; any other returned address leaves the subroutine.
    Call {
        /// Callee.
        target: CallTarget,
        /// Expected return address.
        return_address: u64,
        /// Continuation.
        next: BlockTarget,
    },
    /// [`Self::Call`] through a register value.
    CallIndirect {
        /// Callee address.
        target: Value,
        /// Expected return address.
        return_address: u64,
        /// Continuation.
        next: BlockTarget,
    },
    /// Leaves the subroutine with a computed next address.
    Return(Value),
    /// Leaves the subroutine with a fault.
    Trap(FaultReason),
}

/// A block of straight-line statements.
#[derive(Debug, Clone)]
pub struct IrBlock {
    /// Guest address of the block.
    pub address: u64,
    /// Statements in execution order.
    pub statements: Vec<Statement>,
    /// Control transfer at the end of the block.
    pub terminator: Terminator,
}

/// A translated subroutine before code generation.
#[derive(Debug, Clone)]
pub struct IrFunction {
    /// Guest entry address.
    pub address: u64,
    /// Index of the entry block.
    pub entry: usize,
    /// Blocks in guest address order.
    pub blocks: Vec<IrBlock>,
    /// Number of temporaries used.
    pub locals: u32,
}

impl IrFunction {
    /// Total statement count, for statistics.
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.blocks.iter().map(|block| block.statements.len()).sum()
    }
}
