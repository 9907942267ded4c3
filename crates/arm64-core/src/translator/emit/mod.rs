//! Per-instruction lowering from decoded opcodes to IR.
//!
//! Each decode descriptor carries one [`InstEmitter`]. Emitters append
//! statements to the current block and, for control-flow instructions, set
//! its terminator.

mod alu;
mod branch;
mod memory;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use alu::{
    address, arithmetic, bitfield, conditional, data_processing, logical, move_wide, multiply,
};
pub use branch::branch;
pub use memory::{exclusive, load_store};

use super::ir::{
    BinaryOp, BlockTarget, CallTarget, Local, Statement, Terminator, UnaryOp, Value, Width,
};
use super::sub::TranslatedSub;
use crate::decoder::{ExtendType, InstName, OpCode, Operands, ShiftType};
use crate::fault::{FaultCode, FaultReason};
use crate::state::{RegisterOperand, SystemRegister};

/// Lowers one decoded instruction.
pub type InstEmitter = fn(&mut EmitterContext<'_>, &OpCode);

/// Looks up already translated subroutines by guest address.
pub type SubResolver<'a> = &'a dyn Fn(u64) -> Option<Arc<TranslatedSub>>;

/// Builder state for the block being lowered.
pub struct EmitterContext<'a> {
    blocks: &'a HashMap<u64, usize>,
    resolver: SubResolver<'a>,
    synchronize_backward_branches: bool,
    locals: u32,
    statements: Vec<Statement>,
    terminator: Option<Terminator>,
    sub_calls: HashSet<u64>,
}

impl<'a> EmitterContext<'a> {
    pub(crate) fn new(
        blocks: &'a HashMap<u64, usize>,
        resolver: SubResolver<'a>,
        synchronize_backward_branches: bool,
    ) -> Self {
        Self {
            blocks,
            resolver,
            synchronize_backward_branches,
            locals: 0,
            statements: Vec::new(),
            terminator: None,
            sub_calls: HashSet::new(),
        }
    }

    /// Allocates a fresh temporary.
    pub fn local(&mut self) -> Local {
        let local = Local(self.locals);
        self.locals += 1;
        local
    }

    /// Appends a statement.
    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    /// Evaluates `value` once into a temporary and returns a reference to it.
    pub fn assign(&mut self, value: Value) -> Value {
        let local = self.local();
        self.push(Statement::Assign(local, value));
        Value::Local(local)
    }

    /// Writes `value` to `reg` at `width`.
    pub fn set_register(&mut self, reg: RegisterOperand, width: Width, value: Value) {
        self.push(Statement::SetRegister { reg, width, value });
    }

    /// Ends the block.
    pub fn terminate(&mut self, terminator: Terminator) {
        self.terminator = Some(terminator);
    }

    /// Ends the block with a fault raised at `address`.
    pub fn trap(&mut self, code: FaultCode, address: u64) {
        self.terminate(Terminator::Trap(FaultReason::new(code, address)));
    }

    /// Whether the current block already has a terminator.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }

    /// Target for a branch from the instruction at `from` to `to`.
    #[must_use]
    pub fn target(&self, from: u64, to: u64) -> BlockTarget {
        match self.blocks.get(&to) {
            Some(&index) if self.synchronize_backward_branches && to <= from => {
                BlockTarget::Loop { index, address: to }
            }
            Some(&index) => BlockTarget::Block(index),
            None => BlockTarget::Exit(to),
        }
    }

    /// Callee for a direct call to `address`; records it when it is not
    /// translated yet.
    pub fn call_target(&mut self, address: u64) -> CallTarget {
        if let Some(sub) = (self.resolver)(address) {
            CallTarget::Direct(sub)
        } else {
            self.sub_calls.insert(address);
            CallTarget::Indirect(address)
        }
    }

    pub(crate) fn take_block(&mut self) -> (Vec<Statement>, Option<Terminator>) {
        (
            std::mem::take(&mut self.statements),
            self.terminator.take(),
        )
    }

    pub(crate) fn finish(self) -> (u32, HashSet<u64>) {
        (self.locals, self.sub_calls)
    }
}

fn shifted(value: Value, shift: ShiftType, amount: u8, width: Width) -> Value {
    if amount == 0 {
        return value;
    }
    let op = match shift {
        ShiftType::Lsl => BinaryOp::ShiftLeft,
        ShiftType::Lsr => BinaryOp::ShiftRightLogical,
        ShiftType::Asr => BinaryOp::ShiftRightArithmetic,
        ShiftType::Ror => BinaryOp::RotateRight,
    };
    Value::binary(op, width, value, Value::Const(u64::from(amount)))
}

fn extended(value: Value, extend: ExtendType, shift: u8) -> Value {
    let op = match extend {
        ExtendType::Uxtb => Some(UnaryOp::ZeroExtend8),
        ExtendType::Uxth => Some(UnaryOp::ZeroExtend16),
        ExtendType::Uxtw => Some(UnaryOp::ZeroExtend32),
        ExtendType::Sxtb => Some(UnaryOp::SignExtend8),
        ExtendType::Sxth => Some(UnaryOp::SignExtend16),
        ExtendType::Sxtw => Some(UnaryOp::SignExtend32),
        ExtendType::Uxtx | ExtendType::Sxtx => None,
    };
    let value = match op {
        Some(op) => Value::unary(op, Width::W64, value),
        None => value,
    };
    shifted(value, ShiftType::Lsl, shift, Width::W64)
}

fn carry_flag() -> Value {
    Value::binary(
        BinaryOp::And,
        Width::W64,
        Value::binary(BinaryOp::ShiftRightLogical, Width::W64, Value::Flags, Value::Const(1)),
        Value::Const(1),
    )
}

/// Traps with `UndefinedInstruction`.
pub fn undefined(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    ctx.trap(FaultCode::UndefinedInstruction, op.address);
}

/// `SVC` and `BRK`.
pub fn exception(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    match (op.name, op.operands) {
        (InstName::Svc, Operands::Exception { imm }) => ctx.push(Statement::SupervisorCall {
            imm,
            address: op.address,
        }),
        (InstName::Brk, _) => ctx.trap(FaultCode::GuestBreak, op.address),
        _ => undefined(ctx, op),
    }
}

/// Hints, barriers, `CLREX`, `MRS` and `MSR`.
pub fn system(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    match (op.name, op.operands) {
        (InstName::Nop | InstName::Hint, _) => {}
        (InstName::Dmb | InstName::Dsb | InstName::Isb, _) => ctx.push(Statement::Barrier),
        (InstName::Clrex, _) => ctx.push(Statement::ClearExclusive),
        (InstName::Mrs, Operands::System { rt, key }) => match SystemRegister::from_encoding(key) {
            Some(reg) => ctx.set_register(rt, Width::W64, Value::System(reg)),
            None => undefined(ctx, op),
        },
        (InstName::Msr, Operands::System { rt, key }) => match SystemRegister::from_encoding(key) {
            Some(reg) => ctx.push(Statement::SetSystem {
                reg,
                value: Value::Reg(rt),
            }),
            None => undefined(ctx, op),
        },
        _ => undefined(ctx, op),
    }
}
