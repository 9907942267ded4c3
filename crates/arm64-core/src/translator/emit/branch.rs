use super::{undefined, EmitterContext};
use crate::decoder::{InstName, OpCode, Operands};
use crate::state::{GeneralRegister, RegisterOperand};
use crate::translator::ir::{BinaryOp, Terminator, UnaryOp, Value, Width};

const LINK: RegisterOperand = RegisterOperand::Gpr(GeneralRegister::LR);

/// Every branch, call and return.
pub fn branch(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    let next = op.next_address();
    match (op.name, op.operands) {
        (InstName::B, Operands::Branch { target }) => {
            let target = ctx.target(op.address, target);
            ctx.terminate(Terminator::Jump(target));
        }
        (InstName::Bl, Operands::Branch { target }) => {
            ctx.set_register(LINK, Width::W64, Value::Const(next));
            let callee = ctx.call_target(target);
            let continuation = ctx.target(op.address, next);
            ctx.terminate(Terminator::Call {
                target: callee,
                return_address: next,
                next: continuation,
            });
        }
        (InstName::BCond, Operands::BranchCond { target, cond }) => {
            conditional(ctx, op, Value::Condition(cond), target, false);
        }
        (InstName::Cbz | InstName::Cbnz, Operands::BranchCompare { sf, rt, target }) => {
            let zero = Value::unary(UnaryOp::IsZero, Width::from_sf(sf), Value::Reg(rt));
            conditional(ctx, op, zero, target, op.name == InstName::Cbnz);
        }
        (InstName::Tbz | InstName::Tbnz, Operands::BranchTest { rt, bit, target }) => {
            let set = Value::binary(
                BinaryOp::And,
                Width::W64,
                Value::binary(
                    BinaryOp::ShiftRightLogical,
                    Width::W64,
                    Value::Reg(rt),
                    Value::Const(u64::from(bit)),
                ),
                Value::Const(1),
            );
            conditional(ctx, op, set, target, op.name == InstName::Tbz);
        }
        (InstName::Blr, Operands::BranchReg { rn }) => {
            let callee = ctx.assign(Value::Reg(rn));
            ctx.set_register(LINK, Width::W64, Value::Const(next));
            let continuation = ctx.target(op.address, next);
            ctx.terminate(Terminator::CallIndirect {
                target: callee,
                return_address: next,
                next: continuation,
            });
        }
        (InstName::Br | InstName::Ret, Operands::BranchReg { rn }) => {
            ctx.terminate(Terminator::Return(Value::Reg(rn)));
        }
        _ => undefined(ctx, op),
    }
}

fn conditional(
    ctx: &mut EmitterContext<'_>,
    op: &OpCode,
    condition: Value,
    target: u64,
    inverted: bool,
) {
    let taken = ctx.target(op.address, target);
    let fallthrough = ctx.target(op.address, op.next_address());
    let (taken, not_taken) = if inverted {
        (fallthrough, taken)
    } else {
        (taken, fallthrough)
    };
    ctx.terminate(Terminator::Branch {
        condition,
        taken,
        not_taken,
    });
}
