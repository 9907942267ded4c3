use super::{carry_flag, extended, shifted, undefined, EmitterContext};
use crate::decoder::{CompareOperand, InstName, OpCode, Operands};
use crate::translator::ir::{BinaryOp, Statement, UnaryOp, Value, Width};

const fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Add and subtract, with or without carry and flags.
pub fn arithmetic(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    let (sf, rd, rn, rhs) = match op.operands {
        Operands::Alu { sf, rd, rn, rm } => (sf, rd, rn, Value::Reg(rm)),
        Operands::AluImm { sf, rd, rn, imm } => (sf, rd, rn, Value::Const(imm)),
        Operands::AluShifted {
            sf,
            rd,
            rn,
            rm,
            shift,
            amount,
        } => (sf, rd, rn, shifted(Value::Reg(rm), shift, amount, Width::from_sf(sf))),
        Operands::AluExtended {
            sf,
            rd,
            rn,
            rm,
            extend,
            shift,
        } => (sf, rd, rn, extended(Value::Reg(rm), extend, shift)),
        _ => return undefined(ctx, op),
    };
    let (subtract, set_flags, carry) = match op.name {
        InstName::Add => (false, false, Value::Const(0)),
        InstName::Adds => (false, true, Value::Const(0)),
        InstName::Sub => (true, false, Value::Const(1)),
        InstName::Subs => (true, true, Value::Const(1)),
        InstName::Adc => (false, false, carry_flag()),
        InstName::Adcs => (false, true, carry_flag()),
        InstName::Sbc => (true, false, carry_flag()),
        InstName::Sbcs => (true, true, carry_flag()),
        _ => return undefined(ctx, op),
    };
    let width = Width::from_sf(sf);
    let rhs = if subtract {
        Value::unary(UnaryOp::Not, width, rhs)
    } else {
        rhs
    };
    let result = ctx.local();
    let flags = set_flags.then(|| ctx.local());
    ctx.push(Statement::AddWithCarry {
        result,
        flags,
        width,
        lhs: Value::Reg(rn),
        rhs,
        carry,
    });
    if let Some(flags) = flags {
        ctx.push(Statement::SetFlags(Value::Local(flags)));
    }
    ctx.set_register(rd, width, Value::Local(result));
}

/// Bitwise operations with an immediate or shifted register.
pub fn logical(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    let (sf, rd, rn, rhs) = match op.operands {
        Operands::AluImm { sf, rd, rn, imm } => (sf, rd, rn, Value::Const(imm)),
        Operands::AluShifted {
            sf,
            rd,
            rn,
            rm,
            shift,
            amount,
        } => (sf, rd, rn, shifted(Value::Reg(rm), shift, amount, Width::from_sf(sf))),
        _ => return undefined(ctx, op),
    };
    let width = Width::from_sf(sf);
    let (binary, invert, set_flags) = match op.name {
        InstName::And => (BinaryOp::And, false, false),
        InstName::Ands => (BinaryOp::And, false, true),
        InstName::Bic => (BinaryOp::And, true, false),
        InstName::Bics => (BinaryOp::And, true, true),
        InstName::Orr => (BinaryOp::Or, false, false),
        InstName::Orn => (BinaryOp::Or, true, false),
        InstName::Eor => (BinaryOp::Xor, false, false),
        InstName::Eon => (BinaryOp::Xor, true, false),
        _ => return undefined(ctx, op),
    };
    let rhs = if invert {
        Value::unary(UnaryOp::Not, width, rhs)
    } else {
        rhs
    };
    let result = ctx.assign(Value::binary(binary, width, Value::Reg(rn), rhs));
    if set_flags {
        ctx.push(Statement::SetFlags(Value::unary(
            UnaryOp::LogicalFlags,
            width,
            result.clone(),
        )));
    }
    ctx.set_register(rd, width, result);
}

/// Variable shifts, division, bit counting, reversal and `EXTR`.
pub fn data_processing(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    match op.operands {
        Operands::Alu { sf, rd, rn, rm } => {
            let width = Width::from_sf(sf);
            let binary = match op.name {
                InstName::Lslv => Some(BinaryOp::ShiftLeft),
                InstName::Lsrv => Some(BinaryOp::ShiftRightLogical),
                InstName::Asrv => Some(BinaryOp::ShiftRightArithmetic),
                InstName::Rorv => Some(BinaryOp::RotateRight),
                InstName::Udiv => Some(BinaryOp::DivideUnsigned),
                InstName::Sdiv => Some(BinaryOp::DivideSigned),
                _ => None,
            };
            let unary = match op.name {
                InstName::Clz => Some(UnaryOp::CountLeadingZeros),
                InstName::Cls => Some(UnaryOp::CountLeadingSigns),
                InstName::Rbit => Some(UnaryOp::ReverseBits),
                InstName::Rev16 => Some(UnaryOp::Rev16),
                InstName::Rev32 => Some(UnaryOp::Rev32),
                InstName::Rev64 => Some(UnaryOp::Rev64),
                _ => None,
            };
            let value = match (binary, unary) {
                (Some(binary), _) => Value::binary(binary, width, Value::Reg(rn), Value::Reg(rm)),
                (None, Some(unary)) => Value::unary(unary, width, Value::Reg(rn)),
                (None, None) => return undefined(ctx, op),
            };
            ctx.set_register(rd, width, value);
        }
        Operands::Extract {
            sf,
            rd,
            rn,
            rm,
            lsb,
        } => {
            let width = Width::from_sf(sf);
            if u32::from(lsb) >= width.bits() {
                return undefined(ctx, op);
            }
            let value = if lsb == 0 {
                Value::Reg(rm)
            } else {
                Value::binary(
                    BinaryOp::Or,
                    width,
                    Value::binary(
                        BinaryOp::ShiftRightLogical,
                        width,
                        Value::Reg(rm),
                        Value::Const(u64::from(lsb)),
                    ),
                    Value::binary(
                        BinaryOp::ShiftLeft,
                        width,
                        Value::Reg(rn),
                        Value::Const(u64::from(width.bits() - u32::from(lsb))),
                    ),
                )
            };
            ctx.set_register(rd, width, value);
        }
        _ => undefined(ctx, op),
    }
}

/// `SBFM`, `UBFM` and `BFM`, covering the shift and extend aliases.
pub fn bitfield(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    let Operands::Bitfield {
        sf,
        rd,
        rn,
        immr,
        imms,
    } = op.operands
    else {
        return undefined(ctx, op);
    };
    let width = Width::from_sf(sf);
    let bits = width.bits();
    let (r, s) = (u32::from(immr), u32::from(imms));
    if r >= bits || s >= bits {
        return undefined(ctx, op);
    }
    let konst = |value: u32| Value::Const(u64::from(value));
    let src = Value::Reg(rn);
    let value = match op.name {
        InstName::Ubfm if s >= r => Value::binary(
            BinaryOp::And,
            width,
            Value::binary(BinaryOp::ShiftRightLogical, width, src, konst(r)),
            Value::Const(low_mask(s - r + 1)),
        ),
        InstName::Ubfm => Value::binary(
            BinaryOp::ShiftLeft,
            width,
            Value::binary(BinaryOp::And, width, src, Value::Const(low_mask(s + 1))),
            konst(bits - r),
        ),
        InstName::Sbfm if s >= r => Value::binary(
            BinaryOp::ShiftRightArithmetic,
            width,
            Value::binary(BinaryOp::ShiftLeft, width, src, konst(bits - 1 - s)),
            konst(bits - 1 - s + r),
        ),
        InstName::Sbfm => Value::binary(
            BinaryOp::ShiftLeft,
            width,
            Value::binary(
                BinaryOp::ShiftRightArithmetic,
                width,
                Value::binary(BinaryOp::ShiftLeft, width, src, konst(bits - 1 - s)),
                konst(bits - 1 - s),
            ),
            konst(bits - r),
        ),
        InstName::Bfm => {
            let (field, mask) = if s >= r {
                let mask = low_mask(s - r + 1);
                (
                    Value::binary(
                        BinaryOp::And,
                        width,
                        Value::binary(BinaryOp::ShiftRightLogical, width, src, konst(r)),
                        Value::Const(mask),
                    ),
                    mask,
                )
            } else {
                let mask = low_mask(s + 1) << (bits - r);
                (
                    Value::binary(
                        BinaryOp::ShiftLeft,
                        width,
                        Value::binary(BinaryOp::And, width, src, Value::Const(low_mask(s + 1))),
                        konst(bits - r),
                    ),
                    mask,
                )
            };
            Value::binary(
                BinaryOp::Or,
                width,
                Value::binary(BinaryOp::And, width, Value::Reg(rd), Value::Const(!mask)),
                field,
            )
        }
        _ => return undefined(ctx, op),
    };
    ctx.set_register(rd, width, value);
}

/// `MOVZ`, `MOVN` and `MOVK`.
pub fn move_wide(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    let Operands::Move { sf, rd, imm, shift } = op.operands else {
        return undefined(ctx, op);
    };
    let width = Width::from_sf(sf);
    if u32::from(shift) >= width.bits() {
        return undefined(ctx, op);
    }
    let shifted = imm << shift;
    let value = match op.name {
        InstName::Movz => Value::Const(shifted),
        InstName::Movn => Value::Const(!shifted),
        InstName::Movk => Value::binary(
            BinaryOp::Or,
            width,
            Value::binary(
                BinaryOp::And,
                width,
                Value::Reg(rd),
                Value::Const(!(0xFFFF << shift)),
            ),
            Value::Const(shifted),
        ),
        _ => return undefined(ctx, op),
    };
    ctx.set_register(rd, width, value);
}

/// `ADR` and `ADRP`; the address is resolved at decode time.
pub fn address(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    let Operands::Adr { rd, address } = op.operands else {
        return undefined(ctx, op);
    };
    ctx.set_register(rd, Width::W64, Value::Const(address));
}

/// Multiply-accumulate and high-half multiplies.
pub fn multiply(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    let Operands::Mul { sf, rd, rn, rm, ra } = op.operands else {
        return undefined(ctx, op);
    };
    let width = Width::from_sf(sf);
    let widen = |extend: UnaryOp, reg| Value::unary(extend, Width::W64, Value::Reg(reg));
    let (width, product, accumulate) = match op.name {
        InstName::Madd | InstName::Msub => (
            width,
            Value::binary(BinaryOp::Multiply, width, Value::Reg(rn), Value::Reg(rm)),
            op.name == InstName::Madd,
        ),
        InstName::Smaddl | InstName::Smsubl => (
            Width::W64,
            Value::binary(
                BinaryOp::Multiply,
                Width::W64,
                widen(UnaryOp::SignExtend32, rn),
                widen(UnaryOp::SignExtend32, rm),
            ),
            op.name == InstName::Smaddl,
        ),
        InstName::Umaddl | InstName::Umsubl => (
            Width::W64,
            Value::binary(
                BinaryOp::Multiply,
                Width::W64,
                widen(UnaryOp::ZeroExtend32, rn),
                widen(UnaryOp::ZeroExtend32, rm),
            ),
            op.name == InstName::Umaddl,
        ),
        InstName::Smulh | InstName::Umulh => {
            let high = if op.name == InstName::Smulh {
                BinaryOp::MultiplyHighSigned
            } else {
                BinaryOp::MultiplyHighUnsigned
            };
            let value = Value::binary(high, Width::W64, Value::Reg(rn), Value::Reg(rm));
            return ctx.set_register(rd, Width::W64, value);
        }
        _ => return undefined(ctx, op),
    };
    let combine = if accumulate {
        BinaryOp::Add
    } else {
        BinaryOp::Sub
    };
    ctx.set_register(
        rd,
        width,
        Value::binary(combine, width, Value::Reg(ra), product),
    );
}

/// Conditional select and conditional compare.
pub fn conditional(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    match op.operands {
        Operands::CondSelect {
            sf,
            rd,
            rn,
            rm,
            cond,
        } => {
            let width = Width::from_sf(sf);
            let otherwise = match op.name {
                InstName::Csel => Value::Reg(rm),
                InstName::Csinc => {
                    Value::binary(BinaryOp::Add, width, Value::Reg(rm), Value::Const(1))
                }
                InstName::Csinv => Value::unary(UnaryOp::Not, width, Value::Reg(rm)),
                InstName::Csneg => Value::unary(UnaryOp::Neg, width, Value::Reg(rm)),
                _ => return undefined(ctx, op),
            };
            let value = Value::select(Value::Condition(cond), Value::Reg(rn), otherwise);
            ctx.set_register(rd, width, value);
        }
        Operands::CondCompare {
            sf,
            rn,
            operand,
            nzcv,
            cond,
        } => {
            let width = Width::from_sf(sf);
            let rhs = match operand {
                CompareOperand::Imm(imm) => Value::Const(imm),
                CompareOperand::Reg(rm) => Value::Reg(rm),
            };
            let (rhs, carry) = match op.name {
                InstName::Ccmp => (Value::unary(UnaryOp::Not, width, rhs), 1),
                InstName::Ccmn => (rhs, 0),
                _ => return undefined(ctx, op),
            };
            let result = ctx.local();
            let flags = ctx.local();
            ctx.push(Statement::AddWithCarry {
                result,
                flags: Some(flags),
                width,
                lhs: Value::Reg(rn),
                rhs,
                carry: Value::Const(carry),
            });
            ctx.push(Statement::SetFlags(Value::select(
                Value::Condition(cond),
                Value::Local(flags),
                Value::Const(u64::from(nzcv)),
            )));
        }
        _ => undefined(ctx, op),
    }
}
