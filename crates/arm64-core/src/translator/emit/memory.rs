use super::{extended, undefined, EmitterContext};
use crate::decoder::{IndexMode, InstName, MemOffset, OpCode, Operands};
use crate::state::RegisterOperand;
use crate::translator::ir::{BinaryOp, Statement, UnaryOp, Value, Width};

fn sign_extend(size: u8) -> UnaryOp {
    match size {
        0 => UnaryOp::SignExtend8,
        1 => UnaryOp::SignExtend16,
        _ => UnaryOp::SignExtend32,
    }
}

/// Computes the access address and the base writeback value.
fn addressing(
    ctx: &mut EmitterContext<'_>,
    rn: RegisterOperand,
    offset: Value,
    index: IndexMode,
) -> (Value, Option<Value>) {
    let base = ctx.assign(Value::Reg(rn));
    let offset_address = Value::binary(BinaryOp::Add, Width::W64, base.clone(), offset);
    match index {
        IndexMode::Offset => (ctx.assign(offset_address), None),
        IndexMode::PreIndex => {
            let address = ctx.assign(offset_address);
            (address.clone(), Some(address))
        }
        IndexMode::PostIndex => {
            let writeback = ctx.assign(offset_address);
            (base, Some(writeback))
        }
    }
}

fn load(ctx: &mut EmitterContext<'_>, size: u8, address: Value, signed: Option<bool>) -> (Value, Width) {
    let dst = ctx.local();
    ctx.push(Statement::Load { dst, size, address });
    let loaded = Value::Local(dst);
    match signed {
        Some(to_64) if size < 3 => {
            let width = Width::from_sf(to_64);
            (Value::unary(sign_extend(size), width, loaded), width)
        }
        _ => (loaded, Width::W64),
    }
}

fn element_address(base: &Value, index: u64, size: u8) -> Value {
    if index == 0 {
        base.clone()
    } else {
        Value::binary(
            BinaryOp::Add,
            Width::W64,
            base.clone(),
            Value::Const(index << size),
        )
    }
}

/// Single and pair loads and stores, literal loads and prefetches.
pub fn load_store(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    match (op.name, op.operands) {
        (InstName::Prfm, _) => {}
        (
            InstName::Ldr | InstName::Ldrs | InstName::Str,
            Operands::Mem {
                size,
                rt,
                rn,
                offset,
                index,
                signed,
            },
        ) => {
            let offset = match offset {
                #[allow(clippy::cast_sign_loss)]
                MemOffset::Imm(imm) => Value::Const(imm as u64),
                MemOffset::Reg { rm, extend, shift } => extended(Value::Reg(rm), extend, shift),
            };
            let (address, writeback) = addressing(ctx, rn, offset, index);
            if op.name == InstName::Str {
                ctx.push(Statement::Store {
                    size,
                    address,
                    value: Value::Reg(rt),
                });
                if let Some(writeback) = writeback {
                    ctx.set_register(rn, Width::W64, writeback);
                }
            } else {
                let (value, width) = load(ctx, size, address, signed);
                if let Some(writeback) = writeback {
                    ctx.set_register(rn, Width::W64, writeback);
                }
                ctx.set_register(rt, width, value);
            }
        }
        (
            InstName::LdrLiteral,
            Operands::MemLiteral {
                size,
                rt,
                address,
                signed,
            },
        ) => {
            let (value, width) = load(ctx, size, Value::Const(address), signed.then_some(true));
            ctx.set_register(rt, width, value);
        }
        (
            InstName::Ldp | InstName::Stp,
            Operands::MemPair {
                size,
                rt,
                rt2,
                rn,
                offset,
                index,
                signed,
            },
        ) => {
            #[allow(clippy::cast_sign_loss)]
            let (address, writeback) = addressing(ctx, rn, Value::Const(offset as u64), index);
            if op.name == InstName::Stp {
                for (slot, rt) in [rt, rt2].into_iter().enumerate() {
                    ctx.push(Statement::Store {
                        size,
                        address: element_address(&address, slot as u64, size),
                        value: Value::Reg(rt),
                    });
                }
                if let Some(writeback) = writeback {
                    ctx.set_register(rn, Width::W64, writeback);
                }
            } else {
                let signed = signed.then_some(true);
                let first = load(ctx, size, element_address(&address, 0, size), signed);
                let second = load(ctx, size, element_address(&address, 1, size), signed);
                if let Some(writeback) = writeback {
                    ctx.set_register(rn, Width::W64, writeback);
                }
                ctx.set_register(rt, first.1, first.0);
                ctx.set_register(rt2, second.1, second.0);
            }
        }
        _ => undefined(ctx, op),
    }
}

/// Exclusive and acquire/release accesses.
pub fn exclusive(ctx: &mut EmitterContext<'_>, op: &OpCode) {
    let Operands::MemExclusive { size, rt, rs, rn } = op.operands else {
        return undefined(ctx, op);
    };
    let address = Value::Reg(rn);
    match op.name {
        InstName::Ldxr | InstName::Ldaxr => {
            let dst = ctx.local();
            ctx.push(Statement::LoadExclusive { dst, size, address });
            if op.name == InstName::Ldaxr {
                ctx.push(Statement::Barrier);
            }
            ctx.set_register(rt, Width::W64, Value::Local(dst));
        }
        InstName::Ldar => {
            let (value, width) = load(ctx, size, address, None);
            ctx.push(Statement::Barrier);
            ctx.set_register(rt, width, value);
        }
        InstName::Stxr | InstName::Stlxr => {
            if op.name == InstName::Stlxr {
                ctx.push(Statement::Barrier);
            }
            let status = ctx.local();
            ctx.push(Statement::StoreExclusive {
                status,
                size,
                address,
                value: Value::Reg(rt),
            });
            ctx.set_register(rs, Width::W32, Value::Local(status));
        }
        InstName::Stlr => {
            ctx.push(Statement::Barrier);
            ctx.push(Statement::Store {
                size,
                address,
                value: Value::Reg(rt),
            });
        }
        _ => undefined(ctx, op),
    }
}

#[cfg(test)]
mod tests {
    use super::sign_extend;
    use crate::translator::ir::UnaryOp;

    #[test]
    fn sign_extension_follows_access_size() {
        assert_eq!(sign_extend(0), UnaryOp::SignExtend8);
        assert_eq!(sign_extend(1), UnaryOp::SignExtend16);
        assert_eq!(sign_extend(2), UnaryOp::SignExtend32);
    }
}
