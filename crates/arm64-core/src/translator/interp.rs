//! Tree-walking backend that executes IR directly.

use std::sync::atomic::{fence, Ordering};

use super::backend::{CodeGenBackend, CompiledCode, Dispatcher};
use super::ir::{
    BinaryOp, BlockTarget, CallTarget, IrFunction, Statement, Terminator, UnaryOp, Value, Width,
};
use crate::fault::FaultReason;
use crate::memory::MemoryManager;
use crate::state::{ExclusiveMonitor, ExecutionContext, Nzcv};

/// Backend that interprets IR instead of emitting host code.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl CodeGenBackend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn compile(&self, function: IrFunction) -> Box<dyn CompiledCode> {
        Box::new(InterpretedCode { function })
    }
}

struct InterpretedCode {
    function: IrFunction,
}

struct Frame<'a> {
    locals: Vec<u64>,
    context: &'a mut ExecutionContext,
    memory: &'a MemoryManager,
}

impl CompiledCode for InterpretedCode {
    fn execute(
        &self,
        context: &mut ExecutionContext,
        memory: &MemoryManager,
        dispatcher: &dyn Dispatcher,
    ) -> Result<u64, FaultReason> {
        let mut frame = Frame {
            locals: vec![0; self.function.locals as usize],
            context,
            memory,
        };
        let mut index = self.function.entry;
        loop {
            let block = &self.function.blocks[index];
            for statement in &block.statements {
                frame.run(statement)?;
            }
            let target = match &block.terminator {
                Terminator::Jump(target) => *target,
                Terminator::Branch {
                    condition,
                    taken,
                    not_taken,
                } => {
                    if frame.eval(condition) == 0 {
                        *not_taken
                    } else {
                        *taken
                    }
                }
                Terminator::Call {
                    target,
                    return_address,
                    next,
                } => {
                    let returned = match target {
                        CallTarget::Direct(sub) => {
                            sub.execute(frame.context, frame.memory, dispatcher)?
                        }
                        CallTarget::Indirect(address) => {
                            dispatcher.dispatch(frame.context, *address)?
                        }
                    };
                    if returned != *return_address {
                        return Ok(returned);
                    }
                    *next
                }
                Terminator::CallIndirect {
                    target,
                    return_address,
                    next,
                } => {
                    let address = frame.eval(target);
                    let returned = dispatcher.dispatch(frame.context, address)?;
                    if returned != *return_address {
                        return Ok(returned);
                    }
                    *next
                }
                Terminator::Return(value) => return Ok(frame.eval(value)),
                Terminator::Trap(fault) => return Err(*fault),
            };
            index = match target {
                BlockTarget::Block(next) => next,
                BlockTarget::Loop { index, address } => {
                    if !frame.context.running() {
                        return Ok(address);
                    }
                    index
                }
                BlockTarget::Exit(address) => return Ok(address),
            };
        }
    }
}

impl Frame<'_> {
    fn eval(&self, value: &Value) -> u64 {
        match value {
            Value::Const(value) => *value,
            Value::Local(local) => self.locals[local.0 as usize],
            Value::Reg(reg) => self.context.registers().read(*reg),
            Value::Flags => self.context.registers().nzcv().to_nibble(),
            Value::Condition(cond) => u64::from(cond.holds(self.context.registers().nzcv())),
            Value::System(reg) => self.context.system_register(*reg),
            Value::Unary(op, width, value) => unary(*op, *width, self.eval(value)),
            Value::Binary(op, width, lhs, rhs) => {
                binary(*op, *width, self.eval(lhs), self.eval(rhs))
            }
            Value::Select(condition, taken, not_taken) => {
                if self.eval(condition) == 0 {
                    self.eval(not_taken)
                } else {
                    self.eval(taken)
                }
            }
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn run(&mut self, statement: &Statement) -> Result<(), FaultReason> {
        match statement {
            Statement::Assign(local, value) => {
                self.locals[local.0 as usize] = self.eval(value);
            }
            Statement::SetRegister { reg, width, value } => {
                let value = self.eval(value) & width.mask();
                self.context.registers_mut().write(*reg, value);
            }
            Statement::SetFlags(value) => {
                let flags = Nzcv::from_nibble(self.eval(value));
                self.context.registers_mut().set_nzcv(flags);
            }
            Statement::AddWithCarry {
                result,
                flags,
                width,
                lhs,
                rhs,
                carry,
            } => {
                let (sum, nzcv) =
                    add_with_carry(*width, self.eval(lhs), self.eval(rhs), self.eval(carry));
                self.locals[result.0 as usize] = sum;
                if let Some(flags) = flags {
                    self.locals[flags.0 as usize] = nzcv;
                }
            }
            Statement::SetSystem { reg, value } => {
                let value = self.eval(value);
                self.context.registers_mut().set_system(*reg, value);
            }
            Statement::Load { dst, size, address } => {
                let address = self.eval(address);
                self.locals[dst.0 as usize] = self.load(*size, address)?;
            }
            Statement::Store {
                size,
                address,
                value,
            } => {
                let address = self.eval(address);
                let value = self.eval(value);
                match size {
                    0 => self.memory.write_u8(address, value as u8)?,
                    1 => self.memory.write_u16(address, value as u16)?,
                    2 => self.memory.write_u32(address, value as u32)?,
                    _ => self.memory.write_u64(address, value)?,
                }
            }
            Statement::LoadExclusive { dst, size, address } => {
                let address = self.eval(address);
                let value = self.load(*size, address)?;
                self.context.set_exclusive(ExclusiveMonitor {
                    address,
                    size: 1 << size,
                    value,
                });
                self.locals[dst.0 as usize] = value;
            }
            Statement::StoreExclusive {
                status,
                size,
                address,
                value,
            } => {
                let address = self.eval(address);
                let desired = self.eval(value);
                let stored = match self.context.take_exclusive() {
                    Some(monitor) if monitor.address == address && monitor.size == 1 << size => {
                        let expected = monitor.value;
                        match size {
                            0 => self.memory.compare_exchange_byte(
                                address,
                                expected as u8,
                                desired as u8,
                            )?,
                            1 => self.memory.compare_exchange_i16(
                                address,
                                expected as i16,
                                desired as i16,
                            )?,
                            2 => self.memory.compare_exchange_i32(
                                address,
                                expected as i32,
                                desired as i32,
                            )?,
                            _ => self.memory.compare_exchange_i64(
                                address,
                                expected as i64,
                                desired as i64,
                            )?,
                        }
                    }
                    _ => false,
                };
                self.locals[status.0 as usize] = u64::from(!stored);
            }
            Statement::ClearExclusive => {
                self.context.take_exclusive();
            }
            Statement::Barrier => fence(Ordering::SeqCst),
            Statement::SupervisorCall { imm, address } => {
                self.context.supervisor_call(self.memory, *imm, *address)?;
            }
        }
        Ok(())
    }

    fn load(&self, size: u8, address: u64) -> Result<u64, FaultReason> {
        Ok(match size {
            0 => u64::from(self.memory.read_u8(address)?),
            1 => u64::from(self.memory.read_u16(address)?),
            2 => u64::from(self.memory.read_u32(address)?),
            _ => self.memory.read_u64(address)?,
        })
    }
}

/// Returns the masked sum and its NZCV nibble.
fn add_with_carry(width: Width, lhs: u64, rhs: u64, carry: u64) -> (u64, u64) {
    let mask = width.mask();
    let (lhs, rhs) = (lhs & mask, rhs & mask);
    let wide = u128::from(lhs) + u128::from(rhs) + u128::from(carry & 1);
    #[allow(clippy::cast_possible_truncation)]
    let result = wide as u64 & mask;
    let sign = 1u64 << (width.bits() - 1);
    let n = u64::from(result & sign != 0);
    let z = u64::from(result == 0);
    let c = u64::from(wide > u128::from(mask));
    let v = u64::from((lhs ^ result) & (rhs ^ result) & sign != 0);
    (result, n << 3 | z << 2 | c << 1 | v)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
fn unary(op: UnaryOp, width: Width, value: u64) -> u64 {
    let mask = width.mask();
    let value = value & mask;
    let wide = width == Width::W64;
    let result = match op {
        UnaryOp::Not => !value,
        UnaryOp::Neg => value.wrapping_neg(),
        UnaryOp::CountLeadingZeros => {
            u64::from(value.leading_zeros() - (64 - width.bits()))
        }
        UnaryOp::CountLeadingSigns => {
            if wide {
                let signed = value as i64;
                u64::from((signed ^ (signed >> 1)).leading_zeros() - 1)
            } else {
                let signed = value as u32 as i32;
                u64::from((signed ^ (signed >> 1)).leading_zeros() - 1)
            }
        }
        UnaryOp::ReverseBits => {
            if wide {
                value.reverse_bits()
            } else {
                u64::from((value as u32).reverse_bits())
            }
        }
        UnaryOp::Rev16 => ((value & 0x00FF_00FF_00FF_00FF) << 8) | ((value >> 8) & 0x00FF_00FF_00FF_00FF),
        UnaryOp::Rev32 => {
            let low = u64::from((value as u32).swap_bytes());
            let high = u64::from(((value >> 32) as u32).swap_bytes());
            high << 32 | low
        }
        UnaryOp::Rev64 => {
            if wide {
                value.swap_bytes()
            } else {
                u64::from((value as u32).swap_bytes())
            }
        }
        UnaryOp::SignExtend8 => value as u8 as i8 as i64 as u64,
        UnaryOp::SignExtend16 => value as u16 as i16 as i64 as u64,
        UnaryOp::SignExtend32 => value as u32 as i32 as i64 as u64,
        UnaryOp::ZeroExtend8 => value & 0xFF,
        UnaryOp::ZeroExtend16 => value & 0xFFFF,
        UnaryOp::ZeroExtend32 => value & 0xFFFF_FFFF,
        UnaryOp::IsZero => u64::from(value == 0),
        UnaryOp::LogicalFlags => {
            let n = (value >> (width.bits() - 1)) & 1;
            let z = u64::from(value == 0);
            n << 3 | z << 2
        }
    };
    result & mask
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
fn binary(op: BinaryOp, width: Width, lhs: u64, rhs: u64) -> u64 {
    let mask = width.mask();
    let (lhs, rhs) = (lhs & mask, rhs & mask);
    let wide = width == Width::W64;
    let amount = (rhs % u64::from(width.bits())) as u32;
    let result = match op {
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::And => lhs & rhs,
        BinaryOp::Or => lhs | rhs,
        BinaryOp::Xor => lhs ^ rhs,
        BinaryOp::ShiftLeft => lhs << amount,
        BinaryOp::ShiftRightLogical => lhs >> amount,
        BinaryOp::ShiftRightArithmetic => {
            if wide {
                ((lhs as i64) >> amount) as u64
            } else {
                u64::from(((lhs as u32 as i32) >> amount) as u32)
            }
        }
        BinaryOp::RotateRight => {
            if wide {
                lhs.rotate_right(amount)
            } else {
                u64::from((lhs as u32).rotate_right(amount))
            }
        }
        BinaryOp::Multiply => lhs.wrapping_mul(rhs),
        BinaryOp::MultiplyHighUnsigned => ((u128::from(lhs) * u128::from(rhs)) >> 64) as u64,
        BinaryOp::MultiplyHighSigned => {
            ((i128::from(lhs as i64) * i128::from(rhs as i64)) >> 64) as u64
        }
        BinaryOp::DivideUnsigned => lhs.checked_div(rhs).unwrap_or(0),
        BinaryOp::DivideSigned => {
            if rhs == 0 {
                0
            } else if wide {
                (lhs as i64).wrapping_div(rhs as i64) as u64
            } else {
                u64::from((lhs as u32 as i32).wrapping_div(rhs as u32 as i32) as u32)
            }
        }
        BinaryOp::Equal => u64::from(lhs == rhs),
    };
    result & mask
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{add_with_carry, binary, unary};
    use crate::translator::ir::{BinaryOp, UnaryOp, Width};

    #[rstest]
    // 1 - 1: zero, carry set (no borrow).
    #[case(Width::W64, 1, !1, 1, 0, 0b0110)]
    // 0 - 1: negative, borrow.
    #[case(Width::W64, 0, !1, 1, u64::MAX, 0b1000)]
    // i32::MAX + 1 overflows into the sign bit.
    #[case(Width::W32, 0x7FFF_FFFF, 1, 0, 0x8000_0000, 0b1001)]
    // u32::MAX + 1 wraps to zero with carry.
    #[case(Width::W32, 0xFFFF_FFFF, 1, 0, 0, 0b0110)]
    fn add_with_carry_sets_nzcv(
        #[case] width: Width,
        #[case] lhs: u64,
        #[case] rhs: u64,
        #[case] carry: u64,
        #[case] result: u64,
        #[case] flags: u64,
    ) {
        assert_eq!(add_with_carry(width, lhs, rhs, carry), (result, flags));
    }

    #[rstest]
    #[case(UnaryOp::CountLeadingZeros, Width::W32, 1, 31)]
    #[case(UnaryOp::CountLeadingZeros, Width::W64, 0, 64)]
    #[case(UnaryOp::CountLeadingSigns, Width::W64, 0, 63)]
    #[case(UnaryOp::CountLeadingSigns, Width::W32, 0xFFFF_FFFF, 31)]
    #[case(UnaryOp::CountLeadingSigns, Width::W64, 1, 62)]
    #[case(UnaryOp::ReverseBits, Width::W32, 1, 0x8000_0000)]
    #[case(UnaryOp::Rev16, Width::W32, 0x1122_3344, 0x2211_4433)]
    #[case(UnaryOp::Rev32, Width::W64, 0x1122_3344_5566_7788, 0x4433_2211_8877_6655)]
    #[case(UnaryOp::Rev64, Width::W64, 0x1122_3344_5566_7788, 0x8877_6655_4433_2211)]
    #[case(UnaryOp::SignExtend8, Width::W32, 0x80, 0xFFFF_FF80)]
    #[case(UnaryOp::Not, Width::W32, 0, 0xFFFF_FFFF)]
    #[case(UnaryOp::LogicalFlags, Width::W64, 0, 0b0100)]
    fn unary_operations(
        #[case] op: UnaryOp,
        #[case] width: Width,
        #[case] value: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(unary(op, width, value), expected);
    }

    #[rstest]
    #[case(BinaryOp::ShiftLeft, Width::W32, 1, 33, 2)]
    #[case(BinaryOp::ShiftRightArithmetic, Width::W32, 0x8000_0000, 4, 0xF800_0000)]
    #[case(BinaryOp::RotateRight, Width::W64, 1, 1, 0x8000_0000_0000_0000)]
    #[case(BinaryOp::DivideUnsigned, Width::W64, 7, 0, 0)]
    #[case(BinaryOp::DivideSigned, Width::W64, (-7i64) as u64, 2, (-3i64) as u64)]
    #[case(BinaryOp::DivideSigned, Width::W64, i64::MIN as u64, u64::MAX, i64::MIN as u64)]
    #[case(BinaryOp::MultiplyHighUnsigned, Width::W64, u64::MAX, 2, 1)]
    #[case(BinaryOp::MultiplyHighSigned, Width::W64, u64::MAX, 2, u64::MAX)]
    #[case(BinaryOp::Add, Width::W32, 0xFFFF_FFFF, 2, 1)]
    fn binary_operations(
        #[case] op: BinaryOp,
        #[case] width: Width,
        #[case] lhs: u64,
        #[case] rhs: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(binary(op, width, lhs, rhs), expected);
    }
}
