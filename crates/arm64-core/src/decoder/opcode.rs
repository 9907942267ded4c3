//! Decoded instruction model: names, operand layouts and field extraction.

use std::fmt;

use crate::state::{Condition, RegisterOperand};
use crate::translator::emit::InstEmitter;

/// Instruction mnemonics recognized by the A64 decode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum InstName {
    Adc,
    Adcs,
    Add,
    Adds,
    Adr,
    Adrp,
    And,
    Ands,
    Asrv,
    B,
    BCond,
    Bfm,
    Bic,
    Bics,
    Bl,
    Blr,
    Br,
    Brk,
    Cbnz,
    Cbz,
    Ccmn,
    Ccmp,
    Clrex,
    Cls,
    Clz,
    Csel,
    Csinc,
    Csinv,
    Csneg,
    Dmb,
    Dsb,
    Eon,
    Eor,
    Extr,
    Hint,
    Isb,
    Ldar,
    Ldaxr,
    Ldp,
    Ldr,
    LdrLiteral,
    Ldrs,
    Ldxr,
    Lslv,
    Lsrv,
    Madd,
    Movk,
    Movn,
    Movz,
    Mrs,
    Msr,
    Msub,
    Nop,
    Orn,
    Orr,
    Prfm,
    Rbit,
    Ret,
    Rev16,
    Rev32,
    Rev64,
    Rorv,
    Sbc,
    Sbcs,
    Sbfm,
    Sdiv,
    Smaddl,
    Smsubl,
    Smulh,
    Stlr,
    Stlxr,
    Stp,
    Str,
    Stxr,
    Sub,
    Subs,
    Svc,
    Tbnz,
    Tbz,
    Ubfm,
    Udiv,
    Umaddl,
    Umsubl,
    Umulh,
    /// Sentinel for encodings the table does not recognize.
    Undefined,
}

/// How an instruction transfers control, as needed to build block graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlFlow {
    /// Falls through to the next instruction.
    Sequential,
    /// Unconditional jump to a decode-time target.
    Jump,
    /// Conditional jump; may also fall through.
    ConditionalJump,
    /// Call to a decode-time target that returns to the next instruction.
    Call,
    /// Call through a register.
    IndirectCall,
    /// Jump through a register, including returns.
    Return,
    /// Ends execution of the block with a fault.
    Trap,
}

impl InstName {
    /// Control-flow class of the mnemonic.
    #[must_use]
    pub const fn control_flow(self) -> ControlFlow {
        match self {
            Self::B => ControlFlow::Jump,
            Self::BCond | Self::Cbz | Self::Cbnz | Self::Tbz | Self::Tbnz => {
                ControlFlow::ConditionalJump
            }
            Self::Bl => ControlFlow::Call,
            Self::Blr => ControlFlow::IndirectCall,
            Self::Br | Self::Ret => ControlFlow::Return,
            Self::Brk | Self::Undefined => ControlFlow::Trap,
            _ => ControlFlow::Sequential,
        }
    }
}

/// Operand-layout families; each determines how fields are extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandLayout {
    /// Two- or three-register data processing.
    Alu,
    /// Add/subtract with a shifted 12-bit immediate.
    AluImm,
    /// Logical operation with a bitmask immediate.
    AluLogicalImm,
    /// Register operand with shift.
    AluShifted,
    /// Register operand with extend.
    AluExtended,
    /// Register pair extract.
    Extract,
    /// Bitfield move.
    Bitfield,
    /// Wide immediate move.
    Move,
    /// PC-relative address.
    Adr,
    /// Multiply-accumulate.
    Mul,
    /// Conditional select.
    CondSelect,
    /// Conditional compare with immediate.
    CondCompareImm,
    /// Conditional compare with register.
    CondCompareReg,
    /// Immediate branch.
    BranchImm,
    /// Conditional immediate branch.
    BranchCond,
    /// Compare and branch.
    BranchCompare,
    /// Test bit and branch.
    BranchTest,
    /// Branch to register.
    BranchReg,
    /// Exception generation.
    Exception,
    /// System instruction.
    System,
    /// Load/store with immediate offset.
    MemImm,
    /// Load/store with register offset.
    MemReg,
    /// PC-relative literal load.
    MemLiteral,
    /// Load/store pair.
    MemPair,
    /// Exclusive or ordered load/store.
    MemExclusive,
    /// No operands.
    None,
}

/// Shift applied to a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ShiftType {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftType {
    const fn from_u2(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Lsl,
            1 => Self::Lsr,
            2 => Self::Asr,
            _ => Self::Ror,
        }
    }
}

/// Extension applied to a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ExtendType {
    Uxtb,
    Uxth,
    Uxtw,
    Uxtx,
    Sxtb,
    Sxth,
    Sxtw,
    Sxtx,
}

impl ExtendType {
    const fn from_u3(bits: u32) -> Self {
        match bits & 7 {
            0 => Self::Uxtb,
            1 => Self::Uxth,
            2 => Self::Uxtw,
            3 => Self::Uxtx,
            4 => Self::Sxtb,
            5 => Self::Sxth,
            6 => Self::Sxtw,
            _ => Self::Sxtx,
        }
    }

    /// Applies the extension to a 64-bit register value.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub const fn apply(self, value: u64) -> u64 {
        match self {
            Self::Uxtb => value & 0xFF,
            Self::Uxth => value & 0xFFFF,
            Self::Uxtw => value & 0xFFFF_FFFF,
            Self::Uxtx | Self::Sxtx => value,
            Self::Sxtb => value as i8 as i64 as u64,
            Self::Sxth => value as i16 as i64 as u64,
            Self::Sxtw => value as i32 as i64 as u64,
        }
    }
}

/// Addressing mode of an immediate-offset or pair access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexMode {
    /// Base plus offset, no writeback.
    Offset,
    /// Access at base plus offset, then write the sum back.
    PreIndex,
    /// Access at base, then write base plus offset back.
    PostIndex,
}

/// Second operand of a conditional compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOperand {
    /// 5-bit immediate.
    Imm(u64),
    /// Register.
    Reg(RegisterOperand),
}

/// Where a load/store finds its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemOffset {
    /// Immediate byte offset.
    Imm(i64),
    /// Extended and shifted register.
    Reg {
        /// Offset register.
        rm: RegisterOperand,
        /// Extension of the offset register.
        extend: ExtendType,
        /// Left shift after extension.
        shift: u8,
    },
}

/// Operands extracted at decode time, with register field `31` resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Operands {
    None,
    Alu {
        sf: bool,
        rd: RegisterOperand,
        rn: RegisterOperand,
        rm: RegisterOperand,
    },
    AluImm {
        sf: bool,
        rd: RegisterOperand,
        rn: RegisterOperand,
        imm: u64,
    },
    AluShifted {
        sf: bool,
        rd: RegisterOperand,
        rn: RegisterOperand,
        rm: RegisterOperand,
        shift: ShiftType,
        amount: u8,
    },
    AluExtended {
        sf: bool,
        rd: RegisterOperand,
        rn: RegisterOperand,
        rm: RegisterOperand,
        extend: ExtendType,
        shift: u8,
    },
    Extract {
        sf: bool,
        rd: RegisterOperand,
        rn: RegisterOperand,
        rm: RegisterOperand,
        lsb: u8,
    },
    Bitfield {
        sf: bool,
        rd: RegisterOperand,
        rn: RegisterOperand,
        immr: u8,
        imms: u8,
    },
    Move {
        sf: bool,
        rd: RegisterOperand,
        imm: u64,
        shift: u8,
    },
    Adr {
        rd: RegisterOperand,
        address: u64,
    },
    Mul {
        sf: bool,
        rd: RegisterOperand,
        rn: RegisterOperand,
        rm: RegisterOperand,
        ra: RegisterOperand,
    },
    CondSelect {
        sf: bool,
        rd: RegisterOperand,
        rn: RegisterOperand,
        rm: RegisterOperand,
        cond: Condition,
    },
    CondCompare {
        sf: bool,
        rn: RegisterOperand,
        operand: CompareOperand,
        nzcv: u8,
        cond: Condition,
    },
    Branch {
        target: u64,
    },
    BranchCond {
        target: u64,
        cond: Condition,
    },
    BranchCompare {
        sf: bool,
        rt: RegisterOperand,
        target: u64,
    },
    BranchTest {
        rt: RegisterOperand,
        bit: u8,
        target: u64,
    },
    BranchReg {
        rn: RegisterOperand,
    },
    Exception {
        imm: u16,
    },
    System {
        rt: RegisterOperand,
        key: u16,
    },
    Mem {
        /// Access width as log2 bytes.
        size: u8,
        rt: RegisterOperand,
        rn: RegisterOperand,
        offset: MemOffset,
        index: IndexMode,
        /// Load sign-extends to 32 (`Some(false)`) or 64 (`Some(true)`) bits.
        signed: Option<bool>,
    },
    MemLiteral {
        size: u8,
        rt: RegisterOperand,
        address: u64,
        signed: bool,
    },
    MemPair {
        size: u8,
        rt: RegisterOperand,
        rt2: RegisterOperand,
        rn: RegisterOperand,
        offset: i64,
        index: IndexMode,
        signed: bool,
    },
    MemExclusive {
        size: u8,
        rt: RegisterOperand,
        rs: RegisterOperand,
        rn: RegisterOperand,
    },
}

const fn bits(word: u32, lsb: u32, len: u32) -> u32 {
    (word >> lsb) & ((1 << len) - 1)
}

#[allow(clippy::cast_possible_truncation)]
const fn reg_zr(word: u32, lsb: u32) -> RegisterOperand {
    RegisterOperand::zr_or_gpr(bits(word, lsb, 5) as u8)
}

#[allow(clippy::cast_possible_truncation)]
const fn reg_sp(word: u32, lsb: u32) -> RegisterOperand {
    RegisterOperand::sp_or_gpr(bits(word, lsb, 5) as u8)
}

#[allow(clippy::cast_possible_wrap)]
const fn sign_extend(value: u32, len: u32) -> i64 {
    let shift = 64 - len;
    ((value as i64) << shift) >> shift
}

#[allow(clippy::cast_sign_loss)]
const fn relative(address: u64, imm: u32, len: u32) -> u64 {
    address.wrapping_add((sign_extend(imm, len) << 2) as u64)
}

/// Decodes an A64 logical-immediate bitmask (`N:immr:imms`).
///
/// Returns `None` for reserved encodings.
#[must_use]
pub const fn decode_bit_mask(n: u32, imms: u32, immr: u32, sf: bool) -> Option<u64> {
    let combined = (n << 6) | (!imms & 0x3F);
    if combined == 0 {
        return None;
    }
    let len = 31 - combined.leading_zeros();
    if len < 1 || (!sf && n == 1) {
        return None;
    }
    let size = 1u32 << len;
    let levels = size - 1;
    let s = imms & levels;
    let r = immr & levels;
    if s == levels {
        return None;
    }
    let ones = (1u64 << (s + 1)) - 1;
    let element = if r == 0 {
        ones
    } else {
        let mask = if size == 64 { u64::MAX } else { (1u64 << size) - 1 };
        ((ones >> r) | (ones << (size - r))) & mask
    };
    let mut pattern = element;
    let mut width = size;
    while width < 64 {
        pattern |= pattern << width;
        width *= 2;
    }
    Some(if sf { pattern } else { pattern & 0xFFFF_FFFF })
}

impl OperandLayout {
    /// Extracts the operands of `word` fetched from `address`.
    ///
    /// Returns `None` when the fields form a reserved combination.
    #[must_use]
    #[allow(clippy::too_many_lines, clippy::cast_possible_truncation)]
    pub const fn extract(self, word: u32, address: u64) -> Option<Operands> {
        let sf = bits(word, 31, 1) == 1;
        let set_flags = bits(word, 29, 1) == 1;
        let operands = match self {
            Self::None => Operands::None,
            Self::Alu => Operands::Alu {
                sf,
                rd: reg_zr(word, 0),
                rn: reg_zr(word, 5),
                rm: reg_zr(word, 16),
            },
            Self::AluImm => Operands::AluImm {
                sf,
                rd: if set_flags { reg_zr(word, 0) } else { reg_sp(word, 0) },
                rn: reg_sp(word, 5),
                imm: (bits(word, 10, 12) as u64) << (bits(word, 22, 1) * 12),
            },
            Self::AluLogicalImm => {
                let is_ands = bits(word, 29, 2) == 3;
                let Some(imm) =
                    decode_bit_mask(bits(word, 22, 1), bits(word, 10, 6), bits(word, 16, 6), sf)
                else {
                    return None;
                };
                Operands::AluImm {
                    sf,
                    rd: if is_ands { reg_zr(word, 0) } else { reg_sp(word, 0) },
                    rn: reg_zr(word, 5),
                    imm,
                }
            }
            Self::AluShifted => Operands::AluShifted {
                sf,
                rd: reg_zr(word, 0),
                rn: reg_zr(word, 5),
                rm: reg_zr(word, 16),
                shift: ShiftType::from_u2(bits(word, 22, 2)),
                amount: bits(word, 10, 6) as u8,
            },
            Self::AluExtended => Operands::AluExtended {
                sf,
                rd: if set_flags { reg_zr(word, 0) } else { reg_sp(word, 0) },
                rn: reg_sp(word, 5),
                rm: reg_zr(word, 16),
                extend: ExtendType::from_u3(bits(word, 13, 3)),
                shift: bits(word, 10, 3) as u8,
            },
            Self::Extract => Operands::Extract {
                sf,
                rd: reg_zr(word, 0),
                rn: reg_zr(word, 5),
                rm: reg_zr(word, 16),
                lsb: bits(word, 10, 6) as u8,
            },
            Self::Bitfield => Operands::Bitfield {
                sf,
                rd: reg_zr(word, 0),
                rn: reg_zr(word, 5),
                immr: bits(word, 16, 6) as u8,
                imms: bits(word, 10, 6) as u8,
            },
            Self::Move => Operands::Move {
                sf,
                rd: reg_zr(word, 0),
                imm: bits(word, 5, 16) as u64,
                shift: (bits(word, 21, 2) * 16) as u8,
            },
            Self::Adr => {
                let imm = (bits(word, 5, 19) << 2) | bits(word, 29, 2);
                let offset = sign_extend(imm, 21);
                #[allow(clippy::cast_sign_loss)]
                let address = if sf {
                    (address & !0xFFF).wrapping_add((offset << 12) as u64)
                } else {
                    address.wrapping_add(offset as u64)
                };
                Operands::Adr {
                    rd: reg_zr(word, 0),
                    address,
                }
            }
            Self::Mul => Operands::Mul {
                sf,
                rd: reg_zr(word, 0),
                rn: reg_zr(word, 5),
                rm: reg_zr(word, 16),
                ra: reg_zr(word, 10),
            },
            Self::CondSelect => Operands::CondSelect {
                sf,
                rd: reg_zr(word, 0),
                rn: reg_zr(word, 5),
                rm: reg_zr(word, 16),
                cond: Condition::from_u4(bits(word, 12, 4) as u8),
            },
            Self::CondCompareImm | Self::CondCompareReg => Operands::CondCompare {
                sf,
                rn: reg_zr(word, 5),
                operand: if matches!(self, Self::CondCompareImm) {
                    CompareOperand::Imm(bits(word, 16, 5) as u64)
                } else {
                    CompareOperand::Reg(reg_zr(word, 16))
                },
                nzcv: bits(word, 0, 4) as u8,
                cond: Condition::from_u4(bits(word, 12, 4) as u8),
            },
            Self::BranchImm => Operands::Branch {
                target: relative(address, bits(word, 0, 26), 26),
            },
            Self::BranchCond => Operands::BranchCond {
                target: relative(address, bits(word, 5, 19), 19),
                cond: Condition::from_u4(bits(word, 0, 4) as u8),
            },
            Self::BranchCompare => Operands::BranchCompare {
                sf,
                rt: reg_zr(word, 0),
                target: relative(address, bits(word, 5, 19), 19),
            },
            Self::BranchTest => Operands::BranchTest {
                rt: reg_zr(word, 0),
                bit: ((bits(word, 31, 1) << 5) | bits(word, 19, 5)) as u8,
                target: relative(address, bits(word, 5, 14), 14),
            },
            Self::BranchReg => Operands::BranchReg {
                rn: reg_zr(word, 5),
            },
            Self::Exception => Operands::Exception {
                imm: bits(word, 5, 16) as u16,
            },
            Self::System => Operands::System {
                rt: reg_zr(word, 0),
                key: bits(word, 5, 15) as u16,
            },
            Self::MemImm => {
                let size = bits(word, 30, 2);
                let (offset, index) = if bits(word, 24, 1) == 1 {
                    ((bits(word, 10, 12) << size) as i64, IndexMode::Offset)
                } else {
                    let index = match bits(word, 10, 2) {
                        1 => IndexMode::PostIndex,
                        3 => IndexMode::PreIndex,
                        _ => IndexMode::Offset,
                    };
                    (sign_extend(bits(word, 12, 9), 9), index)
                };
                Operands::Mem {
                    size: size as u8,
                    rt: reg_zr(word, 0),
                    rn: reg_sp(word, 5),
                    offset: MemOffset::Imm(offset),
                    index,
                    signed: load_sign(word),
                }
            }
            Self::MemReg => {
                let size = bits(word, 30, 2);
                let option = bits(word, 13, 3);
                if option & 2 == 0 {
                    return None;
                }
                Operands::Mem {
                    size: size as u8,
                    rt: reg_zr(word, 0),
                    rn: reg_sp(word, 5),
                    offset: MemOffset::Reg {
                        rm: reg_zr(word, 16),
                        extend: ExtendType::from_u3(option),
                        shift: if bits(word, 12, 1) == 1 { size as u8 } else { 0 },
                    },
                    index: IndexMode::Offset,
                    signed: load_sign(word),
                }
            }
            Self::MemLiteral => {
                let opc = bits(word, 30, 2);
                Operands::MemLiteral {
                    size: if opc == 1 { 3 } else { 2 },
                    rt: reg_zr(word, 0),
                    address: relative(address, bits(word, 5, 19), 19),
                    signed: opc == 2,
                }
            }
            Self::MemPair => {
                let opc = bits(word, 30, 2);
                let size = if opc == 2 { 3 } else { 2 };
                let index = match bits(word, 23, 2) {
                    1 => IndexMode::PostIndex,
                    3 => IndexMode::PreIndex,
                    _ => IndexMode::Offset,
                };
                Operands::MemPair {
                    size,
                    rt: reg_zr(word, 0),
                    rt2: reg_zr(word, 10),
                    rn: reg_sp(word, 5),
                    offset: sign_extend(bits(word, 15, 7), 7) << size,
                    index,
                    signed: opc == 1,
                }
            }
            Self::MemExclusive => Operands::MemExclusive {
                size: bits(word, 30, 2) as u8,
                rt: reg_zr(word, 0),
                rs: reg_zr(word, 16),
                rn: reg_sp(word, 5),
            },
        };
        Some(operands)
    }
}

/// Sign-extension target of a load in the immediate/register families.
const fn load_sign(word: u32) -> Option<bool> {
    let opc = bits(word, 22, 2);
    let size = bits(word, 30, 2);
    if opc < 2 {
        None
    } else if size == 2 {
        Some(true)
    } else {
        Some(opc == 2)
    }
}

/// One decoded guest instruction.
#[derive(Clone, Copy)]
pub struct OpCode {
    /// Guest address of the instruction.
    pub address: u64,
    /// Raw instruction word.
    pub raw: u32,
    /// Mnemonic.
    pub name: InstName,
    /// Extracted operands.
    pub operands: Operands,
    /// Lowering routine taken from the decode descriptor.
    pub emitter: InstEmitter,
}

impl fmt::Debug for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpCode")
            .field("address", &format_args!("{:#x}", self.address))
            .field("raw", &format_args!("{:#010x}", self.raw))
            .field("name", &self.name)
            .field("operands", &self.operands)
            .finish_non_exhaustive()
    }
}

impl OpCode {
    /// An instruction the table did not recognize, lowered by `emitter`.
    #[must_use]
    pub const fn undefined(address: u64, raw: u32, emitter: InstEmitter) -> Self {
        Self {
            address,
            raw,
            name: InstName::Undefined,
            operands: Operands::None,
            emitter,
        }
    }

    /// Address of the following instruction.
    #[must_use]
    pub const fn next_address(&self) -> u64 {
        self.address.wrapping_add(4)
    }

    /// Control-flow class of the instruction.
    #[must_use]
    pub const fn control_flow(&self) -> ControlFlow {
        self.name.control_flow()
    }

    /// Decode-time branch or call target, if the instruction has one.
    #[must_use]
    pub const fn branch_target(&self) -> Option<u64> {
        match self.operands {
            Operands::Branch { target }
            | Operands::BranchCond { target, .. }
            | Operands::BranchCompare { target, .. }
            | Operands::BranchTest { target, .. } => Some(target),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{decode_bit_mask, ExtendType, IndexMode, MemOffset, OperandLayout, Operands};
    use crate::state::{Condition, GeneralRegister, RegisterOperand};

    #[rstest]
    #[case(0, 0b000000, 0, false, Some(1))]
    #[case(1, 0b000111, 0, true, Some(0xFF))]
    #[case(1, 0b111100, 0, true, Some(0x1FFF_FFFF_FFFF_FFFF))]
    #[case(0, 0b111100, 1, true, Some(0xAAAA_AAAA_AAAA_AAAA))]
    #[case(1, 0b111111, 0, true, None)]
    #[case(1, 0b000000, 0, false, None)]
    fn logical_immediates(
        #[case] n: u32,
        #[case] imms: u32,
        #[case] immr: u32,
        #[case] sf: bool,
        #[case] expected: Option<u64>,
    ) {
        assert_eq!(decode_bit_mask(n, imms, immr, sf), expected);
    }

    #[test]
    fn add_immediate_resolves_sp_and_shift() {
        // add sp, sp, #0x10, lsl #12
        let operands = OperandLayout::AluImm.extract(0x9140_43FF, 0).expect("operands");
        assert_eq!(
            operands,
            Operands::AluImm {
                sf: true,
                rd: RegisterOperand::Sp,
                rn: RegisterOperand::Sp,
                imm: 0x10 << 12,
            }
        );
    }

    #[test]
    fn branch_targets_are_pc_relative() {
        // b.ne -8 at 0x1000
        let operands = OperandLayout::BranchCond.extract(0x54FF_FFC1, 0x1000).expect("operands");
        assert_eq!(
            operands,
            Operands::BranchCond {
                target: 0xFF8,
                cond: Condition::Ne,
            }
        );
        // bl +0x40 at 0x2000
        let operands = OperandLayout::BranchImm.extract(0x9400_0010, 0x2000).expect("operands");
        assert_eq!(operands, Operands::Branch { target: 0x2040 });
    }

    #[test]
    fn adrp_targets_page() {
        // adrp x0, #0x1000 at 0x4123
        let operands = OperandLayout::Adr.extract(0xB000_0000, 0x4123).expect("operands");
        assert_eq!(
            operands,
            Operands::Adr {
                rd: RegisterOperand::Gpr(GeneralRegister::X0),
                address: 0x5000,
            }
        );
    }

    #[test]
    fn load_store_addressing_modes() {
        // ldr x1, [sp, #16]
        let unsigned = OperandLayout::MemImm.extract(0xF940_0BE1, 0).expect("operands");
        assert!(matches!(
            unsigned,
            Operands::Mem {
                size: 3,
                rn: RegisterOperand::Sp,
                offset: MemOffset::Imm(16),
                index: IndexMode::Offset,
                signed: None,
                ..
            }
        ));
        // str x30, [sp, #-16]!
        let pre = OperandLayout::MemImm.extract(0xF81F_0FFE, 0).expect("operands");
        assert!(matches!(
            pre,
            Operands::Mem {
                offset: MemOffset::Imm(-16),
                index: IndexMode::PreIndex,
                ..
            }
        ));
        // ldrsw x0, [x1, w2, sxtw #2]
        let reg = OperandLayout::MemReg.extract(0xB8A2_D820, 0).expect("operands");
        assert!(matches!(
            reg,
            Operands::Mem {
                size: 2,
                offset: MemOffset::Reg {
                    extend: ExtendType::Sxtw,
                    shift: 2,
                    ..
                },
                signed: Some(true),
                ..
            }
        ));
    }

    #[test]
    fn sign_extension_helpers() {
        assert_eq!(ExtendType::Sxtb.apply(0x80), 0xFFFF_FFFF_FFFF_FF80);
        assert_eq!(ExtendType::Uxth.apply(0x1_2345), 0x2345);
    }
}
