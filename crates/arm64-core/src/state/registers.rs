/// Number of general-purpose registers (`X0..X30`).
pub const GENERAL_REGISTER_COUNT: usize = 31;
/// Number of SIMD&FP registers (`V0..V31`).
pub const VECTOR_REGISTER_COUNT: usize = 32;
/// Generic timer frequency reported through `CNTFRQ_EL0`.
pub const COUNTER_FREQUENCY: u64 = 19_200_000;

/// General-purpose register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum GeneralRegister {
    X0 = 0,
    X1,
    X2,
    X3,
    X4,
    X5,
    X6,
    X7,
    X8,
    X9,
    X10,
    X11,
    X12,
    X13,
    X14,
    X15,
    X16,
    X17,
    X18,
    X19,
    X20,
    X21,
    X22,
    X23,
    X24,
    X25,
    X26,
    X27,
    X28,
    X29,
    X30,
}

impl GeneralRegister {
    /// Frame pointer alias.
    pub const FP: Self = Self::X29;
    /// Link register alias.
    pub const LR: Self = Self::X30;

    /// Ordered list of all general-purpose registers.
    pub const ALL: [Self; GENERAL_REGISTER_COUNT] = [
        Self::X0,
        Self::X1,
        Self::X2,
        Self::X3,
        Self::X4,
        Self::X5,
        Self::X6,
        Self::X7,
        Self::X8,
        Self::X9,
        Self::X10,
        Self::X11,
        Self::X12,
        Self::X13,
        Self::X14,
        Self::X15,
        Self::X16,
        Self::X17,
        Self::X18,
        Self::X19,
        Self::X20,
        Self::X21,
        Self::X22,
        Self::X23,
        Self::X24,
        Self::X25,
        Self::X26,
        Self::X27,
        Self::X28,
        Self::X29,
        Self::X30,
    ];

    /// Returns the array index for this register (`0..=30`).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decodes a 5-bit register field; `31` names SP or ZR and has no
    /// general register.
    #[must_use]
    pub const fn from_u5(bits: u8) -> Option<Self> {
        if (bits as usize) < GENERAL_REGISTER_COUNT {
            Some(Self::ALL[bits as usize])
        } else {
            None
        }
    }
}

/// A register operand with the meaning of field value `31` already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterOperand {
    /// `X0..X30`.
    Gpr(GeneralRegister),
    /// Stack pointer.
    Sp,
    /// Zero register: reads as zero, writes are discarded.
    Zr,
}

impl RegisterOperand {
    /// Decodes a field where `31` is the stack pointer.
    #[must_use]
    pub const fn sp_or_gpr(bits: u8) -> Self {
        match GeneralRegister::from_u5(bits & 0x1F) {
            Some(reg) => Self::Gpr(reg),
            None => Self::Sp,
        }
    }

    /// Decodes a field where `31` is the zero register.
    #[must_use]
    pub const fn zr_or_gpr(bits: u8) -> Self {
        match GeneralRegister::from_u5(bits & 0x1F) {
            Some(reg) => Self::Gpr(reg),
            None => Self::Zr,
        }
    }
}

/// A64 condition codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Condition {
    Eq = 0,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
    Nv,
}

impl Condition {
    /// Decodes a 4-bit condition field.
    #[must_use]
    pub const fn from_u4(bits: u8) -> Self {
        match bits & 0xF {
            0 => Self::Eq,
            1 => Self::Ne,
            2 => Self::Cs,
            3 => Self::Cc,
            4 => Self::Mi,
            5 => Self::Pl,
            6 => Self::Vs,
            7 => Self::Vc,
            8 => Self::Hi,
            9 => Self::Ls,
            10 => Self::Ge,
            11 => Self::Lt,
            12 => Self::Gt,
            13 => Self::Le,
            14 => Self::Al,
            _ => Self::Nv,
        }
    }

    /// The condition with the opposite outcome (`AL`/`NV` excepted).
    #[must_use]
    pub const fn invert(self) -> Self {
        Self::from_u4(self as u8 ^ 1)
    }

    /// Evaluates the condition against `flags`.
    #[must_use]
    pub const fn holds(self, flags: Nzcv) -> bool {
        let Nzcv { n, z, c, v } = flags;
        let base = match (self as u8) >> 1 {
            0 => z,
            1 => c,
            2 => n,
            3 => v,
            4 => c && !z,
            5 => n == v,
            6 => n == v && !z,
            _ => true,
        };
        if (self as u8) & 1 == 1 && (self as u8) != 0xF {
            !base
        } else {
            base
        }
    }
}

/// Condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Nzcv {
    /// Negative.
    pub n: bool,
    /// Zero.
    pub z: bool,
    /// Carry.
    pub c: bool,
    /// Overflow.
    pub v: bool,
}

impl Nzcv {
    /// Unpacks flags from the low four bits (`N` in bit 3).
    #[must_use]
    pub const fn from_nibble(bits: u64) -> Self {
        Self {
            n: bits & 8 != 0,
            z: bits & 4 != 0,
            c: bits & 2 != 0,
            v: bits & 1 != 0,
        }
    }

    /// Packs flags into the low four bits (`N` in bit 3).
    #[must_use]
    pub const fn to_nibble(self) -> u64 {
        (self.n as u64) << 3 | (self.z as u64) << 2 | (self.c as u64) << 1 | self.v as u64
    }
}

/// System registers reachable through `MRS`/`MSR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemRegister {
    /// Condition flags in bits `31..28`.
    Nzcv,
    /// Floating-point control.
    Fpcr,
    /// Floating-point status.
    Fpsr,
    /// User read-write thread pointer.
    TpidrEl0,
    /// User read-only thread pointer.
    TpidrroEl0,
    /// Cache type.
    CtrEl0,
    /// Data cache zero ID.
    DczidEl0,
    /// Generic timer frequency.
    CntfrqEl0,
    /// Generic timer virtual count.
    CntvctEl0,
}

impl SystemRegister {
    /// Resolves the `o0:op1:CRn:CRm:op2` field (instruction bits `19..5`).
    #[must_use]
    pub const fn from_encoding(key: u16) -> Option<Self> {
        match key {
            0x5A10 => Some(Self::Nzcv),
            0x5A20 => Some(Self::Fpcr),
            0x5A21 => Some(Self::Fpsr),
            0x5E82 => Some(Self::TpidrEl0),
            0x5E83 => Some(Self::TpidrroEl0),
            0x5801 => Some(Self::CtrEl0),
            0x5807 => Some(Self::DczidEl0),
            0x5F00 => Some(Self::CntfrqEl0),
            0x5F02 => Some(Self::CntvctEl0),
            _ => None,
        }
    }
}

/// Guest register state owned by exactly one guest thread.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    x: [u64; GENERAL_REGISTER_COUNT],
    sp: u64,
    pc: u64,
    nzcv: Nzcv,
    v: [u128; VECTOR_REGISTER_COUNT],
    fpcr: u64,
    fpsr: u64,
    tpidr_el0: u64,
    tpidrro_el0: u64,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            x: [0; GENERAL_REGISTER_COUNT],
            sp: 0,
            pc: 0,
            nzcv: Nzcv::default(),
            v: [0; VECTOR_REGISTER_COUNT],
            fpcr: 0,
            fpsr: 0,
            tpidr_el0: 0,
            tpidrro_el0: 0,
        }
    }
}

impl RegisterFile {
    /// Reads a general-purpose register.
    #[must_use]
    pub const fn gpr(&self, reg: GeneralRegister) -> u64 {
        self.x[reg.index()]
    }

    /// Writes a general-purpose register.
    pub const fn set_gpr(&mut self, reg: GeneralRegister, value: u64) {
        self.x[reg.index()] = value;
    }

    /// Reads a resolved operand.
    #[must_use]
    pub const fn read(&self, operand: RegisterOperand) -> u64 {
        match operand {
            RegisterOperand::Gpr(reg) => self.gpr(reg),
            RegisterOperand::Sp => self.sp,
            RegisterOperand::Zr => 0,
        }
    }

    /// Writes a resolved operand; writes to the zero register are dropped.
    pub const fn write(&mut self, operand: RegisterOperand, value: u64) {
        match operand {
            RegisterOperand::Gpr(reg) => self.set_gpr(reg, value),
            RegisterOperand::Sp => self.sp = value,
            RegisterOperand::Zr => {}
        }
    }

    /// Reads the stack pointer.
    #[must_use]
    pub const fn sp(&self) -> u64 {
        self.sp
    }

    /// Writes the stack pointer.
    pub const fn set_sp(&mut self, value: u64) {
        self.sp = value;
    }

    /// Address of the subroutine being dispatched.
    #[must_use]
    pub const fn pc(&self) -> u64 {
        self.pc
    }

    /// Sets the dispatch address.
    pub const fn set_pc(&mut self, value: u64) {
        self.pc = value;
    }

    /// Condition flags.
    #[must_use]
    pub const fn nzcv(&self) -> Nzcv {
        self.nzcv
    }

    /// Replaces the condition flags.
    pub const fn set_nzcv(&mut self, flags: Nzcv) {
        self.nzcv = flags;
    }

    /// Reads a SIMD&FP register.
    #[must_use]
    pub const fn vector(&self, index: usize) -> u128 {
        self.v[index % VECTOR_REGISTER_COUNT]
    }

    /// Writes a SIMD&FP register.
    pub const fn set_vector(&mut self, index: usize, value: u128) {
        self.v[index % VECTOR_REGISTER_COUNT] = value;
    }

    /// Reads a system register; counter registers are supplied by the caller.
    #[must_use]
    pub const fn system(&self, reg: SystemRegister, counter: u64) -> u64 {
        match reg {
            SystemRegister::Nzcv => self.nzcv.to_nibble() << 28,
            SystemRegister::Fpcr => self.fpcr,
            SystemRegister::Fpsr => self.fpsr,
            SystemRegister::TpidrEl0 => self.tpidr_el0,
            SystemRegister::TpidrroEl0 => self.tpidrro_el0,
            // 64-byte cache lines, minimum line of 16 words.
            SystemRegister::CtrEl0 => 0x8444_C004,
            // DC ZVA prohibited.
            SystemRegister::DczidEl0 => 0x10,
            SystemRegister::CntfrqEl0 => COUNTER_FREQUENCY,
            SystemRegister::CntvctEl0 => counter,
        }
    }

    /// Writes a system register; read-only registers ignore the write.
    pub const fn set_system(&mut self, reg: SystemRegister, value: u64) {
        match reg {
            SystemRegister::Nzcv => self.nzcv = Nzcv::from_nibble(value >> 28),
            SystemRegister::Fpcr => self.fpcr = value,
            SystemRegister::Fpsr => self.fpsr = value,
            SystemRegister::TpidrEl0 => self.tpidr_el0 = value,
            SystemRegister::TpidrroEl0
            | SystemRegister::CtrEl0
            | SystemRegister::DczidEl0
            | SystemRegister::CntfrqEl0
            | SystemRegister::CntvctEl0 => {}
        }
    }

    /// Sets the read-only thread pointer; only the host may do this.
    pub const fn set_tpidrro_el0(&mut self, value: u64) {
        self.tpidrro_el0 = value;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        Condition, GeneralRegister, Nzcv, RegisterFile, RegisterOperand, SystemRegister,
        GENERAL_REGISTER_COUNT,
    };

    #[test]
    fn register_count_and_decode_match_architecture() {
        assert_eq!(GENERAL_REGISTER_COUNT, 31);
        for bits in 0_u8..31 {
            let reg = GeneralRegister::from_u5(bits).expect("valid register encoding");
            assert_eq!(reg.index(), usize::from(bits));
        }
        assert!(GeneralRegister::from_u5(31).is_none());
    }

    #[test]
    fn field_31_resolves_to_sp_or_zero_register() {
        let mut regs = RegisterFile::default();
        regs.write(RegisterOperand::sp_or_gpr(31), 0x8000);
        regs.write(RegisterOperand::zr_or_gpr(31), 0xFFFF);
        assert_eq!(regs.sp(), 0x8000);
        assert_eq!(regs.read(RegisterOperand::Zr), 0);
        assert_eq!(
            RegisterOperand::zr_or_gpr(3),
            RegisterOperand::Gpr(GeneralRegister::X3)
        );
    }

    #[test]
    fn general_register_file_tracks_each_register_independently() {
        let mut regs = RegisterFile::default();
        for (offset, reg) in (0_u64..).zip(GeneralRegister::ALL) {
            regs.set_gpr(reg, 0x1000 + offset);
        }
        for (offset, reg) in (0_u64..).zip(GeneralRegister::ALL) {
            assert_eq!(regs.gpr(reg), 0x1000 + offset);
        }
    }

    #[rstest]
    #[case(Condition::Eq, Nzcv { n: false, z: true, c: false, v: false }, true)]
    #[case(Condition::Ne, Nzcv { n: false, z: true, c: false, v: false }, false)]
    #[case(Condition::Hi, Nzcv { n: false, z: false, c: true, v: false }, true)]
    #[case(Condition::Ls, Nzcv { n: false, z: true, c: true, v: false }, true)]
    #[case(Condition::Ge, Nzcv { n: true, z: false, c: false, v: true }, true)]
    #[case(Condition::Lt, Nzcv { n: true, z: false, c: false, v: false }, true)]
    #[case(Condition::Gt, Nzcv { n: false, z: true, c: false, v: false }, false)]
    #[case(Condition::Al, Nzcv::default(), true)]
    #[case(Condition::Nv, Nzcv::default(), true)]
    fn condition_evaluation(#[case] cond: Condition, #[case] flags: Nzcv, #[case] expected: bool) {
        assert_eq!(cond.holds(flags), expected);
    }

    #[test]
    fn nzcv_system_register_uses_top_nibble() {
        let mut regs = RegisterFile::default();
        regs.set_system(SystemRegister::Nzcv, 0xA000_0000);
        assert_eq!(regs.nzcv(), Nzcv { n: true, z: false, c: true, v: false });
        assert_eq!(regs.system(SystemRegister::Nzcv, 0), 0xA000_0000);
        regs.set_system(SystemRegister::TpidrroEl0, 5);
        assert_eq!(regs.system(SystemRegister::TpidrroEl0, 0), 0);
        assert_eq!(SystemRegister::from_encoding(0x5E82), Some(SystemRegister::TpidrEl0));
    }
}
