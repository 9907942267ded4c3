//! The A64 integer instruction patterns.

use super::opcode::{InstName as I, OperandLayout as L};
use super::table::{DecodeTable, PatternError};
use crate::translator::emit::{self as e, InstEmitter};

/// One row of the A64 pattern list.
pub type PatternRow = (&'static str, I, L, InstEmitter);

/// A64 patterns in insertion order.
pub const A64_PATTERNS: &[PatternRow] = &[
    ("x0011010000xxxxx000000xxxxxxxxxx", I::Adc, L::Alu, e::arithmetic),
    ("x0111010000xxxxx000000xxxxxxxxxx", I::Adcs, L::Alu, e::arithmetic),
    ("x00100010xxxxxxxxxxxxxxxxxxxxxxx", I::Add, L::AluImm, e::arithmetic),
    ("00001011<<0xxxxx0xxxxxxxxxxxxxxx", I::Add, L::AluShifted, e::arithmetic),
    ("10001011<<0xxxxxxxxxxxxxxxxxxxxx", I::Add, L::AluShifted, e::arithmetic),
    ("x0001011001xxxxxxxx0xxxxxxxxxxxx", I::Add, L::AluExtended, e::arithmetic),
    ("x0001011001xxxxxxxx100xxxxxxxxxx", I::Add, L::AluExtended, e::arithmetic),
    ("x01100010xxxxxxxxxxxxxxxxxxxxxxx", I::Adds, L::AluImm, e::arithmetic),
    ("00101011<<0xxxxx0xxxxxxxxxxxxxxx", I::Adds, L::AluShifted, e::arithmetic),
    ("10101011<<0xxxxxxxxxxxxxxxxxxxxx", I::Adds, L::AluShifted, e::arithmetic),
    ("x0101011001xxxxxxxx0xxxxxxxxxxxx", I::Adds, L::AluExtended, e::arithmetic),
    ("x0101011001xxxxxxxx100xxxxxxxxxx", I::Adds, L::AluExtended, e::arithmetic),
    ("0xx10000xxxxxxxxxxxxxxxxxxxxxxxx", I::Adr, L::Adr, e::address),
    ("1xx10000xxxxxxxxxxxxxxxxxxxxxxxx", I::Adrp, L::Adr, e::address),
    ("0001001000xxxxxxxxxxxxxxxxxxxxxx", I::And, L::AluLogicalImm, e::logical),
    ("100100100xxxxxxxxxxxxxxxxxxxxxxx", I::And, L::AluLogicalImm, e::logical),
    ("00001010xx0xxxxx0xxxxxxxxxxxxxxx", I::And, L::AluShifted, e::logical),
    ("10001010xx0xxxxxxxxxxxxxxxxxxxxx", I::And, L::AluShifted, e::logical),
    ("0111001000xxxxxxxxxxxxxxxxxxxxxx", I::Ands, L::AluLogicalImm, e::logical),
    ("111100100xxxxxxxxxxxxxxxxxxxxxxx", I::Ands, L::AluLogicalImm, e::logical),
    ("01101010xx0xxxxx0xxxxxxxxxxxxxxx", I::Ands, L::AluShifted, e::logical),
    ("11101010xx0xxxxxxxxxxxxxxxxxxxxx", I::Ands, L::AluShifted, e::logical),
    ("x0011010110xxxxx001010xxxxxxxxxx", I::Asrv, L::Alu, e::data_processing),
    ("000101xxxxxxxxxxxxxxxxxxxxxxxxxx", I::B, L::BranchImm, e::branch),
    ("01010100xxxxxxxxxxxxxxxxxxx0xxxx", I::BCond, L::BranchCond, e::branch),
    ("00110011000xxxxx0xxxxxxxxxxxxxxx", I::Bfm, L::Bitfield, e::bitfield),
    ("1011001101xxxxxxxxxxxxxxxxxxxxxx", I::Bfm, L::Bitfield, e::bitfield),
    ("00001010xx1xxxxx0xxxxxxxxxxxxxxx", I::Bic, L::AluShifted, e::logical),
    ("10001010xx1xxxxxxxxxxxxxxxxxxxxx", I::Bic, L::AluShifted, e::logical),
    ("01101010xx1xxxxx0xxxxxxxxxxxxxxx", I::Bics, L::AluShifted, e::logical),
    ("11101010xx1xxxxxxxxxxxxxxxxxxxxx", I::Bics, L::AluShifted, e::logical),
    ("100101xxxxxxxxxxxxxxxxxxxxxxxxxx", I::Bl, L::BranchImm, e::branch),
    ("1101011000111111000000xxxxx00000", I::Blr, L::BranchReg, e::branch),
    ("1101011000011111000000xxxxx00000", I::Br, L::BranchReg, e::branch),
    ("11010100001xxxxxxxxxxxxxxxx00000", I::Brk, L::Exception, e::exception),
    ("x0110101xxxxxxxxxxxxxxxxxxxxxxxx", I::Cbnz, L::BranchCompare, e::branch),
    ("x0110100xxxxxxxxxxxxxxxxxxxxxxxx", I::Cbz, L::BranchCompare, e::branch),
    ("x0111010010xxxxxxxxx10xxxxx0xxxx", I::Ccmn, L::CondCompareImm, e::conditional),
    ("x0111010010xxxxxxxxx00xxxxx0xxxx", I::Ccmn, L::CondCompareReg, e::conditional),
    ("x1111010010xxxxxxxxx10xxxxx0xxxx", I::Ccmp, L::CondCompareImm, e::conditional),
    ("x1111010010xxxxxxxxx00xxxxx0xxxx", I::Ccmp, L::CondCompareReg, e::conditional),
    ("11010101000000110011xxxx01011111", I::Clrex, L::None, e::system),
    ("x101101011000000000101xxxxxxxxxx", I::Cls, L::Alu, e::data_processing),
    ("x101101011000000000100xxxxxxxxxx", I::Clz, L::Alu, e::data_processing),
    ("x0011010100xxxxxxxxx00xxxxxxxxxx", I::Csel, L::CondSelect, e::conditional),
    ("x0011010100xxxxxxxxx01xxxxxxxxxx", I::Csinc, L::CondSelect, e::conditional),
    ("x1011010100xxxxxxxxx00xxxxxxxxxx", I::Csinv, L::CondSelect, e::conditional),
    ("x1011010100xxxxxxxxx01xxxxxxxxxx", I::Csneg, L::CondSelect, e::conditional),
    ("11010101000000110011xxxx10111111", I::Dmb, L::None, e::system),
    ("11010101000000110011xxxx10011111", I::Dsb, L::None, e::system),
    ("01001010xx1xxxxx0xxxxxxxxxxxxxxx", I::Eon, L::AluShifted, e::logical),
    ("11001010xx1xxxxxxxxxxxxxxxxxxxxx", I::Eon, L::AluShifted, e::logical),
    ("0101001000xxxxxxxxxxxxxxxxxxxxxx", I::Eor, L::AluLogicalImm, e::logical),
    ("110100100xxxxxxxxxxxxxxxxxxxxxxx", I::Eor, L::AluLogicalImm, e::logical),
    ("01001010xx0xxxxx0xxxxxxxxxxxxxxx", I::Eor, L::AluShifted, e::logical),
    ("11001010xx0xxxxxxxxxxxxxxxxxxxxx", I::Eor, L::AluShifted, e::logical),
    ("00010011100xxxxx0xxxxxxxxxxxxxxx", I::Extr, L::Extract, e::data_processing),
    ("10010011110xxxxxxxxxxxxxxxxxxxxx", I::Extr, L::Extract, e::data_processing),
    ("11010101000000110010xxxxxxx11111", I::Hint, L::None, e::system),
    ("11010101000000110011xxxx11011111", I::Isb, L::None, e::system),
    ("xx001000110xxxxx1xxxxxxxxxxxxxxx", I::Ldar, L::MemExclusive, e::exclusive),
    ("xx001000010xxxxx1xxxxxxxxxxxxxxx", I::Ldaxr, L::MemExclusive, e::exclusive),
    ("<<10100xx1xxxxxxxxxxxxxxxxxxxxxx", I::Ldp, L::MemPair, e::load_store),
    ("xx111000010xxxxxxxxxxxxxxxxxxxxx", I::Ldr, L::MemImm, e::load_store),
    ("xx11100101xxxxxxxxxxxxxxxxxxxxxx", I::Ldr, L::MemImm, e::load_store),
    ("xx111000011xxxxxxxxx10xxxxxxxxxx", I::Ldr, L::MemReg, e::load_store),
    ("xx011000xxxxxxxxxxxxxxxxxxxxxxxx", I::LdrLiteral, L::MemLiteral, e::load_store),
    ("0x1110001x0xxxxxxxxxxxxxxxxxxxxx", I::Ldrs, L::MemImm, e::load_store),
    ("0x1110011xxxxxxxxxxxxxxxxxxxxxxx", I::Ldrs, L::MemImm, e::load_store),
    ("10111000100xxxxxxxxxxxxxxxxxxxxx", I::Ldrs, L::MemImm, e::load_store),
    ("1011100110xxxxxxxxxxxxxxxxxxxxxx", I::Ldrs, L::MemImm, e::load_store),
    ("0x1110001x1xxxxxxxxx10xxxxxxxxxx", I::Ldrs, L::MemReg, e::load_store),
    ("10111000101xxxxxxxxx10xxxxxxxxxx", I::Ldrs, L::MemReg, e::load_store),
    ("xx001000010xxxxx0xxxxxxxxxxxxxxx", I::Ldxr, L::MemExclusive, e::exclusive),
    ("x0011010110xxxxx001000xxxxxxxxxx", I::Lslv, L::Alu, e::data_processing),
    ("x0011010110xxxxx001001xxxxxxxxxx", I::Lsrv, L::Alu, e::data_processing),
    ("x0011011000xxxxx0xxxxxxxxxxxxxxx", I::Madd, L::Mul, e::multiply),
    ("0111001010xxxxxxxxxxxxxxxxxxxxxx", I::Movk, L::Move, e::move_wide),
    ("111100101xxxxxxxxxxxxxxxxxxxxxxx", I::Movk, L::Move, e::move_wide),
    ("0001001010xxxxxxxxxxxxxxxxxxxxxx", I::Movn, L::Move, e::move_wide),
    ("100100101xxxxxxxxxxxxxxxxxxxxxxx", I::Movn, L::Move, e::move_wide),
    ("0101001010xxxxxxxxxxxxxxxxxxxxxx", I::Movz, L::Move, e::move_wide),
    ("110100101xxxxxxxxxxxxxxxxxxxxxxx", I::Movz, L::Move, e::move_wide),
    ("110101010011xxxxxxxxxxxxxxxxxxxx", I::Mrs, L::System, e::system),
    ("110101010001xxxxxxxxxxxxxxxxxxxx", I::Msr, L::System, e::system),
    ("x0011011000xxxxx1xxxxxxxxxxxxxxx", I::Msub, L::Mul, e::multiply),
    ("11010101000000110010000000011111", I::Nop, L::None, e::system),
    ("00101010xx1xxxxx0xxxxxxxxxxxxxxx", I::Orn, L::AluShifted, e::logical),
    ("10101010xx1xxxxxxxxxxxxxxxxxxxxx", I::Orn, L::AluShifted, e::logical),
    ("0011001000xxxxxxxxxxxxxxxxxxxxxx", I::Orr, L::AluLogicalImm, e::logical),
    ("101100100xxxxxxxxxxxxxxxxxxxxxxx", I::Orr, L::AluLogicalImm, e::logical),
    ("00101010xx0xxxxx0xxxxxxxxxxxxxxx", I::Orr, L::AluShifted, e::logical),
    ("10101010xx0xxxxxxxxxxxxxxxxxxxxx", I::Orr, L::AluShifted, e::logical),
    ("1111100110xxxxxxxxxxxxxxxxxxxxxx", I::Prfm, L::MemImm, e::load_store),
    ("11111000100xxxxxxxxx00xxxxxxxxxx", I::Prfm, L::MemImm, e::load_store),
    ("11011000xxxxxxxxxxxxxxxxxxxxxxxx", I::Prfm, L::MemLiteral, e::load_store),
    ("x101101011000000000000xxxxxxxxxx", I::Rbit, L::Alu, e::data_processing),
    ("1101011001011111000000xxxxx00000", I::Ret, L::BranchReg, e::branch),
    ("x101101011000000000001xxxxxxxxxx", I::Rev16, L::Alu, e::data_processing),
    ("x101101011000000000010xxxxxxxxxx", I::Rev32, L::Alu, e::data_processing),
    ("1101101011000000000011xxxxxxxxxx", I::Rev64, L::Alu, e::data_processing),
    ("x0011010110xxxxx001011xxxxxxxxxx", I::Rorv, L::Alu, e::data_processing),
    ("x1011010000xxxxx000000xxxxxxxxxx", I::Sbc, L::Alu, e::arithmetic),
    ("x1111010000xxxxx000000xxxxxxxxxx", I::Sbcs, L::Alu, e::arithmetic),
    ("00010011000xxxxx0xxxxxxxxxxxxxxx", I::Sbfm, L::Bitfield, e::bitfield),
    ("1001001101xxxxxxxxxxxxxxxxxxxxxx", I::Sbfm, L::Bitfield, e::bitfield),
    ("x0011010110xxxxx000011xxxxxxxxxx", I::Sdiv, L::Alu, e::data_processing),
    ("10011011001xxxxx0xxxxxxxxxxxxxxx", I::Smaddl, L::Mul, e::multiply),
    ("10011011001xxxxx1xxxxxxxxxxxxxxx", I::Smsubl, L::Mul, e::multiply),
    ("10011011010xxxxx0xxxxxxxxxxxxxxx", I::Smulh, L::Mul, e::multiply),
    ("xx001000100xxxxx1xxxxxxxxxxxxxxx", I::Stlr, L::MemExclusive, e::exclusive),
    ("xx001000000xxxxx1xxxxxxxxxxxxxxx", I::Stlxr, L::MemExclusive, e::exclusive),
    ("x010100xx0xxxxxxxxxxxxxxxxxxxxxx", I::Stp, L::MemPair, e::load_store),
    ("xx111000000xxxxxxxxxxxxxxxxxxxxx", I::Str, L::MemImm, e::load_store),
    ("xx11100100xxxxxxxxxxxxxxxxxxxxxx", I::Str, L::MemImm, e::load_store),
    ("xx111000001xxxxxxxxx10xxxxxxxxxx", I::Str, L::MemReg, e::load_store),
    ("xx001000000xxxxx0xxxxxxxxxxxxxxx", I::Stxr, L::MemExclusive, e::exclusive),
    ("x10100010xxxxxxxxxxxxxxxxxxxxxxx", I::Sub, L::AluImm, e::arithmetic),
    ("01001011<<0xxxxx0xxxxxxxxxxxxxxx", I::Sub, L::AluShifted, e::arithmetic),
    ("11001011<<0xxxxxxxxxxxxxxxxxxxxx", I::Sub, L::AluShifted, e::arithmetic),
    ("x1001011001xxxxxxxx0xxxxxxxxxxxx", I::Sub, L::AluExtended, e::arithmetic),
    ("x1001011001xxxxxxxx100xxxxxxxxxx", I::Sub, L::AluExtended, e::arithmetic),
    ("x11100010xxxxxxxxxxxxxxxxxxxxxxx", I::Subs, L::AluImm, e::arithmetic),
    ("01101011<<0xxxxx0xxxxxxxxxxxxxxx", I::Subs, L::AluShifted, e::arithmetic),
    ("11101011<<0xxxxxxxxxxxxxxxxxxxxx", I::Subs, L::AluShifted, e::arithmetic),
    ("x1101011001xxxxxxxx0xxxxxxxxxxxx", I::Subs, L::AluExtended, e::arithmetic),
    ("x1101011001xxxxxxxx100xxxxxxxxxx", I::Subs, L::AluExtended, e::arithmetic),
    ("11010100000xxxxxxxxxxxxxxxx00001", I::Svc, L::Exception, e::exception),
    ("x0110111xxxxxxxxxxxxxxxxxxxxxxxx", I::Tbnz, L::BranchTest, e::branch),
    ("x0110110xxxxxxxxxxxxxxxxxxxxxxxx", I::Tbz, L::BranchTest, e::branch),
    ("01010011000xxxxx0xxxxxxxxxxxxxxx", I::Ubfm, L::Bitfield, e::bitfield),
    ("1101001101xxxxxxxxxxxxxxxxxxxxxx", I::Ubfm, L::Bitfield, e::bitfield),
    ("x0011010110xxxxx000010xxxxxxxxxx", I::Udiv, L::Alu, e::data_processing),
    ("10011011101xxxxx0xxxxxxxxxxxxxxx", I::Umaddl, L::Mul, e::multiply),
    ("10011011101xxxxx1xxxxxxxxxxxxxxx", I::Umsubl, L::Mul, e::multiply),
    ("10011011110xxxxx0xxxxxxxxxxxxxxx", I::Umulh, L::Mul, e::multiply),
];

impl DecodeTable {
    /// Builds the A64 integer decode table.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if a built-in pattern is malformed.
    pub fn a64() -> Result<Self, PatternError> {
        let mut builder = Self::builder();
        for (pattern, name, layout, emitter) in A64_PATTERNS {
            builder.set(pattern, *name, *layout, *emitter)?;
        }
        let table = builder.build();
        tracing::debug!(entries = table.len(), "built A64 decode table");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::decoder::{DecodeTable, InstName};

    #[rstest]
    #[case(0xD503_201F, InstName::Nop)]
    #[case(0xD503_203F, InstName::Hint)]
    #[case(0xD65F_03C0, InstName::Ret)]
    #[case(0xD420_0000, InstName::Brk)]
    #[case(0xD400_0001, InstName::Svc)]
    #[case(0x9100_0420, InstName::Add)]
    #[case(0x8B02_0020, InstName::Add)]
    #[case(0xEB02_003F, InstName::Subs)]
    #[case(0xAA01_03E0, InstName::Orr)]
    #[case(0xD280_0540, InstName::Movz)]
    #[case(0x9400_0010, InstName::Bl)]
    #[case(0x5400_0041, InstName::BCond)]
    #[case(0xF940_0BE1, InstName::Ldr)]
    #[case(0xA9BF_7BFD, InstName::Stp)]
    #[case(0xA8C1_7BFD, InstName::Ldp)]
    #[case(0x885F_7C20, InstName::Ldxr)]
    #[case(0x8802_7C20, InstName::Stxr)]
    #[case(0xD53B_D040, InstName::Mrs)]
    #[case(0x9AC2_0C20, InstName::Sdiv)]
    #[case(0x1AC2_0820, InstName::Udiv)]
    #[case(0x9B02_7C20, InstName::Madd)]
    #[case(0x0000_0000, InstName::Undefined)]
    #[case(0xFFFF_FFFF, InstName::Undefined)]
    fn a64_encodings_decode_to_expected_mnemonic(#[case] word: u32, #[case] name: InstName) {
        let table = DecodeTable::a64().expect("table builds");
        assert_eq!(table.decode(word, 0x1000).name, name);
    }

    #[test]
    fn shifted_add_with_reserved_shift_is_undefined() {
        let table = DecodeTable::a64().expect("table builds");
        // add x0, x1, x2, <shift=11>
        assert_eq!(table.decode(0x8BC2_0020, 0).name, InstName::Undefined);
    }
}
