//! Bit-pattern decode table.
//!
//! Patterns are 32-character strings over `0`, `1`, `x` (don't care), `<`
//! (the group must not be all ones) and `>` (the group must not be all
//! zeros). Each pattern compiles to one or more `(mask, value)` pairs which
//! are bucketed by a 12-bit index built from instruction bits `13..10` and
//! `29..22`.

use std::fmt;

use thiserror::Error;

use super::opcode::{InstName, OpCode, OperandLayout};
use crate::translator::emit::{self, InstEmitter};

const FAST_LOOKUP_SIZE: usize = 0x1000;

const fn fast_index(word: u32) -> usize {
    (((word >> 10) & 0x00F) | ((word >> 18) & 0xFF0)) as usize
}

/// Malformed decode pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// Pattern is not exactly 32 symbols long.
    #[error("pattern `{pattern}` has {len} symbols, expected 32")]
    Length {
        /// Offending pattern.
        pattern: String,
        /// Observed length.
        len: usize,
    },
    /// Pattern contains a symbol outside `01x<>`.
    #[error("pattern `{pattern}` contains invalid symbol `{symbol}`")]
    Symbol {
        /// Offending pattern.
        pattern: String,
        /// Offending symbol.
        symbol: char,
    },
}

/// What the decoder knows about one family of encodings.
#[derive(Clone, Copy)]
pub struct InstDescriptor {
    /// Mnemonic.
    pub name: InstName,
    /// Operand layout used for field extraction.
    pub layout: OperandLayout,
    /// Routine that lowers the instruction to IR.
    pub emitter: InstEmitter,
}

impl fmt::Debug for InstDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstDescriptor")
            .field("name", &self.name)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    mask: u32,
    value: u32,
    order: usize,
    descriptor: InstDescriptor,
}

impl Entry {
    const fn matches(&self, word: u32) -> bool {
        word & self.mask == self.value
    }
}

/// Immutable decode table, shared by every translator of a process.
#[derive(Debug)]
pub struct DecodeTable {
    entries: Vec<Entry>,
    buckets: Vec<Vec<usize>>,
}

/// Accumulates patterns before the table is frozen.
#[derive(Debug, Default)]
pub struct DecodeTableBuilder {
    entries: Vec<Entry>,
    patterns: usize,
}

impl DecodeTableBuilder {
    /// Adds `pattern` for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when the pattern is malformed.
    pub fn set(
        &mut self,
        pattern: &str,
        name: InstName,
        layout: OperandLayout,
        emitter: InstEmitter,
    ) -> Result<&mut Self, PatternError> {
        let descriptor = InstDescriptor {
            name,
            layout,
            emitter,
        };
        for (mask, value) in compile(pattern)? {
            self.entries.push(Entry {
                mask,
                value,
                order: self.patterns,
                descriptor,
            });
        }
        self.patterns += 1;
        Ok(self)
    }

    /// Freezes the table.
    ///
    /// Within a bucket, entries with more fixed bits are tried first; equally
    /// specific entries are tried latest-inserted first.
    #[must_use]
    pub fn build(self) -> DecodeTable {
        let mut buckets = vec![Vec::new(); FAST_LOOKUP_SIZE];
        for (slot, bucket) in buckets.iter_mut().enumerate() {
            for (index, entry) in self.entries.iter().enumerate() {
                if slot & fast_index(entry.mask) == fast_index(entry.value) {
                    bucket.push(index);
                }
            }
            bucket.sort_by(|a: &usize, b: &usize| {
                let (a, b) = (&self.entries[*a], &self.entries[*b]);
                b.mask
                    .count_ones()
                    .cmp(&a.mask.count_ones())
                    .then(b.order.cmp(&a.order))
            });
        }
        DecodeTable {
            entries: self.entries,
            buckets,
        }
    }
}

fn compile(pattern: &str) -> Result<Vec<(u32, u32)>, PatternError> {
    let symbols: Vec<char> = pattern.chars().collect();
    if symbols.len() != 32 {
        return Err(PatternError::Length {
            pattern: pattern.to_owned(),
            len: symbols.len(),
        });
    }

    let mut mask = 0u32;
    let mut value = 0u32;
    let mut not_all_ones = Vec::new();
    let mut not_all_zeros = Vec::new();
    for (position, symbol) in symbols.iter().enumerate() {
        let bit = 31 - position;
        match symbol {
            '0' => mask |= 1 << bit,
            '1' => {
                mask |= 1 << bit;
                value |= 1 << bit;
            }
            'x' => {}
            '<' => not_all_ones.push(bit),
            '>' => not_all_zeros.push(bit),
            other => {
                return Err(PatternError::Symbol {
                    pattern: pattern.to_owned(),
                    symbol: *other,
                })
            }
        }
    }

    let grouped: Vec<usize> = not_all_ones.iter().chain(&not_all_zeros).copied().collect();
    if grouped.is_empty() {
        return Ok(vec![(mask, value)]);
    }

    let group_mask = grouped.iter().fold(0u32, |acc, bit| acc | 1 << bit);
    let ones_mask = not_all_ones.iter().fold(0u32, |acc, bit| acc | 1 << bit);
    let zeros_mask = not_all_zeros.iter().fold(0u32, |acc, bit| acc | 1 << bit);
    let combinations = (0..1u32 << grouped.len()).filter_map(|combo| {
        let bits = grouped
            .iter()
            .enumerate()
            .filter(|(index, _)| combo >> index & 1 == 1)
            .fold(0u32, |acc, (_, bit)| acc | 1 << bit);
        let all_ones = ones_mask != 0 && bits & ones_mask == ones_mask;
        let all_zeros = zeros_mask != 0 && bits & zeros_mask == 0;
        (!all_ones && !all_zeros).then_some((mask | group_mask, value | bits))
    });
    Ok(combinations.collect())
}

impl DecodeTable {
    /// Starts an empty table.
    #[must_use]
    pub fn builder() -> DecodeTableBuilder {
        DecodeTableBuilder::default()
    }

    /// Number of compiled `(mask, value)` entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the highest-priority descriptor matching `word`.
    #[must_use]
    pub fn lookup(&self, word: u32) -> Option<&InstDescriptor> {
        self.buckets[fast_index(word)]
            .iter()
            .map(|index| &self.entries[*index])
            .find(|entry| entry.matches(word))
            .map(|entry| &entry.descriptor)
    }

    /// Decodes `word` fetched from `address`.
    ///
    /// Unknown encodings and reserved operand combinations decode to the
    /// [`InstName::Undefined`] sentinel.
    #[must_use]
    pub fn decode(&self, word: u32, address: u64) -> OpCode {
        self.lookup(word)
            .and_then(|descriptor| {
                descriptor
                    .layout
                    .extract(word, address)
                    .map(|operands| OpCode {
                        address,
                        raw: word,
                        name: descriptor.name,
                        operands,
                        emitter: descriptor.emitter,
                    })
            })
            .unwrap_or_else(|| OpCode::undefined(address, word, emit::undefined))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{compile, DecodeTable, PatternError};
    use crate::decoder::{InstName, OperandLayout};
    use crate::translator::emit;

    #[test]
    fn plain_pattern_compiles_to_one_entry() {
        let entries = compile("11010100001xxxxxxxxxxxxxxxx00000").expect("valid");
        assert_eq!(entries, vec![(0xFFE0_001F, 0xD420_0000)]);
    }

    #[test]
    fn not_all_ones_group_excludes_reserved_encoding() {
        let entries = compile("00001011<<0xxxxx0xxxxxxxxxxxxxxx").expect("valid");
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|(_, value)| value >> 22 & 3 != 3));
    }

    #[test]
    fn not_all_zeros_group_excludes_zero_encoding() {
        let entries = compile("xxxxxxxxxxxxxxxxxxxxxxxxxxxxx>>>").expect("valid");
        assert_eq!(entries.len(), 7);
        assert!(entries.iter().all(|(mask, value)| *mask == 7 && *value != 0));
    }

    #[rstest]
    #[case("0101", PatternError::Length { pattern: "0101".to_owned(), len: 4 })]
    #[case(
        "0000000000000000000000000000000z",
        PatternError::Symbol { pattern: "0000000000000000000000000000000z".to_owned(), symbol: 'z' }
    )]
    fn malformed_patterns_are_rejected(#[case] pattern: &str, #[case] error: PatternError) {
        assert_eq!(compile(pattern), Err(error));
    }

    #[test]
    fn more_specific_pattern_wins_regardless_of_insertion_order() {
        let mut builder = DecodeTable::builder();
        builder
            .set("11010101000000110010000000011111", InstName::Nop, OperandLayout::None, emit::system)
            .expect("nop")
            .set("11010101000000110010xxxxxxx11111", InstName::Hint, OperandLayout::None, emit::system)
            .expect("hint");
        let table = builder.build();
        assert_eq!(table.lookup(0xD503_201F).map(|d| d.name), Some(InstName::Nop));
        assert_eq!(table.lookup(0xD503_203F).map(|d| d.name), Some(InstName::Hint));
        assert!(table.lookup(0x0000_0000).is_none());
    }

    #[test]
    fn later_insertion_wins_between_equally_specific_patterns() {
        let mut builder = DecodeTable::builder();
        builder
            .set("1111xxxxxxxxxxxxxxxxxxxxxxxxxxxx", InstName::Nop, OperandLayout::None, emit::system)
            .expect("first")
            .set("xxxx1111xxxxxxxxxxxxxxxxxxxxxxxx", InstName::Hint, OperandLayout::None, emit::system)
            .expect("second");
        let table = builder.build();
        assert_eq!(table.lookup(0xFF00_0000).map(|d| d.name), Some(InstName::Hint));
        assert_eq!(table.lookup(0xF000_0000).map(|d| d.name), Some(InstName::Nop));
    }

    #[test]
    fn unknown_words_decode_to_undefined_sentinel() {
        let table = DecodeTable::builder().build();
        let op = table.decode(0x1234_5678, 0x40);
        assert_eq!(op.name, InstName::Undefined);
        assert_eq!(op.address, 0x40);
        assert!(table.is_empty());
    }
}
