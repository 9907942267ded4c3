//! Follows guest control flow from an entry point and groups the reachable
//! instructions into basic blocks.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::opcode::{ControlFlow, OpCode};
use super::table::DecodeTable;
use crate::fault::FaultReason;
use crate::memory::MemoryManager;

/// A straight-line run of instructions with a single entry.
#[derive(Debug, Clone)]
pub struct Block {
    /// Guest address of the first instruction.
    pub address: u64,
    /// Address one past the last decoded instruction.
    pub end_address: u64,
    /// Decoded instructions, in address order.
    pub opcodes: Vec<OpCode>,
    /// Set when fetching the instruction at `end_address` failed.
    pub fault: Option<FaultReason>,
}

impl Block {
    fn empty(address: u64) -> Self {
        Self {
            address,
            end_address: address,
            opcodes: Vec::new(),
            fault: None,
        }
    }

    /// Whether `address` falls inside the decoded range.
    #[must_use]
    pub const fn contains(&self, address: u64) -> bool {
        address >= self.address && address < self.end_address
    }

    /// Last decoded instruction.
    #[must_use]
    pub fn last(&self) -> Option<&OpCode> {
        self.opcodes.last()
    }

    fn split_off(&mut self, address: u64) -> Self {
        let index = self.opcodes.partition_point(|op| op.address < address);
        let tail = Self {
            address,
            end_address: self.end_address,
            opcodes: self.opcodes.split_off(index),
            fault: self.fault.take(),
        };
        self.end_address = address;
        tail
    }
}

fn decode_block(
    memory: &MemoryManager,
    table: &DecodeTable,
    address: u64,
    limit: Option<u64>,
    budget: usize,
) -> Block {
    let mut block = Block::empty(address);
    while block.opcodes.len() < budget && limit != Some(block.end_address) {
        let word = match memory.read_u32(block.end_address) {
            Ok(word) => word,
            Err(fault) => {
                block.fault = Some(fault);
                break;
            }
        };
        let opcode = table.decode(word, block.end_address);
        block.end_address = opcode.next_address();
        block.opcodes.push(opcode);
        if opcode.control_flow() != ControlFlow::Sequential {
            break;
        }
    }
    block
}

/// Decodes the subroutine entered at `entry`.
///
/// Calls end a block but are not followed; their return addresses are.
/// Branch targets that land inside an existing block split it. Once
/// `max_instructions` have been decoded, remaining targets are left for the
/// dispatcher. Blocks are returned in address order.
///
/// # Errors
///
/// Returns the fetch fault when the entry instruction itself cannot be read.
pub fn decode_function(
    memory: &MemoryManager,
    table: &DecodeTable,
    entry: u64,
    max_instructions: usize,
) -> Result<Vec<Block>, FaultReason> {
    let max_instructions = max_instructions.max(1);
    let mut blocks: BTreeMap<u64, Block> = BTreeMap::new();
    let mut pending = vec![entry];
    let mut decoded = 0usize;

    while let Some(address) = pending.pop() {
        if blocks.contains_key(&address) {
            continue;
        }
        if let Some((_, block)) = blocks.range_mut(..address).next_back() {
            if block.contains(address) {
                let tail = block.split_off(address);
                blocks.insert(address, tail);
                continue;
            }
        }
        if decoded >= max_instructions {
            continue;
        }

        let limit = blocks
            .range((Bound::Excluded(address), Bound::Unbounded))
            .next()
            .map(|(start, _)| *start);
        let block = decode_block(memory, table, address, limit, max_instructions - decoded);
        if block.opcodes.is_empty() {
            if let (true, Some(fault)) = (address == entry, block.fault) {
                return Err(fault);
            }
        }
        decoded += block.opcodes.len();

        if let Some(last) = block.last() {
            let next = last.next_address();
            match last.control_flow() {
                ControlFlow::Jump => pending.extend(last.branch_target()),
                ControlFlow::ConditionalJump => {
                    pending.push(next);
                    pending.extend(last.branch_target());
                }
                ControlFlow::Call | ControlFlow::IndirectCall => pending.push(next),
                ControlFlow::Sequential | ControlFlow::Return | ControlFlow::Trap => {}
            }
        }
        blocks.insert(address, block);
    }

    Ok(blocks.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::decode_function;
    use crate::config::MemoryConfig;
    use crate::decoder::{DecodeTable, InstName};
    use crate::fault::FaultCode;
    use crate::memory::MemoryManager;

    fn load(words: &[u32]) -> MemoryManager {
        let memory =
            MemoryManager::with_ram_size(0x4000, &MemoryConfig::default()).expect("memory");
        memory.map(0x1000, 0, 0x2000).expect("map");
        for (index, word) in words.iter().enumerate() {
            memory
                .write_u32(0x1000 + 4 * index as u64, *word)
                .expect("write");
        }
        memory
    }

    #[test]
    fn backward_branch_splits_existing_block() {
        // 0x1000 mov x0, #3
        // 0x1004 subs x0, x0, #1
        // 0x1008 b.ne 0x1004
        // 0x100c ret
        let memory = load(&[0xD280_0060, 0xF100_0400, 0x54FF_FFE1, 0xD65F_03C0]);
        let table = DecodeTable::a64().expect("table");
        let blocks = decode_function(&memory, &table, 0x1000, 64).expect("decode");
        let starts: Vec<u64> = blocks.iter().map(|block| block.address).collect();
        assert_eq!(starts, vec![0x1000, 0x1004, 0x100C]);
        assert_eq!(blocks[0].end_address, 0x1004);
        assert_eq!(blocks[1].opcodes.len(), 2);
        assert_eq!(blocks[2].opcodes[0].name, InstName::Ret);
    }

    #[test]
    fn call_is_not_followed_but_return_address_is() {
        // 0x1000 bl 0x1800
        // 0x1004 ret
        let memory = load(&[0x9400_0200, 0xD65F_03C0]);
        let table = DecodeTable::a64().expect("table");
        let blocks = decode_function(&memory, &table, 0x1000, 64).expect("decode");
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|block| block.address < 0x1800));
    }

    #[test]
    fn unmapped_entry_is_an_error() {
        let memory = load(&[]);
        let table = DecodeTable::a64().expect("table");
        let error = decode_function(&memory, &table, 0x8000, 64).expect_err("unmapped");
        assert_eq!(error.code, FaultCode::TranslationFault);
        assert_eq!(error.address, 0x8000);
    }

    #[test]
    fn running_off_mapped_memory_records_block_fault() {
        let memory = load(&[]);
        for offset in (0..0x2000).step_by(4) {
            // nop
            memory.write_u32(0x1000 + offset, 0xD503_201F).expect("write");
        }
        let table = DecodeTable::a64().expect("table");
        let blocks = decode_function(&memory, &table, 0x2FF8, 64).expect("decode");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].opcodes.len(), 2);
        assert_eq!(blocks[0].fault.map(|fault| fault.address), Some(0x3000));
    }

    #[test]
    fn instruction_budget_bounds_decoding() {
        let memory = load(&[0xD503_201F; 16]);
        let table = DecodeTable::a64().expect("table");
        let blocks = decode_function(&memory, &table, 0x1000, 5).expect("decode");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].end_address, 0x1014);
        assert!(blocks[0].fault.is_none());
    }
}
