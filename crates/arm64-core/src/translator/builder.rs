//! Lowers a decoded block graph into an [`IrFunction`].

use std::collections::{HashMap, HashSet};

use super::emit::{EmitterContext, SubResolver};
use super::ir::{IrBlock, IrFunction, Terminator};
use crate::decoder::Block;

/// IR of one subroutine plus the direct-call targets that were not yet
/// translated when it was built.
#[derive(Debug)]
pub struct LoweredFunction {
    /// The lowered subroutine.
    pub function: IrFunction,
    /// Addresses called through the dispatcher.
    pub sub_calls: HashSet<u64>,
}

/// Lowers `blocks`, the block graph of the subroutine at `entry`.
///
/// Blocks without a terminating instruction fall through to the block at
/// their end address, or trap with the fetch fault recorded for it.
#[must_use]
pub fn build_function(
    entry: u64,
    blocks: &[Block],
    synchronize_backward_branches: bool,
    resolver: SubResolver<'_>,
) -> LoweredFunction {
    let indices: HashMap<u64, usize> = blocks
        .iter()
        .enumerate()
        .map(|(index, block)| (block.address, index))
        .collect();
    let mut ctx = EmitterContext::new(&indices, resolver, synchronize_backward_branches);
    let mut lowered = Vec::with_capacity(blocks.len());

    for block in blocks {
        let mut last = block.address;
        for opcode in &block.opcodes {
            last = opcode.address;
            (opcode.emitter)(&mut ctx, opcode);
            if ctx.is_terminated() {
                break;
            }
        }
        let (statements, terminator) = ctx.take_block();
        let terminator = terminator.unwrap_or_else(|| match block.fault {
            Some(fault) => Terminator::Trap(fault),
            None => Terminator::Jump(ctx.target(last, block.end_address)),
        });
        lowered.push(IrBlock {
            address: block.address,
            statements,
            terminator,
        });
    }

    let entry_index = indices.get(&entry).copied().unwrap_or_default();
    let (locals, sub_calls) = ctx.finish();
    LoweredFunction {
        function: IrFunction {
            address: entry,
            entry: entry_index,
            blocks: lowered,
            locals,
        },
        sub_calls,
    }
}
