//! Guest virtual memory: host primitives, page table, typed and atomic access.

mod access;
mod atomics;
mod host;
mod jit_block;
mod manager;
mod page_table;
mod reserved;

use thiserror::Error;

use crate::fault::FaultReason;

pub use access::{validate_alignment, Primitive};
pub use host::{host_page_size, HostMemoryBlock, HostMemoryError, MemoryProtection};
pub use jit_block::JitMemoryBlock;
pub use manager::{MemoryManager, ModifiedRange, ObserverId};
pub use page_table::{PageTable, PageTableEntry};
pub use reserved::{ReservedRegion, DEFAULT_GRANULARITY};

/// Guest page size as a power of two.
pub const PAGE_BITS: u32 = 12;
/// Guest page size in bytes.
pub const PAGE_SIZE: u64 = 1 << PAGE_BITS;
/// Mask selecting the offset within a guest page.
pub const PAGE_MASK: u64 = PAGE_SIZE - 1;

/// Failures of page-table construction and mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Host memory primitive failed.
    #[error(transparent)]
    Host(#[from] HostMemoryError),
    /// Guest address outside the configured address space.
    #[error(transparent)]
    Fault(#[from] FaultReason),
    /// Address or physical offset is not page aligned.
    #[error("address {0:#x} is not page aligned")]
    Unaligned(u64),
    /// Physical range does not fit in the backing RAM.
    #[error("physical range {pa:#x}+{size:#x} exceeds ram of {ram_size:#x} bytes")]
    RamOutOfRange {
        /// Physical offset.
        pa: u64,
        /// Range length.
        size: u64,
        /// Backing RAM size.
        ram_size: u64,
    },
    /// Address space width outside the supported range.
    #[error("unsupported address space width of {0} bits")]
    InvalidAddressSpace(u32),
}
