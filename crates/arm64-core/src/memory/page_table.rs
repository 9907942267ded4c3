//! Lock-free radix page table mapping guest pages to offsets in guest RAM.

#![allow(unsafe_code)]

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use super::host::HostMemoryBlock;
use super::{MemoryError, PAGE_BITS, PAGE_MASK};
use crate::config::PageTableLayout;
use crate::fault::{FaultCode, FaultReason};

/// One leaf slot of the page table.
///
/// Layout: bits `0..8` hold one dirty-tracking tag per observer, bit `8` marks
/// the entry present, and bits `12..64` hold the page-aligned offset into
/// guest RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// Unmapped slot.
    pub const EMPTY: Self = Self(0);
    /// Mask of observer tag bits.
    pub const FLAGS_MASK: u64 = 0xFF;
    const PRESENT: u64 = 1 << 8;

    /// Entry mapping a page at `ram_offset` with every tag clear.
    #[must_use]
    pub const fn new(ram_offset: u64) -> Self {
        Self((ram_offset & !PAGE_MASK) | Self::PRESENT)
    }

    /// Reinterprets a raw slot value.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw slot value.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether the slot maps a page.
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0 & Self::PRESENT != 0
    }

    /// Page-aligned offset into guest RAM.
    #[must_use]
    pub const fn ram_offset(self) -> u64 {
        self.0 & !PAGE_MASK
    }

    /// Observer tag bits.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn flags(self) -> u8 {
        (self.0 & Self::FLAGS_MASK) as u8
    }

    /// Same mapping with every tag bit cleared.
    #[must_use]
    pub const fn without_flags(self) -> Self {
        Self(self.0 & !Self::FLAGS_MASK)
    }

    /// Same mapping with `mask` tag bits set.
    #[must_use]
    pub const fn with_flags(self, mask: u8) -> Self {
        Self(self.0 | mask as u64)
    }
}

type Slot = AtomicU64;

/// Radix tree of [`PageTableEntry`] slots.
///
/// Intermediate slots hold the address of the next-level node. Nodes are
/// installed with a single compare-and-swap, so first touches from several
/// threads never leak or double-install a node. Nodes live until the table
/// is dropped.
#[derive(Debug)]
pub struct PageTable {
    root: AtomicPtr<Slot>,
    address_space_bits: u32,
    level_bits: u32,
    levels: u32,
    live_nodes: AtomicUsize,
}

impl PageTable {
    /// Builds an empty table for `address_space_bits`-wide guest addresses.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidAddressSpace`] for widths that leave no
    /// page-number bits or exceed 63 bits, and a host error if the root node
    /// cannot be allocated.
    pub fn new(address_space_bits: u32, layout: PageTableLayout) -> Result<Self, MemoryError> {
        if address_space_bits <= PAGE_BITS || address_space_bits > 63 {
            return Err(MemoryError::InvalidAddressSpace(address_space_bits));
        }
        let page_number_bits = address_space_bits - PAGE_BITS;
        let level_bits = match layout {
            PageTableLayout::Flat => page_number_bits,
            PageTableLayout::MultiLevel { level_bits } => level_bits.clamp(1, page_number_bits),
        };
        let table = Self {
            root: AtomicPtr::new(ptr::null_mut()),
            address_space_bits,
            level_bits,
            levels: page_number_bits.div_ceil(level_bits),
            live_nodes: AtomicUsize::new(0),
        };
        let root = table.alloc_node()?;
        table.root.store(root, Ordering::Release);
        Ok(table)
    }

    /// Width of guest virtual addresses.
    #[must_use]
    pub const fn address_space_bits(&self) -> u32 {
        self.address_space_bits
    }

    /// Number of levels walked per translation.
    #[must_use]
    pub const fn levels(&self) -> u32 {
        self.levels
    }

    /// Number of nodes currently owned by the table.
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.live_nodes.load(Ordering::Acquire)
    }

    /// Raw root node, for consumers that walk the table themselves.
    #[must_use]
    pub fn root_ptr(&self) -> *const AtomicU64 {
        self.root.load(Ordering::Acquire)
    }

    /// Whether `va` fits in the configured address space.
    #[must_use]
    pub const fn is_valid_position(&self, va: u64) -> bool {
        va >> self.address_space_bits == 0
    }

    const fn node_len(&self) -> usize {
        1 << self.level_bits
    }

    const fn index(&self, va: u64, level: u32) -> usize {
        let shift = PAGE_BITS + (self.levels - 1 - level) * self.level_bits;
        ((va >> shift) as usize) & (self.node_len() - 1)
    }

    fn alloc_node(&self) -> Result<*mut Slot, MemoryError> {
        let block = HostMemoryBlock::allocate(self.node_len() * std::mem::size_of::<Slot>())?;
        self.live_nodes.fetch_add(1, Ordering::AcqRel);
        Ok(block.into_raw().as_ptr().cast::<Slot>())
    }

    /// # Safety
    ///
    /// `node` must come from [`Self::alloc_node`] and be unreachable.
    unsafe fn free_node(&self, node: *mut Slot) {
        if let Some(ptr) = NonNull::new(node.cast::<u8>()) {
            // SAFETY: forwarded from the caller.
            drop(unsafe { HostMemoryBlock::from_raw(ptr, self.node_len() * std::mem::size_of::<Slot>()) });
            self.live_nodes.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// # Safety
    ///
    /// `node` must be a live node of this table.
    unsafe fn slot<'a>(&'a self, node: *mut Slot, index: usize) -> &'a Slot {
        // SAFETY: index is masked to the node length.
        unsafe { &*node.add(index) }
    }

    fn check_position(&self, va: u64) -> Result<(), FaultReason> {
        if self.is_valid_position(va) {
            Ok(())
        } else {
            Err(FaultReason::new(FaultCode::AddressOutOfRange, va))
        }
    }

    /// Returns the leaf slot for `va`, allocating missing intermediate nodes.
    ///
    /// # Errors
    ///
    /// Returns an `AddressOutOfRange` fault for addresses outside the space
    /// and a host error if a node cannot be allocated.
    pub fn entry_or_insert(&self, va: u64) -> Result<&Slot, MemoryError> {
        self.check_position(va)?;
        let mut node = self.root.load(Ordering::Acquire);
        for level in 0..self.levels - 1 {
            // SAFETY: `node` is a live node reached from the root.
            let slot = unsafe { self.slot(node, self.index(va, level)) };
            let mut next = slot.load(Ordering::Acquire) as *mut Slot;
            if next.is_null() {
                let fresh = self.alloc_node()?;
                match slot.compare_exchange(0, fresh as u64, Ordering::AcqRel, Ordering::Acquire) {
                    Ok(_) => next = fresh,
                    Err(winner) => {
                        // SAFETY: `fresh` lost the race and was never published.
                        unsafe { self.free_node(fresh) };
                        next = winner as *mut Slot;
                    }
                }
            }
            node = next;
        }
        // SAFETY: `node` is a live leaf node.
        Ok(unsafe { self.slot(node, self.index(va, self.levels - 1)) })
    }

    /// Returns the leaf slot for `va` without allocating.
    #[must_use]
    pub fn entry(&self, va: u64) -> Option<&Slot> {
        if !self.is_valid_position(va) {
            return None;
        }
        let mut node = self.root.load(Ordering::Acquire);
        for level in 0..self.levels - 1 {
            // SAFETY: `node` is a live node reached from the root.
            let slot = unsafe { self.slot(node, self.index(va, level)) };
            node = slot.load(Ordering::Acquire) as *mut Slot;
            if node.is_null() {
                return None;
            }
        }
        // SAFETY: `node` is a live leaf node.
        Some(unsafe { self.slot(node, self.index(va, self.levels - 1)) })
    }

    /// Current leaf entry for `va`, empty when unmapped or out of range.
    #[must_use]
    pub fn load(&self, va: u64) -> PageTableEntry {
        self.entry(va)
            .map_or(PageTableEntry::EMPTY, |slot| PageTableEntry::from_bits(slot.load(Ordering::Acquire)))
    }

    /// # Safety
    ///
    /// `node` must be a live node at `level` that is no longer reachable.
    unsafe fn free_level(&self, node: *mut Slot, level: u32) {
        if level + 1 < self.levels {
            for index in 0..self.node_len() {
                // SAFETY: `node` is live until freed below.
                let child = unsafe { self.slot(node, index) }.load(Ordering::Acquire) as *mut Slot;
                if !child.is_null() {
                    // SAFETY: children are owned exclusively by their parent.
                    unsafe { self.free_level(child, level + 1) };
                }
            }
        }
        // SAFETY: all children are gone.
        unsafe { self.free_node(node) };
    }
}

impl Drop for PageTable {
    fn drop(&mut self) {
        let root = self.root.swap(ptr::null_mut(), Ordering::AcqRel);
        if !root.is_null() {
            // SAFETY: the root was taken out of the table; nothing else can reach it.
            unsafe { self.free_level(root, 0) };
        }
    }
}

// Nodes are plain atomics owned by the table.
unsafe impl Send for PageTable {}
unsafe impl Sync for PageTable {}
