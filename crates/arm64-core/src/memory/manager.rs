//! Guest address space backed by one contiguous host RAM arena.

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};

use super::access::Primitive;
use super::host::HostMemoryBlock;
use super::page_table::{PageTable, PageTableEntry};
use super::{MemoryError, PAGE_MASK, PAGE_SIZE};
use crate::config::MemoryConfig;
use crate::fault::{FaultCode, FaultReason};

/// Identifies one dirty-tracking observer (`0..8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u8);

impl ObserverId {
    /// Number of independent observers a page entry can track.
    pub const COUNT: u8 = 8;

    /// Builds an observer id, rejecting values outside `0..8`.
    #[must_use]
    pub const fn new(id: u8) -> Option<Self> {
        if id < Self::COUNT {
            Some(Self(id))
        } else {
            None
        }
    }

    const fn mask(self) -> u64 {
        1 << self.0
    }
}

/// A run of guest pages written since an observer last looked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifiedRange {
    /// First byte of the run.
    pub start: u64,
    /// Run length in bytes.
    pub len: u64,
}

/// Translates guest virtual addresses into guest RAM and performs typed,
/// bulk and atomic accesses on them.
///
/// All methods take `&self`; the page table is mutated only through atomic
/// slot updates and may be shared by every guest thread of a process.
#[derive(Debug)]
pub struct MemoryManager {
    ram: HostMemoryBlock,
    page_table: PageTable,
}

impl MemoryManager {
    /// Wraps `ram` as the backing arena of a fresh, empty address space.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured address space is unsupported or
    /// the page-table root cannot be allocated.
    pub fn new(ram: HostMemoryBlock, config: &MemoryConfig) -> Result<Self, MemoryError> {
        let page_table = PageTable::new(config.address_space_bits, config.page_table)?;
        Ok(Self { ram, page_table })
    }

    /// Allocates a zeroed arena of `ram_size` bytes and wraps it.
    ///
    /// # Errors
    ///
    /// Returns a fatal host error if the arena cannot be allocated.
    pub fn with_ram_size(ram_size: usize, config: &MemoryConfig) -> Result<Self, MemoryError> {
        Self::new(HostMemoryBlock::allocate(ram_size)?, config)
    }

    /// Width of guest virtual addresses.
    #[must_use]
    pub const fn address_space_bits(&self) -> u32 {
        self.page_table.address_space_bits()
    }

    /// Size of the backing arena in bytes.
    #[must_use]
    pub const fn ram_size(&self) -> u64 {
        self.ram.size() as u64
    }

    /// Host address of the page-table root.
    #[must_use]
    pub fn page_table_root(&self) -> *const AtomicU64 {
        self.page_table.root_ptr()
    }

    /// Whether `va` lies inside the configured address space.
    #[must_use]
    pub const fn is_valid_position(&self, va: u64) -> bool {
        self.page_table.is_valid_position(va)
    }

    /// Maps `[va, va + size)` onto `[pa, pa + size)` of guest RAM.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Unaligned`] if `va` or `pa` is not page aligned,
    /// [`MemoryError::RamOutOfRange`] if the physical range exceeds RAM, and
    /// an `AddressOutOfRange` fault if the virtual range exceeds the space.
    pub fn map(&self, va: u64, pa: u64, size: u64) -> Result<(), MemoryError> {
        let pages = self.page_count(va, pa, size)?;
        let end = pages
            .checked_mul(PAGE_SIZE)
            .and_then(|len| pa.checked_add(len))
            .filter(|end| *end <= self.ram_size());
        if end.is_none() {
            return Err(MemoryError::RamOutOfRange {
                pa,
                size,
                ram_size: self.ram_size(),
            });
        }
        for page in 0..pages {
            let offset = page * PAGE_SIZE;
            let slot = self.page_table.entry_or_insert(va + offset)?;
            slot.store(PageTableEntry::new(pa + offset).bits(), Ordering::Release);
        }
        tracing::trace!(va, pa, size, "mapped guest range");
        Ok(())
    }

    /// Removes every mapping in `[va, va + size)`.
    ///
    /// # Errors
    ///
    /// Same alignment and range rules as [`Self::map`].
    pub fn unmap(&self, va: u64, size: u64) -> Result<(), MemoryError> {
        let pages = self.page_count(va, 0, size)?;
        for page in 0..pages {
            if let Some(slot) = self.page_table.entry(va + page * PAGE_SIZE) {
                slot.store(PageTableEntry::EMPTY.bits(), Ordering::Release);
            }
        }
        tracing::trace!(va, size, "unmapped guest range");
        Ok(())
    }

    fn page_count(&self, va: u64, pa: u64, size: u64) -> Result<u64, MemoryError> {
        if va & PAGE_MASK != 0 {
            return Err(MemoryError::Unaligned(va));
        }
        if pa & PAGE_MASK != 0 {
            return Err(MemoryError::Unaligned(pa));
        }
        let pages = size.div_ceil(PAGE_SIZE);
        let last = va.checked_add(pages.saturating_sub(1) * PAGE_SIZE);
        match last {
            Some(last) if self.is_valid_position(last) => Ok(pages),
            _ => Err(FaultReason::new(FaultCode::AddressOutOfRange, va).into()),
        }
    }

    /// Whether the page containing `va` is mapped.
    #[must_use]
    pub fn is_mapped(&self, va: u64) -> bool {
        self.page_table.load(va).is_present()
    }

    /// Offset into guest RAM that `va` maps to.
    ///
    /// # Errors
    ///
    /// Faults with `AddressOutOfRange` or `TranslationFault`.
    pub fn physical_address(&self, va: u64) -> Result<u64, FaultReason> {
        self.entry(va).map(|entry| entry.ram_offset() + (va & PAGE_MASK))
    }

    fn entry(&self, va: u64) -> Result<PageTableEntry, FaultReason> {
        if !self.is_valid_position(va) {
            return Err(FaultReason::new(FaultCode::AddressOutOfRange, va));
        }
        let entry = self.page_table.load(va);
        if entry.is_present() {
            Ok(entry)
        } else {
            Err(FaultReason::unmapped(va))
        }
    }

    fn host_address(&self, entry: PageTableEntry, va: u64) -> *mut u8 {
        #[allow(clippy::cast_possible_truncation)]
        let offset = (entry.ram_offset() + (va & PAGE_MASK)) as usize;
        self.ram.as_ptr().wrapping_add(offset)
    }

    /// Host address of `va` for a read.
    pub(crate) fn translate(&self, va: u64) -> Result<*mut u8, FaultReason> {
        self.entry(va).map(|entry| self.host_address(entry, va))
    }

    /// Host address of `va` for a write; clears every observer tag of the
    /// page so that dirty tracking reports it.
    pub(crate) fn translate_write(&self, va: u64) -> Result<*mut u8, FaultReason> {
        if !self.is_valid_position(va) {
            return Err(FaultReason::new(FaultCode::AddressOutOfRange, va));
        }
        let slot = self.page_table.entry(va).ok_or(FaultReason::unmapped(va))?;
        let mut current = PageTableEntry::from_bits(slot.load(Ordering::Acquire));
        loop {
            if !current.is_present() {
                return Err(FaultReason::unmapped(va));
            }
            if current.flags() == 0 {
                return Ok(self.host_address(current, va));
            }
            match slot.compare_exchange_weak(
                current.bits(),
                current.without_flags().bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(self.host_address(current, va)),
                Err(observed) => current = PageTableEntry::from_bits(observed),
            }
        }
    }

    fn read_sized(&self, va: u64, size: u64) -> Result<u64, FaultReason> {
        if size > 1 && va & (size - 1) != 0 {
            let half = size / 2;
            let low = self.read_sized(va, half)?;
            let high = self.read_sized(va.wrapping_add(half), half)?;
            return Ok(low | high << (half * 8));
        }
        let ptr = self.translate(va)?;
        // SAFETY: `ptr` is `size`-aligned inside one mapped page of the arena.
        Ok(unsafe { load_le(ptr, size) })
    }

    fn write_sized(&self, va: u64, size: u64, bits: u64) -> Result<(), FaultReason> {
        if size > 1 && va & (size - 1) != 0 {
            let half = size / 2;
            self.write_sized(va, half, bits)?;
            return self.write_sized(va.wrapping_add(half), half, bits >> (half * 8));
        }
        let ptr = self.translate_write(va)?;
        // SAFETY: `ptr` is `size`-aligned inside one mapped page of the arena.
        unsafe { store_le(ptr, size, bits) };
        Ok(())
    }

    /// Reads a little-endian scalar at `va`.
    ///
    /// Misaligned reads are split into naturally aligned halves, down to
    /// single bytes.
    ///
    /// # Errors
    ///
    /// Faults if any touched byte is unmapped or out of range.
    pub fn read<T: Primitive>(&self, va: u64) -> Result<T, FaultReason> {
        self.read_sized(va, T::SIZE).map(T::from_bits)
    }

    /// Writes a little-endian scalar at `va`.
    ///
    /// # Errors
    ///
    /// Faults if any touched byte is unmapped or out of range. Halves written
    /// before the fault stay written.
    pub fn write<T: Primitive>(&self, va: u64, value: T) -> Result<(), FaultReason> {
        self.write_sized(va, T::SIZE, value.to_bits())
    }

    /// Reads a byte.
    ///
    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn read_u8(&self, va: u64) -> Result<u8, FaultReason> {
        self.read(va)
    }

    /// Reads a 16-bit value.
    ///
    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn read_u16(&self, va: u64) -> Result<u16, FaultReason> {
        self.read(va)
    }

    /// Reads a 32-bit value.
    ///
    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn read_u32(&self, va: u64) -> Result<u32, FaultReason> {
        self.read(va)
    }

    /// Reads a 64-bit value.
    ///
    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn read_u64(&self, va: u64) -> Result<u64, FaultReason> {
        self.read(va)
    }

    /// Reads a 128-bit value as two 64-bit halves, low half first.
    ///
    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn read_u128(&self, va: u64) -> Result<u128, FaultReason> {
        let low = self.read_u64(va)?;
        let high = self.read_u64(va.wrapping_add(8))?;
        Ok(u128::from(low) | u128::from(high) << 64)
    }

    /// Writes a byte.
    ///
    /// # Errors
    ///
    /// See [`Self::write`].
    pub fn write_u8(&self, va: u64, value: u8) -> Result<(), FaultReason> {
        self.write(va, value)
    }

    /// Writes a 16-bit value.
    ///
    /// # Errors
    ///
    /// See [`Self::write`].
    pub fn write_u16(&self, va: u64, value: u16) -> Result<(), FaultReason> {
        self.write(va, value)
    }

    /// Writes a 32-bit value.
    ///
    /// # Errors
    ///
    /// See [`Self::write`].
    pub fn write_u32(&self, va: u64, value: u32) -> Result<(), FaultReason> {
        self.write(va, value)
    }

    /// Writes a 64-bit value.
    ///
    /// # Errors
    ///
    /// See [`Self::write`].
    pub fn write_u64(&self, va: u64, value: u64) -> Result<(), FaultReason> {
        self.write(va, value)
    }

    /// Writes a 128-bit value as two 64-bit halves, low half first.
    ///
    /// # Errors
    ///
    /// See [`Self::write`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_u128(&self, va: u64, value: u128) -> Result<(), FaultReason> {
        self.write_u64(va, value as u64)?;
        self.write_u64(va.wrapping_add(8), (value >> 64) as u64)
    }

    /// Copies `size` bytes starting at `va`, one page span at a time.
    ///
    /// # Errors
    ///
    /// Faults at the first unmapped or out-of-range page.
    #[allow(clippy::cast_possible_truncation)]
    pub fn read_bytes(&self, va: u64, size: usize) -> Result<Vec<u8>, FaultReason> {
        let mut data = vec![0; size];
        let mut done = 0;
        while done < size {
            let cursor = va.wrapping_add(done as u64);
            let span = (PAGE_SIZE - (cursor & PAGE_MASK)).min((size - done) as u64) as usize;
            let src = self.translate(cursor)?;
            for (i, byte) in data[done..done + span].iter_mut().enumerate() {
                // SAFETY: `src..src + span` stays inside one mapped page.
                *byte = unsafe { AtomicU8::from_ptr(src.add(i)) }.load(Ordering::Relaxed);
            }
            done += span;
        }
        Ok(data)
    }

    /// Copies `data` to `va`, one page span at a time.
    ///
    /// # Errors
    ///
    /// Faults at the first unmapped or out-of-range page; earlier pages stay
    /// written.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_bytes(&self, va: u64, data: &[u8]) -> Result<(), FaultReason> {
        let mut done = 0;
        while done < data.len() {
            let cursor = va.wrapping_add(done as u64);
            let span =
                (PAGE_SIZE - (cursor & PAGE_MASK)).min((data.len() - done) as u64) as usize;
            let dst = self.translate_write(cursor)?;
            for (i, byte) in data[done..done + span].iter().enumerate() {
                // SAFETY: `dst..dst + span` stays inside one mapped page.
                unsafe { AtomicU8::from_ptr(dst.add(i)) }.store(*byte, Ordering::Relaxed);
            }
            done += span;
        }
        Ok(())
    }

    /// Whether `[va, va + size)` is mapped onto one contiguous run of RAM.
    #[must_use]
    pub fn is_contiguous(&self, va: u64, size: u64) -> bool {
        let Ok(first) = self.entry(va) else {
            return false;
        };
        let first_page = va & !PAGE_MASK;
        let Some(span) = (va & PAGE_MASK).checked_add(size) else {
            return false;
        };
        let pages = span.div_ceil(PAGE_SIZE);
        (1..pages).all(|page| {
            let offset = page * PAGE_SIZE;
            first_page
                .checked_add(offset)
                .and_then(|page_va| self.entry(page_va).ok())
                .is_some_and(|entry| entry.ram_offset() == first.ram_offset() + offset)
        })
    }

    /// Raw host pointer to `[va, va + size)` for consumers that bypass
    /// per-access translation.
    ///
    /// Accesses through the pointer do not update dirty tracking.
    ///
    /// # Errors
    ///
    /// Faults with `TranslationFault` at `va` unless the whole range is
    /// mapped contiguously.
    pub fn host_pointer(&self, va: u64, size: u64) -> Result<*mut u8, FaultReason> {
        if self.is_contiguous(va, size) {
            self.translate(va)
        } else {
            Err(FaultReason::unmapped(va))
        }
    }

    /// Reports pages in `[va, va + size)` written since `observer` last
    /// asked, coalesced into runs, and marks them seen.
    ///
    /// Unmapped pages end a run; the scan stops at the end of the address
    /// space.
    #[must_use]
    pub fn modified_ranges(&self, va: u64, size: u64, observer: ObserverId) -> Vec<ModifiedRange> {
        let mut ranges = Vec::new();
        let mut run: Option<ModifiedRange> = None;
        let mut page = va & !PAGE_MASK;
        let end = va.saturating_add(size);

        while page < end && self.is_valid_position(page) {
            let dirty = self
                .page_table
                .entry(page)
                .is_some_and(|slot| mark_seen(slot, observer));
            if dirty {
                match run.as_mut() {
                    Some(current) => current.len += PAGE_SIZE,
                    None => {
                        run = Some(ModifiedRange {
                            start: page,
                            len: PAGE_SIZE,
                        });
                    }
                }
            } else if let Some(done) = run.take() {
                ranges.push(done);
            }
            page += PAGE_SIZE;
        }
        ranges.extend(run);
        ranges
    }
}

/// Sets `observer`'s tag on a present entry; returns whether it was clear.
fn mark_seen(slot: &AtomicU64, observer: ObserverId) -> bool {
    let mut current = slot.load(Ordering::Acquire);
    loop {
        let entry = PageTableEntry::from_bits(current);
        if !entry.is_present() || current & observer.mask() != 0 {
            return false;
        }
        match slot.compare_exchange_weak(
            current,
            current | observer.mask(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return true,
            Err(observed) => current = observed,
        }
    }
}

/// # Safety
///
/// `ptr` must be valid and aligned for `size` bytes.
#[allow(clippy::cast_ptr_alignment)]
unsafe fn load_le(ptr: *mut u8, size: u64) -> u64 {
    // SAFETY: forwarded from the caller.
    unsafe {
        match size {
            1 => u64::from(AtomicU8::from_ptr(ptr).load(Ordering::Relaxed)),
            2 => u64::from(u16::from_le(AtomicU16::from_ptr(ptr.cast()).load(Ordering::Relaxed))),
            4 => u64::from(u32::from_le(AtomicU32::from_ptr(ptr.cast()).load(Ordering::Relaxed))),
            _ => u64::from_le(AtomicU64::from_ptr(ptr.cast()).load(Ordering::Relaxed)),
        }
    }
}

/// # Safety
///
/// `ptr` must be valid and aligned for `size` bytes.
#[allow(clippy::cast_ptr_alignment, clippy::cast_possible_truncation)]
unsafe fn store_le(ptr: *mut u8, size: u64, bits: u64) {
    // SAFETY: forwarded from the caller.
    unsafe {
        match size {
            1 => AtomicU8::from_ptr(ptr).store(bits as u8, Ordering::Relaxed),
            2 => AtomicU16::from_ptr(ptr.cast()).store((bits as u16).to_le(), Ordering::Relaxed),
            4 => AtomicU32::from_ptr(ptr.cast()).store((bits as u32).to_le(), Ordering::Relaxed),
            _ => AtomicU64::from_ptr(ptr.cast()).store(bits.to_le(), Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{MemoryManager, ModifiedRange, ObserverId};
    use crate::config::{MemoryConfig, PageTableLayout};
    use crate::fault::{FaultCode, FaultReason};
    use crate::memory::MemoryError;

    fn manager(ram: usize) -> MemoryManager {
        MemoryManager::with_ram_size(ram, &MemoryConfig::default()).expect("memory manager")
    }

    #[test]
    fn map_write_read_unmap_scenario() {
        let memory = manager(0x10000);
        memory.map(0x1000, 0, 0x2000).expect("map");
        memory.write_u32(0x1004, 0xDEAD_BEEF).expect("write");
        assert_eq!(memory.read_u32(0x1004), Ok(0xDEAD_BEEF));
        memory.unmap(0x1000, 0x2000).expect("unmap");
        assert!(!memory.is_mapped(0x1004));
        assert_eq!(
            memory.read_u32(0x1004).expect_err("unmapped").code,
            FaultCode::TranslationFault
        );
    }

    #[test]
    fn unmap_leaves_neighbours_mapped() {
        let memory = manager(0x10000);
        memory.map(0x0, 0, 0x4000).expect("map");
        memory.unmap(0x1000, 0x2000).expect("unmap");
        assert!(memory.is_mapped(0x0));
        assert!(!memory.is_mapped(0x1000));
        assert!(!memory.is_mapped(0x2FFF));
        assert!(memory.is_mapped(0x3000));
    }

    #[test]
    fn unaligned_read_composes_little_endian_halves() {
        let memory = manager(0x10000);
        memory.map(0x0, 0, 0x2000).expect("map");
        memory
            .write_bytes(0xFFD, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88])
            .expect("write");
        assert_eq!(memory.read_u32(0xFFF), Ok(0x6655_4433));
        assert_eq!(memory.read_u16(0xFFE), Ok(0x3322));
        assert_eq!(memory.read_u64(0xFFD), Ok(0x8877_6655_4433_2211));
        assert_eq!(memory.read::<i8>(0x1004), Ok(-120));
    }

    #[test]
    fn physical_address_follows_mapping() {
        let memory = manager(0x10000);
        memory.map(0x40_0000, 0x3000, 0x1000).expect("map");
        assert_eq!(memory.physical_address(0x40_0123), Ok(0x3123));
        assert_eq!(
            memory.physical_address(0x40_1000).expect_err("unmapped").code,
            FaultCode::TranslationFault
        );
    }

    #[rstest]
    #[case(0x1001, 0, 0x1000)]
    #[case(0x1000, 0x10, 0x1000)]
    fn map_rejects_unaligned_addresses(#[case] va: u64, #[case] pa: u64, #[case] size: u64) {
        let memory = manager(0x10000);
        assert!(matches!(memory.map(va, pa, size), Err(MemoryError::Unaligned(_))));
    }

    #[test]
    fn map_rejects_ranges_beyond_ram() {
        let memory = manager(0x2000);
        assert!(matches!(
            memory.map(0x0, 0x1000, 0x2000),
            Err(MemoryError::RamOutOfRange { .. })
        ));
        assert!(matches!(
            memory.map(0x0, 0xFFFF_FFFF_FFFF_F000, 0x2000),
            Err(MemoryError::RamOutOfRange { .. })
        ));
        assert!(!memory.is_mapped(0x0));
    }

    #[test]
    fn addresses_outside_space_fault_explicitly() {
        let config = MemoryConfig {
            address_space_bits: 32,
            page_table: PageTableLayout::Flat,
        };
        let memory = MemoryManager::with_ram_size(0x1000, &config).expect("memory");
        assert_eq!(
            memory.read_u8(1 << 32).expect_err("outside").code,
            FaultCode::AddressOutOfRange
        );
        assert!(memory.map(1 << 32, 0, 0x1000).is_err());
    }

    #[test]
    fn bulk_copy_crosses_page_boundaries() {
        let memory = manager(0x10000);
        memory.map(0x8000, 0x4000, 0x3000).expect("map");
        let data: Vec<u8> = (0..0x2100u32).map(|i| (i % 251) as u8).collect();
        memory.write_bytes(0x8F80, &data).expect("write");
        assert_eq!(memory.read_bytes(0x8F80, data.len()), Ok(data));
    }

    #[test]
    fn bulk_read_faults_at_first_unmapped_page() {
        let memory = manager(0x10000);
        memory.map(0x0, 0, 0x1000).expect("map");
        let err = memory.read_bytes(0xF00, 0x200).expect_err("crosses into hole");
        assert_eq!(err.address, 0x1000);
    }

    #[test]
    fn dirty_pages_are_reported_once_per_observer() {
        let memory = manager(0x10000);
        memory.map(0x0, 0, 0x4000).expect("map");
        let gpu = ObserverId::new(0).expect("observer");
        let audio = ObserverId::new(3).expect("observer");

        assert_eq!(
            memory.modified_ranges(0x0, 0x4000, gpu),
            vec![ModifiedRange { start: 0, len: 0x4000 }]
        );
        assert!(memory.modified_ranges(0x0, 0x4000, gpu).is_empty());

        memory.write_u8(0x2010, 1).expect("write");
        assert_eq!(
            memory.modified_ranges(0x0, 0x4000, gpu),
            vec![ModifiedRange { start: 0x2000, len: 0x1000 }]
        );
        assert_eq!(memory.modified_ranges(0x0, 0x4000, audio).len(), 1);
        assert!(memory.modified_ranges(0x0, 0x4000, audio).is_empty());
    }

    #[test]
    fn unmapped_pages_split_modified_runs() {
        let memory = manager(0x10000);
        memory.map(0x0, 0, 0x1000).expect("map");
        memory.map(0x2000, 0x2000, 0x1000).expect("map");
        let observer = ObserverId::new(7).expect("observer");
        assert_eq!(
            memory.modified_ranges(0x0, 0x3000, observer),
            vec![
                ModifiedRange { start: 0, len: 0x1000 },
                ModifiedRange { start: 0x2000, len: 0x1000 },
            ]
        );
        assert!(ObserverId::new(8).is_none());
    }

    #[test]
    fn contiguity_tracks_physical_layout() {
        let memory = manager(0x10000);
        memory.map(0x0, 0, 0x2000).expect("map");
        memory.map(0x2000, 0x8000, 0x1000).expect("map");
        assert!(memory.is_contiguous(0x800, 0x1000));
        assert!(!memory.is_contiguous(0x1800, 0x1000));
        assert!(memory.host_pointer(0x0, 0x2000).is_ok());
        assert!(memory.host_pointer(0x0, 0x3000).is_err());
    }

    #[test]
    fn oversized_host_pointer_request_faults_at_start() {
        let memory = manager(0x10000);
        memory.map(0x1000, 0, 0x1000).expect("map");
        assert!(!memory.is_contiguous(0x1800, u64::MAX));
        assert_eq!(
            memory.host_pointer(0x1800, u64::MAX),
            Err(FaultReason::unmapped(0x1800))
        );
    }

    #[test]
    fn page_table_root_is_exposed() {
        let memory = manager(0x1000);
        assert!(!memory.page_table_root().is_null());
        assert_eq!(memory.address_space_bits(), 48);
    }
}
