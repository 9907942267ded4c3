//! Host virtual-memory primitives: reserve, commit, reprotect and free.
//!
//! All raw OS interaction of the crate lives here. Failures are classified
//! at this boundary into fatal (out of memory, unsupported platform) and
//! recoverable (reprotect failure, write tracking not available) errors.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use thiserror::Error;

/// Access protection applied to a range of host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MemoryProtection {
    /// Inaccessible.
    None,
    /// Read-only.
    Read,
    /// Readable and writable.
    ReadWrite,
    /// Readable and executable.
    ReadExecute,
    /// Readable, writable and executable.
    ReadWriteExecute,
    /// Execute-only.
    Execute,
}

/// Failures reported by host memory primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostMemoryError {
    /// The host refused to reserve or commit memory.
    #[error("host out of memory allocating {size} bytes")]
    OutOfMemory {
        /// Requested byte count.
        size: usize,
    },
    /// Changing protection of an existing range failed.
    #[error("failed to reprotect {size} bytes at offset {offset:#x} to {protection:?}")]
    ReprotectFailed {
        /// Offset of the range inside its block.
        offset: usize,
        /// Length of the range.
        size: usize,
        /// Requested protection.
        protection: MemoryProtection,
    },
    /// Write tracking was requested but the host has no write-watch facility.
    #[error("host write tracking is not supported on this platform")]
    WriteTrackingUnsupported,
    /// No host memory backend exists for this target.
    #[error("host memory management is not supported on this platform")]
    UnsupportedPlatform,
    /// The host refused to release a block.
    #[error("failed to release {size} bytes of host memory")]
    FreeFailed {
        /// Size of the block.
        size: usize,
    },
    /// A commit granule was zero or not a power of two.
    #[error("invalid commit granularity {0:#x}")]
    InvalidGranularity(usize),
    /// A range did not fit inside the block it was applied to.
    #[error("range {offset:#x}+{size:#x} exceeds block of {capacity:#x} bytes")]
    OutOfRange {
        /// Offset of the range.
        offset: usize,
        /// Length of the range.
        size: usize,
        /// Size of the block.
        capacity: usize,
    },
}

impl HostMemoryError {
    /// Fatal errors leave the emulator without a usable memory backend.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::UnsupportedPlatform)
    }
}

/// Returns the host page size in bytes.
#[must_use]
pub fn host_page_size() -> usize {
    platform::page_size()
}

const fn round_up(value: usize, granule: usize) -> usize {
    (value + granule - 1) & !(granule - 1)
}

/// One contiguous host virtual-memory allocation.
///
/// The block owns its address range and releases it on drop.
#[derive(Debug)]
pub struct HostMemoryBlock {
    ptr: NonNull<u8>,
    size: usize,
}

// The block only hands out raw pointers; synchronization of the memory
// behind them is the responsibility of the accessors.
unsafe impl Send for HostMemoryBlock {}
unsafe impl Sync for HostMemoryBlock {}

impl HostMemoryBlock {
    /// Reserves `size` bytes of address space with no access and no commit.
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::OutOfMemory`] if the host refuses the
    /// reservation.
    pub fn reserve(size: usize) -> Result<Self, HostMemoryError> {
        Self::map(size, MemoryProtection::None)
    }

    /// Reserves address space with host write tracking enabled.
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::WriteTrackingUnsupported`] on hosts without
    /// a write-watch facility, so callers can fall back to page-table dirty
    /// tracking.
    pub fn reserve_tracked(size: usize) -> Result<Self, HostMemoryError> {
        if !platform::SUPPORTS_WRITE_TRACKING {
            return Err(HostMemoryError::WriteTrackingUnsupported);
        }
        Self::reserve(size)
    }

    /// Reserves and commits `size` zeroed, read-write bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::OutOfMemory`] if the host refuses the
    /// allocation.
    pub fn allocate(size: usize) -> Result<Self, HostMemoryError> {
        Self::map(size, MemoryProtection::ReadWrite)
    }

    fn map(size: usize, protection: MemoryProtection) -> Result<Self, HostMemoryError> {
        let size = round_up(size.max(1), host_page_size());
        let ptr = platform::map(size, protection)?;
        Ok(Self { ptr, size })
    }

    /// Commits `[offset, offset + size)` as read-write memory.
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::OutOfRange`] for ranges outside the block
    /// and [`HostMemoryError::OutOfMemory`] if the host cannot back them.
    pub fn commit(&self, offset: usize, size: usize) -> Result<(), HostMemoryError> {
        let (start, len) = self.page_range(offset, size)?;
        if platform::protect(self.ptr, start, len, MemoryProtection::ReadWrite) {
            Ok(())
        } else {
            Err(HostMemoryError::OutOfMemory { size: len })
        }
    }

    /// Changes the protection of `[offset, offset + size)`.
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::ReprotectFailed`] if the host rejects the
    /// change; the block stays usable.
    pub fn reprotect(
        &self,
        offset: usize,
        size: usize,
        protection: MemoryProtection,
    ) -> Result<(), HostMemoryError> {
        let (start, len) = self.page_range(offset, size)?;
        if platform::protect(self.ptr, start, len, protection) {
            Ok(())
        } else {
            Err(HostMemoryError::ReprotectFailed {
                offset,
                size,
                protection,
            })
        }
    }

    /// Releases the block, reporting whether the host accepted the release.
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::FreeFailed`] when the host refuses to
    /// unmap the range.
    pub fn free(self) -> Result<(), HostMemoryError> {
        let block = std::mem::ManuallyDrop::new(self);
        if platform::unmap(block.ptr, block.size) {
            Ok(())
        } else {
            Err(HostMemoryError::FreeFailed { size: block.size })
        }
    }

    /// Gives up ownership of the mapping without releasing it.
    pub(crate) fn into_raw(self) -> NonNull<u8> {
        std::mem::ManuallyDrop::new(self).ptr
    }

    /// Re-adopts a mapping released by [`Self::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` on a block whose size rounds to `size`,
    /// and must not be adopted twice.
    pub(crate) unsafe fn from_raw(ptr: NonNull<u8>, size: usize) -> Self {
        Self {
            ptr,
            size: round_up(size.max(1), host_page_size()),
        }
    }

    /// Base address of the block.
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Size of the block in bytes, rounded to the host page size.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    fn page_range(&self, offset: usize, size: usize) -> Result<(usize, usize), HostMemoryError> {
        let end = offset.checked_add(size).filter(|end| *end <= self.size);
        let Some(end) = end else {
            return Err(HostMemoryError::OutOfRange {
                offset,
                size,
                capacity: self.size,
            });
        };
        let page = host_page_size();
        let start = offset & !(page - 1);
        Ok((start, round_up(end, page).min(self.size) - start))
    }
}

impl Drop for HostMemoryBlock {
    fn drop(&mut self) {
        if !platform::unmap(self.ptr, self.size) {
            tracing::warn!(size = self.size, "host refused to release memory block");
        }
    }
}

#[cfg(unix)]
mod platform {
    use std::ptr::{self, NonNull};

    use super::{HostMemoryError, MemoryProtection};

    pub const SUPPORTS_WRITE_TRACKING: bool = false;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    const fn prot_flags(protection: MemoryProtection) -> libc::c_int {
        match protection {
            MemoryProtection::None => libc::PROT_NONE,
            MemoryProtection::Read => libc::PROT_READ,
            MemoryProtection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
            MemoryProtection::ReadExecute => libc::PROT_READ | libc::PROT_EXEC,
            MemoryProtection::ReadWriteExecute => {
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC
            }
            MemoryProtection::Execute => libc::PROT_EXEC,
        }
    }

    pub fn page_size() -> usize {
        // SAFETY: sysconf has no memory-safety preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(size).unwrap_or(4096)
    }

    pub fn map(size: usize, protection: MemoryProtection) -> Result<NonNull<u8>, HostMemoryError> {
        // SAFETY: anonymous private mapping at a kernel-chosen address.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                prot_flags(protection),
                MAP_FLAGS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(HostMemoryError::OutOfMemory { size });
        }
        NonNull::new(raw.cast::<u8>()).ok_or(HostMemoryError::OutOfMemory { size })
    }

    pub fn protect(base: NonNull<u8>, offset: usize, size: usize, protection: MemoryProtection) -> bool {
        // SAFETY: callers pass page-aligned ranges inside a mapping they own.
        unsafe {
            libc::mprotect(
                base.as_ptr().add(offset).cast::<libc::c_void>(),
                size,
                prot_flags(protection),
            ) == 0
        }
    }

    pub fn unmap(base: NonNull<u8>, size: usize) -> bool {
        // SAFETY: `base`/`size` describe exactly one mapping created by `map`.
        unsafe { libc::munmap(base.as_ptr().cast::<libc::c_void>(), size) == 0 }
    }
}

#[cfg(not(unix))]
mod platform {
    use std::ptr::NonNull;

    use super::{HostMemoryError, MemoryProtection};

    pub const SUPPORTS_WRITE_TRACKING: bool = false;

    pub const fn page_size() -> usize {
        4096
    }

    pub const fn map(_size: usize, _protection: MemoryProtection) -> Result<NonNull<u8>, HostMemoryError> {
        Err(HostMemoryError::UnsupportedPlatform)
    }

    pub const fn protect(_base: NonNull<u8>, _offset: usize, _size: usize, _protection: MemoryProtection) -> bool {
        false
    }

    pub const fn unmap(_base: NonNull<u8>, _size: usize) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::{host_page_size, HostMemoryBlock, HostMemoryError, MemoryProtection};

    #[test]
    fn allocate_rounds_to_host_pages_and_is_zeroed() {
        let block = HostMemoryBlock::allocate(100).expect("allocate");
        assert_eq!(block.size(), host_page_size());
        // SAFETY: block is committed read-write for its whole size.
        let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), block.size()) };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn reserved_memory_becomes_writable_after_commit() {
        let page = host_page_size();
        let block = HostMemoryBlock::reserve(page * 4).expect("reserve");
        block.commit(page, page).expect("commit");
        // SAFETY: the second page was just committed read-write.
        unsafe {
            block.as_ptr().add(page).write(0xAB);
            assert_eq!(block.as_ptr().add(page).read(), 0xAB);
        }
        block.free().expect("free");
    }

    #[test]
    fn commit_outside_block_is_rejected() {
        let block = HostMemoryBlock::reserve(host_page_size()).expect("reserve");
        let err = block.commit(0, block.size() + 1).expect_err("out of range");
        assert!(matches!(err, HostMemoryError::OutOfRange { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn reprotect_round_trips_between_protections() {
        let block = HostMemoryBlock::allocate(host_page_size()).expect("allocate");
        block
            .reprotect(0, block.size(), MemoryProtection::Read)
            .expect("read only");
        block
            .reprotect(0, block.size(), MemoryProtection::ReadWrite)
            .expect("read write");
    }

    #[test]
    fn write_tracking_request_reports_unsupported() {
        let err = HostMemoryBlock::reserve_tracked(host_page_size()).expect_err("no write watch");
        assert_eq!(err, HostMemoryError::WriteTrackingUnsupported);
        assert!(!err.is_fatal());
        assert!(HostMemoryError::OutOfMemory { size: 1 }.is_fatal());
    }

    #[test]
    fn release_and_granularity_failures_are_recoverable() {
        assert!(!HostMemoryError::FreeFailed { size: 4096 }.is_fatal());
        assert!(!HostMemoryError::InvalidGranularity(0).is_fatal());
        assert!(HostMemoryError::UnsupportedPlatform.is_fatal());
    }
}
