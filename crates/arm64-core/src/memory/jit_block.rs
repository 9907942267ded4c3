//! Raw executable memory for out-of-core code generators.

use super::host::{HostMemoryBlock, HostMemoryError, MemoryProtection};

/// A reserved host block whose ranges can be committed and flipped between
/// writable and executable protection.
#[derive(Debug)]
pub struct JitMemoryBlock {
    block: HostMemoryBlock,
}

impl JitMemoryBlock {
    /// Reserves `size` bytes of inaccessible address space.
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::OutOfMemory`] if the reservation fails.
    pub fn new(size: usize) -> Result<Self, HostMemoryError> {
        HostMemoryBlock::reserve(size).map(|block| Self { block })
    }

    /// Base address of the block.
    #[must_use]
    pub const fn pointer(&self) -> *mut u8 {
        self.block.as_ptr()
    }

    /// Reserved size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.block.size()
    }

    /// Commits `[offset, offset + size)` read-write.
    ///
    /// # Errors
    ///
    /// See [`HostMemoryBlock::commit`].
    pub fn commit(&self, offset: usize, size: usize) -> Result<(), HostMemoryError> {
        self.block.commit(offset, size)
    }

    /// Makes a committed range read-execute.
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::ReprotectFailed`] if the host rejects it.
    pub fn map_as_rx(&self, offset: usize, size: usize) -> Result<(), HostMemoryError> {
        self.block
            .reprotect(offset, size, MemoryProtection::ReadExecute)
    }

    /// Makes a committed range read-write-execute.
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::ReprotectFailed`] if the host rejects it.
    pub fn map_as_rwx(&self, offset: usize, size: usize) -> Result<(), HostMemoryError> {
        self.block
            .reprotect(offset, size, MemoryProtection::ReadWriteExecute)
    }
}
