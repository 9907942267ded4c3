//! A host reservation whose committed prefix grows on demand.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::host::HostMemoryError;
use super::jit_block::JitMemoryBlock;

/// Default commit granule (64 KiB).
pub const DEFAULT_GRANULARITY: usize = 0x10000;

/// Reserved address range with a monotonically growing committed prefix.
#[derive(Debug)]
pub struct ReservedRegion {
    block: JitMemoryBlock,
    max_size: usize,
    granularity: usize,
    committed: AtomicUsize,
    grow_lock: Mutex<()>,
}

impl ReservedRegion {
    /// Reserves `max_size` bytes (rounded up to `granularity`, a power of two).
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::InvalidGranularity`] unless `granularity`
    /// is a power of two, and [`HostMemoryError::OutOfMemory`] if the
    /// rounded size overflows or the reservation fails.
    pub fn new(max_size: usize, granularity: usize) -> Result<Self, HostMemoryError> {
        if !granularity.is_power_of_two() {
            return Err(HostMemoryError::InvalidGranularity(granularity));
        }
        let max_size = max_size
            .checked_next_multiple_of(granularity)
            .ok_or(HostMemoryError::OutOfMemory { size: max_size })?;
        Ok(Self {
            block: JitMemoryBlock::new(max_size)?,
            max_size,
            granularity,
            committed: AtomicUsize::new(0),
            grow_lock: Mutex::new(()),
        })
    }

    /// Reserves `max_size` bytes with [`DEFAULT_GRANULARITY`].
    ///
    /// # Errors
    ///
    /// See [`ReservedRegion::new`].
    pub fn with_default_granularity(max_size: usize) -> Result<Self, HostMemoryError> {
        Self::new(max_size, DEFAULT_GRANULARITY)
    }

    /// Underlying block, for callers that emit code into the region.
    #[must_use]
    pub const fn block(&self) -> &JitMemoryBlock {
        &self.block
    }

    /// Base address of the region.
    #[must_use]
    pub const fn pointer(&self) -> *mut u8 {
        self.block.pointer()
    }

    /// Bytes committed so far.
    #[must_use]
    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::Acquire)
    }

    /// Reserved upper bound in bytes.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Ensures at least `desired` bytes are committed.
    ///
    /// Growth happens in whole granules and at most one commit is issued per
    /// needed step, even under concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns [`HostMemoryError::OutOfMemory`] when `desired` exceeds the
    /// reservation or the host cannot commit the additional range.
    pub fn expand_if_needed(&self, desired: usize) -> Result<(), HostMemoryError> {
        if desired > self.max_size {
            return Err(HostMemoryError::OutOfMemory { size: desired });
        }
        if desired <= self.committed() {
            return Ok(());
        }

        let _guard = self.grow_lock.lock();
        let committed = self.committed.load(Ordering::Acquire);
        if desired <= committed {
            return Ok(());
        }

        let grow = (desired - committed).div_ceil(self.granularity) * self.granularity;
        self.block.commit(committed, grow)?;
        self.committed.store(committed + grow, Ordering::Release);
        tracing::trace!(committed = committed + grow, "reserved region grown");
        Ok(())
    }
}
