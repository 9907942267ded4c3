//! Atomic guest-memory primitives.
//!
//! Widths of 16 bits and up require natural alignment and fault with
//! `AlignmentFault` otherwise. Byte and halfword compare-exchange operate on
//! the containing 32-bit word so concurrent updates to neighbouring bytes are
//! never lost.

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, Ordering};

use portable_atomic::AtomicU128;

use super::access::validate_alignment;
use super::manager::MemoryManager;
use crate::fault::FaultReason;

impl MemoryManager {
    fn atomic_word(&self, va: u64) -> Result<&AtomicU32, FaultReason> {
        let ptr = self.translate_write(va & !3)?;
        // SAFETY: the containing word is 4-aligned inside one mapped page and
        // the arena outlives `self`.
        Ok(unsafe { AtomicU32::from_ptr(ptr.cast()) })
    }

    fn compare_exchange_in_word(
        &self,
        va: u64,
        field_mask: u32,
        expected: u32,
        desired: u32,
    ) -> Result<bool, FaultReason> {
        let word = self.atomic_word(va)?;
        let shift = (va & 3) * 8;
        let mask = field_mask << shift;
        let current = u32::from_le(word.load(Ordering::Acquire));
        if (current & mask) >> shift != expected {
            return Ok(false);
        }
        let replaced = (current & !mask) | (desired << shift);
        Ok(word
            .compare_exchange(
                current.to_le(),
                replaced.to_le(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok())
    }

    /// Compare-and-swap on one byte.
    ///
    /// Fails if any byte of the containing word changed since it was read.
    ///
    /// # Errors
    ///
    /// Faults if the address is unmapped or out of range.
    pub fn compare_exchange_byte(&self, va: u64, expected: u8, desired: u8) -> Result<bool, FaultReason> {
        self.compare_exchange_in_word(va, 0xFF, u32::from(expected), u32::from(desired))
    }

    /// Compare-and-swap on a 2-aligned halfword.
    ///
    /// # Errors
    ///
    /// Faults with `AlignmentFault` for odd addresses.
    #[allow(clippy::cast_sign_loss)]
    pub fn compare_exchange_i16(&self, va: u64, expected: i16, desired: i16) -> Result<bool, FaultReason> {
        validate_alignment(va, 2)?;
        self.compare_exchange_in_word(
            va,
            0xFFFF,
            u32::from(expected as u16),
            u32::from(desired as u16),
        )
    }

    fn atomic_i32(&self, va: u64) -> Result<&AtomicI32, FaultReason> {
        validate_alignment(va, 4)?;
        let ptr = self.translate_write(va)?;
        // SAFETY: 4-aligned inside one mapped page.
        Ok(unsafe { AtomicI32::from_ptr(ptr.cast()) })
    }

    /// Compare-and-swap on a 4-aligned word.
    ///
    /// # Errors
    ///
    /// Faults with `AlignmentFault` when misaligned, or on unmapped memory.
    pub fn compare_exchange_i32(&self, va: u64, expected: i32, desired: i32) -> Result<bool, FaultReason> {
        Ok(self
            .atomic_i32(va)?
            .compare_exchange(expected.to_le(), desired.to_le(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    /// Compare-and-swap on an 8-aligned doubleword.
    ///
    /// # Errors
    ///
    /// Faults with `AlignmentFault` when misaligned, or on unmapped memory.
    pub fn compare_exchange_i64(&self, va: u64, expected: i64, desired: i64) -> Result<bool, FaultReason> {
        validate_alignment(va, 8)?;
        let ptr = self.translate_write(va)?;
        // SAFETY: 8-aligned inside one mapped page.
        let atomic = unsafe { AtomicI64::from_ptr(ptr.cast()) };
        Ok(atomic
            .compare_exchange(expected.to_le(), desired.to_le(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    fn atomic_u128(&self, va: u64, write: bool) -> Result<&AtomicU128, FaultReason> {
        validate_alignment(va, 16)?;
        let ptr = if write {
            self.translate_write(va)?
        } else {
            self.translate(va)?
        };
        // SAFETY: 16-aligned inside one mapped page.
        Ok(unsafe { AtomicU128::from_ptr(ptr.cast()) })
    }

    /// Compare-and-swap on a 16-aligned quadword.
    ///
    /// # Errors
    ///
    /// Faults with `AlignmentFault` when misaligned, or on unmapped memory.
    pub fn compare_exchange_u128(&self, va: u64, expected: u128, desired: u128) -> Result<bool, FaultReason> {
        Ok(self
            .atomic_u128(va, true)?
            .compare_exchange(expected.to_le(), desired.to_le(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    /// Single-copy atomic load of a 16-aligned quadword.
    ///
    /// # Errors
    ///
    /// Faults with `AlignmentFault` when misaligned, or on unmapped memory.
    pub fn atomic_load_u128(&self, va: u64) -> Result<u128, FaultReason> {
        Ok(u128::from_le(self.atomic_u128(va, false)?.load(Ordering::Acquire)))
    }

    fn atomic_add_i32(&self, va: u64, delta: i32) -> Result<i32, FaultReason> {
        let atomic = self.atomic_i32(va)?;
        let mut current = atomic.load(Ordering::Acquire);
        loop {
            let next = i32::from_le(current).wrapping_add(delta);
            match atomic.compare_exchange_weak(current, next.to_le(), Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(next),
                Err(observed) => current = observed,
            }
        }
    }

    /// Atomically increments a 4-aligned word, returning the new value.
    ///
    /// # Errors
    ///
    /// Faults with `AlignmentFault` when misaligned, or on unmapped memory.
    pub fn atomic_increment_i32(&self, va: u64) -> Result<i32, FaultReason> {
        self.atomic_add_i32(va, 1)
    }

    /// Atomically decrements a 4-aligned word, returning the new value.
    ///
    /// # Errors
    ///
    /// Faults with `AlignmentFault` when misaligned, or on unmapped memory.
    pub fn atomic_decrement_i32(&self, va: u64) -> Result<i32, FaultReason> {
        self.atomic_add_i32(va, -1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use proptest::prelude::*;
    use rstest::rstest;

    use crate::config::MemoryConfig;
    use crate::fault::FaultCode;
    use crate::memory::MemoryManager;

    fn mapped() -> MemoryManager {
        let memory = MemoryManager::with_ram_size(0x4000, &MemoryConfig::default()).expect("memory");
        memory.map(0x1000, 0, 0x2000).expect("map");
        memory
    }

    #[test]
    fn word_cas_fails_on_mismatch_and_leaves_memory() {
        let memory = mapped();
        memory.write_u32(0x1100, 7).expect("seed");
        assert_eq!(memory.compare_exchange_i32(0x1100, 5, 9), Ok(false));
        assert_eq!(memory.read_u32(0x1100), Ok(7));
        assert_eq!(memory.compare_exchange_i32(0x1100, 7, 9), Ok(true));
        assert_eq!(memory.read_u32(0x1100), Ok(9));
    }

    #[test]
    fn byte_cas_preserves_neighbouring_bytes() {
        let memory = mapped();
        memory.write_u32(0x1200, 0x4433_2211).expect("seed");
        assert_eq!(memory.compare_exchange_byte(0x1202, 0x33, 0xEE), Ok(true));
        assert_eq!(memory.read_u32(0x1200), Ok(0x44EE_2211));
        assert_eq!(memory.compare_exchange_byte(0x1203, 0x00, 0xFF), Ok(false));
        assert_eq!(memory.read_u32(0x1200), Ok(0x44EE_2211));
    }

    #[test]
    fn halfword_cas_preserves_neighbouring_halfword() {
        let memory = mapped();
        memory.write_u32(0x1300, 0xBBBB_AAAA).expect("seed");
        assert_eq!(memory.compare_exchange_i16(0x1302, -17477, 0x1234), Ok(true));
        assert_eq!(memory.read_u32(0x1300), Ok(0x1234_AAAA));
    }

    #[test]
    fn wide_cas_round_trips() {
        let memory = mapped();
        memory.write_u64(0x1400, 1).expect("seed");
        assert_eq!(memory.compare_exchange_i64(0x1400, 1, -1), Ok(true));
        assert_eq!(memory.read_u64(0x1400), Ok(u64::MAX));

        let wide = 0x0123_4567_89AB_CDEF_FEDC_BA98_7654_3210_u128;
        assert_eq!(memory.compare_exchange_u128(0x1500, 0, wide), Ok(true));
        assert_eq!(memory.atomic_load_u128(0x1500), Ok(wide));
        assert_eq!(memory.read_u128(0x1500), Ok(wide));
        assert_eq!(memory.compare_exchange_u128(0x1500, 0, 1), Ok(false));
    }

    #[rstest]
    #[case(0x1101, 2)]
    #[case(0x1102, 4)]
    #[case(0x1104, 8)]
    #[case(0x1108, 16)]
    fn misaligned_atomics_raise_alignment_fault(#[case] va: u64, #[case] width: u64) {
        let memory = mapped();
        let result = match width {
            2 => memory.compare_exchange_i16(va, 0, 1),
            4 => memory.compare_exchange_i32(va, 0, 1),
            8 => memory.compare_exchange_i64(va, 0, 1),
            _ => memory.compare_exchange_u128(va, 0, 1),
        };
        let fault = result.expect_err("misaligned");
        assert_eq!(fault.code, FaultCode::AlignmentFault);
        assert_eq!(fault.address, va);
    }

    #[test]
    fn increments_and_decrements_return_new_value() {
        let memory = mapped();
        assert_eq!(memory.atomic_increment_i32(0x1600), Ok(1));
        assert_eq!(memory.atomic_increment_i32(0x1600), Ok(2));
        assert_eq!(memory.atomic_decrement_i32(0x1600), Ok(1));
        assert_eq!(
            memory.atomic_increment_i32(0x1601).expect_err("misaligned").code,
            FaultCode::AlignmentFault
        );
    }

    #[test]
    fn concurrent_byte_cas_on_shared_word_loses_no_update() {
        let memory = Arc::new(mapped());
        let handles: Vec<_> = (0..4u64)
            .map(|lane| {
                let memory = Arc::clone(&memory);
                thread::spawn(move || {
                    for _ in 0..200 {
                        loop {
                            let current = memory.read_u8(0x1700 + lane).expect("read");
                            if memory
                                .compare_exchange_byte(0x1700 + lane, current, current.wrapping_add(1))
                                .expect("cas")
                            {
                                break;
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(memory.read_u32(0x1700), Ok(0xC8C8_C8C8));
    }

    proptest! {
        #[test]
        fn unaligned_scalar_writes_read_back(offset in 0u64..0x1FF8, value in any::<u64>()) {
            let memory = mapped();
            let va = 0x1000 + offset;
            memory.write_u64(va, value).expect("write");
            prop_assert_eq!(memory.read_u64(va), Ok(value));
            prop_assert_eq!(memory.read_u8(va), Ok(value.to_le_bytes()[0]));
        }
    }
}
