//! Alignment policy and the scalar types accepted by typed guest accesses.

use crate::fault::FaultReason;

/// Validates natural alignment of a `width`-byte access at `va`.
///
/// Byte accesses are always aligned.
///
/// # Errors
///
/// Returns an `AlignmentFault` reason carrying `va` when `va` is not a
/// multiple of `width`.
pub const fn validate_alignment(va: u64, width: u64) -> Result<(), FaultReason> {
    if width <= 1 || va & (width - 1) == 0 {
        Ok(())
    } else {
        Err(FaultReason::misaligned(va))
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width scalar readable from and writable to guest memory.
///
/// Values are stored little-endian; `to_bits`/`from_bits` convert between
/// the scalar and its zero-extended little-endian bit pattern.
pub trait Primitive: sealed::Sealed + Copy {
    /// Width in bytes.
    const SIZE: u64;
    /// Truncating conversion from raw bits.
    fn from_bits(bits: u64) -> Self;
    /// Zero-extending conversion to raw bits.
    fn to_bits(self) -> u64;
}

macro_rules! impl_primitive {
    ($($ty:ty => $unsigned:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Primitive for $ty {
                const SIZE: u64 = std::mem::size_of::<$ty>() as u64;

                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_possible_wrap,
                    clippy::unnecessary_cast
                )]
                fn from_bits(bits: u64) -> Self {
                    bits as $unsigned as $ty
                }

                #[allow(
                    clippy::cast_sign_loss,
                    clippy::unnecessary_cast,
                    clippy::useless_conversion
                )]
                fn to_bits(self) -> u64 {
                    u64::from(self as $unsigned)
                }
            }
        )*
    };
}

impl_primitive!(
    u8 => u8,
    i8 => u8,
    u16 => u16,
    i16 => u16,
    u32 => u32,
    i32 => u32,
    u64 => u64,
    i64 => u64,
);

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{validate_alignment, Primitive};
    use crate::fault::FaultCode;

    #[rstest]
    #[case(0x1001, 1, true)]
    #[case(0x1002, 2, true)]
    #[case(0x1001, 2, false)]
    #[case(0x1004, 4, true)]
    #[case(0x1002, 4, false)]
    #[case(0x1008, 8, true)]
    #[case(0x1004, 8, false)]
    #[case(0x1010, 16, true)]
    #[case(0x1008, 16, false)]
    fn alignment_policy(#[case] va: u64, #[case] width: u64, #[case] aligned: bool) {
        let result = validate_alignment(va, width);
        assert_eq!(result.is_ok(), aligned);
        if let Err(reason) = result {
            assert_eq!(reason.code, FaultCode::AlignmentFault);
            assert_eq!(reason.address, va);
        }
    }

    #[test]
    fn signed_scalars_round_trip_through_bits() {
        assert_eq!((-1i8).to_bits(), 0xFF);
        assert_eq!(i16::from_bits(0xFFFE), -2);
        assert_eq!(i32::from_bits(0x1_8000_0000), i32::MIN);
        assert_eq!(<i64 as Primitive>::SIZE, 8);
    }
}
