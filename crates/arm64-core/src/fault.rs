use thiserror::Error;

/// Fault classes used to route guest-semantic conditions to the embedding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// The decoder did not recognize an instruction encoding.
    Decode,
    /// Guest address translation or access-policy violation.
    Memory,
    /// The guest deliberately trapped into the host (`BRK`, `SVC`).
    Debug,
}

/// Stable taxonomy of guest-semantic faults.
///
/// These never abort the host process; they propagate to the owning guest
/// thread as distinguishable conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum FaultCode {
    /// Instruction word matched no decode table entry.
    #[error("undefined instruction")]
    UndefinedInstruction = 0x01,
    /// Guest virtual address has no page-table mapping.
    #[error("translation fault on unmapped address")]
    TranslationFault = 0x02,
    /// Guest virtual address lies outside the configured address space.
    #[error("address outside the guest address space")]
    AddressOutOfRange = 0x03,
    /// Atomic or exclusive access violated natural alignment.
    #[error("misaligned atomic access")]
    AlignmentFault = 0x04,
    /// Guest executed `BRK`.
    #[error("guest broke execution")]
    GuestBreak = 0x05,
    /// Guest executed `SVC` with no supervisor-call handler installed.
    #[error("unhandled supervisor call")]
    UnhandledSupervisorCall = 0x06,
}

impl FaultCode {
    /// Converts a fault code to its stable byte value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable byte value back into a fault code.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::UndefinedInstruction),
            0x02 => Some(Self::TranslationFault),
            0x03 => Some(Self::AddressOutOfRange),
            0x04 => Some(Self::AlignmentFault),
            0x05 => Some(Self::GuestBreak),
            0x06 => Some(Self::UnhandledSupervisorCall),
            _ => None,
        }
    }

    /// Returns the fault class for this fault code.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::UndefinedInstruction => FaultClass::Decode,
            Self::TranslationFault | Self::AddressOutOfRange | Self::AlignmentFault => {
                FaultClass::Memory
            }
            Self::GuestBreak | Self::UnhandledSupervisorCall => FaultClass::Debug,
        }
    }

    /// Memory faults are the ones a guest kernel could in principle resolve and retry.
    #[must_use]
    pub const fn is_memory(self) -> bool {
        matches!(self.class(), FaultClass::Memory)
    }
}

/// A fault together with the guest address it was raised at.
///
/// For memory faults `address` is the faulting data address; for decode and
/// debug faults it is the address of the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[error("{code} at {address:#x}")]
pub struct FaultReason {
    /// Fault taxonomy code.
    pub code: FaultCode,
    /// Guest address associated with the fault.
    pub address: u64,
}

impl FaultReason {
    /// Builds a fault reason for `code` raised at `address`.
    #[must_use]
    pub const fn new(code: FaultCode, address: u64) -> Self {
        Self { code, address }
    }

    /// Shorthand for [`FaultCode::TranslationFault`].
    #[must_use]
    pub const fn unmapped(address: u64) -> Self {
        Self::new(FaultCode::TranslationFault, address)
    }

    /// Shorthand for [`FaultCode::AlignmentFault`].
    #[must_use]
    pub const fn misaligned(address: u64) -> Self {
        Self::new(FaultCode::AlignmentFault, address)
    }
}
