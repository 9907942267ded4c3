//! Construction-time configuration for the memory manager and translator.

/// Default guest address space width.
pub const DEFAULT_ADDRESS_SPACE_BITS: u32 = 48;
/// Default bits resolved per page-table level.
pub const DEFAULT_LEVEL_BITS: u32 = 9;
/// Default guest RAM size (64 MiB).
pub const DEFAULT_RAM_SIZE: usize = 64 * 1024 * 1024;

/// Shape of the guest page table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PageTableLayout {
    /// Radix tree resolving `level_bits` bits per level.
    MultiLevel {
        /// Bits per level.
        level_bits: u32,
    },
    /// A single array covering the whole address space.
    Flat,
}

impl Default for PageTableLayout {
    fn default() -> Self {
        Self::MultiLevel {
            level_bits: DEFAULT_LEVEL_BITS,
        }
    }
}

/// Guest address space configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemoryConfig {
    /// Width of guest virtual addresses.
    pub address_space_bits: u32,
    /// Page-table shape.
    pub page_table: PageTableLayout,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            address_space_bits: DEFAULT_ADDRESS_SPACE_BITS,
            page_table: PageTableLayout::default(),
        }
    }
}

/// Translator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TranslatorConfig {
    /// Upper bound on instructions decoded into one subroutine.
    pub max_function_instructions: usize,
    /// Exit to the dispatcher on backward branches once a stop is requested.
    pub synchronize_backward_branches: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            max_function_instructions: 4096,
            synchronize_backward_branches: true,
        }
    }
}

/// Aggregate configuration for one emulated CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuConfig {
    /// Guest address space.
    pub memory: MemoryConfig,
    /// Translator tuning.
    pub translator: TranslatorConfig,
    /// Size of the host arena backing guest RAM.
    pub ram_size: usize,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            translator: TranslatorConfig::default(),
            ram_size: DEFAULT_RAM_SIZE,
        }
    }
}
