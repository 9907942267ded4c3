//! Core of an ARM64 user-mode CPU emulator.

/// Fault taxonomy for guest-semantic conditions.
pub mod fault;
pub use fault::{FaultClass, FaultCode, FaultReason};

/// Memory, translator and CPU configuration.
pub mod config;
pub use config::{
    CpuConfig, MemoryConfig, PageTableLayout, TranslatorConfig, DEFAULT_ADDRESS_SPACE_BITS,
    DEFAULT_LEVEL_BITS, DEFAULT_RAM_SIZE,
};

/// Host memory primitives, page table and guest memory manager.
pub mod memory;
pub use memory::{
    HostMemoryBlock, HostMemoryError, JitMemoryBlock, MemoryError, MemoryManager,
    MemoryProtection, ModifiedRange, ObserverId, ReservedRegion, PAGE_SIZE,
};

/// Guest architectural state and the per-thread execution context.
pub mod state;
pub use state::{
    Condition, ExclusiveMonitor, ExecutionContext, GeneralRegister, Nzcv, RegisterFile,
    RegisterOperand, RunState, SupervisorCallHandler, SystemRegister,
};

/// Bit-pattern decode table and block-graph decoder.
pub mod decoder;
pub use decoder::{decode_function, Block, DecodeTable, InstName, OpCode, PatternError};

/// IR lowering, code-generation backends and the subroutine cache.
pub mod translator;
pub use translator::{
    CodeGenBackend, CompiledCode, Interpreter, TranslatedSub, Translator, TranslatorStats,
};

/// Guest threads and host priority mapping.
pub mod thread;
pub use thread::{GuestThread, HostPriority, ThreadError};
