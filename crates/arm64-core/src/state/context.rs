//! Per-thread execution context handed to translated code.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::registers::{RegisterFile, SystemRegister, COUNTER_FREQUENCY};
use crate::fault::{FaultCode, FaultReason};
use crate::memory::MemoryManager;

/// Host-side service for `SVC` instructions.
pub trait SupervisorCallHandler: Send + Sync {
    /// Handles `SVC #imm`. Arguments and results travel in the register file.
    ///
    /// # Errors
    ///
    /// A returned fault ends guest execution on this thread.
    fn supervisor_call(
        &self,
        context: &mut ExecutionContext,
        memory: &MemoryManager,
        imm: u16,
    ) -> Result<(), FaultReason>;
}

/// Address, width and value recorded by a load-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExclusiveMonitor {
    /// Guest address of the reservation.
    pub address: u64,
    /// Access width in bytes.
    pub size: u8,
    /// Value observed by the load.
    pub value: u64,
}

/// Register file plus the thread-scoped state translated code touches.
pub struct ExecutionContext {
    registers: RegisterFile,
    running: Arc<AtomicBool>,
    exclusive: Option<ExclusiveMonitor>,
    thread_id: u64,
    supervisor: Option<Arc<dyn SupervisorCallHandler>>,
    started: Instant,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("registers", &self.registers)
            .field("running", &self.running())
            .field("exclusive", &self.exclusive)
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Creates a running context for guest thread `thread_id`.
    #[must_use]
    pub fn new(thread_id: u64) -> Self {
        Self {
            registers: RegisterFile::default(),
            running: Arc::new(AtomicBool::new(true)),
            exclusive: None,
            thread_id,
            supervisor: None,
            started: Instant::now(),
        }
    }

    /// Installs the `SVC` handler.
    #[must_use]
    pub fn with_supervisor(mut self, handler: Arc<dyn SupervisorCallHandler>) -> Self {
        self.supervisor = Some(handler);
        self
    }

    /// Guest thread id.
    #[must_use]
    pub const fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// Register file.
    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Mutable register file.
    pub const fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    /// Whether no stop has been requested.
    #[must_use]
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Requests that execution stop at the next dispatch boundary.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Shared stop flag, for controllers living on other threads.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Current exclusive reservation.
    #[must_use]
    pub const fn exclusive(&self) -> Option<ExclusiveMonitor> {
        self.exclusive
    }

    /// Records an exclusive reservation.
    pub const fn set_exclusive(&mut self, monitor: ExclusiveMonitor) {
        self.exclusive = Some(monitor);
    }

    /// Takes and clears the exclusive reservation.
    pub const fn take_exclusive(&mut self) -> Option<ExclusiveMonitor> {
        self.exclusive.take()
    }

    /// Virtual counter value derived from host monotonic time.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn counter(&self) -> u64 {
        let nanos = self.started.elapsed().as_nanos();
        (nanos * u128::from(COUNTER_FREQUENCY) / 1_000_000_000) as u64
    }

    /// Reads a system register, sampling the virtual counter when asked for.
    #[must_use]
    pub fn system_register(&self, reg: SystemRegister) -> u64 {
        let counter = if reg == SystemRegister::CntvctEl0 {
            self.counter()
        } else {
            0
        };
        self.registers.system(reg, counter)
    }

    /// Dispatches `SVC #imm` raised at `address`.
    ///
    /// # Errors
    ///
    /// Faults with `UnhandledSupervisorCall` when no handler is installed,
    /// otherwise forwards the handler's result.
    pub fn supervisor_call(
        &mut self,
        memory: &MemoryManager,
        imm: u16,
        address: u64,
    ) -> Result<(), FaultReason> {
        let Some(handler) = self.supervisor.clone() else {
            return Err(FaultReason::new(
                FaultCode::UnhandledSupervisorCall,
                address,
            ));
        };
        handler.supervisor_call(self, memory, imm)
    }
}
