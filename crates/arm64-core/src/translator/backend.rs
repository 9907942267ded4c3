//! Code-generation backend interface.

use crate::fault::FaultReason;
use crate::memory::MemoryManager;
use crate::state::ExecutionContext;

use super::ir::IrFunction;

/// Runs the subroutine at a guest address on behalf of translated code that
/// calls a target it could not bind at translation time.
pub trait Dispatcher {
    /// Translates (if needed) and runs one subroutine, returning the next
    /// guest address.
    ///
    /// # Errors
    ///
    /// Propagates translation and execution faults.
    fn dispatch(&self, context: &mut ExecutionContext, address: u64) -> Result<u64, FaultReason>;
}

/// Host-executable form of one translated subroutine.
pub trait CompiledCode: Send + Sync {
    /// Runs the subroutine until it leaves, returning the next guest address.
    ///
    /// A returned address of `0` is a natural return from the outermost
    /// subroutine.
    ///
    /// # Errors
    ///
    /// Returns the guest fault that ended execution.
    fn execute(
        &self,
        context: &mut ExecutionContext,
        memory: &MemoryManager,
        dispatcher: &dyn Dispatcher,
    ) -> Result<u64, FaultReason>;
}

/// Turns IR into [`CompiledCode`].
pub trait CodeGenBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Compiles one subroutine.
    fn compile(&self, function: IrFunction) -> Box<dyn CompiledCode>;
}
