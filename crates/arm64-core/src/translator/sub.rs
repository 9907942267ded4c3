use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use super::backend::{CompiledCode, Dispatcher};
use crate::fault::FaultReason;
use crate::memory::MemoryManager;
use crate::state::ExecutionContext;

/// A cached, executable subroutine.
pub struct TranslatedSub {
    address: u64,
    code: Box<dyn CompiledCode>,
    sub_calls: HashSet<u64>,
    needs_rejit: AtomicBool,
}

impl fmt::Debug for TranslatedSub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatedSub")
            .field("address", &format_args!("{:#x}", self.address))
            .field("sub_calls", &self.sub_calls)
            .field("needs_rejit", &self.needs_rejit())
            .finish_non_exhaustive()
    }
}

impl TranslatedSub {
    /// Wraps compiled code for the subroutine at `address`.
    #[must_use]
    pub fn new(address: u64, code: Box<dyn CompiledCode>, sub_calls: HashSet<u64>) -> Self {
        Self {
            address,
            code,
            sub_calls,
            needs_rejit: AtomicBool::new(false),
        }
    }

    /// Guest entry address.
    #[must_use]
    pub const fn address(&self) -> u64 {
        self.address
    }

    /// Call targets that were dispatched indirectly because they were not
    /// translated yet.
    #[must_use]
    pub const fn sub_calls(&self) -> &HashSet<u64> {
        &self.sub_calls
    }

    /// Whether a callee has since been translated and this subroutine
    /// would benefit from recompilation.
    #[must_use]
    pub fn needs_rejit(&self) -> bool {
        self.needs_rejit.load(Ordering::Acquire)
    }

    pub(crate) fn mark_needs_rejit(&self) {
        self.needs_rejit.store(true, Ordering::Release);
    }

    /// Runs the subroutine.
    ///
    /// # Errors
    ///
    /// Returns the guest fault that ended execution.
    pub fn execute(
        &self,
        context: &mut ExecutionContext,
        memory: &MemoryManager,
        dispatcher: &dyn Dispatcher,
    ) -> Result<u64, FaultReason> {
        self.code.execute(context, memory, dispatcher)
    }
}
