//! Guest-to-host translation with a per-process subroutine cache.
//!
//! The translator decodes a subroutine's block graph, lowers it to IR,
//! compiles the IR through a [`CodeGenBackend`] and caches the result by
//! guest address. Direct calls to subroutines that are not cached yet are
//! dispatched at run time and recorded; translating such a callee later
//! marks every caller for recompilation so the call can be bound directly.

/// Code-generation backend interface.
pub mod backend;
/// Decoded block graph to IR lowering.
pub mod builder;
/// Per-instruction lowering routines.
pub mod emit;
/// Tree-walking IR backend.
pub mod interp;
/// Intermediate representation.
pub mod ir;
mod sub;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

pub use backend::{CodeGenBackend, CompiledCode, Dispatcher};
pub use builder::{build_function, LoweredFunction};
pub use interp::Interpreter;
pub use sub::TranslatedSub;

use crate::config::TranslatorConfig;
use crate::decoder::{decode_function, DecodeTable};
use crate::fault::FaultReason;
use crate::memory::MemoryManager;
use crate::state::ExecutionContext;

/// Snapshot of translator activity counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranslatorStats {
    /// Subroutines compiled, including recompilations.
    pub translations: u64,
    /// Recompilations of cached subroutines marked for re-JIT.
    pub rejits: u64,
    /// Subroutines currently cached.
    pub cached: usize,
}

/// Translates and runs guest code for every guest thread of one process.
pub struct Translator {
    memory: Arc<MemoryManager>,
    table: Arc<DecodeTable>,
    backend: Box<dyn CodeGenBackend>,
    config: TranslatorConfig,
    cache: RwLock<HashMap<u64, Arc<TranslatedSub>>>,
    translations: AtomicU64,
    rejits: AtomicU64,
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Translator {
    /// Creates a translator using the [`Interpreter`] backend.
    #[must_use]
    pub fn new(
        memory: Arc<MemoryManager>,
        table: Arc<DecodeTable>,
        config: TranslatorConfig,
    ) -> Self {
        Self::with_backend(memory, table, config, Box::new(Interpreter))
    }

    /// Creates a translator with an explicit backend.
    #[must_use]
    pub fn with_backend(
        memory: Arc<MemoryManager>,
        table: Arc<DecodeTable>,
        config: TranslatorConfig,
        backend: Box<dyn CodeGenBackend>,
    ) -> Self {
        Self {
            memory,
            table,
            backend,
            config,
            cache: RwLock::new(HashMap::new()),
            translations: AtomicU64::new(0),
            rejits: AtomicU64::new(0),
        }
    }

    /// Guest memory shared by every thread this translator runs.
    #[must_use]
    pub const fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Translation settings.
    #[must_use]
    pub const fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Runs guest code from `address` until a subroutine returns `0` or a
    /// stop is requested, and returns the address execution ended at.
    ///
    /// Stop requests are observed between subroutines and on backward
    /// branches, never in the middle of a block.
    ///
    /// # Errors
    ///
    /// Returns the guest fault that ended execution.
    pub fn execute(
        &self,
        context: &mut ExecutionContext,
        address: u64,
    ) -> Result<u64, FaultReason> {
        let mut address = address;
        loop {
            address = self.execute_single(context, address)?;
            context.registers_mut().set_pc(address);
            if address == 0 || !context.running() {
                return Ok(address);
            }
        }
    }

    /// Runs the single subroutine at `address` and returns the next address.
    ///
    /// # Errors
    ///
    /// Returns translation faults (unmapped entry) and execution faults.
    pub fn execute_single(
        &self,
        context: &mut ExecutionContext,
        address: u64,
    ) -> Result<u64, FaultReason> {
        context.registers_mut().set_pc(address);
        let sub = self.get_or_translate(address)?;
        sub.execute(context, &self.memory, self)
    }

    /// Returns the cached subroutine at `address`, translating it when it is
    /// missing or marked for re-JIT.
    ///
    /// # Errors
    ///
    /// Faults when the entry instruction cannot be fetched.
    pub fn get_or_translate(&self, address: u64) -> Result<Arc<TranslatedSub>, FaultReason> {
        let stale = match self.cache.read().get(&address) {
            Some(sub) if !sub.needs_rejit() => {
                tracing::trace!(address, "subroutine cache hit");
                return Ok(Arc::clone(sub));
            }
            Some(_) => true,
            None => false,
        };

        let sub = Arc::new(self.translate(address)?);
        self.translations.fetch_add(1, Ordering::Relaxed);
        if stale {
            self.rejits.fetch_add(1, Ordering::Relaxed);
        }

        let mut cache = self.cache.write();
        // A callee may have been cached while this sub was being compiled.
        if sub
            .sub_calls()
            .iter()
            .any(|target| *target != address && cache.contains_key(target))
        {
            sub.mark_needs_rejit();
        }
        cache.insert(address, Arc::clone(&sub));
        let mut marked = 0usize;
        for cached in cache.values() {
            if cached.sub_calls().contains(&address) {
                cached.mark_needs_rejit();
                marked += 1;
            }
        }
        drop(cache);
        if marked > 0 {
            tracing::debug!(
                address,
                callers = marked,
                "marked callers for re-JIT"
            );
        }
        Ok(sub)
    }

    /// Cached subroutine at `address`, if any, stale or not.
    #[must_use]
    pub fn cached(&self, address: u64) -> Option<Arc<TranslatedSub>> {
        self.cache.read().get(&address).cloned()
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> TranslatorStats {
        TranslatorStats {
            translations: self.translations.load(Ordering::Relaxed),
            rejits: self.rejits.load(Ordering::Relaxed),
            cached: self.cache.read().len(),
        }
    }

    fn translate(&self, address: u64) -> Result<TranslatedSub, FaultReason> {
        let blocks = decode_function(
            &self.memory,
            &self.table,
            address,
            self.config.max_function_instructions,
        )?;
        let resolve = |target: u64| self.cached(target);
        let lowered = build_function(
            address,
            &blocks,
            self.config.synchronize_backward_branches,
            &resolve,
        );
        tracing::debug!(
            address,
            blocks = lowered.function.blocks.len(),
            statements = lowered.function.statement_count(),
            indirect_calls = lowered.sub_calls.len(),
            backend = self.backend.name(),
            "translated subroutine"
        );
        let code = self.backend.compile(lowered.function);
        Ok(TranslatedSub::new(address, code, lowered.sub_calls))
    }
}

impl Dispatcher for Translator {
    /// Runs a call dispatched at run time. Once a stop is requested the
    /// callee is not entered; its address unwinds to [`Translator::execute`].
    fn dispatch(&self, context: &mut ExecutionContext, address: u64) -> Result<u64, FaultReason> {
        if !context.running() {
            return Ok(address);
        }
        self.execute_single(context, address)
    }
}
