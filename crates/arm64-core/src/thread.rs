//! Guest threads: one host OS thread per guest thread of control.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use thiserror::Error;

use crate::state::{ExecutionContext, GeneralRegister, RegisterFile, RunState};
use crate::translator::Translator;

/// Host stack reserved for each guest thread; guest calls nest on it.
pub const HOST_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Guest priorities below this value map to [`HostPriority::Highest`];
/// each following band is this many values wide.
pub const PRIORITY_BAND_WIDTH: i32 = 12;

/// Host scheduling band for a guest thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum HostPriority {
    /// Guest priority `< 12`.
    Highest,
    /// Guest priority `12..24`.
    AboveNormal,
    /// Guest priority `24..36`.
    Normal,
    /// Guest priority `36..48`.
    BelowNormal,
    /// Guest priority `>= 48`.
    Lowest,
}

impl HostPriority {
    /// Maps a guest priority; lower guest values run at higher host priority.
    #[must_use]
    pub const fn from_guest(priority: i32) -> Self {
        if priority < PRIORITY_BAND_WIDTH {
            Self::Highest
        } else if priority < 2 * PRIORITY_BAND_WIDTH {
            Self::AboveNormal
        } else if priority < 3 * PRIORITY_BAND_WIDTH {
            Self::Normal
        } else if priority < 4 * PRIORITY_BAND_WIDTH {
            Self::BelowNormal
        } else {
            Self::Lowest
        }
    }

    /// Unix nice value hinted for the band.
    #[must_use]
    pub const fn nice(self) -> i32 {
        match self {
            Self::Highest => -10,
            Self::AboveNormal => -5,
            Self::Normal => 0,
            Self::BelowNormal => 5,
            Self::Lowest => 10,
        }
    }
}

/// Guest thread lifecycle errors.
#[derive(Debug, Error)]
pub enum ThreadError {
    /// `execute` was called on a thread that was already started.
    #[error("guest thread {0} is already executing")]
    AlreadyExecuting(u64),
    /// The host refused to create the OS thread.
    #[error("failed to spawn host thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// `join` was called before `execute`.
    #[error("guest thread {0} was never started")]
    NotStarted(u64),
    /// The host thread panicked.
    #[error("host thread of guest thread {0} panicked")]
    Panicked(u64),
}

type WorkFinished = Box<dyn FnOnce(u64, RunState) + Send>;

/// A guest thread bound to a translator and an entry point.
pub struct GuestThread {
    translator: Arc<Translator>,
    thread_id: u64,
    priority: i32,
    entry: u64,
    stop: Arc<AtomicBool>,
    executing: AtomicBool,
    context: Arc<Mutex<Option<ExecutionContext>>>,
    state: Arc<Mutex<RunState>>,
    handle: Mutex<Option<JoinHandle<RunState>>>,
    on_finished: Arc<Mutex<Option<WorkFinished>>>,
}

impl std::fmt::Debug for GuestThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestThread")
            .field("thread_id", &self.thread_id)
            .field("priority", &self.priority)
            .field("entry", &format_args!("{:#x}", self.entry))
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl GuestThread {
    /// Binds `context` to a guest thread that will start at `entry`.
    #[must_use]
    pub fn new(
        translator: Arc<Translator>,
        context: ExecutionContext,
        priority: i32,
        entry: u64,
    ) -> Self {
        Self {
            translator,
            thread_id: context.thread_id(),
            priority,
            entry,
            stop: context.stop_flag(),
            executing: AtomicBool::new(false),
            context: Arc::new(Mutex::new(Some(context))),
            state: Arc::new(Mutex::new(RunState::Created)),
            handle: Mutex::new(None),
            on_finished: Arc::new(Mutex::new(None)),
        }
    }

    /// Guest thread id.
    #[must_use]
    pub const fn thread_id(&self) -> u64 {
        self.thread_id
    }

    /// Guest priority.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Host band derived from the guest priority.
    #[must_use]
    pub const fn host_priority(&self) -> HostPriority {
        HostPriority::from_guest(self.priority)
    }

    /// Entry address.
    #[must_use]
    pub const fn entry(&self) -> u64 {
        self.entry
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Whether `execute` has been called.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    /// Edits the register file while no host thread owns it: before
    /// `execute` and after execution has finished. Returns `None` otherwise.
    pub fn with_registers<R>(&self, edit: impl FnOnce(&mut RegisterFile) -> R) -> Option<R> {
        self.context
            .lock()
            .as_mut()
            .map(|context| edit(context.registers_mut()))
    }

    /// Registers the notification fired on the host thread once execution
    /// ends, with the thread id and final state.
    ///
    /// The callback may be registered before or during execution; one
    /// registered after execution has ended is never called.
    pub fn on_work_finished(&self, callback: impl FnOnce(u64, RunState) + Send + 'static) {
        *self.on_finished.lock() = Some(Box::new(callback));
    }

    /// Starts the host thread.
    ///
    /// `X30` is cleared first so that a return from the entry subroutine
    /// ends execution.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::AlreadyExecuting`] on every call after the
    /// first successful one, and [`ThreadError::Spawn`] if the OS thread
    /// cannot be created. A failed spawn leaves the thread in
    /// [`RunState::Created`] with its registers intact, so `execute` may be
    /// retried.
    pub fn execute(&self) -> Result<(), ThreadError> {
        if self.executing.swap(true, Ordering::AcqRel) {
            return Err(ThreadError::AlreadyExecuting(self.thread_id));
        }
        let Some(mut context) = self.context.lock().take() else {
            return Err(ThreadError::AlreadyExecuting(self.thread_id));
        };
        context.registers_mut().set_gpr(GeneralRegister::LR, 0);
        *self.state.lock() = RunState::Running;

        // Handed over through a slot so a failed spawn can give it back.
        let pending = Arc::new(Mutex::new(Some(context)));
        let spawned = self.spawn_host_thread(Arc::clone(&pending));
        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                Ok(())
            }
            Err(error) => {
                self.abandon_start(pending.lock().take());
                Err(ThreadError::Spawn(error))
            }
        }
    }

    fn spawn_host_thread(
        &self,
        pending: Arc<Mutex<Option<ExecutionContext>>>,
    ) -> std::io::Result<JoinHandle<RunState>> {
        let translator = Arc::clone(&self.translator);
        let slot = Arc::clone(&self.context);
        let state = Arc::clone(&self.state);
        let on_finished = Arc::clone(&self.on_finished);
        let (thread_id, entry) = (self.thread_id, self.entry);
        let priority = self.host_priority();

        std::thread::Builder::new()
            .name(format!("guest-{thread_id}"))
            .stack_size(HOST_STACK_SIZE)
            .spawn(move || {
                let Some(mut context) = pending.lock().take() else {
                    return RunState::Created;
                };
                apply_host_priority(priority);
                tracing::info!(thread_id, entry, ?priority, "guest thread started");
                let finished = match translator.execute(&mut context, entry) {
                    Ok(0) => RunState::Exited,
                    Ok(_) => RunState::Stopped,
                    Err(fault) => RunState::Faulted(fault),
                };
                *slot.lock() = Some(context);
                *state.lock() = finished;
                tracing::info!(thread_id, state = ?finished, "guest thread finished");
                let callback = on_finished.lock().take();
                if let Some(callback) = callback {
                    callback(thread_id, finished);
                }
                finished
            })
    }

    /// Returns the thread to [`RunState::Created`] after its host thread
    /// failed to start.
    fn abandon_start(&self, context: Option<ExecutionContext>) {
        *self.context.lock() = context;
        *self.state.lock() = RunState::Created;
        self.executing.store(false, Ordering::Release);
    }

    /// Requests termination; observed at the next subroutine boundary or
    /// backward branch.
    pub fn stop_execution(&self) {
        self.stop.store(false, Ordering::Release);
    }

    /// Waits for the host thread and returns the final state.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::NotStarted`] if the thread was never started
    /// or was already joined, and [`ThreadError::Panicked`] if the host
    /// thread panicked.
    pub fn join(&self) -> Result<RunState, ThreadError> {
        let handle = self
            .handle
            .lock()
            .take()
            .ok_or(ThreadError::NotStarted(self.thread_id))?;
        handle
            .join()
            .map_err(|_| ThreadError::Panicked(self.thread_id))
    }
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn apply_host_priority(priority: HostPriority) {
    // With `who == 0` Linux applies the nice value to the calling thread.
    // SAFETY: plain syscall with no pointer arguments.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, priority.nice()) };
    if result != 0 {
        tracing::warn!(
            ?priority,
            error = %std::io::Error::last_os_error(),
            "host priority hint not applied"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_host_priority(priority: HostPriority) {
    tracing::debug!(?priority, "host priority hints unsupported on this platform");
}
