//! Builds one guest address space around an image, then runs it on a
//! single guest thread until the entry subroutine returns.
//!
//! Layout: the image sits at its base address, backed by guest RAM from
//! offset zero. One unmapped guard page follows it, then the stack.

use std::sync::Arc;

use arm64_core::{
    CpuConfig, DecodeTable, ExecutionContext, GeneralRegister, GuestThread, MemoryError,
    MemoryManager, PatternError, RunState, ThreadError, Translator, TranslatorStats, PAGE_SIZE,
};
use thiserror::Error;

use crate::image::{GuestImage, ImageError};

/// Default guest load address.
pub const DEFAULT_BASE: u64 = 0x1_0000;
/// Default guest stack size.
pub const DEFAULT_STACK_SIZE: u64 = 0x1_0000;
/// Default guest priority, in the normal host band.
pub const DEFAULT_PRIORITY: i32 = 30;

const MAIN_THREAD_ID: u64 = 1;

/// Failures that prevent the guest from running at all.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Guest RAM or a mapping could not be set up.
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// The image could not be placed.
    #[error(transparent)]
    Image(#[from] ImageError),
    /// The decode table could not be built.
    #[error(transparent)]
    Table(#[from] PatternError),
    /// The guest thread could not be started or joined.
    #[error(transparent)]
    Thread(#[from] ThreadError),
    /// The image, guard page and stack do not fit below `2^64`.
    #[error("image at {base:#x} with a {stack_size:#x}-byte stack overflows the address space")]
    LayoutOverflow {
        /// Image base address.
        base: u64,
        /// Requested stack size.
        stack_size: u64,
    },
}

/// How to run an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Entry address; the image base when `None`.
    pub entry: Option<u64>,
    /// Memory and translator configuration.
    pub cpu: CpuConfig,
    /// Guest priority of the main thread.
    pub priority: i32,
    /// Stack size in bytes, rounded up to whole pages.
    pub stack_size: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            entry: None,
            cpu: CpuConfig::default(),
            priority: DEFAULT_PRIORITY,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Final thread state.
    pub state: RunState,
    /// `X0` when execution ended.
    pub x0: u64,
    /// Program counter when execution ended.
    pub pc: u64,
    /// Translator counters.
    pub stats: TranslatorStats,
}

/// Loads `image`, runs it to completion and reports the final state.
///
/// Guest faults do not fail the call; they are reported through
/// [`RunReport::state`].
///
/// # Errors
///
/// Returns [`SessionError`] when memory, the decode table or the host
/// thread cannot be set up.
pub fn run(image: &GuestImage, options: &RunOptions) -> Result<RunReport, SessionError> {
    let cpu = &options.cpu;
    let memory = MemoryManager::with_ram_size(cpu.ram_size, &cpu.memory)?;
    image.load_into(&memory, 0)?;

    let (stack_base, stack_size, stack_top) =
        stack_layout(image, options.stack_size).ok_or(SessionError::LayoutOverflow {
            base: image.base(),
            stack_size: options.stack_size,
        })?;
    memory.map(stack_base, image.mapped_size(), stack_size)?;

    let translator = Arc::new(Translator::new(
        Arc::new(memory),
        Arc::new(DecodeTable::a64()?),
        cpu.translator,
    ));
    let mut context = ExecutionContext::new(MAIN_THREAD_ID);
    context.registers_mut().set_sp(stack_top);

    let entry = options.entry.unwrap_or_else(|| image.base());
    let thread = GuestThread::new(Arc::clone(&translator), context, options.priority, entry);
    tracing::info!(entry, stack_top, priority = options.priority, "starting guest");
    thread.execute()?;
    let state = thread.join()?;

    let (x0, pc) = thread
        .with_registers(|registers| (registers.gpr(GeneralRegister::X0), registers.pc()))
        .unwrap_or_default();
    Ok(RunReport {
        state,
        x0,
        pc,
        stats: translator.stats(),
    })
}

/// Stack base, rounded size and top, past the image and its guard page.
fn stack_layout(image: &GuestImage, stack_size: u64) -> Option<(u64, u64, u64)> {
    let stack_size = stack_size.div_ceil(PAGE_SIZE).max(1).checked_mul(PAGE_SIZE)?;
    let stack_base = image
        .base()
        .checked_add(image.mapped_size())?
        .checked_add(PAGE_SIZE)?;
    let stack_top = stack_base.checked_add(stack_size)?;
    Some((stack_base, stack_size, stack_top))
}

#[cfg(test)]
mod tests {
    use arm64_core::{FaultCode, RunState};

    use super::{run, stack_layout, RunOptions, SessionError, DEFAULT_BASE};
    use crate::image::GuestImage;

    fn image(words: &[u32]) -> GuestImage {
        let bytes = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        GuestImage::from_bytes(DEFAULT_BASE, bytes).expect("valid image")
    }

    #[test]
    fn loop_program_exits_with_its_sum() {
        let image = image(&[
            0xD280_0000, // movz x0, #0
            0xD280_0141, // movz x1, #10
            0x8B01_0000, // add x0, x0, x1
            0xF100_0421, // subs x1, x1, #1
            0x54FF_FFC1, // b.ne -8
            0xD65F_03C0, // ret
        ]);
        let report = run(&image, &RunOptions::default()).expect("run");
        assert_eq!(report.state, RunState::Exited);
        assert_eq!(report.x0, 55);
        assert_eq!(report.pc, 0);
        assert_eq!(report.stats.translations, 1);
    }

    #[test]
    fn stack_is_usable_below_its_top() {
        let image = image(&[
            0xA9BF_7BFD, // stp x29, x30, [sp, #-16]!
            0xF940_03E0, // ldr x0, [sp]
            0xA8C1_7BFD, // ldp x29, x30, [sp], #16
            0xD65F_03C0, // ret
        ]);
        let report = run(&image, &RunOptions::default()).expect("run");
        assert_eq!(report.state, RunState::Exited);
    }

    #[test]
    fn guest_faults_are_reported_not_returned() {
        let report = run(&image(&[0xD420_0000]), &RunOptions::default()).expect("run");
        let fault = report.state.fault().expect("faulted");
        assert_eq!(fault.code, FaultCode::GuestBreak);
        assert_eq!(fault.address, DEFAULT_BASE);
    }

    #[test]
    fn undersized_ram_fails_setup() {
        let mut options = RunOptions::default();
        options.cpu.ram_size = 0x1000;
        assert!(matches!(
            run(&image(&[0xD65F_03C0]), &options),
            Err(SessionError::Memory(_))
        ));
    }

    #[test]
    fn oversized_stack_fails_setup() {
        let options = RunOptions {
            stack_size: u64::MAX,
            ..RunOptions::default()
        };
        assert!(matches!(
            run(&image(&[0xD65F_03C0]), &options),
            Err(SessionError::LayoutOverflow {
                base: DEFAULT_BASE,
                stack_size: u64::MAX,
            })
        ));
    }

    #[test]
    fn stack_layout_rejects_wrapping_addresses() {
        let high = GuestImage::from_bytes(0xFFFF_FFFF_FFFF_E000, vec![0; 4]).expect("valid");
        assert_eq!(stack_layout(&high, 0x1000), None);
        assert_eq!(
            stack_layout(&image(&[0xD65F_03C0]), 0x1001),
            Some((DEFAULT_BASE + 0x2000, 0x2000, DEFAULT_BASE + 0x4000))
        );
    }
}
