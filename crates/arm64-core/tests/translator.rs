//! Translator integration coverage: guest programs run end to end through
//! decode, IR lowering and the interpreter backend.

#![allow(clippy::pedantic, clippy::nursery, clippy::unreadable_literal)]

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use arm64_core::{
    DecodeTable, ExecutionContext, FaultCode, FaultReason, GeneralRegister, MemoryConfig,
    MemoryManager, SupervisorCallHandler, Translator, TranslatorConfig,
};
use libc as _;
use parking_lot as _;
use portable_atomic as _;
use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

const CODE: u64 = 0x1000;
const DATA: u64 = 0x3000;
const STACK_TOP: u64 = 0x5000;

const RET: u32 = 0xD65F03C0;

fn load(memory: &MemoryManager, address: u64, program: &[u32]) {
    let bytes: Vec<u8> = program.iter().flat_map(|word| word.to_le_bytes()).collect();
    memory.write_bytes(address, &bytes).expect("load program");
}

fn machine(program: &[u32]) -> (Translator, ExecutionContext) {
    let memory = MemoryManager::with_ram_size(0x10000, &MemoryConfig::default()).expect("ram");
    memory.map(0x1000, 0x1000, 0x4000).expect("map");
    load(&memory, CODE, program);
    let table = DecodeTable::a64().expect("a64 table");
    let translator = Translator::new(
        Arc::new(memory),
        Arc::new(table),
        TranslatorConfig::default(),
    );
    let mut context = ExecutionContext::new(1);
    context.registers_mut().set_sp(STACK_TOP);
    (translator, context)
}

fn x(context: &ExecutionContext, index: u8) -> u64 {
    let reg = GeneralRegister::from_u5(index).expect("general register");
    context.registers().gpr(reg)
}

fn set_x(context: &mut ExecutionContext, index: u8, value: u64) {
    let reg = GeneralRegister::from_u5(index).expect("general register");
    context.registers_mut().set_gpr(reg, value);
}

#[test]
fn counted_loop_sums_to_fifty_five() {
    let (translator, mut context) = machine(&[
        0xD2800000, // movz x0, #0
        0xD2800141, // movz x1, #10
        0x8B010000, // add x0, x0, x1
        0xF1000421, // subs x1, x1, #1
        0x54FFFFC1, // b.ne -8
        RET,
    ]);
    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(x(&context, 0), 55);
    assert_eq!(x(&context, 1), 0);
    assert!(context.registers().nzcv().z);
    assert_eq!(translator.stats().translations, 1);
}

#[test]
fn call_through_dispatch_marks_caller_for_rejit() {
    let (translator, mut context) = machine(&[
        0xA9BF7BFD, // stp x29, x30, [sp, #-16]!
        0x9400003F, // bl 0x1100
        0xA8C17BFD, // ldp x29, x30, [sp], #16
        RET,
    ]);
    load(
        translator.memory(),
        0x1100,
        &[
            0xD2800540, // movz x0, #42
            RET,
        ],
    );

    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(x(&context, 0), 42);
    assert_eq!(context.registers().sp(), STACK_TOP);

    let caller = translator.cached(CODE).expect("caller cached");
    assert!(caller.sub_calls().contains(&0x1100));
    assert!(caller.needs_rejit());
    assert!(!translator.cached(0x1100).expect("callee cached").needs_rejit());

    let rebuilt = translator.get_or_translate(CODE).expect("recompile");
    assert!(!rebuilt.needs_rejit());
    assert!(rebuilt.sub_calls().is_empty());
    let stats = translator.stats();
    assert_eq!(stats.translations, 3);
    assert_eq!(stats.rejits, 1);
    assert_eq!(stats.cached, 2);

    set_x(&mut context, 0, 0);
    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(x(&context, 0), 42);
}

#[test]
fn cache_hit_reuses_compiled_subroutine() {
    let (translator, _) = machine(&[RET]);
    let first = translator.get_or_translate(CODE).expect("translate");
    let second = translator.get_or_translate(CODE).expect("hit");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(translator.stats().translations, 1);
}

#[rstest]
#[case::brk(0xD4200000, FaultCode::GuestBreak)]
#[case::undefined(0x00000000, FaultCode::UndefinedInstruction)]
#[case::unhandled_svc(0xD4000021, FaultCode::UnhandledSupervisorCall)]
fn guest_traps_surface_as_typed_faults(#[case] word: u32, #[case] code: FaultCode) {
    let (translator, mut context) = machine(&[0xD2800020, word, RET]);
    let fault = translator
        .execute(&mut context, CODE)
        .expect_err("trap ends execution");
    assert_eq!(fault, FaultReason::new(code, CODE + 4));
    // Instructions before the trap have already retired.
    assert_eq!(x(&context, 0), 1);
}

#[test]
fn data_abort_reports_the_faulting_data_address() {
    let (translator, mut context) = machine(&[
        0xF9400020, // ldr x0, [x1]
        RET,
    ]);
    set_x(&mut context, 1, 0x9000);
    assert_eq!(
        translator.execute(&mut context, CODE),
        Err(FaultReason::unmapped(0x9000))
    );
}

#[test]
fn unmapped_entry_faults_before_execution() {
    let (translator, mut context) = machine(&[RET]);
    assert_eq!(
        translator.execute(&mut context, 0x8000),
        Err(FaultReason::unmapped(0x8000))
    );
    assert_eq!(translator.stats().cached, 0);
}

#[derive(Default)]
struct RecordingHandler {
    last: AtomicU16,
}

impl SupervisorCallHandler for RecordingHandler {
    fn supervisor_call(
        &self,
        context: &mut ExecutionContext,
        memory: &MemoryManager,
        imm: u16,
    ) -> Result<(), FaultReason> {
        self.last.store(imm, Ordering::Relaxed);
        let address = context.registers().gpr(GeneralRegister::X0);
        let value = memory.read_u64(address)?;
        context
            .registers_mut()
            .set_gpr(GeneralRegister::X0, value + u64::from(imm));
        Ok(())
    }
}

#[test]
fn supervisor_call_reaches_installed_handler() {
    let (translator, context) = machine(&[
        0xD4000021, // svc #1
        RET,
    ]);
    let handler = Arc::new(RecordingHandler::default());
    let mut context = context.with_supervisor(Arc::clone(&handler) as Arc<dyn SupervisorCallHandler>);
    translator.memory().write_u64(DATA, 100).expect("seed");
    set_x(&mut context, 0, DATA);

    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(x(&context, 0), 101);
    assert_eq!(handler.last.load(Ordering::Relaxed), 1);
}

#[test]
fn exclusive_pair_increments_memory() {
    let (translator, mut context) = machine(&[
        0x885F7C22, // ldxr w2, [x1]
        0x11000442, // add w2, w2, #1
        0x88037C22, // stxr w3, w2, [x1]
        0x35FFFFA3, // cbnz w3, -12
        RET,
    ]);
    translator.memory().write_u32(DATA, 41).expect("seed");
    set_x(&mut context, 1, DATA);

    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(translator.memory().read_u32(DATA), Ok(42));
    assert_eq!(x(&context, 3), 0);
    assert!(context.exclusive().is_none());
}

#[test]
fn store_exclusive_without_reservation_fails() {
    let (translator, mut context) = machine(&[
        0x88037C22, // stxr w3, w2, [x1]
        RET,
    ]);
    translator.memory().write_u32(DATA, 7).expect("seed");
    set_x(&mut context, 1, DATA);
    set_x(&mut context, 2, 99);

    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(x(&context, 3), 1);
    assert_eq!(translator.memory().read_u32(DATA), Ok(7));
}

#[test]
fn compare_and_select_follow_signed_order() {
    let (translator, mut context) = machine(&[
        0xD28000A0, // movz x0, #5
        0xD28000E1, // movz x1, #7
        0xEB01001F, // cmp x0, x1
        0x9A81B002, // csel x2, x0, x1, lt
        RET,
    ]);
    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(x(&context, 2), 5);
    assert!(context.registers().nzcv().n);
}

#[test]
fn thread_pointer_round_trips_through_system_register() {
    let (translator, mut context) = machine(&[
        0xD51BD041, // msr tpidr_el0, x1
        0xD53BD040, // mrs x0, tpidr_el0
        RET,
    ]);
    set_x(&mut context, 1, 0xABCD);
    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(x(&context, 0), 0xABCD);
}

#[rstest]
#[case::lsl(0xD37CEC20, 0x1234, 0x12340)]
#[case::lsr(0xD344FC20, 0x1234, 0x123)]
#[case::asr(0x9344FC20, 0x8000_0000_0000_0000, 0xF800_0000_0000_0000)]
#[case::sxtw(0x93407C20, 0xFFFF_FFFF, u64::MAX)]
#[case::mvn(0xAA2103E0, 0, u64::MAX)]
#[case::clz(0xDAC01020, 1, 63)]
#[case::rev(0xDAC00C20, 0x0102_0304_0506_0708, 0x0807_0605_0403_0201)]
#[case::mov_w(0x2A0103E0, 0xFFFF_FFFF_0000_0001, 1)]
#[case::and_imm(0x92401C20, 0x1234, 0x34)]
#[case::add_shifted_imm(0x91400420, 1, 0x1001)]
#[case::neg(0xCB0103E0, 1, u64::MAX)]
#[case::mul(0x9B017C20, 12, 144)]
#[case::udiv(0x9AC10820, 9, 1)]
#[case::udiv_by_zero(0x9AC10820, 0, 0)]
fn single_instruction_results(#[case] word: u32, #[case] input: u64, #[case] expected: u64) {
    let (translator, mut context) = machine(&[word, RET]);
    set_x(&mut context, 1, input);
    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(x(&context, 0), expected);
}

#[test]
fn adr_is_relative_to_the_instruction() {
    let (translator, mut context) = machine(&[
        0x10000040, // adr x0, #8
        RET,
    ]);
    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(x(&context, 0), CODE + 8);
}

#[test]
fn stop_request_breaks_a_spin_loop() {
    let (translator, mut context) = machine(&[
        0x14000000, // b .
    ]);
    context.request_stop();
    assert_eq!(translator.execute(&mut context, CODE), Ok(CODE));
    assert_eq!(context.registers().pc(), CODE);
}

#[test]
fn unsynchronized_loops_still_run_to_completion() {
    let memory = MemoryManager::with_ram_size(0x10000, &MemoryConfig::default()).expect("ram");
    memory.map(0x1000, 0x1000, 0x1000).expect("map");
    load(
        &memory,
        CODE,
        &[0xD2800000, 0xD2800141, 0x8B010000, 0xF1000421, 0x54FFFFC1, RET],
    );
    let config = TranslatorConfig {
        synchronize_backward_branches: false,
        ..TranslatorConfig::default()
    };
    let translator = Translator::new(
        Arc::new(memory),
        Arc::new(DecodeTable::a64().expect("a64 table")),
        config,
    );
    let mut context = ExecutionContext::new(2);
    assert_eq!(translator.execute(&mut context, CODE), Ok(0));
    assert_eq!(x(&context, 0), 55);
}
