//! Throughput harness for the translator dispatch loop.
//!
//! Measures guest instructions retired per second on small hot loops, with
//! every worker thread sharing one translator and its subroutine cache.
//!
//! ## Usage
//!
//! ```sh
//! cargo run -p arm64-core --release --example performance_harness
//! ```
//!
//! ## Metrics
//!
//! - Guest instructions per second (static count of the loop body times
//!   iterations)
//! - Subroutine entries per second (one per `Translator::execute` plus one
//!   per dispatched call)

#![allow(clippy::pedantic)]

use arm64_core::{
    DecodeTable, ExecutionContext, GeneralRegister, MemoryConfig, MemoryManager, Translator,
    TranslatorConfig,
};
use libc as _;
use parking_lot as _;
use portable_atomic as _;
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

const NUM_THREADS: usize = 4;
const ITERATIONS_PER_CALL: u64 = 1000;
const CODE_BASE: u64 = 0x1000;
const DATA_BASE: u64 = 0x8000;

const ALU_LOOP: u64 = 0x1000;
const MEMORY_LOOP: u64 = 0x2000;
const CALL_LOOP: u64 = 0x3000;
const CALLEE: u64 = 0x3100;

const RET: u32 = 0xD65F_03C0;

#[derive(Debug, Clone, Copy)]
struct Workload {
    name: &'static str,
    entry: u64,
    /// Guest instructions retired per loop iteration.
    body: u64,
    /// Subroutine entries per loop iteration.
    calls: u64,
}

const WORKLOADS: [Workload; 3] = [
    Workload {
        name: "alu_loop",
        entry: ALU_LOOP,
        body: 5,
        calls: 0,
    },
    Workload {
        name: "memory_loop",
        entry: MEMORY_LOOP,
        body: 5,
        calls: 0,
    },
    Workload {
        name: "call_loop",
        entry: CALL_LOOP,
        body: 5,
        calls: 1,
    },
];

#[derive(Debug, Clone, Copy)]
struct BenchmarkResult {
    name: &'static str,
    instructions_per_second: f64,
    entries_per_second: f64,
}

fn load(memory: &MemoryManager, address: u64, words: &[u32]) {
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    memory
        .write_bytes(address, &bytes)
        .expect("program fits the code mapping");
}

fn build_translator() -> Arc<Translator> {
    let memory =
        MemoryManager::with_ram_size(0x10000, &MemoryConfig::default()).expect("guest ram");
    memory.map(CODE_BASE, CODE_BASE, 0x4000).expect("code");
    memory.map(DATA_BASE, DATA_BASE, 0x1000).expect("data");

    load(
        &memory,
        ALU_LOOP,
        &[
            0x8B01_0000, // add x0, x0, x1
            0xCA01_0002, // eor x2, x0, x1
            0x9B01_7C43, // mul x3, x2, x1
            0xF100_0421, // subs x1, x1, #1
            0x54FF_FF81, // b.ne -16
            RET,
        ],
    );
    load(
        &memory,
        MEMORY_LOOP,
        &[
            0xF940_0062, // ldr x2, [x3]
            0x9100_0442, // add x2, x2, #1
            0xF900_0062, // str x2, [x3]
            0xF100_0421, // subs x1, x1, #1
            0x54FF_FF81, // b.ne -16
            RET,
        ],
    );
    load(
        &memory,
        CALL_LOOP,
        &[
            0xAA1E_03F3, // mov x19, x30
            0x9400_003F, // bl callee
            0xF100_0421, // subs x1, x1, #1
            0x54FF_FFC1, // b.ne -8
            0xAA13_03FE, // mov x30, x19
            RET,
        ],
    );
    load(
        &memory,
        CALLEE,
        &[
            0x9100_0400, // add x0, x0, #1
            RET,
        ],
    );

    Arc::new(Translator::new(
        Arc::new(memory),
        Arc::new(DecodeTable::a64().expect("a64 table")),
        TranslatorConfig::default(),
    ))
}

fn benchmark(translator: &Arc<Translator>, workload: Workload, duration: Duration) -> BenchmarkResult {
    let (tx, rx) = mpsc::channel();

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|worker| {
            let tx = tx.clone();
            let translator = Arc::clone(translator);
            thread::spawn(move || {
                let mut context = ExecutionContext::new(worker as u64 + 1);
                let slot = DATA_BASE + worker as u64 * 8;

                let mut iterations = 0u64;
                let mut entries = 0u64;
                let start = Instant::now();

                while start.elapsed() < duration {
                    let registers = context.registers_mut();
                    registers.set_gpr(GeneralRegister::X1, ITERATIONS_PER_CALL);
                    registers.set_gpr(GeneralRegister::X3, slot);
                    registers.set_gpr(GeneralRegister::LR, 0);

                    translator
                        .execute(&mut context, workload.entry)
                        .expect("workload runs without faulting");
                    iterations += ITERATIONS_PER_CALL;
                    entries += 1 + ITERATIONS_PER_CALL * workload.calls;
                }

                tx.send((iterations, entries)).ok();
            })
        })
        .collect();

    for h in handles {
        h.join().ok();
    }

    drop(tx);

    let mut total_iterations = 0u64;
    let mut total_entries = 0u64;
    for (iterations, entries) in rx {
        total_iterations += iterations;
        total_entries += entries;
    }

    let elapsed_secs = duration.as_secs_f64();
    BenchmarkResult {
        name: workload.name,
        instructions_per_second: (total_iterations * workload.body) as f64 / elapsed_secs,
        entries_per_second: total_entries as f64 / elapsed_secs,
    }
}

fn format_number(n: f64) -> String {
    if n >= 1_000_000.0 {
        format!("{:.2}M", n / 1_000_000.0)
    } else if n >= 1_000.0 {
        format!("{:.2}K", n / 1_000.0)
    } else {
        format!("{:.2}", n)
    }
}

fn print_results(translator: &Translator, results: &[BenchmarkResult]) {
    let stats = translator.stats();
    println!("\n╔══════════════════════════════════════════════════╗");
    println!("║        ARM64-CORE TRANSLATOR THROUGHPUT          ║");
    println!("╠══════════════════════════════════════════════════╣");
    println!(
        "║   Threads:        {:>5}                          ║",
        NUM_THREADS
    );
    println!(
        "║   Iterations:     {:>5} per execute              ║",
        ITERATIONS_PER_CALL
    );
    println!(
        "║   Translations:   {:>5} ({} re-jit, {} cached)    ║",
        stats.translations, stats.rejits, stats.cached
    );
    println!("╠══════════════════════════════════════════════════╣");
    println!(
        "║ {:12} │ {:>15} │ {:>15} ║",
        "Benchmark", "Instr/sec", "Entries/sec"
    );
    println!("╟──────────────┼─────────────────┼─────────────────╢");

    for result in results {
        println!(
            "║ {:12} │ {:>15} │ {:>15} ║",
            result.name,
            format_number(result.instructions_per_second),
            format_number(result.entries_per_second)
        );
    }

    println!("╚══════════════════════════════════════════════════╝");
}

fn main() {
    let warmup = Duration::from_millis(500);
    let benchmark_duration = Duration::from_secs(3);
    let translator = build_translator();

    println!("Running warmup for {:?}...", warmup);
    for workload in WORKLOADS {
        let _ = benchmark(&translator, workload, warmup / 3);
    }

    println!("Running benchmarks for {:?} each...\n", benchmark_duration);
    let results: Vec<_> = WORKLOADS
        .iter()
        .map(|workload| benchmark(&translator, *workload, benchmark_duration))
        .collect();

    print_results(&translator, &results);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_workload_retires_instructions() {
        let translator = build_translator();
        for workload in WORKLOADS {
            let result = benchmark(&translator, workload, Duration::from_millis(50));
            assert!(result.instructions_per_second > 0.0, "{}", result.name);
            assert!(result.entries_per_second > 0.0, "{}", result.name);
        }
    }

    #[test]
    fn call_loop_binds_the_callee_directly_after_rejit() {
        let translator = build_translator();
        let _ = benchmark(&translator, WORKLOADS[2], Duration::from_millis(20));
        let _ = benchmark(&translator, WORKLOADS[2], Duration::from_millis(20));
        let caller = translator.cached(CALL_LOOP).expect("caller cached");
        assert!(caller.sub_calls().is_empty());
        assert!(translator.stats().rejits >= 1);
    }
}
