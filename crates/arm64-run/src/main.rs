//! CLI entry point for the `arm64-run` binary.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use arm64_core::{PageTableLayout, RunState};
use arm64_run::session::DEFAULT_BASE;
use arm64_run::{run, GuestImage, RunOptions, RunReport};
#[cfg(test)]
use tempfile as _;
use thiserror as _;
use tracing as _;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "ARM64_LOG";

const USAGE_TEXT: &str = "\
Usage: arm64-run <image> [options]

Runs a raw little-endian A64 image until its entry subroutine returns.

Options:
  --base <addr>           Guest load address (default 0x10000)
  --entry <addr>          Entry address (default: load address)
  --ram <bytes>           Guest RAM size (default 64 MiB)
  --address-bits <n>      Guest virtual address width (default 48)
  --flat-page-table       Use a single-level page table
  --priority <n>          Guest thread priority (default 30)
  -v, --verbose           Log at debug level
  -h, --help              Show this help message

Numbers accept a 0x prefix for hexadecimal.
Logging is filtered by ARM64_LOG (default: info).

Examples:
  arm64-run loop.bin
  arm64-run kernel.bin --base 0x80000 --entry 0x80040 --ram 0x10000000
";

#[derive(Debug, PartialEq, Eq)]
struct RunArgs {
    image: PathBuf,
    base: u64,
    options: RunOptions,
    verbose: bool,
}

#[derive(Debug)]
enum ParseResult {
    Command(RunArgs),
    Help,
}

fn parse_number(flag: &str, value: Option<OsString>) -> Result<u64, String> {
    let value = value.ok_or_else(|| format!("missing value for {flag}"))?;
    let text = value.to_string_lossy();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.map_err(|_| format!("invalid number for {flag}: {text}"))
}

#[allow(clippy::while_let_on_iterator)]
fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let mut image: Option<PathBuf> = None;
    let mut base = DEFAULT_BASE;
    let mut options = RunOptions::default();
    let mut verbose = false;

    while let Some(arg) = args.next() {
        let flag = arg.to_string_lossy().to_string();
        match flag.as_str() {
            "--help" | "-h" => return Ok(ParseResult::Help),
            "--verbose" | "-v" => verbose = true,
            "--flat-page-table" => options.cpu.memory.page_table = PageTableLayout::Flat,
            "--base" => base = parse_number(&flag, args.next())?,
            "--entry" => options.entry = Some(parse_number(&flag, args.next())?),
            "--ram" => {
                let ram = parse_number(&flag, args.next())?;
                options.cpu.ram_size =
                    usize::try_from(ram).map_err(|_| format!("--ram too large: {ram}"))?;
            }
            "--address-bits" => {
                let bits = parse_number(&flag, args.next())?;
                options.cpu.memory.address_space_bits =
                    u32::try_from(bits).map_err(|_| format!("invalid address width: {bits}"))?;
            }
            "--priority" => {
                let priority = args
                    .next()
                    .ok_or_else(|| "missing value for --priority".to_string())?;
                let priority = priority.to_string_lossy();
                options.priority = priority
                    .parse()
                    .map_err(|_| format!("invalid priority: {priority}"))?;
            }
            other if other.starts_with('-') => return Err(format!("unknown option: {other}")),
            _ => {
                if image.is_some() {
                    return Err("multiple image paths provided".to_string());
                }
                image = Some(PathBuf::from(arg));
            }
        }
    }

    let image = image.ok_or_else(|| "missing image path".to_string())?;
    Ok(ParseResult::Command(RunArgs {
        image,
        base,
        options,
        verbose,
    }))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(report: &RunReport) {
    let state = match report.state {
        RunState::Faulted(fault) => format!("faulted: {fault}"),
        other => format!("{other:?}").to_lowercase(),
    };
    println!("state: {state}");
    println!("x0 = {:#x} ({})", report.x0, report.x0);
    println!("pc = {:#x}", report.pc);
    println!(
        "translations: {}, re-jits: {}, cached: {}",
        report.stats.translations, report.stats.rejits, report.stats.cached
    );
}

const fn exit_code(state: RunState) -> i32 {
    match state {
        RunState::Exited => 0,
        RunState::Faulted(_) => 2,
        RunState::Created | RunState::Running | RunState::Stopped => 3,
    }
}

fn run_image(args: &RunArgs) -> Result<i32, String> {
    let image = GuestImage::read(&args.image, args.base).map_err(|error| error.to_string())?;
    let report = run(&image, &args.options).map_err(|error| error.to_string())?;
    print_report(&report);
    Ok(exit_code(report.state))
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(args)) => {
            init_logging(args.verbose);
            match run_image(&args) {
                Ok(code) => code,
                Err(error) => {
                    eprintln!("error: {error}");
                    1
                }
            }
        }
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!("{USAGE_TEXT}");
            1
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;

    fn args(values: &[&str]) -> impl Iterator<Item = OsString> {
        values
            .iter()
            .map(OsString::from)
            .collect::<Vec<_>>()
            .into_iter()
    }

    fn command(values: &[&str]) -> RunArgs {
        match parse_args(args(values)).expect("valid args should parse") {
            ParseResult::Command(run) => run,
            ParseResult::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn parses_image_with_defaults() {
        let run = command(&["loop.bin"]);
        assert_eq!(
            run,
            RunArgs {
                image: PathBuf::from("loop.bin"),
                base: DEFAULT_BASE,
                options: RunOptions::default(),
                verbose: false,
            }
        );
    }

    #[test]
    fn parses_every_option() {
        let run = command(&[
            "--base",
            "0x80000",
            "kernel.bin",
            "--entry",
            "0x80040",
            "--ram",
            "16777216",
            "--address-bits",
            "39",
            "--flat-page-table",
            "--priority",
            "44",
            "-v",
        ]);
        assert_eq!(run.base, 0x80000);
        assert_eq!(run.options.entry, Some(0x80040));
        assert_eq!(run.options.cpu.ram_size, 16 * 1024 * 1024);
        assert_eq!(run.options.cpu.memory.address_space_bits, 39);
        assert_eq!(run.options.cpu.memory.page_table, PageTableLayout::Flat);
        assert_eq!(run.options.priority, 44);
        assert!(run.verbose);
        assert_eq!(
            run.options.cpu.translator,
            arm64_core::CpuConfig::default().translator
        );
    }

    #[test]
    fn parses_help_flag() {
        let result = parse_args(args(&["--help"])).expect("help should parse without error");
        assert!(matches!(result, ParseResult::Help));
    }

    #[test]
    fn rejects_unknown_option() {
        let error = parse_args(args(&["image.bin", "--turbo"])).expect_err("unknown option");
        assert!(error.contains("unknown option"));
    }

    #[test]
    fn rejects_missing_image() {
        let error = parse_args(args(&["--verbose"])).expect_err("missing image");
        assert!(error.contains("missing image"));
    }

    #[test]
    fn rejects_malformed_numbers() {
        let error = parse_args(args(&["a.bin", "--base", "0xZZ"])).expect_err("bad number");
        assert!(error.contains("invalid number for --base"));
        let error = parse_args(args(&["a.bin", "--entry"])).expect_err("missing value");
        assert!(error.contains("missing value for --entry"));
    }

    #[test]
    fn rejects_second_image() {
        let error = parse_args(args(&["a.bin", "b.bin"])).expect_err("two images");
        assert!(error.contains("multiple image paths"));
    }

    #[test]
    fn negative_priorities_are_accepted() {
        assert_eq!(command(&["a.bin", "--priority", "-4"]).options.priority, -4);
    }

    #[test]
    fn exit_codes_follow_final_state() {
        assert_eq!(exit_code(RunState::Exited), 0);
        assert_eq!(
            exit_code(RunState::Faulted(arm64_core::FaultReason::unmapped(0))),
            2
        );
        assert_eq!(exit_code(RunState::Stopped), 3);
    }
}
