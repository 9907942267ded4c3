//! Integration tests for the arm64-run CLI.

use arm64_core as _;
use arm64_run as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror as _;
use tracing as _;
use tracing_subscriber as _;

fn binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_arm64-run"))
}

fn write_image(dir: &Path, name: &str, words: &[u32]) -> PathBuf {
    let path = dir.join(name);
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
    fs::write(&path, bytes).unwrap();
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(binary_path())
        .args(args)
        .env("ARM64_LOG", "warn")
        .output()
        .expect("failed to run arm64-run")
}

const SUM_LOOP: [u32; 6] = [
    0xD280_0000, // movz x0, #0
    0xD280_0141, // movz x1, #10
    0x8B01_0000, // add x0, x0, x1
    0xF100_0421, // subs x1, x1, #1
    0x54FF_FFC1, // b.ne -8
    0xD65F_03C0, // ret
];

#[test]
fn runs_image_to_completion() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_image(temp_dir.path(), "sum.bin", &SUM_LOOP);

    let output = run(&[image.to_str().unwrap()]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("state: exited"), "stdout: {stdout}");
    assert!(stdout.contains("x0 = 0x37 (55)"), "stdout: {stdout}");
}

#[test]
fn honours_base_entry_and_flat_tables() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut words = vec![0xD420_0000]; // brk #0, skipped by --entry
    words.extend_from_slice(&SUM_LOOP);
    let image = write_image(temp_dir.path(), "offset.bin", &words);

    let output = run(&[
        image.to_str().unwrap(),
        "--base",
        "0x200000",
        "--entry",
        "0x200004",
        "--address-bits",
        "32",
        "--flat-page-table",
        "--ram",
        "0x100000",
    ]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("x0 = 0x37"));
}

#[test]
fn guest_fault_sets_exit_code() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_image(temp_dir.path(), "brk.bin", &[0xD420_0000]);

    let output = run(&[image.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("faulted: guest broke execution at 0x10000"),
        "stdout: {stdout}"
    );
}

#[test]
fn base_at_the_top_of_memory_is_a_setup_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_image(temp_dir.path(), "high.bin", &SUM_LOOP);

    let output = run(&[image.to_str().unwrap(), "--base", "0xFFFFFFFFFFFFF000"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn missing_image_is_an_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    let missing = temp_dir.path().join("missing.bin");

    let output = run(&[missing.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read"));
}

#[test]
fn help_prints_usage() {
    let output = run(&["--help"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage: arm64-run"));
}

#[test]
fn unknown_option_prints_usage_to_stderr() {
    let output = run(&["--frobnicate"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown option"));
}
