//! CLI integration tests for linedup.

use assert_cmd::Command;
use predicates::prelude::*;
use std::collections::HashSet;
use std::fs;
use tempfile::TempDir;

/// Get a Command for the linedup binary.
#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("linedup").unwrap()
}

const DUPLICATED: &str = r#"{"text": "hello world"}
{"text": "hello world"}
{"text": "different text here"}
{"text": "another unique document"}
{"text": "different text here"}
"#;

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Exact deduplication for line-oriented datasets larger than memory",
        ));
}

#[test]
fn test_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("linedup"));
}

// ============================================================================
// Argument Validation Tests
// ============================================================================

#[test]
fn test_missing_input() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file is required"));
}

#[test]
fn test_missing_output() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("test.jsonl");
    fs::write(&input, "").unwrap();

    cmd()
        .args([input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("output file required"));
}

#[test]
fn test_zero_chunk_size() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("test.jsonl");
    let output = temp.path().join("out.jsonl");
    let work = temp.path().join("work");
    fs::write(&input, DUPLICATED).unwrap();

    cmd()
        .args([
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-w",
            work.to_str().unwrap(),
            "--chunk-size",
            "0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("chunk_size must be >= 1"));

    assert!(!output.exists());
    assert!(!work.exists());
}

#[test]
fn test_non_numeric_chunk_size() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("test.jsonl");
    fs::write(&input, DUPLICATED).unwrap();

    cmd()
        .args([input.to_str().unwrap(), "-o", "out.jsonl", "-c", "ten"])
        .assert()
        .failure();
}

#[test]
fn test_workspace_is_a_file() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("test.jsonl");
    let output = temp.path().join("out.jsonl");
    let blocker = temp.path().join("blocker");
    fs::write(&input, DUPLICATED).unwrap();
    fs::write(&blocker, "").unwrap();

    cmd()
        .args([
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-w",
            blocker.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn test_missing_input_file() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("out.jsonl");

    cmd()
        .args([
            temp.path().join("nope.jsonl").to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("input stream"));

    assert!(!output.exists());
}

// ============================================================================
// Dedup Tests
// ============================================================================

#[test]
fn test_jsonl_dedup() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input.jsonl");
    let output = temp.path().join("output.jsonl");
    fs::write(&input, DUPLICATED).unwrap();

    cmd()
        .args([
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-c",
            "2",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Deduplication Results:"))
        .stderr(predicate::str::contains("Duplicates found:  2"));

    let content = fs::read_to_string(&output).unwrap();
    let lines: HashSet<&str> = content.lines().collect();
    assert_eq!(content.lines().count(), 3);
    assert_eq!(lines, DUPLICATED.lines().collect::<HashSet<_>>());

    // Default workspace is created next to the output and removed afterwards.
    assert!(!temp.path().join(".output.jsonl.linedup-work").exists());
}

#[test]
fn test_stdin_input() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("output.jsonl");

    cmd()
        .args(["-", "-o", output.to_str().unwrap()])
        .write_stdin("b\na\nb\n")
        .assert()
        .success();

    let content = fs::read_to_string(&output).unwrap();
    assert_eq!(content.lines().count(), 2);
}

#[test]
fn test_json_output() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input.jsonl");
    let output = temp.path().join("output.jsonl");
    fs::write(&input, DUPLICATED).unwrap();

    let assert = cmd()
        .args([
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-c",
            "1",
            "--json",
        ])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["total_lines"], 5);
    assert_eq!(report["unique_lines"], 3);
    assert_eq!(report["duplicates"], 2);
    assert_eq!(report["chunks"], 5);
    assert_eq!(report["rounds"], 3);
    assert_eq!(report["merges"], 4);
    assert_eq!(report["chunk_size"], 1);
}

#[test]
fn test_parallel_with_threads() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input.jsonl");
    let output = temp.path().join("output.jsonl");
    let content: String = (0..100).map(|i| format!("{}\n", i % 37)).collect();
    fs::write(&input, content).unwrap();

    cmd()
        .args([
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-c",
            "10",
            "--threads",
            "2",
        ])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&output).unwrap().lines().count(), 37);
}

#[test]
fn test_skip_blank_lines() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input.jsonl");
    let output = temp.path().join("output.jsonl");
    fs::write(&input, "a\n\nb\n   \na\n").unwrap();

    cmd()
        .args([
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--skip-blank-lines",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("2 skipped"));

    assert_eq!(fs::read_to_string(&output).unwrap().lines().count(), 2);
}

#[test]
fn test_config_file() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input.jsonl");
    let output = temp.path().join("output.jsonl");
    let config = temp.path().join("linedup.json");
    let work = temp.path().join("configured-work");
    fs::write(&input, DUPLICATED).unwrap();
    fs::write(
        &config,
        format!(
            r#"{{"chunk_size": 2, "workspace": {}}}"#,
            serde_json::to_string(work.to_str().unwrap()).unwrap()
        ),
    )
    .unwrap();

    cmd()
        .args([
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("configured-work"))
        .stdout(predicate::str::contains(r#""chunk_size": 2"#));
}

#[test]
fn test_config_file_without_workspace_uses_output_default() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input.jsonl");
    let config = temp.path().join("linedup.json");
    fs::write(&input, DUPLICATED).unwrap();
    fs::write(&config, r#"{"chunk_size": 1}"#).unwrap();

    cmd()
        .current_dir(temp.path())
        .args([
            "input.jsonl",
            "-o",
            "sub/out.jsonl",
            "--config",
            "linedup.json",
            "-v",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains(".out.jsonl.linedup-work"))
        .stderr(predicate::str::contains("Chunk size: 1"));

    assert!(!temp.path().join("linedup-work").exists());
    assert!(!temp.path().join("sub").join(".out.jsonl.linedup-work").exists());
    assert_eq!(
        fs::read_to_string(temp.path().join("sub").join("out.jsonl"))
            .unwrap()
            .lines()
            .count(),
        3
    );
}

#[test]
fn test_invalid_config_file() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input.jsonl");
    let config = temp.path().join("linedup.json");
    fs::write(&input, DUPLICATED).unwrap();
    fs::write(&config, r#"{"chunk_size": 1.5}"#).unwrap();

    cmd()
        .args([
            input.to_str().unwrap(),
            "-o",
            "out.jsonl",
            "--config",
            config.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_verbose() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input.jsonl");
    let output = temp.path().join("output.jsonl");
    fs::write(&input, DUPLICATED).unwrap();

    cmd()
        .args([
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-v",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Configuration:"))
        .stderr(predicate::str::contains("Chunk size: 100000"));
}

// ============================================================================
// Subcommand Tests
// ============================================================================

#[test]
fn test_completions_bash() {
    cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("linedup"));
}

#[test]
fn test_convert_missing_file() {
    let temp = TempDir::new().unwrap();

    cmd()
        .args(["convert", temp.path().join("nope.parquet").to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_convert_empty_directory() {
    let temp = TempDir::new().unwrap();

    cmd()
        .args(["convert", temp.path().to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("No Parquet files found"));
}
