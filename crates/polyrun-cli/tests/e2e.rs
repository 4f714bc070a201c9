//! End-to-end tests for polyrun CLI commands.
//!
//! These tests run the built binary against real source files.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use polyrun_core::{Language, ToolchainPaths, Toolchains};
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// A temporary directory holding one source file.
struct TestSource {
    _temp_dir: TempDir,
    path: PathBuf,
}

impl TestSource {
    fn new(filename: &str, source: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join(filename);
        fs::write(&path, source).expect("Failed to write source");
        Self {
            _temp_dir: temp_dir,
            path,
        }
    }
}

fn polyrun() -> Command {
    Command::cargo_bin("polyrun").expect("binary should build")
}

fn available(language: Language) -> bool {
    Toolchains::new(&ToolchainPaths::detect())
        .get(language)
        .descriptor()
        .is_available()
}

// =============================================================================
// template / toolchains
// =============================================================================

#[test]
fn test_template_python() {
    polyrun()
        .args(["template", "python"])
        .assert()
        .success()
        .stdout(predicate::str::contains("print(\"Hello, World!\")"));
}

#[test]
fn test_template_accepts_alias() {
    polyrun()
        .args(["template", "c++"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#include <iostream>"));
}

#[test]
fn test_template_unknown_language() {
    polyrun()
        .args(["template", "ruby"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported language: ruby"));
}

#[test]
fn test_toolchains_lists_all_languages() {
    polyrun()
        .arg("toolchains")
        .assert()
        .success()
        .stdout(predicate::str::contains("Python"))
        .stdout(predicate::str::contains("C++"))
        .stdout(predicate::str::contains("Java"));
}

// =============================================================================
// run
// =============================================================================

#[test]
fn test_run_restricted_code_fails() {
    let source = TestSource::new("bad.py", "import os\nprint(1)\n");
    polyrun()
        .arg("run")
        .arg(&source.path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Restricted construct"));
}

#[test]
fn test_run_json_output() {
    let source = TestSource::new("main.c", "int main(){return 0;}");
    let output = polyrun()
        .arg("run")
        .arg(&source.path)
        .arg("--json")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Compilation Error: Missing required header files");
    assert!(json["executionTime"].is_u64());
}

#[test]
fn test_run_unknown_extension() {
    let source = TestSource::new("notes.txt", "print(1)");
    polyrun()
        .arg("run")
        .arg(&source.path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot infer language"));
}

#[test]
fn test_run_missing_file() {
    polyrun()
        .args(["run", "/nonexistent/polyrun/main.py"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_run_python_streams_stdout() {
    if !available(Language::Python) {
        return;
    }
    let source = TestSource::new("hello.py", "print('hi')\nprint('there')\n");
    polyrun()
        .arg("run")
        .arg(&source.path)
        .assert()
        .success()
        .stdout("hi\nthere\n")
        .stderr(predicate::str::contains("Completed"));
}

#[test]
fn test_run_with_explicit_language() {
    if !available(Language::Python) {
        return;
    }
    let source = TestSource::new("script", "print(6 * 7)");
    polyrun()
        .args(["run", "--language", "python"])
        .arg(&source.path)
        .assert()
        .success()
        .stdout("42\n");
}

#[test]
fn test_run_timeout() {
    if !available(Language::Python) {
        return;
    }
    let source = TestSource::new("spin.py", "while True:\n    pass\n");
    polyrun()
        .args(["run", "--timeout-ms", "500"])
        .arg(&source.path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("timed out after 500 ms"));
}
