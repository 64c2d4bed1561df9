//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Code running on the tokio runtime MUST NOT block.
//! **Required**: `tokio::io`, `tokio::net` and async `reqwest`, never their
//! blocking counterparts.
//! **Acceptable**: blocking calls in plain `fn`s that run before the
//! runtime work starts (config loading).

use architectural_enforcement::{all_production_lines, is_async_context, SourceLine};

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = find_blocking_io_violations(&all_production_lines());

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking I/O found in async code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n❌ FORBIDDEN in async code:");
        eprintln!("  - std::fs::*, std::net::*");
        eprintln!("  - std::io::stdin(), std::io::stdout()");
        eprintln!("  - std::process::Command");
        eprintln!("\n❌ FORBIDDEN everywhere:");
        eprintln!("  - reqwest::blocking::*");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}

fn find_blocking_io_violations(lines: &[SourceLine]) -> Vec<String> {
    let mut violations = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let code = &line.code;

        if code.contains("reqwest::blocking") {
            violations.push(line.describe("Blocking HTTP client"));
            continue;
        }

        if !is_async_context(lines, idx) {
            continue;
        }

        if code.contains("std::fs::") {
            violations.push(line.describe("Blocking file I/O"));
        }
        if code.contains("std::net::") {
            violations.push(line.describe("Blocking network I/O"));
        }
        if code.contains("std::process::Command") {
            violations.push(line.describe("Blocking process I/O"));
        }
        if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
            violations.push(line.describe("Blocking stdin/stdout"));
        }
    }

    violations
}

fn line(number: usize, code: &str) -> SourceLine {
    SourceLine {
        path: "widget/core/src/x.rs".into(),
        number,
        code: code.to_string(),
        text: code.trim().to_string(),
    }
}

#[test]
fn test_detector_allows_sync_config_loading() {
    let lines = vec![
        line(1, "pub fn load(path: &Path) -> String {"),
        line(2, "    std::fs::read_to_string(path).unwrap_or_default()"),
        line(3, "}"),
    ];
    assert!(find_blocking_io_violations(&lines).is_empty());
}

#[test]
fn test_detector_flags_blocking_read_in_async_fn() {
    let lines = vec![
        line(1, "async fn load(path: &Path) -> String {"),
        line(2, "    std::fs::read_to_string(path).unwrap_or_default()"),
        line(3, "}"),
    ];
    assert_eq!(find_blocking_io_violations(&lines).len(), 1);
}
