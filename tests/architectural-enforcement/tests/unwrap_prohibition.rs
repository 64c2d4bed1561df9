//! Integration Test: Panic-Free Library Code
//!
//! **Policy**: `widget-core` propagates errors with `Result` and `?`. Its
//! production code MUST NOT call `unwrap()` or `expect()`; nothing in the
//! session is fatal to the embedding process.

use architectural_enforcement::{production_lines, rust_files};

#[test]
fn test_no_unwrap_in_core_library() {
    let violations: Vec<String> = rust_files("widget/core/src")
        .iter()
        .flat_map(|path| production_lines(path))
        .filter(|line| line.code.contains(".unwrap()") || line.code.contains(".expect("))
        .map(|line| line.describe("Panicking unwrap"))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ unwrap()/expect() found in widget-core!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use `?`, `map_err`, or log and continue.");

        panic!(
            "\nFound {} unwrap/expect call(s) in library code.",
            violations.len()
        );
    }
}
