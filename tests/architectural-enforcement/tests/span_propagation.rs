//! Integration Test: Spawned Tasks Stay in the Session Span
//!
//! **Policy**: every task `widget-core` spawns MUST carry the caller's span
//! (`.in_current_span()` or `.instrument(..)`), so connect attempts, link
//! pumps, history fetches and timers all log under `widget_session`.

use architectural_enforcement::{production_lines, rust_files, SourceLine};

#[test]
fn test_spawned_tasks_carry_span() {
    let violations: Vec<String> = rust_files("widget/core/src")
        .iter()
        .flat_map(|path| find_unspanned_spawns(&production_lines(path)))
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ Spawned task without a span!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Wrap the future: `tokio::spawn(work.in_current_span())`");

        panic!(
            "\nFound {} spawn(s) outside the session span.",
            violations.len()
        );
    }
}

/// `tokio::spawn(` calls whose argument never attaches a span
fn find_unspanned_spawns(lines: &[SourceLine]) -> Vec<String> {
    let mut violations = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if !line.code.contains("tokio::spawn(") {
            continue;
        }
        // The call ends on its own line, or on the next line back at its indent
        let indent = indentation(&line.code);
        let end = if line.code.trim_end().ends_with(");") {
            idx
        } else {
            lines[idx + 1..]
                .iter()
                .position(|l| !l.code.trim().is_empty() && indentation(&l.code) <= indent)
                .map_or(lines.len() - 1, |offset| idx + 1 + offset)
        };
        let spanned = lines[idx..=end]
            .iter()
            .any(|l| l.code.contains("in_current_span()") || l.code.contains(".instrument("));
        if !spanned {
            violations.push(line.describe("Spawn without span"));
        }
    }

    violations
}

fn indentation(code: &str) -> usize {
    code.len() - code.trim_start().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lines(src: &[&str]) -> Vec<SourceLine> {
        src.iter()
            .enumerate()
            .map(|(i, l)| SourceLine {
                path: PathBuf::from("x.rs"),
                number: i + 1,
                code: (*l).to_string(),
                text: l.trim().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_detects_bare_spawn() {
        let src = lines(&[
            "let task = tokio::spawn(async move {",
            "    let _ = tx.send(tick);",
            "});",
            "task.in_current_span();",
        ]);
        assert_eq!(find_unspanned_spawns(&src).len(), 1);
    }

    #[test]
    fn test_accepts_spanned_spawns() {
        let src = lines(&[
            "tokio::spawn(writer.in_current_span());",
            "let task = tokio::spawn(",
            "    async move {",
            "        let _ = tx.send(tick);",
            "    }",
            "    .in_current_span(),",
            ");",
        ]);
        assert!(find_unspanned_spawns(&src).is_empty());
    }
}
