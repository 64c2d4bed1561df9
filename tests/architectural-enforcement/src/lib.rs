//! Architectural Enforcement Integration Tests
//!
//! This package scans the workspace sources to enforce the event model the
//! widget is built on:
//! - No blocking sleeps; timers are owned by the session driver
//! - No blocking I/O inside async code
//! - No `unwrap()`/`expect()` in library code
//!
//! The helpers here locate production source files and strip their
//! `#[cfg(test)]` sections so test code is never reported.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["widget/core/src", "widget/console/src"];

/// Workspace root, derived from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// One production line of a source file
#[derive(Debug)]
pub struct SourceLine {
    /// File the line belongs to, relative to the workspace root
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// The line with any trailing `//` comment removed
    pub code: String,
    /// The full line, trimmed
    pub text: String,
}

impl SourceLine {
    /// Render as a violation entry
    #[must_use]
    pub fn describe(&self, what: &str) -> String {
        format!(
            "{}:{} - {}: {}",
            self.path.display(),
            self.number,
            what,
            self.text
        )
    }
}

/// All `.rs` files below `dir` (relative to the workspace root)
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(dir);
    if !root.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Lines of `path` up to its first `#[cfg(test)]`, doc comments excluded
#[must_use]
pub fn production_lines(path: &Path) -> Vec<SourceLine> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let relative = path
        .strip_prefix(workspace_root())
        .unwrap_or(path)
        .to_path_buf();

    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(idx, line)| SourceLine {
            path: relative.clone(),
            number: idx + 1,
            code: strip_comment(line).to_string(),
            text: line.trim().to_string(),
        })
        .collect()
}

/// Every production line in the workspace
#[must_use]
pub fn all_production_lines() -> Vec<SourceLine> {
    PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| rust_files(dir))
        .flat_map(|path| production_lines(&path))
        .collect()
}

/// Whether `lines[idx]` runs in an async context
///
/// Scans back to the enclosing `fn`; an `async fn`, or an `async` block
/// opened between that `fn` and the line, counts.
#[must_use]
pub fn is_async_context(lines: &[SourceLine], idx: usize) -> bool {
    for line in lines[..=idx].iter().rev() {
        let code = line.code.trim();
        if code.contains("async move") || code.contains("async {") {
            return true;
        }
        if code.starts_with("fn ") || code.contains(" fn ") {
            return code.contains("async fn");
        }
    }
    false
}

/// Code part of a line, before any `//` comment outside a string literal
#[must_use]
pub fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut prev = '\0';
    for (i, c) in line.char_indices() {
        match c {
            '"' if prev != '\\' => in_string = !in_string,
            '/' if !in_string && prev == '/' => return &line[..i - 1],
            _ => {}
        }
        prev = c;
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("let a = 1; // note"), "let a = 1; ");
        assert_eq!(strip_comment(r#"let u = "ws://host";"#), r#"let u = "ws://host";"#);
        assert_eq!(strip_comment("no comment"), "no comment");
    }

    #[test]
    fn test_workspace_sources_found() {
        assert!(!rust_files("widget/core/src").is_empty());
        assert!(!all_production_lines().is_empty());
    }

    fn lines(src: &[&str]) -> Vec<SourceLine> {
        src.iter()
            .enumerate()
            .map(|(i, l)| SourceLine {
                path: PathBuf::from("x.rs"),
                number: i + 1,
                code: strip_comment(l).to_string(),
                text: l.trim().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_async_context() {
        let src = lines(&[
            "fn spawn_it() {",
            "    let a = 1;",
            "    tokio::spawn(async move {",
            "        work();",
            "    });",
            "}",
            "async fn run() {",
            "    work();",
            "}",
        ]);
        assert!(!is_async_context(&src, 1));
        assert!(is_async_context(&src, 3));
        assert!(is_async_context(&src, 7));
    }
}
