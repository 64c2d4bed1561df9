//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep to wait for events. Every
//! state change arrives as an event on the session queue.
//! **Exception**: the session driver owns the watchdog and stream timers
//! and may use `tokio::time::sleep`/`interval` to implement them.

use std::path::Path;

use architectural_enforcement::{all_production_lines, SourceLine};

/// Files allowed to arm timers
const TIMER_OWNERS: &[&str] = &["widget/core/src/session/driver.rs"];

#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations(&all_production_lines());

    if !violations.is_empty() {
        eprintln!("\n❌ Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ ACCEPTABLE:");
        eprintln!("  - Watchdog/stream timers in the session driver");
        eprintln!("  - Test code");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - std::thread::sleep anywhere");
        eprintln!("  - Sleep as a way to wait for a connection or a reply");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

fn find_sleep_violations(lines: &[SourceLine]) -> Vec<String> {
    let mut violations = Vec::new();

    for line in lines {
        if line.code.contains("thread::sleep") {
            violations.push(line.describe("Blocking thread sleep"));
            continue;
        }

        let sleeps = line.code.contains("::sleep(") || line.code.contains("sleep_until(");
        if sleeps && !is_timer_owner(&line.path) {
            violations.push(line.describe("Sleep outside the session driver"));
        }
    }

    violations
}

fn is_timer_owner(path: &Path) -> bool {
    TIMER_OWNERS.iter().any(|owner| path.ends_with(owner))
}

#[test]
fn test_detector_flags_thread_sleep() {
    let line = SourceLine {
        path: "widget/core/src/session/driver.rs".into(),
        number: 1,
        code: "std::thread::sleep(Duration::from_millis(5));".to_string(),
        text: "std::thread::sleep(Duration::from_millis(5));".to_string(),
    };
    assert_eq!(find_sleep_violations(&[line]).len(), 1);
}

#[test]
fn test_detector_allows_driver_timers() {
    let line = SourceLine {
        path: "widget/core/src/session/driver.rs".into(),
        number: 1,
        code: "tokio::time::sleep(after).await;".to_string(),
        text: "tokio::time::sleep(after).await;".to_string(),
    };
    assert!(find_sleep_violations(&[line]).is_empty());
}
