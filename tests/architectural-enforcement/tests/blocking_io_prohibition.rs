//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async production code MUST NOT use blocking I/O.
//! **Required**: `reqwest` async client, `tokio` primitives.
//! **Acceptable**: blocking calls in non-async functions (config loading
//! before any stream starts), test code.

use architectural_enforcement::{enclosing_fn_is_async, report, scan, PRODUCTION_DIRS};

fn blocking_call(code: &str) -> Option<&'static str> {
    if code.contains("reqwest::blocking") {
        return Some("blocking HTTP client");
    }
    if code.contains("std::fs::") {
        return Some("blocking file I/O");
    }
    if code.contains("std::net::") {
        return Some("blocking network I/O");
    }
    if code.contains("std::process::Command") {
        return Some("blocking process I/O");
    }
    if code.contains("std::thread::sleep") {
        return Some("blocking sleep");
    }
    None
}

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan(PRODUCTION_DIRS, |lines, idx| {
        let reason = blocking_call(&lines[idx].1)?;
        if reason == "blocking HTTP client" {
            return Some(reason);
        }
        // Blocking calls are fine in sync functions called before the runtime does I/O
        match enclosing_fn_is_async(lines, idx) {
            Some(false) => None,
            _ => Some(reason),
        }
    });

    report("Blocking I/O in async production code", &violations);
}

#[test]
fn test_blocking_call_detection() {
    assert_eq!(
        blocking_call("let s = std::fs::read_to_string(path)?;"),
        Some("blocking file I/O")
    );
    assert_eq!(
        blocking_call("let c = reqwest::blocking::Client::new();"),
        Some("blocking HTTP client")
    );
    assert_eq!(blocking_call("let s = tokio::fs::read(path).await?;"), None);
}
