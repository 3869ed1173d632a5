//! Integration Test: Panic Prohibition
//!
//! **Policy**: the core library propagates errors with `Result`; it never
//! calls `unwrap()`/`expect()` or `panic!` outside tests. A malformed
//! record or a failed request must never take down the embedding UI.

use architectural_enforcement::{report, scan};

fn panicking_call(code: &str) -> Option<&'static str> {
    if code.contains(".unwrap()") {
        return Some("unwrap() in library code");
    }
    if code.contains(".expect(") {
        return Some("expect() in library code");
    }
    if code.contains("panic!(") || code.contains("unreachable!(") || code.contains("todo!(") {
        return Some("panicking macro in library code");
    }
    None
}

#[test]
fn test_no_panics_in_core_library() {
    let violations = scan(&["chatline/core/src"], |lines, idx| {
        panicking_call(&lines[idx].1)
    });
    report("Panicking calls in chatline-core", &violations);
}

#[test]
fn test_panicking_call_detection() {
    assert!(panicking_call("let x = y.unwrap();").is_some());
    assert!(panicking_call("let x = y.expect(\"boom\");").is_some());
    assert!(panicking_call("let x = y.unwrap_or_default();").is_none());
    assert!(panicking_call("let x = y.unwrap_or(0);").is_none());
}
