//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Streams wait on
//! the network, the flush ticker or cancellation, never on a fixed delay.
//! **Exceptions**: test code, exponential backoff in retry logic.

use architectural_enforcement::{report, scan, PRODUCTION_DIRS};

fn is_sleep(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

/// Exponential backoff is the one acceptable delay
fn is_backoff_context(lines: &[(usize, String)], idx: usize) -> bool {
    let range = idx.saturating_sub(15)..std::cmp::min(idx + 5, lines.len());
    let mut has_backoff_calc = false;
    let mut has_retry_context = false;

    for (_, line) in &lines[range] {
        let line = line.to_lowercase();
        if line.contains("<<") || line.contains("pow") || line.contains("* 2") {
            has_backoff_calc = true;
        }
        if line.contains("retry") || line.contains("backoff") || line.contains("attempt") {
            has_retry_context = true;
        }
    }

    has_backoff_calc && has_retry_context
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(PRODUCTION_DIRS, |lines, idx| {
        (is_sleep(&lines[idx].1) && !is_backoff_context(lines, idx))
            .then_some("sleep in production code")
    });

    if !violations.is_empty() {
        eprintln!("\n✅ ACCEPTABLE: tokio::time::interval, CancellationToken, awaiting I/O");
    }
    report("Sleep calls found in production code", &violations);
}

#[test]
fn test_sleep_detection() {
    assert!(is_sleep("    tokio::time::sleep(Duration::from_millis(10)).await;"));
    assert!(is_sleep("    std::thread::sleep(delay);"));
    assert!(!is_sleep("    ticker.tick().await;"));
}

#[test]
fn test_backoff_detection() {
    let code: Vec<(usize, String)> = [
        "fn reconnect() {",
        "    let delay = base_delay * (1 << attempt);",
        "    tracing::debug!(attempt, \"Retry\");",
        "    tokio::time::sleep(Duration::from_millis(delay)).await;",
        "}",
    ]
    .iter()
    .enumerate()
    .map(|(i, l)| (i + 1, (*l).to_string()))
    .collect();

    assert!(is_backoff_context(&code, 3));
}
