//! Architectural Enforcement
//!
//! Source scanners shared by the integration tests in `tests/`. They enforce
//! rules the compiler cannot:
//! - No sleep() calls in production code (wait on I/O or timers instead)
//! - No blocking I/O inside async functions
//! - No panicking `unwrap()`/`expect()` in library code
//!
//! The scanners are line based. Everything after a file's first
//! `#[cfg(test)]` is treated as test code.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["chatline/core/src", "chatline/cli/src"];

/// One rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the violation
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What was found
    pub reason: &'static str,
    /// The offending line, trimmed
    pub code: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.reason,
            self.code
        )
    }
}

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files below `dir` (relative to the workspace root)
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    if !path.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Lines of a file that are production code, with their 1-based numbers
///
/// Comments are stripped; the scan stops at the first `#[cfg(test)]`.
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with("#[cfg(test)]") {
            break;
        }
        let code = line.split("//").next().unwrap_or(line);
        if !code.trim().is_empty() {
            out.push((idx + 1, code.to_string()));
        }
    }
    out
}

/// Scan production files with `check`, which returns a reason on violation
///
/// `check` receives the production lines of the file and the index of the
/// line under test.
pub fn scan<F>(dirs: &[&str], check: F) -> Vec<Violation>
where
    F: Fn(&[(usize, String)], usize) -> Option<&'static str>,
{
    let mut violations = Vec::new();
    for dir in dirs {
        for path in rust_files(dir) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let lines = production_lines(&content);
            for idx in 0..lines.len() {
                if let Some(reason) = check(&lines, idx) {
                    violations.push(Violation {
                        path: path.clone(),
                        line: lines[idx].0,
                        reason,
                        code: lines[idx].1.trim().to_string(),
                    });
                }
            }
        }
    }
    violations
}

/// Whether a trimmed line declares a function
#[must_use]
pub fn is_fn_declaration(line: &str) -> bool {
    let line = line.trim_start();
    let line = line
        .strip_prefix("pub(crate) ")
        .or_else(|| line.strip_prefix("pub(super) "))
        .or_else(|| line.strip_prefix("pub "))
        .unwrap_or(line);
    line.starts_with("fn ") || line.starts_with("async fn ")
}

/// Whether the function enclosing `idx` is `async`
///
/// Returns `None` when no enclosing function is found.
#[must_use]
pub fn enclosing_fn_is_async(lines: &[(usize, String)], idx: usize) -> Option<bool> {
    for i in (0..=idx).rev() {
        let line = lines[i].1.trim();
        if is_fn_declaration(line) {
            return Some(line.contains("async fn "));
        }
        // `async move` blocks run on the runtime too
        if line.contains("async move") || line.contains("async {") {
            return Some(true);
        }
    }
    None
}

/// Print violations and panic if there are any
pub fn report(title: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s): {title}\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(code: &[&str]) -> Vec<(usize, String)> {
        production_lines(&code.join("\n"))
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let found = lines(&[
            "fn a() {} // trailing",
            "// only a comment",
            "#[cfg(test)]",
            "mod tests { fn b() {} }",
        ]);
        assert_eq!(found, vec![(1, "fn a() {} ".to_string())]);
    }

    #[test]
    fn test_fn_declarations() {
        assert!(is_fn_declaration("pub fn load() {"));
        assert!(is_fn_declaration("    pub async fn send(&self) {"));
        assert!(is_fn_declaration("pub(crate) fn helper() {"));
        assert!(!is_fn_declaration("let fn_name = 1;"));
    }

    #[test]
    fn test_enclosing_async_detection() {
        let code = lines(&[
            "pub async fn bad() {",
            "    let x = 1;",
            "}",
            "pub fn fine() {",
            "    let y = 2;",
            "}",
        ]);
        assert_eq!(enclosing_fn_is_async(&code, 1), Some(true));
        assert_eq!(enclosing_fn_is_async(&code, 4), Some(false));
    }

    #[test]
    fn test_workspace_root_has_core() {
        assert!(!rust_files("chatline/core/src").is_empty());
    }
}
