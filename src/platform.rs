//! Platform capability: environment lookup, path normalization, process
//! argv, output and exit. The parser and dispatcher only reach the outside
//! world through this trait.

use std::io::Write;
use tracing::debug;

pub trait Platform {
    fn env_var(&self, key: &str) -> Option<String>;

    /// Lexically normalize a path (`a//b/../c` -> `a/c`).
    fn normalize_path(&self, path: &str) -> String {
        normalize(path)
    }

    /// Arguments after the program name.
    fn process_args(&self) -> Vec<String>;

    /// Name used for `$0`.
    fn script_name(&self) -> String;

    fn write_out(&self, text: &str);

    fn exit(&self, code: i32);
}

/// The real process.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdPlatform;

impl Platform for StdPlatform {
    fn env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn process_args(&self) -> Vec<String> {
        std::env::args().skip(1).collect()
    }

    fn script_name(&self) -> String {
        std::env::args()
            .next()
            .as_deref()
            .and_then(|p| std::path::Path::new(p).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
    }

    fn write_out(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{text}") {
            debug!(error = %e, "stdout write failed");
        }
    }

    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// POSIX-style lexical normalization: collapses repeated separators, drops
/// `.` segments and resolves `..` against preceding segments. A trailing
/// separator is kept; an empty path becomes `.`.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = path.starts_with('/');
    let trailing = path.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let mut out = segments.join("/");
    if absolute {
        out.insert(0, '/');
    }
    if out.is_empty() {
        out.push('.');
    }
    if trailing && !out.ends_with('/') {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", ".")]
    #[case("./foo", "foo")]
    #[case("foo//bar/../baz", "foo/baz")]
    #[case("/a/b/../../..", "/")]
    #[case("../x/./y/", "../x/y/")]
    #[case("a/..", ".")]
    #[case("/usr/local//lib", "/usr/local/lib")]
    fn normalizes_lexically(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn std_platform_reads_environment() {
        let platform = StdPlatform;
        // PATH is set for any process that can run the test harness.
        assert!(platform.env_var("PATH").is_some());
        assert!(platform.env_var("ARGWEAVE_SURELY_UNSET_VARIABLE").is_none());
        assert!(!platform.script_name().is_empty());
    }
}
