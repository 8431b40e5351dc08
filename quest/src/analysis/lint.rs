//! Optional lint/type-check tools run as isolated subprocesses.
//!
//! Each tool is invoked with a single argument (the test file) inside a
//! temporary working directory, with a bounded timeout. Tools missing from
//! `PATH` are recorded as unavailable and never fail the attempt.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::core::types::LintRecord;

const OUTPUT_EXCERPT_CHARS: usize = 4_000;
const TEST_FILE_NAME: &str = "candidate_test.py";

static PYLINT_ISSUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m):\d+:\d+: [EF]\d{4}").expect("pylint regex"));
static MYPY_ISSUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\berror:").expect("mypy regex"));

/// Run all configured lint tools against the candidate source.
pub fn run_linters(source: &str, timeout: Duration) -> BTreeMap<String, LintRecord> {
    let mut records = BTreeMap::new();

    let workdir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(err) => {
            warn!(error = %err, "could not create lint working directory");
            records.insert("pylint".to_string(), LintRecord::unavailable());
            records.insert("mypy".to_string(), LintRecord::unavailable());
            return records;
        }
    };
    let test_path = workdir.path().join(TEST_FILE_NAME);
    if let Err(err) = fs::write(&test_path, source) {
        warn!(error = %err, "could not write lint input file");
        records.insert("pylint".to_string(), LintRecord::unavailable());
        records.insert("mypy".to_string(), LintRecord::unavailable());
        return records;
    }

    records.insert(
        "pylint".to_string(),
        run_tool(
            "pylint",
            &["--score=no", "--disable=all", "--enable=E,F"],
            &test_path,
            workdir.path(),
            timeout,
        ),
    );
    records.insert(
        "mypy".to_string(),
        run_tool(
            "mypy",
            &["--hide-error-context", "--hide-error-codes"],
            &test_path,
            workdir.path(),
            timeout,
        ),
    );

    records
}

/// `which`-style probe for a tool on `PATH`.
pub fn tool_available(name: &str) -> bool {
    let Some(path_var) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path_var).any(|dir| is_executable(&dir.join(name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn run_tool(
    name: &str,
    args: &[&str],
    test_path: &Path,
    workdir: &Path,
    timeout: Duration,
) -> LintRecord {
    if !tool_available(name) {
        debug!(tool = name, "lint tool not on PATH, skipping");
        return LintRecord::unavailable();
    }

    let mut child = match Command::new(name)
        .args(args)
        .arg(test_path)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(tool = name, error = %err, "lint tool failed to spawn");
            return LintRecord {
                available: true,
                issue_count: 0,
                exit_code: Some(-1),
                output_excerpt: format!("{name} failed to spawn: {err}"),
            };
        }
    };

    let exit_status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => Some(status),
        Ok(None) => {
            child.kill().ok();
            child.wait().ok();
            None
        }
        Err(err) => {
            warn!(tool = name, error = %err, "lint tool wait failed");
            child.kill().ok();
            child.wait().ok();
            None
        }
    };

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_string(&mut output).ok();
    }
    if let Some(mut stderr) = child.stderr.take() {
        let mut tail = String::new();
        stderr.read_to_string(&mut tail).ok();
        output.push_str(&tail);
    }

    let Some(status) = exit_status else {
        return LintRecord {
            available: true,
            issue_count: 0,
            exit_code: None,
            output_excerpt: format!("{name} timed out after {}s", timeout.as_secs()),
        };
    };

    LintRecord {
        available: true,
        issue_count: count_issues(name, &output),
        exit_code: status.code(),
        output_excerpt: tail_chars(&output, OUTPUT_EXCERPT_CHARS),
    }
}

fn count_issues(tool: &str, output: &str) -> u32 {
    let matches = match tool {
        "pylint" => PYLINT_ISSUE_RE.find_iter(output).count(),
        _ => MYPY_ISSUE_RE.find_iter(output).count(),
    };
    matches as u32
}

fn tail_chars(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    if count <= limit {
        return text.to_string();
    }
    text.chars().skip(count - limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_recorded_as_unavailable() {
        assert!(!tool_available("definitely-not-a-real-linter-binary"));
    }

    #[test]
    fn pylint_issue_lines_are_counted() {
        let output = "\
candidate_test.py:3:0: E0602: Undefined variable 'nope' (undefined-variable)
candidate_test.py:9:4: F0001: fatal parse problem
candidate_test.py:9:4: W0612: Unused variable 'x' (unused-variable)
";
        assert_eq!(count_issues("pylint", output), 2);
    }

    #[test]
    fn mypy_errors_are_counted() {
        let output = "\
candidate_test.py:4: error: Name \"nope\" is not defined
candidate_test.py:7: note: See documentation
Found 1 error in 1 file (checked 1 source file)
";
        assert_eq!(count_issues("mypy", output), 1);
    }

    #[test]
    fn excerpt_keeps_the_tail() {
        let long = "a".repeat(5_000) + "END";
        let excerpt = tail_chars(&long, 100);
        assert_eq!(excerpt.chars().count(), 100);
        assert!(excerpt.ends_with("END"));
    }
}
