//! Append-only event log, one line per event.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::types::FinishReason;

/// Append one event, stamped with the current unix-millisecond time.
pub fn append_event(path: &Path, message: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open event log {}", path.display()))?;
    let millis = chrono::Utc::now().timestamp_millis();
    writeln!(file, "t={millis} {message}")
        .with_context(|| format!("append event to {}", path.display()))
}

/// `run=<id> attempt=<k> state=<NAME> status=<ok|err> cov=<n> mut=<n>`
pub fn phase_line(
    run_id: &str,
    attempt: u32,
    state: &str,
    ok: bool,
    coverage: f64,
    mutation: f64,
) -> String {
    let status = if ok { "ok" } else { "err" };
    format!(
        "run={run_id} attempt={attempt} state={state} status={status} cov={coverage:.2} mut={mutation:.2}"
    )
}

/// `run=<id> finish reason=<reason> iter=<k>`
pub fn finish_line(run_id: &str, reason: FinishReason, iter: u32) -> String {
    format!("run={run_id} finish reason={} iter={iter}", reason.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn events_append_in_order_with_timestamps() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("events.log");

        append_event(&path, &phase_line("run-1", 0, "EXECUTE", true, 41.5, -1.0)).expect("append");
        append_event(&path, &finish_line("run-1", FinishReason::TargetsMet, 0)).expect("append");

        let contents = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("t="));
        assert!(lines[0].contains("state=EXECUTE status=ok cov=41.50 mut=-1.00"));
        assert!(lines[1].ends_with("finish reason=targets-met iter=0"));
    }
}
