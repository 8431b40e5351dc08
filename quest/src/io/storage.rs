//! Run directory layout and artifact writing.
//!
//! Every run gets `runs/<run_id>/` with deterministic filenames; per-attempt
//! artifacts carry the `attempt_<k>.` prefix. Artifacts are written once and
//! never mutated, so plain writes suffice; each file is fully written before
//! the next phase starts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::Rng;
use serde::Serialize;

/// `run_<unix_ms>_<hex8>`.
pub fn new_run_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::rng().random();
    format!("run_{millis}_{suffix:08x}")
}

/// Per-run file locations.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub context_path: PathBuf,
    pub target_code_path: PathBuf,
    pub events_path: PathBuf,
    pub summary_path: PathBuf,
}

impl RunPaths {
    pub fn new(runs_root: &Path, run_id: &str) -> Self {
        let dir = runs_root.join(run_id);
        Self {
            context_path: dir.join("context.json"),
            target_code_path: dir.join("target_code.py"),
            events_path: dir.join("events.log"),
            summary_path: dir.join("run_summary.json"),
            dir,
        }
    }

    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create run directory {}", self.dir.display()))
    }
}

/// Per-attempt artifact locations.
#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub request_path: PathBuf,
    pub test_src_path: PathBuf,
    pub llm_metadata_path: PathBuf,
    pub static_path: PathBuf,
    pub pre_reliability_path: PathBuf,
    pub response_path: PathBuf,
    pub post_reliability_path: PathBuf,
    pub critique_path: PathBuf,
    pub supervisor_llm_metadata_path: PathBuf,
    pub metrics_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(run_dir: &Path, attempt: u32) -> Self {
        let file = |suffix: &str| run_dir.join(format!("attempt_{attempt}.{suffix}"));
        Self {
            request_path: file("request.json"),
            test_src_path: file("test_src.py"),
            llm_metadata_path: file("llm_metadata.json"),
            static_path: file("static.json"),
            pre_reliability_path: file("pre_reliability.json"),
            response_path: file("response.json"),
            post_reliability_path: file("post_reliability.json"),
            critique_path: file("critique.json"),
            supervisor_llm_metadata_path: file("supervisor_llm_metadata.json"),
            metrics_path: file("metrics.json"),
        }
    }
}

/// Serialize to pretty-printed JSON with a trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_text(path, &buf)
}

pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_carry_prefix_and_are_unique() {
        let a = new_run_id();
        let b = new_run_id();
        assert!(a.starts_with("run_"));
        assert_ne!(a, b);
    }

    #[test]
    fn attempt_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AttemptPaths::new(temp.path(), 2);

        assert!(paths.request_path.ends_with("attempt_2.request.json"));
        assert!(paths.test_src_path.ends_with("attempt_2.test_src.py"));
        assert!(paths.llm_metadata_path.ends_with("attempt_2.llm_metadata.json"));
        assert!(paths.static_path.ends_with("attempt_2.static.json"));
        assert!(paths.pre_reliability_path.ends_with("attempt_2.pre_reliability.json"));
        assert!(paths.response_path.ends_with("attempt_2.response.json"));
        assert!(paths.post_reliability_path.ends_with("attempt_2.post_reliability.json"));
        assert!(paths.critique_path.ends_with("attempt_2.critique.json"));
        assert!(paths.metrics_path.ends_with("attempt_2.metrics.json"));
    }

    #[test]
    fn write_json_is_pretty_with_trailing_newline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("value.json");
        write_json(&path, &serde_json::json!({"a": 1})).expect("write");

        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn run_paths_nest_under_runs_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = RunPaths::new(temp.path(), "run_1_00000000");
        paths.create().expect("create");

        assert!(paths.dir.is_dir());
        assert!(paths.context_path.ends_with("run_1_00000000/context.json"));
        assert!(paths.events_path.ends_with("run_1_00000000/events.log"));
    }
}
