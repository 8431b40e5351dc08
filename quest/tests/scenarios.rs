//! End-to-end loop scenarios driven through scripted collaborators.

use std::fs;
use std::path::Path;

use quest::core::error::FailureKind;
use quest::core::types::{
    AttemptMetrics, Critique, FinishReason, PostLevel, PostReliability, PreLevel, PreReliability,
    RunSummary,
};
use quest::engine::{Engine, RunRequest};
use quest::io::config::QuestConfig;
use quest::llm::DryCompleter;
use quest::runner::DryRunner;
use quest::test_support::{
    ScriptedCompleter, ScriptedCompletion, ScriptedExecution, ScriptedRunner, failing_response,
    passing_response,
};

const VALID_MODULE: &str = "\
import unittest


class ThingTest(unittest.TestCase):
    def test_value(self):
        self.assertEqual(1 + 1, 2)
";

const REVISED_MODULE: &str = "\
import unittest


class ThingTest(unittest.TestCase):
    def test_value(self):
        self.assertEqual(1 + 1, 2)

    def test_more(self):
        self.assertTrue(bool(1))
";

const BROKEN_MODULE: &str = "def broken(:\n    pass\n";

fn config(target_coverage: f64, target_mutation: f64, max_iterations: u32) -> QuestConfig {
    let mut config = QuestConfig::default();
    config.targets.coverage = target_coverage;
    config.targets.mutation = target_mutation;
    config.max_iterations = max_iterations;
    // Assertions below hold whether or not lint tools exist on the host: the
    // scripted modules are lint-clean and missing tools are non-fatal.
    config.static_analysis.enable = true;
    config
}

fn request(runs_root: &Path) -> RunRequest {
    RunRequest {
        repo: "org/lib".to_string(),
        version: "1.0".to_string(),
        code_file: "lib/mod.py".to_string(),
        repo_root: None,
        runs_root: runs_root.to_path_buf(),
        max_iterations: None,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    let contents = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("read {}: {err}", path.display()));
    serde_json::from_str(&contents)
        .unwrap_or_else(|err| panic!("parse {}: {err}", path.display()))
}

fn events(run_dir: &Path) -> Vec<String> {
    fs::read_to_string(run_dir.join("events.log"))
        .expect("events.log")
        .lines()
        .map(str::to_string)
        .collect()
}

/// S1: targets met on the initial draft.
#[test]
fn immediate_success_finishes_after_one_attempt() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(40.0, 30.0, 3);
    let completer = ScriptedCompleter::new(vec![ScriptedCompletion::text(VALID_MODULE)]);
    let runner = ScriptedRunner::new(vec![ScriptedExecution::Respond(passing_response(
        40.0, 30.0,
    ))]);

    let engine = Engine::new(&config, &completer, &runner);
    let report = engine.run(&request(temp.path())).expect("run");

    assert_eq!(report.finish_reason, FinishReason::TargetsMet);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.final_coverage, 40.0);

    let post: PostReliability = read_json(&report.run_dir.join("attempt_0.post_reliability.json"));
    assert_eq!(post.level, PostLevel::Pass);

    let log = events(&report.run_dir);
    assert!(
        log.last()
            .expect("events")
            .contains("finish reason=targets-met iter=0")
    );
    assert!(!report.run_dir.join("attempt_1.request.json").exists());
}

/// S2: a flat dry loop stops after two refinements without progress.
#[test]
fn stagnation_cuts_the_loop_after_three_attempts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(60.0, 50.0, 10);
    let completer = ScriptedCompleter::new(vec![
        ScriptedCompletion::text(VALID_MODULE),
        ScriptedCompletion::text(REVISED_MODULE),
        ScriptedCompletion::text(REVISED_MODULE),
    ]);
    let runner = ScriptedRunner::new(vec![ScriptedExecution::Respond(passing_response(
        20.0, 10.0,
    ))]);

    let engine = Engine::new(&config, &completer, &runner);
    let report = engine.run(&request(temp.path())).expect("run");

    assert_eq!(report.finish_reason, FinishReason::Stagnation);
    assert_eq!(report.iterations, 3);

    let critique: Critique = read_json(&report.run_dir.join("attempt_2.critique.json"));
    assert!(critique.no_progress);

    let log = events(&report.run_dir);
    assert!(
        log.last()
            .expect("events")
            .contains("finish reason=stagnation iter=2")
    );
    assert!(!report.run_dir.join("attempt_3.request.json").exists());
}

/// S3: a syntactically broken draft is repaired on the first refinement.
#[test]
fn compile_error_then_recovery_meets_targets() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(60.0, 50.0, 3);
    let completer = ScriptedCompleter::new(vec![
        ScriptedCompletion::text(BROKEN_MODULE),
        ScriptedCompletion::text(VALID_MODULE),
    ]);
    let runner = ScriptedRunner::new(vec![
        ScriptedExecution::Respond(failing_response("SyntaxError: invalid syntax")),
        ScriptedExecution::Respond(passing_response(65.0, 55.0)),
    ]);

    let engine = Engine::new(&config, &completer, &runner);
    let report = engine.run(&request(temp.path())).expect("run");

    assert_eq!(report.finish_reason, FinishReason::TargetsMet);
    assert_eq!(report.iterations, 2);

    let pre: PreReliability = read_json(&report.run_dir.join("attempt_0.pre_reliability.json"));
    assert_eq!(pre.level, PreLevel::Low);

    let critique: Critique = read_json(&report.run_dir.join("attempt_0.critique.json"));
    assert!(critique.compile_error);
    assert!(critique.instructions[0].to_lowercase().contains("syntax"));

    let log = events(&report.run_dir);
    assert!(
        log.last()
            .expect("events")
            .contains("finish reason=targets-met iter=1")
    );
}

/// S4: a model timeout mid-run ends gracefully with best-so-far data.
#[test]
fn model_timeout_mid_run_keeps_completed_attempts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(60.0, 50.0, 10);
    let completer = ScriptedCompleter::new(vec![
        ScriptedCompletion::text(VALID_MODULE),
        ScriptedCompletion::text(REVISED_MODULE),
        ScriptedCompletion::Fail(FailureKind::UpstreamTimeout, "provider timed out".to_string()),
    ]);
    let runner = ScriptedRunner::new(vec![ScriptedExecution::Respond(passing_response(
        20.0, 10.0,
    ))]);

    let engine = Engine::new(&config, &completer, &runner);
    let report = engine.run(&request(temp.path())).expect("run");

    assert_eq!(report.finish_reason, FinishReason::UpstreamTimeout);
    assert_eq!(report.iterations, 2);

    let summary: RunSummary = read_json(&report.run_dir.join("run_summary.json"));
    assert_eq!(summary.iterations, 2);
    assert!(report.run_dir.join("attempt_0.response.json").exists());
    assert!(report.run_dir.join("attempt_1.response.json").exists());
    assert!(!report.run_dir.join("attempt_2.request.json").exists());

    let log = events(&report.run_dir);
    assert!(
        log.last()
            .expect("events")
            .contains("finish reason=upstream-timeout iter=1")
    );
}

/// A missing credential on attempt 0 is fatal but still leaves a recorded run.
#[test]
fn configuration_missing_on_attempt_zero_is_fatal_but_recorded() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(60.0, 0.0, 3);
    let completer = ScriptedCompleter::new(vec![ScriptedCompletion::Fail(
        FailureKind::ConfigurationMissing,
        "OPENAI_API_KEY is not set".to_string(),
    )]);
    let runner = ScriptedRunner::new(Vec::new());

    let engine = Engine::new(&config, &completer, &runner);
    let report = engine.run(&request(temp.path())).expect("run");

    assert_eq!(report.finish_reason, FinishReason::ConfigurationMissing);
    assert_eq!(report.iterations, 0);
    assert!(report.run_dir.join("run_summary.json").exists());

    let log = events(&report.run_dir);
    assert!(
        log.last()
            .expect("events")
            .contains("finish reason=configuration-missing iter=0")
    );
}

/// A runner failure yields a synthetic failed attempt and the loop continues.
#[test]
fn runner_failure_becomes_a_failed_attempt_not_a_crash() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(60.0, 0.0, 2);
    let completer = ScriptedCompleter::new(vec![
        ScriptedCompletion::text(VALID_MODULE),
        ScriptedCompletion::text(REVISED_MODULE),
    ]);
    let runner = ScriptedRunner::new(vec![
        ScriptedExecution::Fail("timeout".to_string()),
        ScriptedExecution::Respond(passing_response(70.0, -1.0)),
    ]);

    let engine = Engine::new(&config, &completer, &runner);
    let report = engine.run(&request(temp.path())).expect("run");

    assert_eq!(report.finish_reason, FinishReason::TargetsMet);
    assert_eq!(report.iterations, 2);

    let response: quest::core::types::RunnerResponse =
        read_json(&report.run_dir.join("attempt_0.response.json"));
    assert!(!response.success);
    assert_eq!(response.test_error.as_deref(), Some("timeout"));

    let post: PostReliability = read_json(&report.run_dir.join("attempt_0.post_reliability.json"));
    assert_eq!(post.level, PostLevel::Discard);
}

/// S6: coverage met but mutation missed routes to refine with a mutation
/// instruction and no missing-lines instruction.
#[test]
fn mutation_shortfall_alone_still_refines() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(60.0, 50.0, 1);
    let completer = ScriptedCompleter::new(vec![
        ScriptedCompletion::text(VALID_MODULE),
        ScriptedCompletion::text(REVISED_MODULE),
    ]);
    let runner = ScriptedRunner::new(vec![ScriptedExecution::Respond(passing_response(
        70.0, 20.0,
    ))]);

    let engine = Engine::new(&config, &completer, &runner);
    let report = engine.run(&request(temp.path())).expect("run");

    let critique: Critique = read_json(&report.run_dir.join("attempt_0.critique.json"));
    assert!(!critique.low_coverage);
    assert!(critique.low_mutation);
    assert!(
        critique
            .instructions
            .iter()
            .any(|i| i.contains("mutation") || i.contains("mutants"))
    );
    assert!(
        !critique
            .instructions
            .iter()
            .any(|i| i.contains("Add coverage for lines"))
    );

    // The refinement round ran, so the router chose REFINE on attempt 0.
    assert!(report.run_dir.join("attempt_1.request.json").exists());
    assert_eq!(report.finish_reason, FinishReason::MaxIterations);
}

/// Property 6: every per-attempt artifact exists and the summary totals are
/// the arithmetic sum of the per-attempt metrics.
#[test]
fn artifacts_are_complete_and_summary_totals_add_up() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = config(60.0, 50.0, 10);
    let completer = ScriptedCompleter::new(vec![
        ScriptedCompletion::confident(VALID_MODULE),
        ScriptedCompletion::confident(REVISED_MODULE),
        ScriptedCompletion::confident(REVISED_MODULE),
    ]);
    let runner = ScriptedRunner::new(vec![ScriptedExecution::Respond(passing_response(
        20.0, 10.0,
    ))]);

    let engine = Engine::new(&config, &completer, &runner);
    let report = engine.run(&request(temp.path())).expect("run");
    assert_eq!(report.iterations, 3);

    for file in ["context.json", "target_code.py", "events.log", "run_summary.json"] {
        assert!(report.run_dir.join(file).exists(), "missing {file}");
    }
    for attempt in 0..report.iterations {
        for suffix in [
            "request.json",
            "test_src.py",
            "llm_metadata.json",
            "static.json",
            "pre_reliability.json",
            "response.json",
            "post_reliability.json",
            "critique.json",
            "metrics.json",
        ] {
            let name = format!("attempt_{attempt}.{suffix}");
            assert!(report.run_dir.join(&name).exists(), "missing {name}");
        }
    }

    let summary: RunSummary = read_json(&report.run_dir.join("run_summary.json"));
    let mut cost_sum = 0.0;
    let mut input_sum = 0;
    let mut output_sum = 0;
    for attempt in 0..report.iterations {
        let metrics: AttemptMetrics =
            read_json(&report.run_dir.join(format!("attempt_{attempt}.metrics.json")));
        cost_sum += metrics.llm_cost + metrics.supervisor_llm_cost;
        input_sum += metrics.llm_input_tokens + metrics.supervisor_llm_input_tokens;
        output_sum += metrics.llm_output_tokens + metrics.supervisor_llm_output_tokens;
    }
    assert!((summary.total_llm_cost - cost_sum).abs() < 1e-12);
    assert_eq!(summary.total_llm_input_tokens, input_sum);
    assert_eq!(summary.total_llm_output_tokens, output_sum);
}

/// Property 1: dry mode is deterministic up to run id and timestamps.
#[test]
fn dry_mode_runs_are_deterministic() {
    let run = || {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = config(60.0, 50.0, 2);
        config.llm.dry = true;
        config.runner_url = "dry".to_string();
        let completer = DryCompleter;
        let runner = DryRunner {
            target_coverage: config.targets.coverage,
            target_mutation: config.targets.mutation,
        };
        let engine = Engine::new(&config, &completer, &runner);
        let report = engine.run(&request(temp.path())).expect("run");

        // Timestamp-free artifacts only; static/pre-reliability reports embed
        // lint excerpts whose temp-dir paths vary per run.
        let mut contents = Vec::new();
        for name in [
            "target_code.py",
            "context.json",
            "attempt_0.request.json",
            "attempt_0.test_src.py",
            "attempt_0.response.json",
            "attempt_0.post_reliability.json",
            "attempt_0.critique.json",
            "attempt_1.test_src.py",
            "attempt_2.critique.json",
        ] {
            contents.push((
                name,
                fs::read_to_string(report.run_dir.join(name))
                    .unwrap_or_else(|err| panic!("read {name}: {err}")),
            ));
        }
        (report.finish_reason, report.iterations, contents)
    };

    let (reason_a, iterations_a, contents_a) = run();
    let (reason_b, iterations_b, contents_b) = run();

    assert_eq!(reason_a, reason_b);
    assert_eq!(iterations_a, iterations_b);
    for ((name_a, body_a), (_, body_b)) in contents_a.iter().zip(contents_b.iter()) {
        assert_eq!(body_a, body_b, "artifact {name_a} differs between runs");
    }
}
