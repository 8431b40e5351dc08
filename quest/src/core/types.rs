//! Shared records exchanged between the loop components.
//!
//! These types are the stable contracts between the miner, agents, runner
//! client, reliability predictor, and engine. They carry no behavior beyond
//! small accessors and must serialize deterministically: every artifact in a
//! run directory is one of these, pretty-printed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Test framework expected by the target repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameworkTag {
    #[serde(rename = "unittest-django")]
    UnittestDjango,
    #[serde(rename = "unittest-plain")]
    UnittestPlain,
    #[serde(rename = "pytest")]
    Pytest,
}

impl FrameworkTag {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameworkTag::UnittestDjango => "unittest-django",
            FrameworkTag::UnittestPlain => "unittest-plain",
            FrameworkTag::Pytest => "pytest",
        }
    }
}

/// Compact summary of the target source, mined once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPack {
    /// One-line description taken from the module docstring.
    pub summary: String,
    /// Top-level function/class names in source order.
    pub symbols: Vec<String>,
    /// First docstring paragraph per symbol ("" when absent), same order.
    pub docstrings: Vec<String>,
    pub framework_hints: Vec<FrameworkTag>,
    /// Full target source, truncated to whole lines within the char budget.
    pub code_src: String,
    pub parse_failed: bool,
}

impl ContextPack {
    /// Primary framework tag used to shape prompts.
    pub fn primary_framework(&self) -> FrameworkTag {
        self.framework_hints
            .first()
            .copied()
            .unwrap_or(FrameworkTag::Pytest)
    }
}

/// Candidate test module produced by the drafter or refiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestArtifact {
    pub source: String,
    pub framework: FrameworkTag,
    pub parsed_ok: bool,
}

/// Per-call accounting extracted from a model completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMetadata {
    /// Mean of per-token `-log p`; `None` when logprobs were unavailable.
    pub entropy: Option<f64>,
    pub avg_logprob: Option<f64>,
    /// Number of scored content tokens.
    pub token_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Estimated dollars; `None` for models missing from the price table.
    pub estimated_cost: Option<f64>,
    pub duration_seconds: f64,
}

impl LlmMetadata {
    /// Metadata for a call that never reached a provider (dry mode, fallback).
    pub fn empty() -> Self {
        Self {
            entropy: None,
            avg_logprob: None,
            token_count: 0,
            input_tokens: 0,
            output_tokens: 0,
            estimated_cost: None,
            duration_seconds: 0.0,
        }
    }
}

/// One external lint/type tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintRecord {
    pub available: bool,
    pub issue_count: u32,
    pub exit_code: Option<i32>,
    pub output_excerpt: String,
}

impl LintRecord {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            issue_count: 0,
            exit_code: None,
            output_excerpt: String::new(),
        }
    }
}

/// Static analysis of a candidate test module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticReport {
    pub syntax_ok: bool,
    pub syntax_error: Option<String>,
    pub line_count: u32,
    pub function_count: u32,
    pub class_count: u32,
    pub max_function_length: u32,
    pub avg_function_length: f64,
    /// 1 + number of branching nodes.
    pub complexity: u32,
    /// Keyed by tool name; missing tools are recorded, never fatal.
    pub linters: BTreeMap<String, LintRecord>,
}

impl StaticReport {
    /// Zeroed report for the given source; also stands in for the whole
    /// analysis when it is disabled by configuration.
    pub fn empty(source: &str) -> Self {
        Self {
            syntax_ok: true,
            syntax_error: None,
            line_count: source.lines().count() as u32,
            function_count: 0,
            class_count: 0,
            max_function_length: 0,
            avg_function_length: 0.0,
            complexity: 0,
            linters: BTreeMap::new(),
        }
    }

    /// Sum of issue counts over the tools that actually ran.
    pub fn lint_issue_count(&self) -> u32 {
        self.linters
            .values()
            .filter(|record| record.available)
            .map(|record| record.issue_count)
            .sum()
    }

    /// Tools that were probed but not installed.
    pub fn missing_tools(&self) -> Vec<String> {
        self.linters
            .iter()
            .filter(|(_, record)| !record.available)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Request body for the sandboxed runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerRequest {
    pub repo: String,
    pub version: String,
    pub code_file: String,
    pub test_src: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageDetails {
    pub covered_lines: u32,
    pub num_statements: u32,
    pub missing_lines: Vec<u32>,
}

/// Execution metrics parsed from the runner. Missing numeric fields are
/// substituted with `-1`; both snake_case and the runner's camelCase field
/// names are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerResponse {
    pub success: bool,
    #[serde(alias = "exitCode")]
    pub exit_code: i32,
    pub coverage: f64,
    #[serde(alias = "coverageDetails")]
    pub coverage_details: CoverageDetails,
    pub mutation_score: f64,
    pub mutation_num: i64,
    pub mutation_uncertainty: f64,
    pub status: Option<String>,
    pub test_error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    #[serde(alias = "executionTime")]
    pub execution_time: f64,
}

impl Default for RunnerResponse {
    fn default() -> Self {
        Self {
            success: false,
            exit_code: -1,
            coverage: -1.0,
            coverage_details: CoverageDetails::default(),
            mutation_score: -1.0,
            mutation_num: -1,
            mutation_uncertainty: -1.0,
            status: None,
            test_error: None,
            stdout: String::new(),
            stderr: String::new(),
            execution_time: -1.0,
        }
    }
}

impl RunnerResponse {
    /// Synthetic response standing in for a failed or timed-out runner call.
    pub fn synthetic_failure(test_error: impl Into<String>) -> Self {
        Self {
            status: Some("error".to_string()),
            test_error: Some(test_error.into()),
            ..Self::default()
        }
    }
}

/// Pre-execution reliability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreLevel {
    High,
    Medium,
    Low,
    Unknown,
}

/// Post-execution reliability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostLevel {
    Trusted,
    Pass,
    NeedsReview,
    Discard,
}

/// Aggregated lint view carried into the reliability records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintSummary {
    pub issues: u32,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreReliability {
    pub level: PreLevel,
    pub entropy: Option<f64>,
    pub avg_logprob: Option<f64>,
    pub token_count: u64,
    /// Enumerates which scoring rules fired, in order.
    pub rationale: String,
    pub static_report: StaticReport,
    pub lint: LintSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostReliability {
    pub pre_level: PreLevel,
    pub level: PostLevel,
    /// Reasons in rule-firing order.
    pub reasons: Vec<String>,
    pub coverage: f64,
    pub target_coverage: f64,
    pub mutation_score: f64,
    pub target_mutation: f64,
    pub success: bool,
    pub lint: LintSummary,
}

/// Model-assisted critique suggestions, parsed leniently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSuggestions {
    pub priority_issues: Vec<String>,
    pub coverage_suggestions: Vec<String>,
    pub mutation_suggestions: Vec<String>,
    pub code_quality_suggestions: Vec<String>,
    pub test_strategy_suggestions: Vec<String>,
    pub next_steps: Vec<String>,
}

/// Structured critique of one executed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub compile_error: bool,
    pub no_tests: bool,
    pub low_coverage: bool,
    pub low_mutation: bool,
    pub no_progress: bool,
    pub mutation_score: f64,
    pub coverage_delta: f64,
    pub mutation_delta: f64,
    pub lint_issue_count: u32,
    /// First ten uncovered lines, in runner order.
    pub missing_lines: Vec<u32>,
    /// Repair instructions in strict priority order.
    pub instructions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_suggestions: Option<LlmSuggestions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_supervisor_metadata: Option<LlmMetadata>,
}

impl Critique {
    /// Fallback critique asking the refiner to re-attempt compilation.
    pub fn baseline() -> Self {
        Self {
            compile_error: true,
            no_tests: false,
            low_coverage: true,
            low_mutation: false,
            no_progress: false,
            mutation_score: -1.0,
            coverage_delta: 0.0,
            mutation_delta: 0.0,
            lint_issue_count: 0,
            missing_lines: Vec::new(),
            instructions: vec![
                "Resolve runner errors and ensure the tests execute successfully.".to_string(),
            ],
            llm_suggestions: None,
            llm_supervisor_metadata: None,
        }
    }

    /// Targets are met when neither shortfall flag is set.
    pub fn targets_met(&self) -> bool {
        !self.low_coverage && !self.low_mutation
    }
}

/// Router verdict for one completed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Refine,
    Finish,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    TargetsMet,
    MaxIterations,
    Stagnation,
    UpstreamTimeout,
    UpstreamError,
    ConfigurationMissing,
    RunnerError,
    CostBudget,
    TimeBudget,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::TargetsMet => "targets-met",
            FinishReason::MaxIterations => "max-iterations",
            FinishReason::Stagnation => "stagnation",
            FinishReason::UpstreamTimeout => "upstream-timeout",
            FinishReason::UpstreamError => "upstream-error",
            FinishReason::ConfigurationMissing => "configuration-missing",
            FinishReason::RunnerError => "runner-error",
            FinishReason::CostBudget => "cost-budget",
            FinishReason::TimeBudget => "time-budget",
        }
    }
}

/// Mutable per-run bookkeeping. The only state that crosses attempts; all
/// other records are written to the run directory and never touched again.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: String,
    /// Index of the attempt currently being produced (0-based).
    pub attempt_index: u32,
    pub best_coverage: f64,
    pub best_mutation: f64,
    pub stagnation_count: u32,
    /// Observed `(coverage, mutation)` per completed attempt.
    pub history: Vec<(f64, f64)>,
    pub total_llm_cost: f64,
    pub total_llm_input_tokens: u64,
    pub total_llm_output_tokens: u64,
    pub total_llm_duration_seconds: f64,
    pub total_runner_duration_seconds: f64,
    pub total_static_duration_seconds: f64,
    pub target_coverage: f64,
    pub target_mutation: f64,
    pub max_iterations: u32,
    /// 0 disables the cap.
    pub max_total_cost: f64,
    /// 0 disables the cap.
    pub max_total_wall_seconds: u64,
}

impl RunState {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            attempt_index: 0,
            best_coverage: 0.0,
            best_mutation: -1.0,
            stagnation_count: 0,
            history: Vec::new(),
            total_llm_cost: 0.0,
            total_llm_input_tokens: 0,
            total_llm_output_tokens: 0,
            total_llm_duration_seconds: 0.0,
            total_runner_duration_seconds: 0.0,
            total_static_duration_seconds: 0.0,
            target_coverage: 0.0,
            target_mutation: 0.0,
            max_iterations: 0,
            max_total_cost: 0.0,
            max_total_wall_seconds: 0,
        }
    }

    /// Number of attempts with recorded execution results.
    pub fn attempts_completed(&self) -> u32 {
        self.history.len() as u32
    }
}

/// Per-attempt durations and LLM accounting (`attempt_<k>.metrics.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttemptMetrics {
    pub attempt: u32,
    pub llm_duration_seconds: f64,
    pub llm_cost: f64,
    pub llm_input_tokens: u64,
    pub llm_output_tokens: u64,
    pub supervisor_llm_cost: f64,
    pub supervisor_llm_input_tokens: u64,
    pub supervisor_llm_output_tokens: u64,
    pub runner_duration_seconds: f64,
    pub static_duration_seconds: f64,
}

/// Totals written once at the end of a run (`run_summary.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub finish_reason: FinishReason,
    pub iterations: u32,
    pub final_coverage: f64,
    pub final_mutation: f64,
    pub best_coverage: f64,
    pub best_mutation: f64,
    pub total_llm_cost: f64,
    pub total_llm_input_tokens: u64,
    pub total_llm_output_tokens: u64,
    pub total_llm_duration_seconds: f64,
    pub total_runner_duration_seconds: f64,
    pub total_static_duration_seconds: f64,
    pub total_duration_seconds: f64,
}
