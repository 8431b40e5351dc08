//! Reliability scoring before and after sandbox execution.
//!
//! Pre-execution: an uncertainty level from model entropy, downgraded by
//! static signals. Post-execution: a categorical verdict accumulated from
//! execution metrics against the configured targets.

use serde::{Deserialize, Serialize};

use crate::core::types::{
    LintSummary, LlmMetadata, PostLevel, PostReliability, PreLevel, PreReliability, RunnerResponse,
    StaticReport,
};

/// Tunable thresholds for both scoring passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityThresholds {
    /// Entropy at or below this scores `high`.
    pub entropy_high: f64,
    /// Entropy at or below this scores `medium`; above scores `low`.
    pub entropy_medium: f64,
    /// Lint issues at or above this downgrade the level.
    pub lint_downgrade_threshold: u32,
    /// Cyclomatic complexity above this downgrades the level.
    pub complexity_ceiling: u32,
}

impl Default for ReliabilityThresholds {
    fn default() -> Self {
        Self {
            entropy_high: 0.15,
            entropy_medium: 0.45,
            lint_downgrade_threshold: 1,
            complexity_ceiling: 30,
        }
    }
}

/// Score a candidate before it is ever executed.
pub fn score_pre_execution(
    metadata: Option<&LlmMetadata>,
    report: &StaticReport,
    thresholds: &ReliabilityThresholds,
) -> PreReliability {
    let lint = summarize_lint(report);
    let (entropy, avg_logprob, token_count) = match metadata {
        Some(meta) => (meta.entropy, meta.avg_logprob, meta.token_count),
        None => (None, None, 0),
    };

    let base = entropy_level(entropy, thresholds);
    let mut level = base;
    let mut rationale: Vec<String> = Vec::new();

    if !report.syntax_ok {
        level = PreLevel::Low;
        rationale.push("Syntax errors detected in the test module.".to_string());
        if let Some(error) = &report.syntax_error {
            rationale.push(error.clone());
        }
    } else {
        match (entropy, base) {
            (None, _) => rationale.push("Entropy not available from the provider.".to_string()),
            (Some(_), PreLevel::High) => {
                rationale.push("Low entropy indicates confident generation.".to_string());
            }
            (Some(_), PreLevel::Medium) => {
                rationale.push("Moderate entropy; some uncertainty present.".to_string());
            }
            _ => rationale.push("High entropy indicates uncertain generation.".to_string()),
        }
    }

    if lint.issues >= thresholds.lint_downgrade_threshold {
        level = cap_at_medium(level);
        rationale.push(format!(
            "Lint/type checks surfaced {} blocking issue(s).",
            lint.issues
        ));
    } else if !lint.missing.is_empty() {
        rationale.push(format!(
            "Lint/type tools unavailable: {}.",
            lint.missing.join(", ")
        ));
    }

    if report.complexity > thresholds.complexity_ceiling {
        level = cap_at_medium(level);
        rationale.push(format!(
            "Complexity {} exceeds the ceiling of {}.",
            report.complexity, thresholds.complexity_ceiling
        ));
    }

    PreReliability {
        level,
        entropy,
        avg_logprob,
        token_count,
        rationale: rationale.join(" "),
        static_report: report.clone(),
        lint,
    }
}

/// Score an executed attempt against the targets.
pub fn score_post_execution(
    pre: &PreReliability,
    response: &RunnerResponse,
    target_coverage: f64,
    target_mutation: f64,
    thresholds: &ReliabilityThresholds,
) -> PostReliability {
    let coverage = response.coverage.max(0.0);
    let mutation_score = response.mutation_score;

    let mut level = PostLevel::Pass;
    let mut reasons: Vec<String> = Vec::new();

    if !response.success {
        level = PostLevel::Discard;
        reasons.push("Tests failed to execute successfully.".to_string());
    }
    if response
        .test_error
        .as_deref()
        .is_some_and(|error| !error.is_empty())
    {
        level = cap_at_needs_review(level);
        reasons.push("Runner reported a test error.".to_string());
    }
    if coverage < target_coverage {
        level = cap_at_needs_review(level);
        reasons.push("Coverage below target threshold.".to_string());
    }
    if target_mutation > 0.0 {
        if mutation_score < 0.0 {
            level = cap_at_needs_review(level);
            reasons.push("Mutation score unavailable; rerun mutation testing.".to_string());
        } else if mutation_score < target_mutation {
            level = cap_at_needs_review(level);
            reasons.push("Mutation score below target.".to_string());
        }
    }
    if pre.lint.issues >= thresholds.lint_downgrade_threshold {
        level = cap_at_needs_review(level);
        reasons.push("Unresolved lint/type issues remain.".to_string());
    }

    if level == PostLevel::Pass && pre.level == PreLevel::High {
        level = PostLevel::Trusted;
        reasons.push("Coverage and mutation targets met with confident generation.".to_string());
    }

    PostReliability {
        pre_level: pre.level,
        level,
        reasons,
        coverage,
        target_coverage,
        mutation_score,
        target_mutation,
        success: response.success,
        lint: pre.lint.clone(),
    }
}

/// Aggregate per-tool lint records into the summary carried by both scores.
pub fn summarize_lint(report: &StaticReport) -> LintSummary {
    LintSummary {
        issues: report.lint_issue_count(),
        missing: report.missing_tools(),
    }
}

fn entropy_level(entropy: Option<f64>, thresholds: &ReliabilityThresholds) -> PreLevel {
    match entropy {
        None => PreLevel::Unknown,
        Some(value) if value <= thresholds.entropy_high => PreLevel::High,
        Some(value) if value <= thresholds.entropy_medium => PreLevel::Medium,
        Some(_) => PreLevel::Low,
    }
}

fn cap_at_medium(level: PreLevel) -> PreLevel {
    match level {
        PreLevel::High => PreLevel::Medium,
        other => other,
    }
}

fn cap_at_needs_review(level: PostLevel) -> PostLevel {
    match level {
        PostLevel::Pass | PostLevel::Trusted => PostLevel::NeedsReview,
        other => other,
    }
}
