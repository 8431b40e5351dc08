//! Rule-based critique of an executed attempt.
//!
//! The critic turns execution metrics, static signals, and reliability
//! verdicts into a structured critique with repair instructions in strict
//! priority order. It never fails: the optional model-assisted pass degrades
//! to the rule-based result on any error.

use tracing::{debug, instrument, warn};

use crate::agents::prompt::PromptEngine;
use crate::core::types::{
    Critique, LlmSuggestions, PostLevel, PostReliability, PreReliability, RunnerResponse,
    StaticReport,
};
use crate::io::config::LlmConfig;
use crate::llm::{TextCompleter, complete_code};

/// Missing-lines instructions and payloads are truncated to this many lines.
const MISSING_LINES_LIMIT: usize = 10;
const RUNNER_ERROR_EXCERPT_CHARS: usize = 300;

/// Everything the critic looks at for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct CritiqueInputs<'a> {
    pub response: &'a RunnerResponse,
    pub static_report: &'a StaticReport,
    pub pre: &'a PreReliability,
    pub post: &'a PostReliability,
    pub target_coverage: f64,
    pub target_mutation: f64,
    pub test_src: &'a str,
}

/// Build the rule-based critique. Deltas and `no_progress` are stamped by the
/// progress accounting afterwards.
pub fn critique(inputs: &CritiqueInputs<'_>) -> Critique {
    let response = inputs.response;
    let static_report = inputs.static_report;

    let compile_error = !response.success || !static_report.syntax_ok;
    let no_tests = detect_no_tests(response);
    let coverage = response.coverage.max(0.0);
    let low_coverage = coverage < inputs.target_coverage;
    let low_mutation = inputs.target_mutation > 0.0
        && (response.mutation_score < inputs.target_mutation || response.mutation_score < 0.0);
    let lint_issue_count = static_report.lint_issue_count();

    let missing_lines: Vec<u32> = response
        .coverage_details
        .missing_lines
        .iter()
        .take(MISSING_LINES_LIMIT)
        .copied()
        .collect();

    let mut instructions: Vec<String> = Vec::new();

    if !static_report.syntax_ok {
        let detail = static_report
            .syntax_error
            .as_deref()
            .unwrap_or("invalid syntax");
        instructions.push(format!(
            "Fix the Python syntax error so the module parses: {detail}."
        ));
    }
    if lint_issue_count > 0 {
        instructions.push(format!(
            "Resolve {lint_issue_count} lint/type issue(s) reported by static analysis."
        ));
    }
    if compile_error {
        instructions
            .push("Resolve runner errors and ensure the tests execute successfully.".to_string());
    }
    if no_tests {
        instructions
            .push("Add at least one test so the framework collects and runs tests.".to_string());
    }
    if low_coverage {
        if missing_lines.is_empty() {
            instructions.push(
                "Increase test coverage with additional assertions and branch cases.".to_string(),
            );
        } else {
            let targets = missing_lines
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            instructions.push(format!("Add coverage for lines: {targets}."));
        }
    }
    if low_mutation {
        if response.mutation_score < 0.0 {
            instructions.push(
                "Mutation score is unavailable; make the tests assert observable behavior so mutation testing can run.".to_string(),
            );
        } else {
            instructions.push(format!(
                "Strengthen assertions to kill surviving mutants; mutation score {:.1} is below the target {:.1}.",
                response.mutation_score, inputs.target_mutation
            ));
        }
    }
    if matches!(inputs.post.level, PostLevel::NeedsReview | PostLevel::Discard) {
        for reason in &inputs.post.reasons {
            instructions.push(format!("Address reliability concern: {reason}"));
        }
    }
    if let Some(error) = response.test_error.as_deref().filter(|e| !e.is_empty()) {
        instructions.push(format!(
            "Runner reported: {}",
            excerpt(error, RUNNER_ERROR_EXCERPT_CHARS)
        ));
    }

    debug!(
        compile_error,
        no_tests,
        low_coverage,
        low_mutation,
        instruction_count = instructions.len(),
        "critique assembled"
    );

    Critique {
        compile_error,
        no_tests,
        low_coverage,
        low_mutation,
        no_progress: false,
        mutation_score: response.mutation_score,
        coverage_delta: 0.0,
        mutation_delta: 0.0,
        lint_issue_count,
        missing_lines,
        instructions,
        llm_suggestions: None,
        llm_supervisor_metadata: None,
    }
}

/// Rule-based critique plus the model-assisted suggestion pass.
///
/// Provider failures and unparseable replies leave the rule-based critique
/// standing; call metadata is kept whenever the provider was reached so the
/// spend is still accounted for.
#[instrument(skip_all)]
pub fn critique_with_supervisor<C: TextCompleter + ?Sized>(
    completer: &C,
    llm: &LlmConfig,
    inputs: &CritiqueInputs<'_>,
) -> Critique {
    let mut result = critique(inputs);

    let prompt = match PromptEngine::new().render_critic(
        &result,
        inputs.response.success,
        inputs.response.coverage.max(0.0),
        inputs.target_coverage,
        inputs.target_mutation,
        inputs.response.test_error.as_deref(),
        inputs.test_src,
    ) {
        Ok(prompt) => prompt,
        Err(err) => {
            warn!(error = %err, "supervisor prompt failed to render");
            return result;
        }
    };

    match complete_code(completer, &llm.completion_request(prompt)) {
        Ok(completion) => {
            result.llm_supervisor_metadata = Some(completion.metadata);
            match parse_suggestions(&completion.code) {
                Some(suggestions) => result.llm_suggestions = Some(suggestions),
                None => debug!("supervisor reply was not parseable, keeping rule-based critique"),
            }
        }
        Err(err) => {
            warn!(error = %err, "supervisor completion failed");
        }
    }

    result
}

/// Lenient parse of the supervisor reply: accepts a bare JSON object or one
/// embedded in surrounding prose.
fn parse_suggestions(reply: &str) -> Option<LlmSuggestions> {
    if reply.trim().is_empty() {
        return None;
    }
    if let Ok(suggestions) = serde_json::from_str::<LlmSuggestions>(reply) {
        return Some(suggestions);
    }
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

/// Whether the runner saw zero collected tests.
fn detect_no_tests(response: &RunnerResponse) -> bool {
    if response.status.as_deref() == Some("no_tests_collected") {
        return true;
    }
    let haystack = format!("{}\n{}", response.stdout, response.stderr).to_lowercase();
    ["collected 0 items", "no tests ran", "no tests collected"]
        .iter()
        .any(|marker| haystack.contains(marker))
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if out.len() < text.len() {
        out.push_str("...");
    }
    out
}
