//! Initial test-module generation.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::agents::prompt::{PromptEngine, TargetRef};
use crate::analysis::python;
use crate::core::types::{ContextPack, FrameworkTag, LlmMetadata, TestArtifact};
use crate::io::config::LlmConfig;
use crate::llm::{TextCompleter, complete_code};

/// Inputs for the initial draft.
#[derive(Debug, Clone, Copy)]
pub struct DraftRequest<'a> {
    pub target: TargetRef<'a>,
    pub context: &'a ContextPack,
}

/// Produce the attempt-0 test module.
///
/// An empty completion (dry mode, or a provider that returned nothing) falls
/// back to a deterministic minimal sanity module derived from the first mined
/// symbol, so the loop always has something to execute.
#[instrument(skip_all, fields(repo = %request.target.repo))]
pub fn draft<C: TextCompleter + ?Sized>(
    completer: &C,
    llm: &LlmConfig,
    request: &DraftRequest<'_>,
) -> Result<(TestArtifact, LlmMetadata)> {
    let framework = request.context.primary_framework();
    let prompt = PromptEngine::new().render_drafter(&request.target, request.context, framework)?;

    let completion = complete_code(completer, &llm.completion_request(prompt))?;
    let source = if completion.code.is_empty() {
        debug!("empty completion, using fallback module");
        fallback_module(request.context)
    } else {
        completion.code
    };

    Ok((make_artifact(source, framework), completion.metadata))
}

/// Classify a generated module, defaulting to the requested framework.
pub fn detect_framework(source: &str, fallback: FrameworkTag) -> FrameworkTag {
    let lowered = source.to_lowercase();
    if lowered.contains("pytest") {
        FrameworkTag::Pytest
    } else if lowered.contains("django.test") {
        FrameworkTag::UnittestDjango
    } else if lowered.contains("unittest") {
        FrameworkTag::UnittestPlain
    } else {
        fallback
    }
}

pub(crate) fn make_artifact(source: String, requested: FrameworkTag) -> TestArtifact {
    let parsed_ok = python::parse_ok(&source);
    TestArtifact {
        framework: detect_framework(&source, requested),
        parsed_ok,
        source,
    }
}

/// Deterministic promptless baseline.
fn fallback_module(context: &ContextPack) -> String {
    let symbol = context
        .symbols
        .first()
        .map(|name| sanitize(name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "sanity".to_string());
    format!(
        "def test_{symbol}_sanity():\n    value = 1 + 1\n    assert value == 2\n"
    )
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
