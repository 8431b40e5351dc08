//! Test-module rewriting under critic instructions.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::agents::drafter::make_artifact;
use crate::agents::prompt::{PromptEngine, TargetRef};
use crate::core::types::{Critique, LlmMetadata, TestArtifact};
use crate::io::config::LlmConfig;
use crate::llm::{TextCompleter, complete_code};

const GENERIC_INSTRUCTION: &str =
    "Improve coverage and robustness without breaking existing passing tests.";

/// Inputs for one refinement round.
#[derive(Debug, Clone, Copy)]
pub struct RefineRequest<'a> {
    pub target: TargetRef<'a>,
    pub current: &'a TestArtifact,
    pub critique: &'a Critique,
}

/// Rewrite the current module under the critique's instructions, preserving
/// the framework style. An empty completion keeps the current module.
#[instrument(skip_all, fields(repo = %request.target.repo))]
pub fn refine<C: TextCompleter + ?Sized>(
    completer: &C,
    llm: &LlmConfig,
    request: &RefineRequest<'_>,
) -> Result<(TestArtifact, LlmMetadata)> {
    let instructions: Vec<String> = if request.critique.instructions.is_empty() {
        vec![GENERIC_INSTRUCTION.to_string()]
    } else {
        request.critique.instructions.clone()
    };

    let prompt = PromptEngine::new().render_refiner(
        &request.target,
        &request.current.source,
        request.current.framework,
        &instructions,
        &request.critique.missing_lines,
    )?;

    let completion = complete_code(completer, &llm.completion_request(prompt))?;
    let source = if completion.code.is_empty() {
        debug!("empty completion, keeping current module");
        request.current.source.clone()
    } else {
        completion.code
    };

    Ok((
        make_artifact(source, request.current.framework),
        completion.metadata,
    ))
}
