//! Test-only scripted collaborators.
//!
//! Scripted doubles return predetermined replies without touching a network,
//! letting unit and integration tests drive the whole loop deterministically.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::error::{Failure, FailureKind};
use crate::core::types::{RunnerRequest, RunnerResponse};
use crate::llm::{CompletionRequest, RawCompletion, TextCompleter};
use crate::runner::RunnerBackend;

/// One scripted model turn.
pub enum ScriptedCompletion {
    /// Reply with the given text and optional token logprobs.
    Reply {
        text: String,
        token_logprobs: Option<Vec<f64>>,
    },
    /// Fail with a typed gateway failure.
    Fail(FailureKind, String),
}

impl ScriptedCompletion {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedCompletion::Reply {
            text: text.into(),
            token_logprobs: None,
        }
    }

    pub fn confident(text: impl Into<String>) -> Self {
        ScriptedCompletion::Reply {
            text: text.into(),
            token_logprobs: Some(vec![-0.05, -0.05, -0.05]),
        }
    }
}

/// Completer that replays a fixed script, one entry per call.
pub struct ScriptedCompleter {
    script: RefCell<VecDeque<ScriptedCompletion>>,
}

impl ScriptedCompleter {
    pub fn new(script: Vec<ScriptedCompletion>) -> Self {
        Self {
            script: RefCell::new(script.into()),
        }
    }
}

impl TextCompleter for ScriptedCompleter {
    fn complete(&self, _request: &CompletionRequest) -> Result<RawCompletion> {
        match self.script.borrow_mut().pop_front() {
            Some(ScriptedCompletion::Reply {
                text,
                token_logprobs,
            }) => Ok(RawCompletion {
                text,
                token_logprobs,
                input_tokens: 100,
                output_tokens: 50,
            }),
            Some(ScriptedCompletion::Fail(kind, message)) => {
                Err(Failure::new(kind, message).into())
            }
            None => Err(anyhow!("scripted completer exhausted")),
        }
    }
}

/// One scripted runner turn.
pub enum ScriptedExecution {
    Respond(RunnerResponse),
    Fail(String),
}

/// Runner that replays a fixed script; repeats the last response when the
/// script runs out, which keeps stagnation scenarios short to write.
pub struct ScriptedRunner {
    script: RefCell<VecDeque<ScriptedExecution>>,
    repeat_last: RefCell<Option<RunnerResponse>>,
    code_src: String,
}

impl ScriptedRunner {
    pub fn new(script: Vec<ScriptedExecution>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            repeat_last: RefCell::new(None),
            code_src: "def placeholder(value):\n    return value\n".to_string(),
        }
    }

    pub fn with_code_src(mut self, code_src: impl Into<String>) -> Self {
        self.code_src = code_src.into();
        self
    }
}

impl RunnerBackend for ScriptedRunner {
    fn execute(&self, _request: &RunnerRequest) -> Result<RunnerResponse> {
        match self.script.borrow_mut().pop_front() {
            Some(ScriptedExecution::Respond(response)) => {
                *self.repeat_last.borrow_mut() = Some(response.clone());
                Ok(response)
            }
            Some(ScriptedExecution::Fail(message)) => {
                Err(Failure::new(FailureKind::RunnerError, message).into())
            }
            None => self
                .repeat_last
                .borrow()
                .clone()
                .ok_or_else(|| anyhow!("scripted runner exhausted")),
        }
    }

    fn fetch_code(&self, _repo: &str, _version: &str, _code_file: &str) -> Result<String> {
        Ok(self.code_src.clone())
    }
}

/// Successful runner response with the given metrics.
pub fn passing_response(coverage: f64, mutation: f64) -> RunnerResponse {
    RunnerResponse {
        success: true,
        exit_code: 0,
        coverage,
        mutation_score: mutation,
        status: Some("passed".to_string()),
        stdout: "collected 3 items\n3 passed".to_string(),
        execution_time: 0.5,
        ..RunnerResponse::default()
    }
}

/// Failed runner response carrying an error message.
pub fn failing_response(test_error: impl Into<String>) -> RunnerResponse {
    RunnerResponse {
        success: false,
        exit_code: 1,
        status: Some("error".to_string()),
        test_error: Some(test_error.into()),
        stderr: "traceback".to_string(),
        ..RunnerResponse::default()
    }
}
