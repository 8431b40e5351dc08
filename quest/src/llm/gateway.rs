//! Model gateway: provider abstraction plus uncertainty/cost accounting.
//!
//! The [`TextCompleter`] trait decouples the agents from the actual provider.
//! Tests use scripted completers that return predetermined replies without
//! any network traffic; dry mode swaps in [`DryCompleter`].

use std::env;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::error::{Failure, FailureKind};
use crate::core::fences::strip_code_fences;
use crate::core::types::LlmMetadata;
use crate::llm::cost;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Decoding controls forwarded to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoding {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub decoding: Decoding,
    pub collect_logprobs: bool,
    pub timeout: Duration,
}

/// Provider reply before accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub text: String,
    /// Per-content-token logprobs when the provider returned them.
    pub token_logprobs: Option<Vec<f64>>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Abstraction over text-completion providers.
pub trait TextCompleter {
    fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion>;
}

/// Completion with fences stripped and metadata attached.
#[derive(Debug, Clone)]
pub struct Completion {
    pub code: String,
    pub metadata: LlmMetadata,
}

/// Run a completion and derive entropy, average logprob, and estimated cost.
///
/// Entropy is the mean of per-token `-log p`; both statistics are omitted
/// when the provider returned no logprobs.
#[instrument(skip_all, fields(model = %request.decoding.model))]
pub fn complete_code<C: TextCompleter + ?Sized>(
    completer: &C,
    request: &CompletionRequest,
) -> Result<Completion> {
    let start = Instant::now();
    let raw = completer.complete(request)?;
    let duration_seconds = start.elapsed().as_secs_f64();

    let (entropy, avg_logprob, token_count) = match raw.token_logprobs.as_deref() {
        Some([]) | None => (None, None, raw.output_tokens),
        Some(logprobs) => {
            let n = logprobs.len() as f64;
            let sum: f64 = logprobs.iter().sum();
            (Some(-sum / n), Some(sum / n), logprobs.len() as u64)
        }
    };

    let estimated_cost = cost::estimate(&request.decoding.model, raw.input_tokens, raw.output_tokens);
    debug!(
        entropy = ?entropy,
        input_tokens = raw.input_tokens,
        output_tokens = raw.output_tokens,
        "completion finished"
    );

    Ok(Completion {
        code: strip_code_fences(&raw.text),
        metadata: LlmMetadata {
            entropy,
            avg_logprob,
            token_count,
            input_tokens: raw.input_tokens,
            output_tokens: raw.output_tokens,
            estimated_cost,
            duration_seconds,
        },
    })
}

/// Chat-completions client for the OpenAI-compatible HTTP API.
pub struct OpenAiCompleter {
    client: reqwest::blocking::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiCompleter {
    /// Credentials come from `OPENAI_API_KEY`; absence is reported at the
    /// first `complete` call so the engine can record the failed run.
    pub fn new() -> Result<Self> {
        Self::with_base_url(OPENAI_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            api_key: env::var("OPENAI_API_KEY").ok().filter(|key| !key.is_empty()),
            base_url: base_url.into(),
        })
    }
}

impl TextCompleter for OpenAiCompleter {
    fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            Failure::new(FailureKind::ConfigurationMissing, "OPENAI_API_KEY is not set")
        })?;

        let body = serde_json::json!({
            "model": request.decoding.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.decoding.temperature,
            "top_p": request.decoding.top_p,
            "max_tokens": request.decoding.max_tokens,
            "logprobs": request.collect_logprobs,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow::Error::from(Failure::new(
                        FailureKind::UpstreamTimeout,
                        format!("provider timed out after {}s", request.timeout.as_secs()),
                    ))
                } else {
                    anyhow::Error::from(Failure::new(FailureKind::UpstreamError, err.to_string()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let excerpt: String = response.text().unwrap_or_default().chars().take(500).collect();
            warn!(status = %status, "provider returned error status");
            return Err(Failure::new(
                FailureKind::UpstreamError,
                format!("provider returned {status}: {excerpt}"),
            )
            .into());
        }

        let value: Value = response.json().map_err(|err| {
            Failure::new(
                FailureKind::UpstreamError,
                format!("malformed provider body: {err}"),
            )
        })?;
        parse_chat_completion(&value)
    }
}

fn parse_chat_completion(value: &Value) -> Result<RawCompletion> {
    let choice = &value["choices"][0];
    let text = choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let token_logprobs = choice["logprobs"]["content"].as_array().map(|tokens| {
        tokens
            .iter()
            .filter_map(|token| token["logprob"].as_f64())
            .collect::<Vec<f64>>()
    });

    Ok(RawCompletion {
        text,
        token_logprobs,
        input_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
        output_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0),
    })
}

/// Dry-mode provider: no network, deterministic empty reply, no logprobs.
/// Agents substitute their documented fallbacks for the empty text.
pub struct DryCompleter;

impl TextCompleter for DryCompleter {
    fn complete(&self, _request: &CompletionRequest) -> Result<RawCompletion> {
        Ok(RawCompletion {
            text: String::new(),
            token_logprobs: None,
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

/// Provider selected from configuration.
pub enum Completer {
    OpenAi(OpenAiCompleter),
    Dry(DryCompleter),
    /// Provider name the build does not support; fails on first use so the
    /// run directory still records the failure.
    Unconfigured { message: String },
}

impl Completer {
    pub fn from_settings(provider: &str, dry: bool) -> Self {
        if dry {
            return Completer::Dry(DryCompleter);
        }
        match provider {
            "openai" => match OpenAiCompleter::new() {
                Ok(completer) => Completer::OpenAi(completer),
                Err(err) => Completer::Unconfigured {
                    message: err.to_string(),
                },
            },
            other => Completer::Unconfigured {
                message: format!("unsupported llm provider '{other}'"),
            },
        }
    }
}

impl TextCompleter for Completer {
    fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion> {
        match self {
            Completer::OpenAi(inner) => inner.complete(request),
            Completer::Dry(inner) => inner.complete(request),
            Completer::Unconfigured { message } => {
                Err(Failure::new(FailureKind::ConfigurationMissing, message.clone()).into())
            }
        }
    }
}

impl<T: TextCompleter + ?Sized> TextCompleter for &T {
    fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion> {
        (**self).complete(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            prompt: "write a test".to_string(),
            decoding: Decoding {
                model: "gpt-4o-mini".to_string(),
                temperature: 0.2,
                top_p: 0.95,
                max_tokens: 256,
            },
            collect_logprobs: true,
            timeout: Duration::from_secs(60),
        }
    }

    struct FixedCompleter {
        raw: RawCompletion,
    }

    impl TextCompleter for FixedCompleter {
        fn complete(&self, _request: &CompletionRequest) -> Result<RawCompletion> {
            Ok(self.raw.clone())
        }
    }

    #[test]
    fn entropy_is_mean_negative_logprob() {
        let completer = FixedCompleter {
            raw: RawCompletion {
                text: "```python\nx = 1\n```".to_string(),
                token_logprobs: Some(vec![-0.1, -0.3]),
                input_tokens: 10,
                output_tokens: 2,
            },
        };

        let completion = complete_code(&completer, &request()).expect("complete");
        let entropy = completion.metadata.entropy.expect("entropy");
        let avg = completion.metadata.avg_logprob.expect("avg");
        assert!((entropy - 0.2).abs() < 1e-9);
        assert!((avg + 0.2).abs() < 1e-9);
        assert_eq!(completion.metadata.token_count, 2);
        assert_eq!(completion.code, "x = 1");
    }

    #[test]
    fn missing_logprobs_leave_entropy_unset() {
        let completer = FixedCompleter {
            raw: RawCompletion {
                text: "x = 1".to_string(),
                token_logprobs: None,
                input_tokens: 5,
                output_tokens: 3,
            },
        };

        let completion = complete_code(&completer, &request()).expect("complete");
        assert_eq!(completion.metadata.entropy, None);
        assert_eq!(completion.metadata.avg_logprob, None);
        assert_eq!(completion.metadata.token_count, 3);
    }

    #[test]
    fn known_model_gets_a_cost_estimate() {
        let completer = FixedCompleter {
            raw: RawCompletion {
                text: "x = 1".to_string(),
                token_logprobs: None,
                input_tokens: 1_000,
                output_tokens: 1_000,
            },
        };

        let completion = complete_code(&completer, &request()).expect("complete");
        assert!(completion.metadata.estimated_cost.is_some());
    }

    #[test]
    fn dry_completer_returns_deterministic_empty_stub() {
        let completion = complete_code(&DryCompleter, &request()).expect("complete");
        assert_eq!(completion.code, "");
        assert_eq!(completion.metadata.entropy, None);
        assert_eq!(completion.metadata.input_tokens, 0);
    }

    #[test]
    fn unconfigured_completer_reports_configuration_missing() {
        let completer = Completer::Unconfigured {
            message: "unsupported llm provider 'acme'".to_string(),
        };
        let err = complete_code(&completer, &request()).unwrap_err();
        assert_eq!(
            Failure::kind_of(&err),
            Some(FailureKind::ConfigurationMissing)
        );
    }

    #[test]
    fn chat_payload_parses_content_and_usage() {
        let body = serde_json::json!({
            "choices": [{
                "message": {"content": "def test_a():\n    assert True"},
                "logprobs": {"content": [
                    {"token": "def", "logprob": -0.01},
                    {"token": " test", "logprob": -0.05},
                ]},
            }],
            "usage": {"prompt_tokens": 42, "completion_tokens": 12},
        });

        let raw = parse_chat_completion(&body).expect("parse");
        assert_eq!(raw.input_tokens, 42);
        assert_eq!(raw.output_tokens, 12);
        assert_eq!(raw.token_logprobs.as_deref(), Some(&[-0.01, -0.05][..]));
        assert!(raw.text.starts_with("def test_a"));
    }
}
