//! Loop configuration stored as TOML.
//!
//! The file is intended to be edited by humans and must remain stable and
//! automatable. Missing fields (or a missing file) default to sensible
//! values; `validate()` runs after every load.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::llm::{CompletionRequest, Decoding};
use crate::reliability::ReliabilityThresholds;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuestConfig {
    /// Runner execution endpoint; the literal `"dry"` selects the stub.
    pub runner_url: String,
    /// Runner source-fetch endpoint.
    pub runner_code_url: String,
    pub runner_timeout_seconds: u64,

    /// Maximum refinement rounds after the initial draft.
    pub max_iterations: u32,
    /// Total LLM spend cap in dollars; 0 disables the cap.
    pub max_total_cost: f64,
    /// Wall-clock cap for a whole run; 0 disables the cap.
    pub max_total_wall_seconds: u64,
    /// Character budget for the mined source text.
    pub context_max_code_chars: usize,

    pub llm: LlmConfig,
    pub targets: TargetsConfig,
    pub static_analysis: StaticAnalysisConfig,
    pub supervisor: SupervisorConfig,
    pub runner: RunnerOptions,
    pub reliability: ReliabilityThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub collect_logprobs: bool,
    /// Bypass the provider and use the deterministic stub.
    pub dry: bool,
    pub decoding: DecodingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecodingConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TargetsConfig {
    /// Branch coverage target in percent.
    pub coverage: f64,
    /// Mutation kill-rate target in percent; 0 disables the target.
    pub mutation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StaticAnalysisConfig {
    pub enable: bool,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Enable the model-assisted critique pass.
    pub use_llm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerOptions {
    /// Forwarded to the runner; the core only records it.
    pub skip_mutation: bool,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            runner_url: "http://localhost:3000/runner".to_string(),
            runner_code_url: "http://localhost:3000/code".to_string(),
            runner_timeout_seconds: 300,
            max_iterations: 3,
            max_total_cost: 0.0,
            max_total_wall_seconds: 0,
            context_max_code_chars: 40_000,
            llm: LlmConfig::default(),
            targets: TargetsConfig::default(),
            static_analysis: StaticAnalysisConfig::default(),
            supervisor: SupervisorConfig::default(),
            runner: RunnerOptions::default(),
            reliability: ReliabilityThresholds::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 60,
            collect_logprobs: true,
            dry: false,
            decoding: DecodingConfig::default(),
        }
    }
}

impl Default for DecodingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.95,
            max_tokens: 2_048,
        }
    }
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            coverage: 60.0,
            mutation: 0.0,
        }
    }
}

impl Default for StaticAnalysisConfig {
    fn default() -> Self {
        Self {
            enable: true,
            timeout_seconds: 15,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { use_llm: false }
    }
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            skip_mutation: false,
        }
    }
}

impl LlmConfig {
    /// Assemble a gateway request for the given prompt.
    pub fn completion_request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest {
            prompt,
            decoding: Decoding {
                model: self.model.clone(),
                temperature: self.decoding.temperature,
                top_p: self.decoding.top_p,
                max_tokens: self.decoding.max_tokens,
            },
            collect_logprobs: self.collect_logprobs,
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

impl QuestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.runner_timeout_seconds == 0 {
            return Err(anyhow!("runner_timeout_seconds must be > 0"));
        }
        if self.llm.timeout_seconds == 0 {
            return Err(anyhow!("llm.timeout_seconds must be > 0"));
        }
        if self.llm.decoding.max_tokens == 0 {
            return Err(anyhow!("llm.decoding.max_tokens must be > 0"));
        }
        if self.context_max_code_chars == 0 {
            return Err(anyhow!("context_max_code_chars must be > 0"));
        }
        if !(0.0..=100.0).contains(&self.targets.coverage) {
            return Err(anyhow!("targets.coverage must be within 0..=100"));
        }
        if !(0.0..=100.0).contains(&self.targets.mutation) {
            return Err(anyhow!("targets.mutation must be within 0..=100"));
        }
        if self.static_analysis.timeout_seconds == 0 {
            return Err(anyhow!("static_analysis.timeout_seconds must be > 0"));
        }
        if self.reliability.entropy_high > self.reliability.entropy_medium {
            return Err(anyhow!(
                "reliability.entropy_high must not exceed reliability.entropy_medium"
            ));
        }
        Ok(())
    }
}

/// Load config from a TOML file; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<QuestConfig> {
    if !path.exists() {
        let cfg = QuestConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: QuestConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &QuestConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
