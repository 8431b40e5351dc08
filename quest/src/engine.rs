//! Orchestration of one full synthesis run.
//!
//! Drives the per-run state machine: draft the initial module, then per
//! attempt analyze, execute, score, critique, and route until the targets
//! are met or a stop condition fires. Every phase writes its artifact before
//! the next phase starts, so a crash leaves the previous attempt's tree
//! coherent. The only mutable cross-attempt state is [`RunState`].

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};

use crate::agents::critic::{self, CritiqueInputs};
use crate::agents::drafter::{self, DraftRequest};
use crate::agents::prompt::TargetRef;
use crate::agents::refiner::{self, RefineRequest};
use crate::analysis::{self, AnalysisOptions};
use crate::context::miner::mine_context;
use crate::core::error::{Failure, FailureKind};
use crate::core::progress;
use crate::core::router::decide;
use crate::core::types::{
    AttemptMetrics, FinishReason, RouteDecision, RunState, RunSummary, RunnerRequest,
    RunnerResponse, StaticReport,
};
use crate::io::config::QuestConfig;
use crate::io::events::{append_event, finish_line, phase_line};
use crate::io::storage::{AttemptPaths, RunPaths, new_run_id, write_json, write_text};
use crate::llm::TextCompleter;
use crate::reliability::{score_post_execution, score_pre_execution};
use crate::runner::RunnerBackend;

/// One synthesis job.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub repo: String,
    pub version: String,
    pub code_file: String,
    /// Local checkout used for context mining; when the target file is not
    /// found here the source is fetched through the runner's code endpoint.
    pub repo_root: Option<PathBuf>,
    /// Directory holding `<run_id>/` run directories.
    pub runs_root: PathBuf,
    /// Overrides the configured `max_iterations` when set.
    pub max_iterations: Option<u32>,
}

/// Outcome handed back to the caller; the run directory has the full detail.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub finish_reason: FinishReason,
    pub iterations: u32,
    pub final_coverage: f64,
    pub final_mutation: f64,
    pub total_llm_cost: f64,
    pub run_dir: PathBuf,
}

/// The loop driver, generic over its two external collaborators.
pub struct Engine<'a, C: TextCompleter, R: RunnerBackend> {
    config: &'a QuestConfig,
    completer: &'a C,
    runner: &'a R,
}

impl<'a, C: TextCompleter, R: RunnerBackend> Engine<'a, C, R> {
    pub fn new(config: &'a QuestConfig, completer: &'a C, runner: &'a R) -> Self {
        Self {
            config,
            completer,
            runner,
        }
    }

    /// Run the loop to completion. Fatal collaborator failures still produce
    /// `run_summary.json` and a final `finish` event; only artifact-write
    /// errors surface as `Err`.
    #[instrument(skip_all, fields(repo = %request.repo, code_file = %request.code_file))]
    pub fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let run_start = Instant::now();
        let config = self.config;
        let max_iterations = request.max_iterations.unwrap_or(config.max_iterations);

        let run_id = new_run_id();
        let paths = RunPaths::new(&request.runs_root, &run_id);
        paths.create()?;

        let mut state = RunState::new(run_id.clone());
        state.target_coverage = config.targets.coverage;
        state.target_mutation = config.targets.mutation;
        state.max_iterations = max_iterations;
        state.max_total_cost = config.max_total_cost;
        state.max_total_wall_seconds = config.max_total_wall_seconds;

        info!(%run_id, "starting synthesis run");

        let code_src = match self.load_target_source(request) {
            Ok(source) => source,
            Err(err) => {
                error!(error = %err, "target source unavailable");
                append_event(
                    &paths.events_path,
                    &phase_line(&run_id, 0, "INIT", false, -1.0, -1.0),
                )?;
                return self.finish_run(&paths, &state, FinishReason::RunnerError, 0, run_start);
            }
        };
        write_text(&paths.target_code_path, &code_src)?;
        let context = mine_context(&request.repo, &code_src, config.context_max_code_chars);
        if context.parse_failed {
            warn!("target source failed to parse; proceeding with an empty symbol table");
        }
        write_json(&paths.context_path, &context)?;
        append_event(
            &paths.events_path,
            &phase_line(&run_id, 0, "INIT", true, -1.0, -1.0),
        )?;

        let target = TargetRef {
            repo: &request.repo,
            version: &request.version,
            code_file: &request.code_file,
        };

        let drafted = drafter::draft(
            self.completer,
            &config.llm,
            &DraftRequest {
                target,
                context: &context,
            },
        );
        let (mut artifact, mut metadata) = match drafted {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "draft failed");
                append_event(
                    &paths.events_path,
                    &phase_line(&run_id, 0, "DRAFT", false, -1.0, -1.0),
                )?;
                return self.finish_run(&paths, &state, gateway_reason(&err), 0, run_start);
            }
        };
        append_event(
            &paths.events_path,
            &phase_line(&run_id, 0, "DRAFT", true, -1.0, -1.0),
        )?;

        loop {
            let attempt = state.attempt_index;
            let attempt_paths = AttemptPaths::new(&paths.dir, attempt);
            let (last_cov, last_mut) = state.history.last().copied().unwrap_or((-1.0, -1.0));

            let runner_request = RunnerRequest {
                repo: request.repo.clone(),
                version: request.version.clone(),
                code_file: request.code_file.clone(),
                test_src: artifact.source.clone(),
            };
            write_json(&attempt_paths.request_path, &runner_request)?;
            write_text(&attempt_paths.test_src_path, &artifact.source)?;
            write_json(&attempt_paths.llm_metadata_path, &metadata)?;
            state.total_llm_cost += metadata.estimated_cost.unwrap_or(0.0);
            state.total_llm_input_tokens += metadata.input_tokens;
            state.total_llm_output_tokens += metadata.output_tokens;
            state.total_llm_duration_seconds += metadata.duration_seconds;

            // ANALYZE: static check, then pre-execution reliability.
            let static_start = Instant::now();
            let static_report = if config.static_analysis.enable {
                analysis::analyze(
                    &artifact.source,
                    &AnalysisOptions {
                        run_linters: true,
                        tool_timeout: Duration::from_secs(config.static_analysis.timeout_seconds),
                    },
                )
            } else {
                StaticReport::empty(&artifact.source)
            };
            let static_duration = static_start.elapsed().as_secs_f64();
            state.total_static_duration_seconds += static_duration;
            write_json(&attempt_paths.static_path, &static_report)?;

            let pre = score_pre_execution(Some(&metadata), &static_report, &config.reliability);
            write_json(&attempt_paths.pre_reliability_path, &pre)?;
            append_event(
                &paths.events_path,
                &phase_line(
                    &run_id,
                    attempt,
                    "ANALYZE",
                    static_report.syntax_ok,
                    last_cov,
                    last_mut,
                ),
            )?;

            // EXECUTE: runner failures become a synthetic failed attempt and
            // the router decides what to do with it.
            let runner_start = Instant::now();
            let response = match self.runner.execute(&runner_request) {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, "runner call failed, synthesizing failed response");
                    RunnerResponse::synthetic_failure(failure_message(&err))
                }
            };
            let runner_duration = runner_start.elapsed().as_secs_f64();
            state.total_runner_duration_seconds += runner_duration;
            write_json(&attempt_paths.response_path, &response)?;

            let coverage = response.coverage.max(0.0);
            let mutation = response.mutation_score;
            append_event(
                &paths.events_path,
                &phase_line(&run_id, attempt, "EXECUTE", response.success, coverage, mutation),
            )?;

            let post = score_post_execution(
                &pre,
                &response,
                state.target_coverage,
                state.target_mutation,
                &config.reliability,
            );
            write_json(&attempt_paths.post_reliability_path, &post)?;

            // CRITIQUE
            let inputs = CritiqueInputs {
                response: &response,
                static_report: &static_report,
                pre: &pre,
                post: &post,
                target_coverage: state.target_coverage,
                target_mutation: state.target_mutation,
                test_src: &artifact.source,
            };
            let mut critique = if config.supervisor.use_llm {
                critic::critique_with_supervisor(self.completer, &config.llm, &inputs)
            } else {
                critic::critique(&inputs)
            };

            let mut metrics = AttemptMetrics {
                attempt,
                llm_duration_seconds: metadata.duration_seconds,
                llm_cost: metadata.estimated_cost.unwrap_or(0.0),
                llm_input_tokens: metadata.input_tokens,
                llm_output_tokens: metadata.output_tokens,
                runner_duration_seconds: runner_duration,
                static_duration_seconds: static_duration,
                ..AttemptMetrics::default()
            };
            if let Some(supervisor_meta) = critique.llm_supervisor_metadata.clone() {
                write_json(&attempt_paths.supervisor_llm_metadata_path, &supervisor_meta)?;
                metrics.supervisor_llm_cost = supervisor_meta.estimated_cost.unwrap_or(0.0);
                metrics.supervisor_llm_input_tokens = supervisor_meta.input_tokens;
                metrics.supervisor_llm_output_tokens = supervisor_meta.output_tokens;
                state.total_llm_cost += metrics.supervisor_llm_cost;
                state.total_llm_input_tokens += supervisor_meta.input_tokens;
                state.total_llm_output_tokens += supervisor_meta.output_tokens;
                state.total_llm_duration_seconds += supervisor_meta.duration_seconds;
            }

            progress::apply(&mut state, &mut critique, coverage, mutation);
            write_json(&attempt_paths.critique_path, &critique)?;
            append_event(
                &paths.events_path,
                &phase_line(&run_id, attempt, "CRITIQUE", true, coverage, mutation),
            )?;
            write_json(&attempt_paths.metrics_path, &metrics)?;

            // ROUTE
            let decision = decide(&critique, attempt, max_iterations);
            append_event(
                &paths.events_path,
                &phase_line(&run_id, attempt, "ROUTE", true, coverage, mutation),
            )?;
            match decision {
                RouteDecision::Finish => {
                    let reason = if attempt >= max_iterations {
                        FinishReason::MaxIterations
                    } else if critique.no_progress {
                        FinishReason::Stagnation
                    } else {
                        FinishReason::TargetsMet
                    };
                    return self.finish_run(&paths, &state, reason, attempt, run_start);
                }
                RouteDecision::Refine => {
                    if state.max_total_cost > 0.0 && state.total_llm_cost >= state.max_total_cost {
                        return self.finish_run(
                            &paths,
                            &state,
                            FinishReason::CostBudget,
                            attempt,
                            run_start,
                        );
                    }
                    if state.max_total_wall_seconds > 0
                        && run_start.elapsed()
                            >= Duration::from_secs(state.max_total_wall_seconds)
                    {
                        return self.finish_run(
                            &paths,
                            &state,
                            FinishReason::TimeBudget,
                            attempt,
                            run_start,
                        );
                    }

                    let refined = refiner::refine(
                        self.completer,
                        &config.llm,
                        &RefineRequest {
                            target,
                            current: &artifact,
                            critique: &critique,
                        },
                    );
                    match refined {
                        Ok((next_artifact, next_metadata)) => {
                            state.attempt_index += 1;
                            append_event(
                                &paths.events_path,
                                &phase_line(
                                    &run_id,
                                    state.attempt_index,
                                    "REFINE",
                                    true,
                                    coverage,
                                    mutation,
                                ),
                            )?;
                            artifact = next_artifact;
                            metadata = next_metadata;
                        }
                        Err(err) => {
                            warn!(error = %err, "refine failed, ending with best-so-far");
                            append_event(
                                &paths.events_path,
                                &phase_line(&run_id, attempt + 1, "REFINE", false, coverage, mutation),
                            )?;
                            return self.finish_run(
                                &paths,
                                &state,
                                gateway_reason(&err),
                                attempt,
                                run_start,
                            );
                        }
                    }
                }
            }
        }
    }

    fn load_target_source(&self, request: &RunRequest) -> Result<String> {
        if let Some(root) = &request.repo_root {
            let path = root.join(&request.code_file);
            if path.exists() {
                return fs::read_to_string(&path)
                    .with_context(|| format!("read target source {}", path.display()));
            }
        }
        self.runner
            .fetch_code(&request.repo, &request.version, &request.code_file)
            .context("fetch target source from runner")
    }

    fn finish_run(
        &self,
        paths: &RunPaths,
        state: &RunState,
        reason: FinishReason,
        last_iter: u32,
        run_start: Instant,
    ) -> Result<RunReport> {
        let (final_coverage, final_mutation) =
            state.history.last().copied().unwrap_or((-1.0, -1.0));
        let summary = RunSummary {
            run_id: state.run_id.clone(),
            finish_reason: reason,
            iterations: state.attempts_completed(),
            final_coverage,
            final_mutation,
            best_coverage: state.best_coverage,
            best_mutation: state.best_mutation,
            total_llm_cost: state.total_llm_cost,
            total_llm_input_tokens: state.total_llm_input_tokens,
            total_llm_output_tokens: state.total_llm_output_tokens,
            total_llm_duration_seconds: state.total_llm_duration_seconds,
            total_runner_duration_seconds: state.total_runner_duration_seconds,
            total_static_duration_seconds: state.total_static_duration_seconds,
            total_duration_seconds: run_start.elapsed().as_secs_f64(),
        };
        write_json(&paths.summary_path, &summary)?;
        append_event(
            &paths.events_path,
            &finish_line(&state.run_id, reason, last_iter),
        )?;
        info!(
            run_id = %state.run_id,
            reason = reason.as_str(),
            iterations = summary.iterations,
            coverage = final_coverage,
            mutation = final_mutation,
            "run finished"
        );

        Ok(RunReport {
            run_id: state.run_id.clone(),
            finish_reason: reason,
            iterations: summary.iterations,
            final_coverage,
            final_mutation,
            total_llm_cost: state.total_llm_cost,
            run_dir: paths.dir.clone(),
        })
    }
}

fn gateway_reason(err: &anyhow::Error) -> FinishReason {
    match Failure::kind_of(err) {
        Some(FailureKind::ConfigurationMissing) => FinishReason::ConfigurationMissing,
        Some(FailureKind::UpstreamTimeout) => FinishReason::UpstreamTimeout,
        _ => FinishReason::UpstreamError,
    }
}

fn failure_message(err: &anyhow::Error) -> String {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Failure>())
        .map(|failure| failure.message.clone())
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_reason_maps_failure_kinds() {
        let timeout: anyhow::Error =
            Failure::new(FailureKind::UpstreamTimeout, "60s elapsed").into();
        assert_eq!(gateway_reason(&timeout), FinishReason::UpstreamTimeout);

        let missing: anyhow::Error =
            Failure::new(FailureKind::ConfigurationMissing, "no key").into();
        assert_eq!(gateway_reason(&missing), FinishReason::ConfigurationMissing);

        let other = anyhow::anyhow!("boom");
        assert_eq!(gateway_reason(&other), FinishReason::UpstreamError);
    }

    #[test]
    fn failure_message_prefers_the_typed_payload() {
        let err: anyhow::Error = Failure::new(FailureKind::RunnerError, "timeout").into();
        assert_eq!(failure_message(&err), "timeout");

        let plain = anyhow::anyhow!("unreachable");
        assert_eq!(failure_message(&plain), "unreachable");
    }
}
