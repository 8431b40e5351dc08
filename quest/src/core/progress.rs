//! Progress and stagnation accounting across attempts.
//!
//! Deltas are computed against the previous attempt. An attempt makes
//! progress when coverage improves by at least 1.0 points or mutation score
//! by at least 2.0 points; two consecutive attempts without progress while a
//! shortfall remains mark the run as stagnated.

use crate::core::types::{Critique, RunState};

const COVERAGE_PROGRESS_THRESHOLD: f64 = 1.0;
const MUTATION_PROGRESS_THRESHOLD: f64 = 2.0;
const STAGNATION_LIMIT: u32 = 2;

/// Fold one attempt's observed metrics into the run state and stamp the
/// critique with deltas and the `no_progress` verdict.
///
/// `coverage` is clamped to `>= 0`; `mutation` keeps `-1` as "unavailable"
/// and never regresses the best-so-far tracking.
pub fn apply(state: &mut RunState, critique: &mut Critique, coverage: f64, mutation: f64) {
    let coverage = coverage.max(0.0);

    let (coverage_delta, mutation_delta, first_attempt) = match state.history.last() {
        None => (0.0, 0.0, true),
        Some((last_cov, last_mut)) => {
            let cov_delta = coverage - last_cov;
            let mut_delta = if mutation >= 0.0 && *last_mut >= 0.0 {
                mutation - last_mut
            } else {
                0.0
            };
            (cov_delta, mut_delta, false)
        }
    };

    let progress = coverage_delta >= COVERAGE_PROGRESS_THRESHOLD
        || mutation_delta >= MUTATION_PROGRESS_THRESHOLD;
    let shortfall = critique.low_coverage || critique.low_mutation;

    // The initial draft has no baseline, so it can neither make nor fail to
    // make progress.
    if first_attempt {
        state.stagnation_count = 0;
    } else if !progress && shortfall {
        state.stagnation_count += 1;
    } else {
        state.stagnation_count = 0;
    }

    critique.coverage_delta = coverage_delta;
    critique.mutation_delta = mutation_delta;
    critique.no_progress = state.stagnation_count >= STAGNATION_LIMIT;

    state.best_coverage = state.best_coverage.max(coverage);
    if mutation >= 0.0 {
        state.best_mutation = state.best_mutation.max(mutation);
    }
    state.history.push((coverage, mutation));
}
