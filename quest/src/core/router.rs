//! Pure routing decision over a completed attempt.

use crate::core::types::{Critique, RouteDecision};

/// Decide whether to refine the current test module or finish the run.
///
/// `attempts_done` is the 0-based index of the attempt the critique belongs
/// to; `max_iterations` bounds the number of refinement rounds after the
/// initial draft. Total: every input maps to exactly one decision, and the
/// iteration cap wins unconditionally.
pub fn decide(critique: &Critique, attempts_done: u32, max_iterations: u32) -> RouteDecision {
    if attempts_done >= max_iterations {
        return RouteDecision::Finish;
    }
    if critique.no_progress {
        return RouteDecision::Finish;
    }
    if critique.compile_error {
        return RouteDecision::Refine;
    }
    if critique.targets_met() {
        return RouteDecision::Finish;
    }
    RouteDecision::Refine
}
