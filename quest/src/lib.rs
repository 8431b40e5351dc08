//! Closed-loop, metric-driven unit-test synthesizer core.
//!
//! Given a repository, a version tag, and a target Python source file, the
//! engine drives a draft/critique/refine loop over an external sandboxed
//! test runner, scoring each attempt's reliability from model uncertainty
//! and execution metrics, until coverage and mutation targets are met or a
//! stop condition fires.

pub mod agents;
pub mod analysis;
pub mod context;
pub mod core;
pub mod engine;
pub mod io;
pub mod llm;
pub mod logging;
pub mod reliability;
pub mod runner;
pub mod test_support;
