//! Static analysis of candidate test modules: syntax + structure metrics
//! via tree-sitter, plus optional external lint/type tools.

pub mod lint;
pub mod python;
pub mod static_analysis;

use std::time::Duration;

use crate::core::types::StaticReport;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Skip the external tool pass entirely (metrics are always computed).
    pub run_linters: bool,
    pub tool_timeout: Duration,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            run_linters: true,
            tool_timeout: Duration::from_secs(15),
        }
    }
}

/// Full static pass over a candidate test module.
pub fn analyze(source: &str, options: &AnalysisOptions) -> StaticReport {
    let mut report = static_analysis::analyze_test_source(source);
    if options.run_linters {
        report.linters = lint::run_linters(source, options.tool_timeout);
    }
    report
}
