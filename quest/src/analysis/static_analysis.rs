//! Structural metrics for candidate test modules.

use crate::analysis::python;
use crate::core::types::StaticReport;

/// Node kinds that add a branch to the cyclomatic complexity count.
const BRANCHING_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "boolean_operator",
    "conditional_expression",
    "match_statement",
];

/// Syntax-check the module and compute size/complexity metrics.
///
/// Lint tool records are filled in separately; a failed parse short-circuits
/// with `syntax_ok=false` and zeroed metrics so downstream treats the attempt
/// as a compile error.
pub fn analyze_test_source(source: &str) -> StaticReport {
    let mut report = StaticReport::empty(source);

    let Some(tree) = python::parse(source) else {
        report.syntax_ok = false;
        report.syntax_error = Some("parser unavailable".to_string());
        return report;
    };

    let root = tree.root_node();
    if root.has_error() {
        report.syntax_ok = false;
        let line = python::first_error_line(root).unwrap_or(1);
        report.syntax_error = Some(format!("invalid syntax (line {line})"));
        return report;
    }

    let mut function_lengths: Vec<u32> = Vec::new();
    let mut branch_count = 0u32;
    python::visit(root, &mut |node| match node.kind() {
        "function_definition" => {
            report.function_count += 1;
            let length = node.end_position().row - node.start_position().row + 1;
            function_lengths.push(length.max(1) as u32);
        }
        "class_definition" => report.class_count += 1,
        kind if BRANCHING_KINDS.contains(&kind) => branch_count += 1,
        _ => {}
    });

    if !function_lengths.is_empty() {
        report.max_function_length = *function_lengths.iter().max().unwrap_or(&0);
        report.avg_function_length =
            f64::from(function_lengths.iter().sum::<u32>()) / function_lengths.len() as f64;
    }
    report.complexity = 1 + branch_count;

    report
}
