//! Context mining over the target source file.
//!
//! Produces the compact per-run summary fed into every prompt: top-level
//! symbols with their docstrings, framework hints, and the (bounded) source
//! text. A source that fails to parse still yields a usable pack with
//! `parse_failed=true` so the run can proceed.

use tree_sitter::Node;

use crate::analysis::python;
use crate::core::types::{ContextPack, FrameworkTag};

const SUMMARY_MAX_CHARS: usize = 160;
const DOCSTRING_MAX_CHARS: usize = 120;

/// Mine a context pack from the target source.
pub fn mine_context(repo: &str, code_src: &str, max_code_chars: usize) -> ContextPack {
    let bounded_src = truncate_whole_lines(code_src, max_code_chars);
    let framework_hints = infer_framework_hints(repo, code_src);

    let Some(tree) = python::parse(code_src) else {
        return failed_pack(bounded_src, framework_hints);
    };
    let root = tree.root_node();
    if root.has_error() {
        return failed_pack(bounded_src, framework_hints);
    }

    let mut symbols = Vec::new();
    let mut docstrings = Vec::new();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let Some(definition) = as_definition(child) else {
            continue;
        };
        let Some(name) = definition
            .child_by_field_name("name")
            .map(|node| python::node_text(node, code_src).to_string())
        else {
            continue;
        };
        symbols.push(name);
        docstrings.push(
            docstring_of(definition, code_src)
                .map(|text| clip(&text, DOCSTRING_MAX_CHARS))
                .unwrap_or_default(),
        );
    }

    let summary = module_docstring(root, code_src)
        .map(|text| clip(&text, SUMMARY_MAX_CHARS))
        .unwrap_or_default();

    ContextPack {
        summary,
        symbols,
        docstrings,
        framework_hints,
        code_src: bounded_src,
        parse_failed: false,
    }
}

fn failed_pack(code_src: String, framework_hints: Vec<FrameworkTag>) -> ContextPack {
    ContextPack {
        summary: String::new(),
        symbols: Vec::new(),
        docstrings: Vec::new(),
        framework_hints,
        code_src,
        parse_failed: true,
    }
}

/// Unwrap `decorated_definition` wrappers down to the definition node.
fn as_definition(node: Node<'_>) -> Option<Node<'_>> {
    match node.kind() {
        "function_definition" | "class_definition" => Some(node),
        "decorated_definition" => {
            let mut cursor = node.walk();
            node.named_children(&mut cursor)
                .find(|child| matches!(child.kind(), "function_definition" | "class_definition"))
        }
        _ => None,
    }
}

/// First paragraph of a definition's docstring, if present.
fn docstring_of(definition: Node<'_>, source: &str) -> Option<String> {
    let body = definition.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).next()?;
    string_literal_of(first, source).map(|text| first_paragraph(&text))
}

fn module_docstring(root: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = root.walk();
    let first = root.named_children(&mut cursor).next()?;
    string_literal_of(first, source).map(|text| first_paragraph(&text))
}

fn string_literal_of(statement: Node<'_>, source: &str) -> Option<String> {
    if statement.kind() != "expression_statement" {
        return None;
    }
    let mut cursor = statement.walk();
    let expr = statement.named_children(&mut cursor).next()?;
    if expr.kind() != "string" {
        return None;
    }
    Some(strip_string_quotes(python::node_text(expr, source)))
}

fn strip_string_quotes(literal: &str) -> String {
    let body = literal.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = body
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    body.trim().to_string()
}

fn first_paragraph(text: &str) -> String {
    text.split("\n\n")
        .next()
        .unwrap_or_default()
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Framework hints from repository path tokens and import patterns,
/// most specific first.
fn infer_framework_hints(repo: &str, code_src: &str) -> Vec<FrameworkTag> {
    let mut hints = Vec::new();
    let django = repo.to_lowercase().contains("django")
        || code_src.contains("import django")
        || code_src.contains("from django");
    if django {
        hints.push(FrameworkTag::UnittestDjango);
    }
    if code_src.contains("import unittest") || code_src.contains("unittest.TestCase") {
        hints.push(FrameworkTag::UnittestPlain);
    }
    if hints.is_empty() {
        hints.push(FrameworkTag::Pytest);
    }
    hints
}

/// Truncate to the character budget without splitting a line.
fn truncate_whole_lines(source: &str, max_chars: usize) -> String {
    if source.len() <= max_chars {
        return source.to_string();
    }
    let mut out = String::new();
    for line in source.split_inclusive('\n') {
        if out.len() + line.len() > max_chars {
            break;
        }
        out.push_str(line);
    }
    out
}
