//! Extraction of raw code from model output.
//!
//! Models are told to answer with plain code, but in practice replies arrive
//! as fenced blocks (with or without a language tag), fenced blocks embedded
//! in prose, or clean raw code. The extractor accepts all of these and falls
//! back to the full reply when it already looks like code.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").expect("fence regex")
});

/// Leading tokens that mark a reply as already being raw Python code.
const CODE_KEYWORDS: &[&str] = &[
    "import ", "from ", "def ", "class ", "async ", "@", "#", "\"\"\"",
];

/// Extract the code payload from a model reply.
pub fn strip_code_fences(reply: &str) -> String {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if let Some(caps) = FENCED_BLOCK_RE.captures(trimmed) {
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        return body.trim_end().trim_start_matches('\n').to_string();
    }

    // Unterminated fence: drop the opening line and keep the rest.
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        return body.trim().to_string();
    }

    if starts_like_code(trimmed) {
        return trimmed.to_string();
    }

    // Prose without any fence: best effort, return as-is and let the syntax
    // check downstream flag it.
    trimmed.to_string()
}

fn starts_like_code(text: &str) -> bool {
    CODE_KEYWORDS
        .iter()
        .any(|keyword| text.starts_with(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fence_with_language_tag() {
        let reply = "```python\nimport os\n\ndef test_x():\n    assert os is not None\n```";
        let code = strip_code_fences(reply);
        assert!(code.starts_with("import os"));
        assert!(!code.contains("```"));
    }

    #[test]
    fn strips_bare_fence() {
        let reply = "```\nx = 1\n```";
        assert_eq!(strip_code_fences(reply), "x = 1");
    }

    #[test]
    fn extracts_block_embedded_in_prose() {
        let reply = "Here is the revised module:\n\n```python\ndef test_a():\n    assert True\n```\nLet me know!";
        assert_eq!(strip_code_fences(reply), "def test_a():\n    assert True");
    }

    #[test]
    fn raw_code_passes_through() {
        let reply = "import unittest\n\nclass T(unittest.TestCase):\n    pass";
        assert_eq!(strip_code_fences(reply), reply);
    }

    #[test]
    fn unterminated_fence_drops_opening_line() {
        let reply = "```python\ndef test_b():\n    assert 1 == 1";
        assert_eq!(strip_code_fences(reply), "def test_b():\n    assert 1 == 1");
    }

    #[test]
    fn empty_reply_stays_empty() {
        assert_eq!(strip_code_fences("   \n"), "");
    }
}
