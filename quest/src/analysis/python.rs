//! Thin helpers over the tree-sitter Python grammar.

use tree_sitter::{Node, Parser, Tree};

/// Parse Python source. `None` only when the grammar fails to load, which is
/// a build problem rather than an input problem; malformed input still yields
/// a tree with error nodes.
pub fn parse(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    parser.parse(source, None)
}

/// Whether the source parses without error nodes.
pub fn parse_ok(source: &str) -> bool {
    parse(source).is_some_and(|tree| !tree.root_node().has_error())
}

/// Pre-order visit of every node in the tree.
pub fn visit<'a>(node: Node<'a>, f: &mut impl FnMut(Node<'a>)) {
    f(node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child, f);
    }
}

/// Source text spanned by a node.
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

/// 1-based line of the first error or missing node, if any.
pub fn first_error_line(root: Node<'_>) -> Option<usize> {
    let mut line = None;
    visit(root, &mut |node| {
        if line.is_none() && (node.is_error() || node.is_missing()) {
            line = Some(node.start_position().row + 1);
        }
    });
    line
}
