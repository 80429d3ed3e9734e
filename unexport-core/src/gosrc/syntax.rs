//! Go syntax trees via tree-sitter, plus the node helpers both passes share.

use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use super::program::Span;
use crate::error::{UnexportError, UnexportResult};

/// Syntax error at a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    pub(crate) fn at(node: Node, message: impl Into<String>) -> Self {
        let (line, column) = position(node);
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    pub(crate) fn into_error(self, path: &Path) -> UnexportError {
        UnexportError::parse_at(path, self.message, self.line, self.column)
    }
}

pub type SyntaxResult<T> = Result<T, SyntaxError>;

/// Parses one Go file. Any error or missing node fails the whole file.
pub fn parse_go(path: &Path, text: &str) -> UnexportResult<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| UnexportError::parse(path, format!("cannot load Go grammar: {}", e)))?;
    let tree = parser
        .parse(text, None)
        .ok_or_else(|| UnexportError::parse(path, "parser produced no tree"))?;
    if let Some(err) = first_error(tree.root_node(), text.as_bytes()) {
        return Err(err.into_error(path));
    }
    Ok(tree)
}

/// First error or missing node in document order.
pub(crate) fn first_error(node: Node, src: &[u8]) -> Option<SyntaxError> {
    if node.is_missing() {
        return Some(SyntaxError::at(node, format!("missing {}", node.kind())));
    }
    if node.is_error() {
        let snippet: String = node_text(node, src)
            .split_whitespace()
            .next()
            .unwrap_or("")
            .chars()
            .take(24)
            .collect();
        let message = if snippet.is_empty() {
            "syntax error".to_string()
        } else {
            format!("syntax error near {:?}", snippet)
        };
        return Some(SyntaxError::at(node, message));
    }
    if !node.has_error() {
        return None;
    }
    children(node).into_iter().find_map(|c| first_error(c, src))
}

pub(crate) fn node_text<'a>(node: Node, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

pub(crate) fn field_text<'a>(node: Node, field: &str, src: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| node_text(n, src))
}

/// 1-based line and byte column.
pub(crate) fn position(node: Node) -> (usize, usize) {
    let point = node.start_position();
    (point.row + 1, point.column + 1)
}

pub(crate) fn span(node: Node) -> Span {
    Span {
        start: node.start_byte(),
        end: node.end_byte(),
    }
}

pub(crate) fn children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    let out = node.children(&mut cursor).collect();
    out
}

pub(crate) fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    let out = node
        .named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect();
    out
}

pub(crate) fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let out = node.children_by_field_name(field, &mut cursor).collect();
    out
}

/// Whether an anonymous token such as `:=` appears directly under `node`.
pub(crate) fn has_token(node: Node, token: &str) -> bool {
    children(node)
        .into_iter()
        .any(|c| !c.is_named() && c.kind() == token)
}

/// A string literal's value; escapes are left as written.
pub(crate) fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
        .unwrap_or(raw)
}

/// A declaring or referring identifier with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

impl Ident {
    pub(crate) fn from_node(node: Node, src: &[u8]) -> Self {
        let (line, column) = position(node);
        Self {
            name: node_text(node, src).to_string(),
            span: span(node),
            line,
            column,
        }
    }
}
