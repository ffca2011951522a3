//! Tree-sitter parsing subsystem: the Parser Registry and Node Classifier.
//!
//! Each supported language exposes a small, pure `LanguageClassifier`
//! mapping AST node types to the cross-language chunk/symbol/reference
//! taxonomy. The registry dispatches a canonical language tag to its
//! classifier; a registry miss is a normal outcome routing the file to
//! whole-file fallback chunking rather than an error.

pub mod embedded;
pub mod languages;
pub mod registry;

use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// A definition site recognized by a classifier. The same AST node backs
/// both a chunk (`chunk_kind`, `name`) and a symbol record.
#[derive(Debug, Clone)]
pub struct Definition {
    /// Chunk-taxonomy kind for this definition.
    pub chunk_kind: ChunkKind,
    /// Symbol-taxonomy kind for this definition.
    pub symbol_kind: SymbolKind,
    /// Canonical identifier text for this definition.
    pub name: String,
    /// Language-derived visibility.
    pub visibility: Visibility,
    /// Doc comment immediately preceding the definition, if any.
    pub doc_comment: Option<String>,
    /// Best-effort signature text (parameter list / return type).
    pub signature: Option<String>,
}

/// A single reference recognized at a specific AST node, before the
/// walker attaches file/line/from-symbol context.
#[derive(Debug, Clone)]
pub struct RawRef {
    /// What kind of usage this is.
    pub kind: ReferenceKind,
    /// Name of the referenced target, optionally package-qualified.
    pub to: String,
}

/// Per-language node classifier: a small switch over a grammar's node-type
/// names, kept as an independent module per language rather than a single
/// generic rule engine (each grammar's node names are idiosyncratic).
pub trait LanguageClassifier: Send + Sync {
    /// The tree-sitter grammar this classifier's node names are defined against.
    fn grammar(&self) -> tree_sitter::Language;

    /// Classify a definition-shaped node into `(chunk_kind, symbol_kind, name, ...)`,
    /// or `None` if this node is not itself a definition.
    fn classify(&self, node: tree_sitter::Node<'_>, source: &[u8]) -> Option<Definition>;

    /// Classify a usage-shaped node into a call/type_use/import reference,
    /// or `None` if this node is not itself a usage site. Does not recurse;
    /// the walker visits every node and calls this once per node.
    fn node_reference(&self, node: tree_sitter::Node<'_>, source: &[u8]) -> Option<RawRef>;
}

/// Parse `source` with `grammar`, returning `None` on a tree-sitter setup or
/// parse failure (caller maps this to a `Parse` error and falls back).
pub fn parse_to_tree(source: &[u8], grammar: tree_sitter::Language) -> Option<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&grammar).ok()?;
    parser.parse(source, None)
}

/// UTF-8 (lossy-safe) text of a tree-sitter node.
pub fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
}

/// Walk backward over preceding `comment`-kind siblings whose text starts
/// with any of `prefixes`, collecting doc lines in source order. Shared by
/// every classifier that recognizes a line-comment doc style.
pub fn collect_doc_comment<'a>(
    mut sibling: Option<tree_sitter::Node<'_>>,
    source: &[u8],
    comment_kind: &str,
    prefixes: &[&'a str],
) -> Option<String> {
    let mut lines = Vec::new();
    while let Some(node) = sibling {
        if node.kind() != comment_kind {
            break;
        }
        let text = node_text(node, source).trim();
        let Some(prefix) = prefixes.iter().find(|p| text.starts_with(**p)) else {
            break;
        };
        lines.push(text.strip_prefix(prefix).unwrap_or("").trim().to_string());
        sibling = node.prev_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_to_tree_rejects_nothing_for_rust() {
        let tree = parse_to_tree(b"fn f() {}", tree_sitter_rust::LANGUAGE.into());
        assert!(tree.is_some());
    }
}
