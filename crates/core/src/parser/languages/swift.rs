//! Swift node classifier.

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for Swift source.
pub struct SwiftClassifier;

impl LanguageClassifier for SwiftClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_swift::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        match node.kind() {
            "function_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                let is_method = has_ancestor_type(node);
                Some(Definition {
                    chunk_kind: if is_method { ChunkKind::Method } else { ChunkKind::Function },
                    symbol_kind: if is_method { SymbolKind::Method } else { SymbolKind::Function },
                    visibility: modifier_visibility(node, source),
                    doc_comment: doc_comment(node, source),
                    signature: None,
                    name,
                })
            }
            "class_declaration" | "struct_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind: SymbolKind::Type,
                    visibility: modifier_visibility(node, source),
                    doc_comment: doc_comment(node, source),
                    signature: None,
                    name,
                })
            }
            "protocol_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind: SymbolKind::Interface,
                    visibility: modifier_visibility(node, source),
                    doc_comment: doc_comment(node, source),
                    signature: None,
                    name,
                })
            }
            _ => None,
        }
    }

    fn node_reference(&self, node: Node<'_>, source: &[u8]) -> Option<RawRef> {
        match node.kind() {
            "call_expression" => {
                let callee = node.child_by_field_name("callee")?;
                let name = node_text(callee, source).to_string();
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Call, to: name })
                }
            }
            "import_declaration" => {
                let text = node_text(node, source).strip_prefix("import ").map(|s| s.trim().to_string());
                text.filter(|t| !t.is_empty()).map(|to| RawRef { kind: ReferenceKind::Import, to })
            }
            _ => None,
        }
    }
}

fn has_ancestor_type(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(p) = current {
        if matches!(p.kind(), "class_declaration" | "struct_declaration" | "protocol_declaration" | "extension_declaration") {
            return true;
        }
        current = p.parent();
    }
    false
}

fn modifier_visibility(node: Node<'_>, source: &[u8]) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "modifiers" {
            let text = node_text(child, source);
            if text.contains("private") {
                return Visibility::Private;
            }
            if text.contains("internal") || text.contains("fileprivate") {
                return Visibility::Internal;
            }
            if text.contains("public") || text.contains("open") {
                return Visibility::Public;
            }
        }
    }
    Visibility::Public
}

fn doc_comment(node: Node<'_>, source: &[u8]) -> Option<String> {
    let sibling = node.prev_sibling()?;
    if sibling.kind() != "comment" && sibling.kind() != "multiline_comment" {
        return None;
    }
    let text = node_text(sibling, source);
    Some(
        text.trim_start_matches("///")
            .trim_start_matches("/**")
            .trim_end_matches("*/")
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_to_tree;

    fn defs(source: &str) -> Vec<Definition> {
        let tree = parse_to_tree(source.as_bytes(), SwiftClassifier.grammar()).expect("parse");
        let mut out = Vec::new();
        fn visit(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
            if let Some(d) = SwiftClassifier.classify(node, source) {
                out.push(d);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, source, out);
            }
        }
        visit(tree.root_node(), source.as_bytes(), &mut out);
        out
    }

    #[test]
    fn classifies_class_and_method() {
        let out = defs("class User {\n    func greet() {\n        print(name)\n    }\n}\n");
        assert!(out.iter().any(|d| d.name == "User" && d.chunk_kind == ChunkKind::Class));
        assert!(out.iter().any(|d| d.name == "greet" && d.chunk_kind == ChunkKind::Method));
    }

    #[test]
    fn classifies_struct() {
        let out = defs("struct Point {\n    func distance() -> Double {\n        return 1.0\n    }\n}\n");
        assert!(out.iter().any(|d| d.name == "Point" && d.symbol_kind == SymbolKind::Type));
    }
}
