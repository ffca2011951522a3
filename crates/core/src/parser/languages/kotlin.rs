//! Kotlin node classifier.

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for Kotlin source.
pub struct KotlinClassifier;

impl LanguageClassifier for KotlinClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_kotlin_ng::LANGUAGE.into()
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
            "class_declaration" => {
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
            "object_declaration" => {
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
            _ => None,
        }
    }

    fn node_reference(&self, node: Node<'_>, source: &[u8]) -> Option<RawRef> {
        match node.kind() {
            "call_expression" => {
                let callee = node.child_by_field_name("expression")?;
                let name = node_text(callee, source).to_string();
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Call, to: name })
                }
            }
            "import_header" => {
                let identifier = node.child_by_field_name("identifier")?;
                let path = node_text(identifier, source).to_string();
                if path.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Import, to: path })
                }
            }
            _ => None,
        }
    }
}

fn has_ancestor_type(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(p) = current {
        if matches!(p.kind(), "class_declaration" | "object_declaration") {
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
            if text.contains("internal") || text.contains("protected") {
                return Visibility::Internal;
            }
        }
    }
    Visibility::Public
}

fn doc_comment(node: Node<'_>, source: &[u8]) -> Option<String> {
    let sibling = node.prev_sibling()?;
    if sibling.kind() != "multiline_comment" {
        return None;
    }
    let text = node_text(sibling, source);
    if !text.starts_with("/**") {
        return None;
    }
    Some(
        text.trim_start_matches("/**")
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
        let tree = parse_to_tree(source.as_bytes(), KotlinClassifier.grammar()).expect("parse");
        let mut out = Vec::new();
        fn visit(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
            if let Some(d) = KotlinClassifier.classify(node, source) {
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
        let out = defs("class User(val name: String) {\n    fun greet() {\n        println(name)\n    }\n}\n");
        assert!(out.iter().any(|d| d.name == "User" && d.chunk_kind == ChunkKind::Class));
        assert!(out.iter().any(|d| d.name == "greet" && d.chunk_kind == ChunkKind::Method));
    }

    #[test]
    fn classifies_top_level_function() {
        let out = defs("fun greet(name: String): String {\n    return name\n}\n");
        let def = out.iter().find(|d| d.name == "greet").expect("greet");
        assert_eq!(def.chunk_kind, ChunkKind::Function);
    }
}
