//! JavaScript node classifier.
//!
//! Shared with the TypeScript classifier, which layers `interface`/`type`
//! declarations on top of this module's function/class/method/const rules
//! (JS has no type-level declarations of its own).

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for JavaScript source.
pub struct JavaScriptClassifier;

impl LanguageClassifier for JavaScriptClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_javascript::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        classify_shared(node, source)
    }

    fn node_reference(&self, node: Node<'_>, source: &[u8]) -> Option<RawRef> {
        reference_shared(node, source)
    }
}

/// Shared classify logic for function/class/method/arrow-const declarations,
/// exported as `pub(crate)` so the TypeScript classifier can layer on top.
pub(crate) fn classify_shared(node: Node<'_>, source: &[u8]) -> Option<Definition> {
    match node.kind() {
        "function_declaration" => {
            let name = node_text(node.child_by_field_name("name")?, source).to_string();
            Some(Definition {
                chunk_kind: ChunkKind::Function,
                symbol_kind: SymbolKind::Function,
                visibility: export_visibility(node),
                doc_comment: jsdoc(node, source),
                signature: node
                    .child_by_field_name("parameters")
                    .map(|p| node_text(p, source).to_string()),
                name,
            })
        }
        "class_declaration" => {
            let name = node_text(node.child_by_field_name("name")?, source).to_string();
            Some(Definition {
                chunk_kind: ChunkKind::Class,
                symbol_kind: SymbolKind::Type,
                visibility: export_visibility(node),
                doc_comment: jsdoc(node, source),
                signature: None,
                name,
            })
        }
        "method_definition" => {
            let name = node_text(node.child_by_field_name("name")?, source).to_string();
            Some(Definition {
                chunk_kind: ChunkKind::Method,
                symbol_kind: SymbolKind::Method,
                visibility: Visibility::Public,
                doc_comment: jsdoc(node, source),
                signature: node
                    .child_by_field_name("parameters")
                    .map(|p| node_text(p, source).to_string()),
                name,
            })
        }
        "variable_declarator" => {
            let value = node.child_by_field_name("value")?;
            if !matches!(value.kind(), "arrow_function" | "function_expression") {
                return None;
            }
            let name = node_text(node.child_by_field_name("name")?, source).to_string();
            let decl = node.parent().and_then(|p| p.parent());
            Some(Definition {
                chunk_kind: ChunkKind::Function,
                symbol_kind: SymbolKind::Function,
                visibility: decl.map(export_visibility).unwrap_or(Visibility::Private),
                doc_comment: decl.and_then(|d| jsdoc(d, source)),
                signature: value
                    .child_by_field_name("parameters")
                    .map(|p| node_text(p, source).to_string()),
                name,
            })
        }
        _ => None,
    }
}

/// Shared reference logic: calls, imports. `new_expression` constructor
/// names are treated as `type_use`.
pub(crate) fn reference_shared(node: Node<'_>, source: &[u8]) -> Option<RawRef> {
    match node.kind() {
        "call_expression" => {
            let callee = node.child_by_field_name("function")?;
            let name = match callee.kind() {
                "member_expression" => callee
                    .child_by_field_name("property")
                    .map(|p| node_text(p, source).to_string())
                    .unwrap_or_default(),
                _ => node_text(callee, source).to_string(),
            };
            if name.is_empty() {
                None
            } else {
                Some(RawRef { kind: ReferenceKind::Call, to: name })
            }
        }
        "new_expression" => {
            let ctor = node.child_by_field_name("constructor")?;
            let name = node_text(ctor, source).to_string();
            if name.is_empty() {
                None
            } else {
                Some(RawRef { kind: ReferenceKind::TypeUse, to: name })
            }
        }
        "import_statement" => {
            let source_node = node.child_by_field_name("source")?;
            let path = node_text(source_node, source).trim_matches('"').trim_matches('\'').to_string();
            if path.is_empty() {
                None
            } else {
                Some(RawRef { kind: ReferenceKind::Import, to: path })
            }
        }
        _ => None,
    }
}

fn export_visibility(node: Node<'_>) -> Visibility {
    match node.parent() {
        Some(p) if p.kind() == "export_statement" => Visibility::Public,
        _ => Visibility::Private,
    }
}

fn jsdoc(node: Node<'_>, source: &[u8]) -> Option<String> {
    let sibling = node.prev_sibling()?;
    if sibling.kind() != "comment" {
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
        let tree = parse_to_tree(source.as_bytes(), JavaScriptClassifier.grammar()).expect("parse");
        let mut out = Vec::new();
        fn visit(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
            if let Some(d) = classify_shared(node, source) {
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
    fn classifies_function_and_arrow_const() {
        let out = defs("function greet(name) { return name; }\nconst double = (x) => x * 2;\n");
        assert!(out.iter().any(|d| d.name == "greet" && d.chunk_kind == ChunkKind::Function));
        assert!(out.iter().any(|d| d.name == "double" && d.chunk_kind == ChunkKind::Function));
    }

    #[test]
    fn export_marks_public() {
        let out = defs("export function handler(req, res) {}\n");
        let handler = out.iter().find(|d| d.name == "handler").expect("handler");
        assert_eq!(handler.visibility, Visibility::Public);
    }

    #[test]
    fn class_and_methods_classified() {
        let out = defs("class Animal {\n  speak() { return 1; }\n}\n");
        assert!(out.iter().any(|d| d.name == "Animal" && d.chunk_kind == ChunkKind::Class));
        assert!(out.iter().any(|d| d.name == "speak" && d.chunk_kind == ChunkKind::Method));
    }
}
