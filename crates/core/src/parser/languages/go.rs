//! Go node classifier.
//!
//! Visibility is capitalization-derived: an exported (capitalized)
//! identifier is `public`, otherwise `private`. `ServeHTTP`-shaped methods
//! are not special-cased here — entry-point detection is a call-graph
//! concern, not a classifier one.

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for Go source.
pub struct GoClassifier;

impl LanguageClassifier for GoClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        match node.kind() {
            "function_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Function,
                    symbol_kind: SymbolKind::Function,
                    visibility: go_visibility(&name),
                    doc_comment: doc_comment(node, source),
                    signature: signature(node, source),
                    name,
                })
            }
            "method_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Method,
                    symbol_kind: SymbolKind::Method,
                    visibility: go_visibility(&name),
                    doc_comment: doc_comment(node, source),
                    signature: signature(node, source),
                    name,
                })
            }
            "type_spec" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                let (chunk_kind, symbol_kind) = match node.child_by_field_name("type").map(|t| t.kind()) {
                    Some("struct_type") => (ChunkKind::Class, SymbolKind::Type),
                    Some("interface_type") => (ChunkKind::Class, SymbolKind::Interface),
                    _ => (ChunkKind::Block, SymbolKind::Type),
                };
                Some(Definition {
                    chunk_kind,
                    symbol_kind,
                    visibility: go_visibility(&name),
                    doc_comment: doc_comment(node, source),
                    signature: None,
                    name,
                })
            }
            "const_spec" | "var_spec" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Block,
                    symbol_kind: SymbolKind::Constant,
                    visibility: go_visibility(&name),
                    doc_comment: None,
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
                let callee = node.child_by_field_name("function")?;
                let name = match callee.kind() {
                    "selector_expression" => callee
                        .child_by_field_name("field")
                        .map(|f| node_text(f, source).to_string())
                        .unwrap_or_default(),
                    _ => node_text(callee, source).to_string(),
                };
                if name.is_empty() {
                    return None;
                }
                Some(RawRef { kind: ReferenceKind::Call, to: name })
            }
            "type_identifier" => {
                if matches!(node.parent().map(|p| p.kind()), Some("type_spec")) {
                    return None;
                }
                let name = node_text(node, source).to_string();
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::TypeUse, to: name })
                }
            }
            "import_spec" => {
                let path = node
                    .child_by_field_name("path")
                    .map(|n| node_text(n, source).trim_matches('"').to_string())
                    .unwrap_or_default();
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

fn go_visibility(name: &str) -> Visibility {
    if name.starts_with(|c: char| c.is_uppercase()) {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn doc_comment(node: Node<'_>, source: &[u8]) -> Option<String> {
    crate::parser::collect_doc_comment(node.prev_sibling(), source, "comment", &["//"])
}

fn signature(node: Node<'_>, source: &[u8]) -> Option<String> {
    let params = node.child_by_field_name("parameters")?;
    let ret = node
        .child_by_field_name("result")
        .map(|r| format!(" {}", node_text(r, source)))
        .unwrap_or_default();
    Some(format!("{}{ret}", node_text(params, source)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_visibility_from_capitalization() {
        assert_eq!(go_visibility("Hello"), Visibility::Public);
        assert_eq!(go_visibility("hello"), Visibility::Private);
    }

    #[test]
    fn classifies_function_and_method() {
        let src = "package p\nfunc Foo() {}\nfunc (c *C) bar() {}\n";
        let tree = crate::parser::parse_to_tree(src.as_bytes(), GoClassifier.grammar()).expect("parse");
        let mut names = Vec::new();
        fn visit(node: Node<'_>, source: &[u8], names: &mut Vec<(String, ChunkKind)>) {
            if let Some(d) = GoClassifier.classify(node, source) {
                names.push((d.name, d.chunk_kind));
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, source, names);
            }
        }
        visit(tree.root_node(), src.as_bytes(), &mut names);
        assert!(names.contains(&("Foo".to_string(), ChunkKind::Function)));
        assert!(names.contains(&("bar".to_string(), ChunkKind::Method)));
    }
}
