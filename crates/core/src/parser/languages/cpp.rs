//! C++ node classifier.
//!
//! Layers `class_specifier`/`namespace_definition`/`template_declaration`
//! on top of the C classifier's function/struct/union/enum rules.

use tree_sitter::Node;

use crate::parser::languages::c::{extract_declarator_name, reference_shared};
use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for C++ source.
pub struct CppClassifier;

impl LanguageClassifier for CppClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_cpp::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        match node.kind() {
            "template_declaration" => {
                let inner = node.named_children(&mut node.walk()).find(|c| {
                    matches!(c.kind(), "function_definition" | "class_specifier" | "struct_specifier")
                })?;
                self.classify(inner, source)
            }
            "function_definition" => {
                let declarator = node.child_by_field_name("declarator")?;
                let name = extract_declarator_name(declarator, source)?;
                let is_method = has_ancestor_class(node);
                Some(Definition {
                    chunk_kind: if is_method { ChunkKind::Method } else { ChunkKind::Function },
                    symbol_kind: if is_method { SymbolKind::Method } else { SymbolKind::Function },
                    visibility: if is_method { class_member_visibility(node) } else { Visibility::Public },
                    doc_comment: doc_comment(node, source),
                    signature: None,
                    name,
                })
            }
            "class_specifier" | "struct_specifier" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind: SymbolKind::Type,
                    visibility: Visibility::Public,
                    doc_comment: doc_comment(node, source),
                    signature: None,
                    name,
                })
            }
            "enum_specifier" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Block,
                    symbol_kind: SymbolKind::Type,
                    visibility: Visibility::Public,
                    doc_comment: doc_comment(node, source),
                    signature: None,
                    name,
                })
            }
            "namespace_definition" => {
                let name = node.child_by_field_name("name").map(|n| node_text(n, source).to_string())?;
                Some(Definition {
                    chunk_kind: ChunkKind::Block,
                    symbol_kind: SymbolKind::Type,
                    visibility: Visibility::Public,
                    doc_comment: None,
                    signature: None,
                    name,
                })
            }
            _ => None,
        }
    }

    fn node_reference(&self, node: Node<'_>, source: &[u8]) -> Option<RawRef> {
        reference_shared(node, source).or_else(|| match node.kind() {
            "new_expression" => {
                let ty = node.child_by_field_name("type")?;
                let name = node_text(ty, source).to_string();
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::TypeUse, to: name })
                }
            }
            _ => None,
        })
    }
}

fn has_ancestor_class(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(p) = current {
        if matches!(p.kind(), "class_specifier" | "struct_specifier") {
            return true;
        }
        current = p.parent();
    }
    false
}

/// Walks back through preceding siblings in the enclosing `field_declaration_list`
/// for the nearest `access_specifier`; defaults to `private` for `class`, the
/// caller is expected to treat unknown as public for `struct` (C++ default
/// differs, but the analyzer doesn't track which keyword introduced the body).
fn class_member_visibility(node: Node<'_>) -> Visibility {
    let mut sibling = node.prev_sibling();
    while let Some(s) = sibling {
        if s.kind() == "access_specifier" {
            return match s.named_child(0).map(|n| n.kind()) {
                Some("public") => Visibility::Public,
                Some("protected") => Visibility::Protected,
                Some("private") => Visibility::Private,
                _ => Visibility::Private,
            };
        }
        sibling = s.prev_sibling();
    }
    Visibility::Private
}

fn doc_comment(node: Node<'_>, source: &[u8]) -> Option<String> {
    let sibling = node.prev_sibling()?;
    if sibling.kind() != "comment" {
        return None;
    }
    let text = node_text(sibling, source);
    Some(
        text.trim_start_matches("/**")
            .trim_start_matches("/*")
            .trim_start_matches("///")
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

    #[test]
    fn classifies_class_and_namespace() {
        let src = "namespace app {\nclass Widget {\n public:\n  void draw() {}\n};\n}\n";
        let tree = parse_to_tree(src.as_bytes(), CppClassifier.grammar()).expect("parse");
        let mut out = Vec::new();
        fn visit(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
            if let Some(d) = CppClassifier.classify(node, source) {
                out.push(d);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, source, out);
            }
        }
        visit(tree.root_node(), src.as_bytes(), &mut out);
        assert!(out.iter().any(|d| d.name == "app"));
        assert!(out.iter().any(|d| d.name == "Widget" && d.chunk_kind == ChunkKind::Class));
        let draw = out.iter().find(|d| d.name == "draw").expect("draw");
        assert_eq!(draw.visibility, Visibility::Public);
    }
}
