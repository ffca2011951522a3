//! Java node classifier.

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for Java source.
pub struct JavaClassifier;

impl LanguageClassifier for JavaClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        match node.kind() {
            "class_declaration" | "interface_declaration" | "enum_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                let symbol_kind = match node.kind() {
                    "interface_declaration" => SymbolKind::Interface,
                    _ => SymbolKind::Type,
                };
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind,
                    visibility: modifier_visibility(node, source),
                    doc_comment: javadoc(node, source),
                    signature: None,
                    name,
                })
            }
            "method_declaration" | "constructor_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                let is_method = true;
                Some(Definition {
                    chunk_kind: if is_method { ChunkKind::Method } else { ChunkKind::Function },
                    symbol_kind: SymbolKind::Method,
                    visibility: modifier_visibility(node, source),
                    doc_comment: javadoc(node, source),
                    signature: node
                        .child_by_field_name("parameters")
                        .map(|p| node_text(p, source).to_string()),
                    name,
                })
            }
            "field_declaration" => {
                let declarator = node.named_children(&mut node.walk()).find(|c| c.kind() == "variable_declarator")?;
                let name = node_text(declarator.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Block,
                    symbol_kind: SymbolKind::Constant,
                    visibility: modifier_visibility(node, source),
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
            "method_invocation" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Call, to: name })
                }
            }
            "object_creation_expression" => {
                let name = node_text(node.child_by_field_name("type")?, source).to_string();
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::TypeUse, to: name })
                }
            }
            "import_declaration" => {
                let text = node_text(node, source);
                let path = text
                    .trim_start_matches("import ")
                    .trim_start_matches("static ")
                    .trim_end_matches(';')
                    .trim()
                    .to_string();
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

fn modifier_visibility(node: Node<'_>, source: &[u8]) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "modifiers" {
            let text = node_text(child, source);
            if text.contains("public") {
                return Visibility::Public;
            }
            if text.contains("protected") {
                return Visibility::Protected;
            }
            if text.contains("private") {
                return Visibility::Private;
            }
            return Visibility::Internal;
        }
    }
    Visibility::Internal
}

fn javadoc(node: Node<'_>, source: &[u8]) -> Option<String> {
    let sibling = node.prev_sibling()?;
    if sibling.kind() != "block_comment" {
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

    #[test]
    fn classifies_class_and_method_visibility() {
        let src = "public class Config {\n  private void validate() {}\n}\n";
        let tree = parse_to_tree(src.as_bytes(), JavaClassifier.grammar()).expect("parse");
        fn visit(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
            if let Some(d) = JavaClassifier.classify(node, source) {
                out.push(d);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, source, out);
            }
        }
        let mut out = Vec::new();
        visit(tree.root_node(), src.as_bytes(), &mut out);
        let class = out.iter().find(|d| d.name == "Config").expect("Config");
        assert_eq!(class.visibility, Visibility::Public);
        let method = out.iter().find(|d| d.name == "validate").expect("validate");
        assert_eq!(method.visibility, Visibility::Private);
    }
}
