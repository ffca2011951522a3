//! PHP node classifier.
//!
//! Handles PHP-side declarations only; embedded-script extraction for
//! `<?php ?>` regions inside otherwise non-PHP host files is handled
//! separately by the embedded-JS-style extractor.

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for PHP source.
pub struct PhpClassifier;

impl LanguageClassifier for PhpClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_php::LANGUAGE_PHP.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        match node.kind() {
            "function_definition" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Function,
                    symbol_kind: SymbolKind::Function,
                    visibility: Visibility::Public,
                    doc_comment: doc_comment(node, source),
                    signature: node
                        .child_by_field_name("parameters")
                        .map(|p| node_text(p, source).to_string()),
                    name,
                })
            }
            "method_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Method,
                    symbol_kind: SymbolKind::Method,
                    visibility: visibility_modifier(node, source),
                    doc_comment: doc_comment(node, source),
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
                    visibility: Visibility::Public,
                    doc_comment: doc_comment(node, source),
                    signature: None,
                    name,
                })
            }
            "interface_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind: SymbolKind::Interface,
                    visibility: Visibility::Public,
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
            "function_call_expression" => {
                let function = node.child_by_field_name("function")?;
                let name = node_text(function, source).to_string();
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Call, to: name })
                }
            }
            "object_creation_expression" => {
                let class = node.child_by_field_name("class")?;
                let name = node_text(class, source).to_string();
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::TypeUse, to: name })
                }
            }
            "namespace_use_clause" => {
                let name_node = node.child_by_field_name("name")?;
                let path = node_text(name_node, source).to_string();
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

fn visibility_modifier(node: Node<'_>, source: &[u8]) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            return match node_text(child, source) {
                "private" => Visibility::Private,
                "protected" => Visibility::Protected,
                _ => Visibility::Public,
            };
        }
    }
    Visibility::Public
}

fn doc_comment(node: Node<'_>, source: &[u8]) -> Option<String> {
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

    #[test]
    fn classifies_class_and_method_visibility() {
        let src = "<?php\nclass User {\n    private $name;\n    public function getName() {\n        return $this->name;\n    }\n}\n";
        let tree = parse_to_tree(src.as_bytes(), PhpClassifier.grammar()).expect("parse");
        let mut out = Vec::new();
        fn visit(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
            if let Some(d) = PhpClassifier.classify(node, source) {
                out.push(d);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, source, out);
            }
        }
        visit(tree.root_node(), src.as_bytes(), &mut out);
        assert!(out.iter().any(|d| d.name == "User" && d.chunk_kind == ChunkKind::Class));
        let method = out.iter().find(|d| d.name == "getName").expect("getName");
        assert_eq!(method.visibility, Visibility::Public);
    }

    #[test]
    fn classifies_function() {
        let src = "<?php\nfunction greet($name) {\n    return $name;\n}\n";
        let tree = parse_to_tree(src.as_bytes(), PhpClassifier.grammar()).expect("parse");
        let func = tree
            .root_node()
            .named_children(&mut tree.root_node().walk())
            .find(|n| n.kind() == "function_definition")
            .expect("function_definition");
        let def = PhpClassifier.classify(func, src.as_bytes()).expect("def");
        assert_eq!(def.name, "greet");
    }
}
