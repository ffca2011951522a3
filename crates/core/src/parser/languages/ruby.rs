//! Ruby node classifier.
//!
//! `module` declarations are treated as `Block` chunks with `Type` symbol
//! kind since the taxonomy has no dedicated namespace concept.

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for Ruby source.
pub struct RubyClassifier;

impl LanguageClassifier for RubyClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_ruby::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        match node.kind() {
            "method" | "singleton_method" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                let is_method = has_ancestor_class_or_module(node);
                Some(Definition {
                    chunk_kind: if is_method { ChunkKind::Method } else { ChunkKind::Function },
                    symbol_kind: if is_method { SymbolKind::Method } else { SymbolKind::Function },
                    visibility: ruby_visibility(&name),
                    doc_comment: None,
                    signature: node
                        .child_by_field_name("parameters")
                        .map(|p| node_text(p, source).to_string()),
                    name,
                })
            }
            "class" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind: SymbolKind::Type,
                    visibility: Visibility::Public,
                    doc_comment: None,
                    signature: None,
                    name,
                })
            }
            "module" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
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
        match node.kind() {
            "call" => {
                let method = node.child_by_field_name("method")?;
                let method_name = node_text(method, source);
                if method_name == "require" || method_name == "require_relative" {
                    let args = node.child_by_field_name("arguments")?;
                    let string_arg = args.named_children(&mut args.walk()).find(|a| a.kind() == "string")?;
                    let path = node_text(string_arg, source).trim_matches(|c| c == '"' || c == '\'').to_string();
                    return if path.is_empty() { None } else { Some(RawRef { kind: ReferenceKind::Import, to: path }) };
                }
                if method_name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Call, to: method_name.to_string() })
                }
            }
            _ => None,
        }
    }
}

fn has_ancestor_class_or_module(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(p) = current {
        if matches!(p.kind(), "class" | "module") {
            return true;
        }
        current = p.parent();
    }
    false
}

fn ruby_visibility(name: &str) -> Visibility {
    if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_to_tree;

    fn defs(source: &str) -> Vec<Definition> {
        let tree = parse_to_tree(source.as_bytes(), RubyClassifier.grammar()).expect("parse");
        let mut out = Vec::new();
        fn visit(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
            if let Some(d) = RubyClassifier.classify(node, source) {
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
        let out = defs("class User\n  def greet\n    puts \"hi\"\n  end\nend\n");
        assert!(out.iter().any(|d| d.name == "User" && d.chunk_kind == ChunkKind::Class));
        assert!(out.iter().any(|d| d.name == "greet" && d.chunk_kind == ChunkKind::Method));
    }

    #[test]
    fn classifies_module() {
        let out = defs("module Authentication\n  def self.validate(token)\n    token\n  end\nend\n");
        assert!(out.iter().any(|d| d.name == "Authentication" && d.chunk_kind == ChunkKind::Block));
    }
}
