//! TypeScript node classifier.
//!
//! Layers `interface` and `type` declarations on top of the shared
//! JavaScript function/class/method rules.

use tree_sitter::Node;

use crate::parser::languages::javascript::{classify_shared, reference_shared};
use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, SymbolKind, Visibility};

/// Classifier for TypeScript source.
pub struct TypeScriptClassifier;

impl LanguageClassifier for TypeScriptClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        classify_shared(node, source).or_else(|| match node.kind() {
            "interface_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind: SymbolKind::Interface,
                    visibility: export_visibility(node),
                    doc_comment: None,
                    signature: None,
                    name,
                })
            }
            "type_alias_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Block,
                    symbol_kind: SymbolKind::Type,
                    visibility: export_visibility(node),
                    doc_comment: None,
                    signature: None,
                    name,
                })
            }
            _ => None,
        })
    }

    fn node_reference(&self, node: Node<'_>, source: &[u8]) -> Option<RawRef> {
        reference_shared(node, source)
    }
}

fn export_visibility(node: Node<'_>) -> Visibility {
    match node.parent() {
        Some(p) if p.kind() == "export_statement" => Visibility::Public,
        _ => Visibility::Private,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_to_tree;

    #[test]
    fn classifies_interface_and_type_alias() {
        let src = "interface Config { port: number }\ntype Id = string;\n";
        let tree = parse_to_tree(src.as_bytes(), TypeScriptClassifier.grammar()).expect("parse");
        let mut found_interface = false;
        let mut found_alias = false;
        fn visit(node: Node<'_>, source: &[u8], fi: &mut bool, fa: &mut bool) {
            if let Some(d) = TypeScriptClassifier.classify(node, source) {
                if d.symbol_kind == SymbolKind::Interface {
                    *fi = true;
                }
                if d.name == "Id" {
                    *fa = true;
                }
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, source, fi, fa);
            }
        }
        visit(tree.root_node(), src.as_bytes(), &mut found_interface, &mut found_alias);
        assert!(found_interface);
        assert!(found_alias);
    }
}
