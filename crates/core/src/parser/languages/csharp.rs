//! C# node classifier.

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for C# source.
pub struct CSharpClassifier;

impl LanguageClassifier for CSharpClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_c_sharp::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        match node.kind() {
            "class_declaration" | "record_declaration" | "struct_declaration" | "enum_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind: SymbolKind::Type,
                    visibility: modifier_visibility(node, source),
                    doc_comment: xml_doc(node, source),
                    signature: None,
                    name,
                })
            }
            "interface_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind: SymbolKind::Interface,
                    visibility: modifier_visibility(node, source),
                    doc_comment: xml_doc(node, source),
                    signature: None,
                    name,
                })
            }
            "method_declaration" | "constructor_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Method,
                    symbol_kind: SymbolKind::Method,
                    visibility: modifier_visibility(node, source),
                    doc_comment: xml_doc(node, source),
                    signature: node
                        .child_by_field_name("parameters")
                        .map(|p| node_text(p, source).to_string()),
                    name,
                })
            }
            "property_declaration" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Block,
                    symbol_kind: SymbolKind::Constant,
                    visibility: modifier_visibility(node, source),
                    doc_comment: None,
                    signature: None,
                    name,
                })
            }
            "namespace_declaration" => {
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
            "invocation_expression" => {
                let function = node.child_by_field_name("function")?;
                let name = match function.kind() {
                    "member_access_expression" => function
                        .child_by_field_name("name")
                        .map(|n| node_text(n, source).to_string())
                        .unwrap_or_default(),
                    _ => node_text(function, source).to_string(),
                };
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Call, to: name })
                }
            }
            "object_creation_expression" => {
                let ty = node.child_by_field_name("type")?;
                let name = node_text(ty, source).to_string();
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::TypeUse, to: name })
                }
            }
            "using_directive" => {
                let text = node_text(node, source)
                    .trim_start_matches("using ")
                    .trim_end_matches(';')
                    .trim()
                    .to_string();
                if text.is_empty() || text.contains('=') {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Import, to: text })
                }
            }
            _ => None,
        }
    }
}

fn modifier_visibility(node: Node<'_>, source: &[u8]) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "modifier" {
            match node_text(child, source) {
                "public" => return Visibility::Public,
                "protected" => return Visibility::Protected,
                "private" => return Visibility::Private,
                "internal" => return Visibility::Internal,
                _ => {}
            }
        }
    }
    Visibility::Private
}

fn xml_doc(node: Node<'_>, source: &[u8]) -> Option<String> {
    let sibling = node.prev_named_sibling()?;
    if sibling.kind() != "comment" {
        return None;
    }
    let text = node_text(sibling, source);
    if !text.starts_with("///") {
        return None;
    }
    Some(text.trim_start_matches("///").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_to_tree;

    #[test]
    fn classifies_class_and_method() {
        let src = "public class UserService {\n    public void GetUser() {}\n}\n";
        let tree = parse_to_tree(src.as_bytes(), CSharpClassifier.grammar()).expect("parse");
        let mut out = Vec::new();
        fn visit(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
            if let Some(d) = CSharpClassifier.classify(node, source) {
                out.push(d);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, source, out);
            }
        }
        visit(tree.root_node(), src.as_bytes(), &mut out);
        assert!(out.iter().any(|d| d.name == "UserService" && d.chunk_kind == ChunkKind::Class));
        let method = out.iter().find(|d| d.name == "GetUser").expect("GetUser");
        assert_eq!(method.visibility, Visibility::Public);
    }

    #[test]
    fn classifies_interface() {
        let src = "public interface IRepository {\n    void Save();\n}\n";
        let tree = parse_to_tree(src.as_bytes(), CSharpClassifier.grammar()).expect("parse");
        let def = CSharpClassifier.classify(tree.root_node().named_child(0).unwrap(), src.as_bytes());
        assert_eq!(def.unwrap().symbol_kind, SymbolKind::Interface);
    }
}
