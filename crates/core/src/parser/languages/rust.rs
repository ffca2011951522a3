//! Rust node classifier.
//!
//! `function_item` -> function, `struct_item`/`enum_item` -> type,
//! `trait_item` -> interface, `impl_item` -> class (named `impl Type` or
//! `impl Trait for Type`), `const_item`/`static_item` -> constant.

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for Rust source.
pub struct RustClassifier;

impl LanguageClassifier for RustClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        match node.kind() {
            "function_item" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                let is_method = has_ancestor_impl(node);
                Some(Definition {
                    chunk_kind: if is_method {
                        ChunkKind::Method
                    } else {
                        ChunkKind::Function
                    },
                    symbol_kind: if is_method {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    },
                    name,
                    visibility: visibility(node, source),
                    doc_comment: doc_comment(node, source),
                    signature: signature(node, source),
                })
            }
            "struct_item" | "enum_item" => Some(Definition {
                chunk_kind: ChunkKind::Class,
                symbol_kind: SymbolKind::Type,
                name: node_text(node.child_by_field_name("name")?, source).to_string(),
                visibility: visibility(node, source),
                doc_comment: doc_comment(node, source),
                signature: None,
            }),
            "trait_item" => Some(Definition {
                chunk_kind: ChunkKind::Class,
                symbol_kind: SymbolKind::Interface,
                name: node_text(node.child_by_field_name("name")?, source).to_string(),
                visibility: visibility(node, source),
                doc_comment: doc_comment(node, source),
                signature: None,
            }),
            "impl_item" => {
                let type_name = node_text(node.child_by_field_name("type")?, source);
                let name = match node.child_by_field_name("trait") {
                    Some(trait_node) => format!("impl {} for {type_name}", node_text(trait_node, source)),
                    None => format!("impl {type_name}"),
                };
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind: SymbolKind::Type,
                    name,
                    visibility: Visibility::Public,
                    doc_comment: None,
                    signature: None,
                })
            }
            "const_item" | "static_item" => Some(Definition {
                chunk_kind: ChunkKind::Block,
                symbol_kind: SymbolKind::Constant,
                name: node_text(node.child_by_field_name("name")?, source).to_string(),
                visibility: visibility(node, source),
                doc_comment: doc_comment(node, source),
                signature: None,
            }),
            _ => None,
        }
    }

    fn node_reference(&self, node: Node<'_>, source: &[u8]) -> Option<RawRef> {
        match node.kind() {
            "call_expression" => {
                let callee = node.child_by_field_name("function")?;
                let name = callee_name(callee, source);
                if name.is_empty() {
                    return None;
                }
                Some(RawRef { kind: ReferenceKind::Call, to: name })
            }
            "type_identifier" => {
                if is_defining_position(node) {
                    return None;
                }
                let name = node_text(node, source).to_string();
                if name.is_empty() {
                    return None;
                }
                Some(RawRef { kind: ReferenceKind::TypeUse, to: name })
            }
            "use_declaration" => {
                let text = node_text(node, source);
                let path = text
                    .trim_start_matches("pub(crate)")
                    .trim_start_matches("pub")
                    .trim_start_matches("use")
                    .trim_end_matches(';')
                    .trim();
                if path.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Import, to: path.to_string() })
                }
            }
            _ => None,
        }
    }
}

fn has_ancestor_impl(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(p) = current {
        if p.kind() == "impl_item" {
            return true;
        }
        if p.kind() == "source_file" {
            break;
        }
        current = p.parent();
    }
    false
}

fn callee_name(node: Node<'_>, source: &[u8]) -> String {
    match node.kind() {
        "identifier" | "scoped_identifier" => node_text(node, source).to_string(),
        "field_expression" => node
            .child_by_field_name("field")
            .map(|f| node_text(f, source).to_string())
            .unwrap_or_default(),
        _ => node_text(node, source).to_string(),
    }
}

fn is_defining_position(node: Node<'_>) -> bool {
    matches!(
        node.parent().map(|p| p.kind()),
        Some("struct_item") | Some("enum_item") | Some("trait_item") | Some("type_item")
    )
}

fn visibility(node: Node<'_>, source: &[u8]) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            let text = node_text(child, source);
            return match text {
                "pub" => Visibility::Public,
                "pub(super)" => Visibility::Protected,
                t if t.starts_with("pub(") => Visibility::Internal,
                _ => Visibility::Private,
            };
        }
    }
    Visibility::Private
}

fn doc_comment(node: Node<'_>, source: &[u8]) -> Option<String> {
    crate::parser::collect_doc_comment(node.prev_sibling(), source, "line_comment", &["///", "//!"])
}

fn signature(node: Node<'_>, source: &[u8]) -> Option<String> {
    let params = node.child_by_field_name("parameters")?;
    let ret = node
        .child_by_field_name("return_type")
        .map(|r| format!(" -> {}", node_text(r, source)))
        .unwrap_or_default();
    Some(format!("{}{ret}", node_text(params, source)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_to_tree;

    fn classify_all(source: &str) -> Vec<Definition> {
        let tree = parse_to_tree(source.as_bytes(), RustClassifier.grammar()).expect("parse");
        let mut out = Vec::new();
        visit(tree.root_node(), source.as_bytes(), &mut out);
        out
    }

    fn visit(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
        if let Some(def) = RustClassifier.classify(node, source) {
            out.push(def);
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            visit(child, source, out);
        }
    }

    #[test]
    fn classifies_function_and_visibility() {
        let defs = classify_all("pub fn hello() {}\nfn world() {}\n");
        let hello = defs.iter().find(|d| d.name == "hello").expect("hello");
        assert_eq!(hello.visibility, Visibility::Public);
        let world = defs.iter().find(|d| d.name == "world").expect("world");
        assert_eq!(world.visibility, Visibility::Private);
    }

    #[test]
    fn classifies_struct_and_trait() {
        let defs = classify_all("pub struct Config {}\ntrait Drawable {}\n");
        assert!(defs.iter().any(|d| d.name == "Config" && d.symbol_kind == SymbolKind::Type));
        assert!(defs.iter().any(|d| d.name == "Drawable" && d.symbol_kind == SymbolKind::Interface));
    }

    #[test]
    fn impl_methods_classified_as_methods() {
        let defs = classify_all("impl Config {\n    pub fn new() -> Self { Config {} }\n}\n");
        let new_fn = defs.iter().find(|d| d.name == "new").expect("new");
        assert_eq!(new_fn.chunk_kind, ChunkKind::Method);
    }

    #[test]
    fn call_reference_detected() {
        let tree = parse_to_tree(b"fn a() { b(); }", RustClassifier.grammar()).expect("parse");
        let mut found = None;
        fn find_call(node: Node<'_>, source: &[u8], found: &mut Option<RawRef>) {
            if let Some(r) = RustClassifier.node_reference(node, source) {
                *found = Some(r);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                find_call(child, source, found);
            }
        }
        find_call(tree.root_node(), b"fn a() { b(); }", &mut found);
        let r = found.expect("call found");
        assert_eq!(r.to, "b");
        assert_eq!(r.kind, ReferenceKind::Call);
    }
}
