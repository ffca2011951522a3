//! C node classifier.
//!
//! `static` functions are `private`, everything else `public` (C has no
//! finer-grained visibility). The declarator-unwrapping helper is shared
//! with the C++ classifier, which extends this module's rules.

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for C source.
pub struct CClassifier;

impl LanguageClassifier for CClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_c::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        classify_shared(node, source)
    }

    fn node_reference(&self, node: Node<'_>, source: &[u8]) -> Option<RawRef> {
        reference_shared(node, source)
    }
}

pub(crate) fn classify_shared(node: Node<'_>, source: &[u8]) -> Option<Definition> {
    match node.kind() {
        "function_definition" => {
            let declarator = node.child_by_field_name("declarator")?;
            let name = extract_declarator_name(declarator, source)?;
            Some(Definition {
                chunk_kind: ChunkKind::Function,
                symbol_kind: SymbolKind::Function,
                visibility: if is_static(node, source) { Visibility::Private } else { Visibility::Public },
                doc_comment: doc_comment(node, source),
                signature: None,
                name,
            })
        }
        "struct_specifier" | "union_specifier" | "enum_specifier" => {
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
        _ => None,
    }
}

pub(crate) fn reference_shared(node: Node<'_>, source: &[u8]) -> Option<RawRef> {
    match node.kind() {
        "call_expression" => {
            let callee = node.child_by_field_name("function")?;
            let name = node_text(callee, source).to_string();
            if name.is_empty() {
                None
            } else {
                Some(RawRef { kind: ReferenceKind::Call, to: name })
            }
        }
        "preproc_include" => {
            let path_node = node.named_child(0)?;
            let path = node_text(path_node, source).trim_matches('"').trim_matches(|c| c == '<' || c == '>').to_string();
            if path.is_empty() {
                None
            } else {
                Some(RawRef { kind: ReferenceKind::Import, to: path })
            }
        }
        _ => None,
    }
}

/// Unwrap `function_declarator`/`pointer_declarator` nesting to find the
/// identifier naming a declaration. Used by both C and C++ classifiers.
pub(crate) fn extract_declarator_name(declarator: Node<'_>, source: &[u8]) -> Option<String> {
    match declarator.kind() {
        "function_declarator" => declarator
            .child_by_field_name("declarator")
            .and_then(|n| extract_declarator_name(n, source)),
        "pointer_declarator" | "reference_declarator" => {
            let mut cursor = declarator.walk();
            let result = declarator
                .children(&mut cursor)
                .find_map(|child| extract_declarator_name(child, source));
            result
        }
        "identifier" | "field_identifier" | "qualified_identifier" => {
            Some(node_text(declarator, source).to_string())
        }
        _ => None,
    }
}

fn is_static(node: Node<'_>, source: &[u8]) -> bool {
    let mut cursor = node.walk();
    let result = node
        .children(&mut cursor)
        .any(|c| c.kind() == "storage_class_specifier" && node_text(c, source) == "static");
    result
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
    fn static_function_is_private() {
        let src = "static int helper(void) { return 1; }\nint api(void) { return 2; }\n";
        let tree = parse_to_tree(src.as_bytes(), CClassifier.grammar()).expect("parse");
        let mut out = Vec::new();
        fn visit(node: Node<'_>, source: &[u8], out: &mut Vec<Definition>) {
            if let Some(d) = CClassifier.classify(node, source) {
                out.push(d);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                visit(child, source, out);
            }
        }
        visit(tree.root_node(), src.as_bytes(), &mut out);
        assert_eq!(out.iter().find(|d| d.name == "helper").unwrap().visibility, Visibility::Private);
        assert_eq!(out.iter().find(|d| d.name == "api").unwrap().visibility, Visibility::Public);
    }
}
