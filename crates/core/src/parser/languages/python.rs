//! Python node classifier.
//!
//! Visibility: a leading underscore marks `private`, everything else is
//! `public` (Python has no enforced access modifiers). Methods are
//! distinguished from functions by an enclosing `class_definition`.

use tree_sitter::Node;

use crate::parser::{node_text, Definition, LanguageClassifier, RawRef};
use crate::types::{ChunkKind, ReferenceKind, SymbolKind, Visibility};

/// Classifier for Python source.
pub struct PythonClassifier;

impl LanguageClassifier for PythonClassifier {
    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn classify(&self, node: Node<'_>, source: &[u8]) -> Option<Definition> {
        match node.kind() {
            "function_definition" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                let is_method = has_ancestor_class(node);
                Some(Definition {
                    chunk_kind: if is_method { ChunkKind::Method } else { ChunkKind::Function },
                    symbol_kind: if is_method { SymbolKind::Method } else { SymbolKind::Function },
                    visibility: python_visibility(&name),
                    doc_comment: docstring(node, source),
                    signature: node
                        .child_by_field_name("parameters")
                        .map(|p| node_text(p, source).to_string()),
                    name,
                })
            }
            "class_definition" => {
                let name = node_text(node.child_by_field_name("name")?, source).to_string();
                Some(Definition {
                    chunk_kind: ChunkKind::Class,
                    symbol_kind: SymbolKind::Type,
                    visibility: python_visibility(&name),
                    doc_comment: docstring(node, source),
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
                let callee = node.child_by_field_name("function")?;
                let name = match callee.kind() {
                    "attribute" => callee
                        .child_by_field_name("attribute")
                        .map(|a| node_text(a, source).to_string())
                        .unwrap_or_default(),
                    _ => node_text(callee, source).to_string(),
                };
                if name.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Call, to: name })
                }
            }
            "import_statement" => {
                let text = node_text(node, source).trim_start_matches("import").trim();
                if text.is_empty() {
                    None
                } else {
                    Some(RawRef { kind: ReferenceKind::Import, to: text.to_string() })
                }
            }
            "import_from_statement" => {
                let module = node.child_by_field_name("module_name")?;
                Some(RawRef {
                    kind: ReferenceKind::Import,
                    to: node_text(module, source).to_string(),
                })
            }
            _ => None,
        }
    }
}

fn has_ancestor_class(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(p) = current {
        if p.kind() == "class_definition" {
            return true;
        }
        if p.kind() == "module" {
            break;
        }
        current = p.parent();
    }
    false
}

fn python_visibility(name: &str) -> Visibility {
    if name.starts_with('_') {
        Visibility::Private
    } else {
        Visibility::Public
    }
}

fn docstring(node: Node<'_>, source: &[u8]) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string_node = first.named_child(0)?;
    if string_node.kind() != "string" {
        return None;
    }
    let text = node_text(string_node, source);
    Some(
        text.trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_to_tree;

    #[test]
    fn python_visibility_underscore_is_private() {
        assert_eq!(python_visibility("_helper"), Visibility::Private);
        assert_eq!(python_visibility("public_fn"), Visibility::Public);
    }

    #[test]
    fn classifies_function_and_docstring() {
        let src = "def greet():\n    \"\"\"Say hello.\"\"\"\n    return 1\n";
        let tree = parse_to_tree(src.as_bytes(), PythonClassifier.grammar()).expect("parse");
        let root = tree.root_node();
        let func = root.named_child(0).expect("function_definition");
        let def = PythonClassifier.classify(func, src.as_bytes()).expect("def");
        assert_eq!(def.name, "greet");
        assert_eq!(def.chunk_kind, ChunkKind::Function);
        assert_eq!(def.doc_comment.as_deref(), Some("Say hello."));
    }

    #[test]
    fn methods_inside_class_are_methods() {
        let src = "class Foo:\n    def bar(self):\n        pass\n";
        let tree = parse_to_tree(src.as_bytes(), PythonClassifier.grammar()).expect("parse");
        fn find_method<'a>(node: Node<'a>, src: &[u8]) -> Option<Definition> {
            if node.kind() == "function_definition" {
                return PythonClassifier.classify(node, src);
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if let Some(d) = find_method(child, src) {
                    return Some(d);
                }
            }
            None
        }
        let def = find_method(tree.root_node(), src.as_bytes()).expect("bar");
        assert_eq!(def.chunk_kind, ChunkKind::Method);
    }
}
