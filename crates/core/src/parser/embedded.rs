//! Embedded-JavaScript extraction for HTML, Svelte, and PHP host files.
//!
//! Produces JS fragments carrying their original-file line offsets so the
//! chunker can run the normal JS walker over them and translate positions
//! back afterward.

use tree_sitter::Node;

use crate::parser::node_text;

/// How a fragment's surrounding markup introduced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Inline,
    Module,
    Expression,
}

impl FragmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FragmentKind::Inline => "inline",
            FragmentKind::Module => "module",
            FragmentKind::Expression => "expression",
        }
    }
}

/// A JavaScript fragment lifted out of a host file, with the original
/// file's line number its content starts at (1-based).
pub struct JsFragment {
    pub content: String,
    pub start_line: u32,
    pub kind: FragmentKind,
}

/// Walk an HTML (or Svelte, since Svelte's markup layer parses the same way)
/// tree for `script_element` nodes and lift their `raw_text` bodies.
pub fn extract_html_scripts(root: Node<'_>, source: &[u8]) -> Vec<JsFragment> {
    let mut fragments = Vec::new();
    walk_html_scripts(root, source, &mut fragments);
    fragments
}

fn walk_html_scripts(node: Node<'_>, source: &[u8], out: &mut Vec<JsFragment>) {
    if node.kind() == "script_element" {
        if let Some(fragment) = script_element_fragment(node, source) {
            out.push(fragment);
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_html_scripts(child, source, out);
    }
}

fn script_element_fragment(node: Node<'_>, source: &[u8]) -> Option<JsFragment> {
    let raw_text = node
        .named_children(&mut node.walk())
        .find(|c| c.kind() == "raw_text")?;
    let text = node_text(raw_text, source);
    let trimmed = text.trim_start_matches('\n');
    let skipped_lines = (text.len() - trimmed.len()) as u32;
    let start_tag = node
        .named_children(&mut node.walk())
        .find(|c| c.kind() == "start_tag")?;
    let is_module = node_text(start_tag, source).contains("type=\"module\"");
    Some(JsFragment {
        content: trimmed.to_string(),
        start_line: raw_text.start_position().row as u32 + 1 + skipped_lines,
        kind: if is_module { FragmentKind::Module } else { FragmentKind::Inline },
    })
}

/// Svelte-specific extra pass: `{expr}` mustache expressions substantial
/// enough to be worth indexing as JS fragments.
pub fn extract_svelte_expressions(root: Node<'_>, source: &[u8]) -> Vec<JsFragment> {
    let mut fragments = Vec::new();
    walk_svelte_expressions(root, source, &mut fragments);
    fragments
}

fn walk_svelte_expressions(node: Node<'_>, source: &[u8], out: &mut Vec<JsFragment>) {
    if node.kind() == "expression" {
        if let Some(raw) = node.named_children(&mut node.walk()).find(|c| c.kind() == "raw_text_expr") {
            let text = node_text(raw, source);
            if text.len() > 20 || text.contains('(') {
                out.push(JsFragment {
                    content: text.to_string(),
                    start_line: raw.start_position().row as u32 + 1,
                    kind: FragmentKind::Expression,
                });
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_svelte_expressions(child, source, out);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptState {
    Outside,
    Inside,
}

/// PHP host files interleave `<script>...</script>` with PHP interruptions
/// across multiple `text` nodes. Walk the ordered text nodes and accumulate
/// script content across PHP tags using a two-state machine, tracking line
/// numbers by counting newlines consumed so far.
pub fn extract_php_scripts(root: Node<'_>, source: &[u8]) -> Vec<JsFragment> {
    let mut text_nodes = Vec::new();
    collect_text_nodes(root, &mut text_nodes);

    let mut fragments = Vec::new();
    let mut state = ScriptState::Outside;
    let mut accum = String::new();
    let mut accum_start_line = 0u32;

    for node in text_nodes {
        let text = node_text(node, source);
        let mut node_line = node.start_position().row as u32 + 1;
        let mut rest = text;

        loop {
            match state {
                ScriptState::Outside => {
                    if let Some(pos) = find_open_tag(rest) {
                        let before = &rest[..pos];
                        node_line += before.matches('\n').count() as u32;
                        let after_tag_start = pos + rest[pos..].find('>').map(|i| i + 1).unwrap_or(0);
                        accum.clear();
                        accum_start_line = node_line;
                        state = ScriptState::Inside;
                        rest = &rest[after_tag_start..];
                        continue;
                    }
                    break;
                }
                ScriptState::Inside => {
                    if let Some(pos) = rest.find("</script>") {
                        accum.push_str(&rest[..pos]);
                        fragments.push(JsFragment {
                            content: accum.clone(),
                            start_line: accum_start_line,
                            kind: FragmentKind::Inline,
                        });
                        node_line += rest[..pos].matches('\n').count() as u32;
                        rest = &rest[pos + "</script>".len()..];
                        state = ScriptState::Outside;
                        continue;
                    } else {
                        accum.push_str(rest);
                        break;
                    }
                }
            }
        }
    }

    fragments
}

fn find_open_tag(text: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    lower.find("<script")
}

fn collect_text_nodes<'a>(node: Node<'a>, out: &mut Vec<Node<'a>>) {
    if node.kind() == "text" {
        out.push(node);
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_text_nodes(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_to_tree;

    #[test]
    fn extracts_html_script_with_line_offset() {
        let src = "<html><body>\n  <script>\n  function hello(){ return 1; }\n  </script>\n</body></html>";
        let grammar: tree_sitter::Language = tree_sitter_html::LANGUAGE.into();
        let tree = parse_to_tree(src.as_bytes(), grammar).expect("parse");
        let fragments = extract_html_scripts(tree.root_node(), src.as_bytes());
        assert_eq!(fragments.len(), 1);
        // line 1: <html><body>, line 2: <script>, line 3: function hello(...
        assert_eq!(fragments[0].start_line, 3);
        assert!(fragments[0].content.contains("function hello"));
    }

    #[test]
    fn extracts_php_interrupted_script() {
        let src = "<script>\nvar x = <?= $n ?>;\n</script>";
        let grammar: tree_sitter::Language = tree_sitter_php::LANGUAGE_PHP.into();
        let tree = parse_to_tree(src.as_bytes(), grammar).expect("parse");
        let fragments = extract_php_scripts(tree.root_node(), src.as_bytes());
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].start_line, 1);
        assert!(fragments[0].content.contains("var x ="));
        assert!(fragments[0].content.contains(";"));
    }
}
