//! AST Walker and top-level Chunker contract.
//!
//! `chunk`/`extract_symbols`/`extract_references` are the three entry
//! points the indexer calls per file. Each dispatches on whether the
//! file's language is an embedded-JS host (HTML, Svelte, PHP) or has a
//! dedicated primary-walker classifier registered.
//!
//! PHP is a supplemented case: the distilled routing sends `.php` files
//! straight to the embedded-JS extractor and nowhere else, but PHP source
//! is itself rich in classes and functions worth indexing. Both passes run
//! for PHP: the native classifier over the PHP grammar, and the embedded
//! script extractor over the same tree.

use std::collections::HashSet;

use tree_sitter::Node;

use crate::parser::embedded::{self, JsFragment};
use crate::parser::languages::javascript::{classify_shared as js_classify, reference_shared as js_reference};
use crate::parser::registry::global_registry;
use crate::parser::{node_text, parse_to_tree, Definition, LanguageClassifier};
use crate::types::{Chunk, ChunkKind, Language, Reference, SourceFile, Symbol};

/// `chunk(file) -> chunks`. Synthesizes a single whole-file chunk when no
/// semantic node fires and the file is non-empty.
pub fn chunk(file: &SourceFile) -> Vec<Chunk> {
    chunk_with_budget(file, 8000)
}

/// Same as [`chunk`] but with an explicit byte budget, used by the indexer
/// which knows the configured `max_chunk_bytes`.
pub fn chunk_with_budget(file: &SourceFile, max_chunk_bytes: usize) -> Vec<Chunk> {
    if file.content.is_empty() {
        return Vec::new();
    }

    let file_path = file.path.to_string_lossy().to_string();

    if file.language.is_embedded_js_host() {
        let mut chunks = embedded_chunks(file, max_chunk_bytes);
        if file.language == Language::Php {
            chunks.extend(native_chunks(file, max_chunk_bytes));
        }
        if chunks.is_empty() {
            chunks.push(whole_file_chunk(&file_path, &file.content, file.language, max_chunk_bytes));
        }
        return chunks;
    }

    let chunks = native_chunks(file, max_chunk_bytes);
    if chunks.is_empty() {
        return vec![whole_file_chunk(&file_path, &file.content, file.language, max_chunk_bytes)];
    }
    chunks
}

/// `extract_symbols(file) -> symbols`.
pub fn extract_symbols(file: &SourceFile) -> Vec<Symbol> {
    let file_path = file.path.to_string_lossy().to_string();
    let mut out = Vec::new();

    if file.language.is_embedded_js_host() {
        for fragment in embedded_fragments(file) {
            walk_js_fragment_symbols(&fragment, &file_path, &mut out);
        }
        if file.language == Language::Php {
            if let Some(classifier) = global_registry().get(Language::Php) {
                if let Some(tree) = parse_to_tree(&file.content, classifier.grammar()) {
                    walk_symbols(tree.root_node(), &file.content, &file_path, classifier, &mut out);
                }
            }
        }
        return out;
    }

    let Some(classifier) = global_registry().get(file.language) else {
        return out;
    };
    let Some(tree) = parse_to_tree(&file.content, classifier.grammar()) else {
        return out;
    };
    walk_symbols(tree.root_node(), &file.content, &file_path, classifier, &mut out);
    out
}

/// `extract_references(file) -> references`. Builds the local symbol-name
/// set by calling [`extract_symbols`] on the same file, then resolves
/// `is_external` against it.
pub fn extract_references(file: &SourceFile) -> Vec<Reference> {
    let local_symbols: HashSet<String> = extract_symbols(file).into_iter().map(|s| s.name).collect();
    let file_path = file.path.to_string_lossy().to_string();
    let mut out = Vec::new();

    if file.language.is_embedded_js_host() {
        for fragment in embedded_fragments(file) {
            walk_js_fragment_references(&fragment, &file_path, &local_symbols, &mut out);
        }
        if file.language == Language::Php {
            if let Some(classifier) = global_registry().get(Language::Php) {
                if let Some(tree) = parse_to_tree(&file.content, classifier.grammar()) {
                    walk_references(tree.root_node(), &file.content, &file_path, classifier, None, &local_symbols, &mut out);
                }
            }
        }
        return out;
    }

    let Some(classifier) = global_registry().get(file.language) else {
        return out;
    };
    let Some(tree) = parse_to_tree(&file.content, classifier.grammar()) else {
        return out;
    };
    walk_references(tree.root_node(), &file.content, &file_path, classifier, None, &local_symbols, &mut out);
    out
}

// ---------------------------------------------------------------------------
// Primary-walker chunk pass
// ---------------------------------------------------------------------------

fn native_chunks(file: &SourceFile, max_chunk_bytes: usize) -> Vec<Chunk> {
    let Some(classifier) = global_registry().get(file.language) else {
        return Vec::new();
    };
    let Some(tree) = parse_to_tree(&file.content, classifier.grammar()) else {
        return Vec::new();
    };
    let file_path = file.path.to_string_lossy().to_string();
    let mut out = Vec::new();
    walk_chunks(
        tree.root_node(),
        &file.content,
        &file_path,
        file.language.as_str(),
        classifier,
        None,
        max_chunk_bytes,
        0,
        &mut out,
    );
    out
}

#[allow(clippy::too_many_arguments)]
fn walk_chunks(
    node: Node<'_>,
    source: &[u8],
    file_path: &str,
    language_tag: &str,
    classifier: &dyn LanguageClassifier,
    parent_name: Option<&str>,
    max_chunk_bytes: usize,
    line_offset: i64,
    out: &mut Vec<Chunk>,
) {
    if let Some(def) = classifier.classify(node, source) {
        let start_line = apply_offset(node.start_position().row as u32 + 1, line_offset);
        let end_line = apply_offset(node.end_position().row as u32 + 1, line_offset);
        let content = node_text(node, source);

        if content.len() <= max_chunk_bytes {
            out.push(build_chunk(file_path, language_tag, content, def.chunk_kind, &def.name, parent_name, start_line, end_line));
            return;
        }

        let truncated = truncate_to_byte_limit(content, max_chunk_bytes);
        let truncated_name = format!("{} (truncated)", def.name);
        out.push(build_chunk(file_path, language_tag, truncated, def.chunk_kind, &truncated_name, parent_name, start_line, end_line));

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            walk_chunks(child, source, file_path, language_tag, classifier, Some(&def.name), max_chunk_bytes, line_offset, out);
        }
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_chunks(child, source, file_path, language_tag, classifier, parent_name, max_chunk_bytes, line_offset, out);
    }
}

fn build_chunk(
    file_path: &str,
    language_tag: &str,
    content: &str,
    chunk_kind: ChunkKind,
    name: &str,
    parent_name: Option<&str>,
    start_line: u32,
    end_line: u32,
) -> Chunk {
    let content_hash = crate::types::sha256_hex(content.as_bytes());
    Chunk {
        id: Chunk::compute_id(file_path, start_line, content),
        file_path: file_path.to_string(),
        language: language_tag.to_string(),
        content: content.to_string(),
        chunk_kind,
        name: name.to_string(),
        parent_name: parent_name.map(|s| s.to_string()),
        start_line,
        end_line,
        content_hash,
    }
}

fn whole_file_chunk(file_path: &str, content: &[u8], language: Language, max_chunk_bytes: usize) -> Chunk {
    let text = String::from_utf8_lossy(content);
    let end_line = text.lines().count().max(1) as u32;
    let (body, name) = if text.len() > max_chunk_bytes {
        (truncate_to_byte_limit(&text, max_chunk_bytes).to_string(), "file (truncated)".to_string())
    } else {
        (text.to_string(), "file".to_string())
    };
    build_chunk(file_path, language.as_str(), &body, ChunkKind::File, &name, None, 1, end_line)
}

fn apply_offset(line: u32, offset: i64) -> u32 {
    (line as i64 + offset).max(1) as u32
}

/// Truncate `content` to at most `max_bytes` bytes, backing off to the
/// nearest preceding UTF-8 character boundary so the result is always
/// valid `str` and never exceeds the byte budget.
fn truncate_to_byte_limit(content: &str, max_bytes: usize) -> &str {
    if content.len() <= max_bytes {
        return content;
    }
    let mut end = max_bytes;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

// ---------------------------------------------------------------------------
// Symbol pass (always recurses, independent of chunk truncation)
// ---------------------------------------------------------------------------

fn walk_symbols(node: Node<'_>, source: &[u8], file_path: &str, classifier: &dyn LanguageClassifier, out: &mut Vec<Symbol>) {
    if let Some(def) = classifier.classify(node, source) {
        out.push(build_symbol(file_path, &def, node.start_position().row as u32 + 1, node.end_position().row as u32 + 1));
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_symbols(child, source, file_path, classifier, out);
    }
}

fn build_symbol(file_path: &str, def: &Definition, start_line: u32, end_line: u32) -> Symbol {
    Symbol {
        id: Symbol::compute_id(file_path, &def.name, start_line),
        name: def.name.clone(),
        kind: def.symbol_kind,
        file_path: file_path.to_string(),
        start_line,
        end_line,
        line_count: end_line - start_line + 1,
        signature: def.signature.clone(),
        visibility: def.visibility,
        doc_comment: def.doc_comment.clone(),
    }
}

// ---------------------------------------------------------------------------
// Reference pass
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn walk_references(
    node: Node<'_>,
    source: &[u8],
    file_path: &str,
    classifier: &dyn LanguageClassifier,
    enclosing: Option<&str>,
    local_symbols: &HashSet<String>,
    out: &mut Vec<Reference>,
) {
    let mut current_enclosing = enclosing.map(|s| s.to_string());
    if let Some(def) = classifier.classify(node, source) {
        current_enclosing = Some(def.name);
    }

    if let Some(raw) = classifier.node_reference(node, source) {
        let line = node.start_position().row as u32 + 1;
        let from_symbol = current_enclosing.clone().unwrap_or_default();
        let is_external = resolve_is_external(raw.kind, &raw.to, local_symbols);
        out.push(Reference {
            id: Reference::compute_id(file_path, line, raw.kind, &raw.to),
            from_symbol,
            to_symbol: raw.to,
            kind: raw.kind,
            file_path: file_path.to_string(),
            line,
            is_external,
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_references(child, source, file_path, classifier, current_enclosing.as_deref(), local_symbols, out);
    }
}

fn resolve_is_external(kind: crate::types::ReferenceKind, to: &str, local_symbols: &HashSet<String>) -> bool {
    if kind == crate::types::ReferenceKind::Import {
        return true;
    }
    let bare = to.rsplit('.').next().unwrap_or(to);
    !local_symbols.contains(bare)
}

// ---------------------------------------------------------------------------
// Embedded-JS dispatch
// ---------------------------------------------------------------------------

fn embedded_fragments(file: &SourceFile) -> Vec<JsFragment> {
    match file.language {
        Language::Html | Language::Svelte => {
            let grammar: tree_sitter::Language = match file.language {
                Language::Svelte => tree_sitter_svelte::LANGUAGE.into(),
                _ => tree_sitter_html::LANGUAGE.into(),
            };
            let Some(tree) = parse_to_tree(&file.content, grammar) else {
                return Vec::new();
            };
            let mut fragments = embedded::extract_html_scripts(tree.root_node(), &file.content);
            if file.language == Language::Svelte {
                fragments.extend(embedded::extract_svelte_expressions(tree.root_node(), &file.content));
            }
            fragments
        }
        Language::Php => {
            let grammar: tree_sitter::Language = tree_sitter_php::LANGUAGE_PHP.into();
            let Some(tree) = parse_to_tree(&file.content, grammar) else {
                return Vec::new();
            };
            embedded::extract_php_scripts(tree.root_node(), &file.content)
        }
        _ => Vec::new(),
    }
}

fn embedded_chunks(file: &SourceFile, max_chunk_bytes: usize) -> Vec<Chunk> {
    let file_path = file.path.to_string_lossy().to_string();
    let mut out = Vec::new();
    for fragment in embedded_fragments(file) {
        out.extend(fragment_chunks(&fragment, &file_path, max_chunk_bytes));
    }
    out
}

fn fragment_chunks(fragment: &JsFragment, file_path: &str, max_chunk_bytes: usize) -> Vec<Chunk> {
    let grammar: tree_sitter::Language = tree_sitter_javascript::LANGUAGE.into();
    let offset = fragment.start_line as i64 - 1;

    let Some(tree) = parse_to_tree(fragment.content.as_bytes(), grammar) else {
        return vec![fallback_fragment_chunk(fragment, file_path)];
    };

    let mut out = Vec::new();
    walk_js_chunks(tree.root_node(), fragment.content.as_bytes(), file_path, None, max_chunk_bytes, offset, &mut out);
    if out.is_empty() {
        return vec![fallback_fragment_chunk(fragment, file_path)];
    }
    out
}

fn fallback_fragment_chunk(fragment: &JsFragment, file_path: &str) -> Chunk {
    let name = format!("script_{}", fragment.kind.as_str());
    let end_line = fragment.start_line + fragment.content.lines().count().max(1) as u32 - 1;
    build_chunk(file_path, "javascript", &fragment.content, ChunkKind::Block, &name, None, fragment.start_line, end_line)
}

fn walk_js_chunks(
    node: Node<'_>,
    source: &[u8],
    file_path: &str,
    parent_name: Option<&str>,
    max_chunk_bytes: usize,
    line_offset: i64,
    out: &mut Vec<Chunk>,
) {
    if let Some(def) = js_classify(node, source) {
        let start_line = apply_offset(node.start_position().row as u32 + 1, line_offset);
        let end_line = apply_offset(node.end_position().row as u32 + 1, line_offset);
        let content = node_text(node, source);

        if content.len() <= max_chunk_bytes {
            out.push(build_chunk(file_path, "javascript", content, def.chunk_kind, &def.name, parent_name, start_line, end_line));
            return;
        }

        let truncated = truncate_to_byte_limit(content, max_chunk_bytes);
        let truncated_name = format!("{} (truncated)", def.name);
        out.push(build_chunk(file_path, "javascript", truncated, def.chunk_kind, &truncated_name, parent_name, start_line, end_line));
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            walk_js_chunks(child, source, file_path, Some(&def.name), max_chunk_bytes, line_offset, out);
        }
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_js_chunks(child, source, file_path, parent_name, max_chunk_bytes, line_offset, out);
    }
}

fn walk_js_fragment_symbols(fragment: &JsFragment, file_path: &str, out: &mut Vec<Symbol>) {
    let grammar: tree_sitter::Language = tree_sitter_javascript::LANGUAGE.into();
    let Some(tree) = parse_to_tree(fragment.content.as_bytes(), grammar) else {
        return;
    };
    let offset = fragment.start_line as i64 - 1;
    walk_js_symbols(tree.root_node(), fragment.content.as_bytes(), file_path, offset, out);
}

fn walk_js_symbols(node: Node<'_>, source: &[u8], file_path: &str, line_offset: i64, out: &mut Vec<Symbol>) {
    if let Some(def) = js_classify(node, source) {
        let start_line = apply_offset(node.start_position().row as u32 + 1, line_offset);
        let end_line = apply_offset(node.end_position().row as u32 + 1, line_offset);
        out.push(build_symbol(file_path, &def, start_line, end_line));
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_js_symbols(child, source, file_path, line_offset, out);
    }
}

fn walk_js_fragment_references(fragment: &JsFragment, file_path: &str, local_symbols: &HashSet<String>, out: &mut Vec<Reference>) {
    let grammar: tree_sitter::Language = tree_sitter_javascript::LANGUAGE.into();
    let Some(tree) = parse_to_tree(fragment.content.as_bytes(), grammar) else {
        return;
    };
    let offset = fragment.start_line as i64 - 1;
    walk_js_references(tree.root_node(), fragment.content.as_bytes(), file_path, None, offset, local_symbols, out);
}

#[allow(clippy::too_many_arguments)]
fn walk_js_references(
    node: Node<'_>,
    source: &[u8],
    file_path: &str,
    enclosing: Option<&str>,
    line_offset: i64,
    local_symbols: &HashSet<String>,
    out: &mut Vec<Reference>,
) {
    let mut current_enclosing = enclosing.map(|s| s.to_string());
    if let Some(def) = js_classify(node, source) {
        current_enclosing = Some(def.name);
    }

    if let Some(raw) = js_reference(node, source) {
        let line = apply_offset(node.start_position().row as u32 + 1, line_offset);
        let from_symbol = current_enclosing.clone().unwrap_or_default();
        let is_external = resolve_is_external(raw.kind, &raw.to, local_symbols);
        out.push(Reference {
            id: Reference::compute_id(file_path, line, raw.kind, &raw.to),
            from_symbol,
            to_symbol: raw.to,
            kind: raw.kind,
            file_path: file_path.to_string(),
            line,
            is_external,
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_js_references(child, source, file_path, current_enclosing.as_deref(), line_offset, local_symbols, out);
    }
}

/// The chunking-strategy contract the indexer programs against, so the
/// pipeline doesn't call the free functions directly and a second strategy
/// could be swapped in without touching call sites.
pub trait ChunkingStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn supports_language(&self, tag: &str) -> bool;
    fn chunk(&self, file: &SourceFile) -> crate::error::IndexResult<Vec<Chunk>>;
    fn extract_symbols(&self, file: &SourceFile) -> crate::error::IndexResult<Vec<Symbol>>;
    fn extract_references(&self, file: &SourceFile) -> crate::error::IndexResult<Vec<Reference>>;
}

/// The one shipped strategy: dispatches through the parser registry and
/// node classifiers (§4.1-§4.5).
pub struct TreeSitterChunker {
    max_chunk_bytes: usize,
}

impl TreeSitterChunker {
    pub fn new(max_chunk_bytes: usize) -> Self {
        Self { max_chunk_bytes }
    }
}

impl ChunkingStrategy for TreeSitterChunker {
    fn name(&self) -> &str {
        "tree_sitter"
    }

    fn supports_language(&self, tag: &str) -> bool {
        Language::from_tag(tag).has_dedicated_grammar()
    }

    fn chunk(&self, file: &SourceFile) -> crate::error::IndexResult<Vec<Chunk>> {
        Ok(chunk_with_budget(file, self.max_chunk_bytes))
    }

    fn extract_symbols(&self, file: &SourceFile) -> crate::error::IndexResult<Vec<Symbol>> {
        Ok(extract_symbols(file))
    }

    fn extract_references(&self, file: &SourceFile) -> crate::error::IndexResult<Vec<Reference>> {
        Ok(extract_references(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn source_file(path: &str, content: &str) -> SourceFile {
        SourceFile::new(PathBuf::from(path), content.as_bytes().to_vec())
    }

    #[test]
    fn go_function_yields_symbol_and_external_call_reference() {
        let file = source_file("x.go", "package p\nfunc Foo() { Bar() }\nfunc bar() { }\n");
        let symbols = extract_symbols(&file);
        assert!(symbols.iter().any(|s| s.name == "Foo" && s.visibility == crate::types::Visibility::Public));
        assert!(symbols.iter().any(|s| s.name == "bar" && s.visibility == crate::types::Visibility::Private));

        let refs = extract_references(&file);
        let call = refs.iter().find(|r| r.to_symbol == "Bar").expect("Bar call");
        assert_eq!(call.from_symbol, "Foo");
        assert!(call.is_external);
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let file = source_file("empty.go", "");
        assert!(chunk(&file).is_empty());
    }

    #[test]
    fn unknown_language_falls_back_to_whole_file_chunk() {
        let file = source_file("notes.txt", "just some text\nacross two lines\n");
        let chunks = chunk(&file);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_kind, ChunkKind::File);
    }

    #[test]
    fn embedded_html_script_gets_host_file_line_offset() {
        let file = source_file(
            "page.html",
            "<html><body>\n  <script>\n  function hello(){ return 1; }\n  </script>\n</body></html>",
        );
        let chunks = chunk(&file);
        let hello = chunks.iter().find(|c| c.name == "hello").expect("hello chunk");
        // line 1: <html><body>, line 2: <script>, line 3: function hello(...
        assert_eq!(hello.start_line, 3);
        assert_eq!(hello.language, "javascript");
    }

    #[test]
    fn truncate_to_byte_limit_backs_off_to_char_boundary() {
        // "é" is 2 bytes in UTF-8; a budget landing mid-character must back off.
        let content = "aé"; // byte 0 = 'a', bytes 1-2 = 'é'
        let truncated = truncate_to_byte_limit(content, 2);
        assert!(truncated.len() <= 2);
        assert_eq!(truncated, "a");
    }

    #[test]
    fn whole_file_chunk_truncation_never_exceeds_byte_budget_on_multibyte_content() {
        let content = "é".repeat(10); // 20 bytes, each char 2 bytes
        let chunk = whole_file_chunk("multi.txt", content.as_bytes(), Language::from_tag("txt"), 7);
        assert!(chunk.content.len() <= 7);
    }

    #[test]
    fn tree_sitter_chunker_supports_dedicated_grammar_languages_only() {
        let strategy = TreeSitterChunker::new(8000);
        assert_eq!(strategy.name(), "tree_sitter");
        assert!(strategy.supports_language("go"));
        assert!(!strategy.supports_language("markdown"));
        let file = source_file("x.go", "package p\nfunc Foo() { Bar() }\n");
        let chunks = strategy.chunk(&file).expect("chunk");
        assert!(!chunks.is_empty());
    }
}
