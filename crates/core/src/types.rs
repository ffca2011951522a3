//! Core domain types shared across all codegraph-core subsystems.
//!
//! These types form the API contract between modules. Changing them
//! requires updating all consumers, so they should be stable and minimal.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Language tags
// ---------------------------------------------------------------------------

/// A canonical language identifier.
///
/// Dispatch families have a dedicated tree-sitter grammar and node
/// classifier. `Other` carries any tag from the closed alphabet that is
/// accepted but has no dedicated grammar wired up (it routes to whole-file
/// fallback chunking, which is a normal, non-error outcome). `Unknown` is
/// the sentinel for extensions outside the closed alphabet entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python
    Python,
    /// TypeScript (.ts, .tsx)
    TypeScript,
    /// JavaScript (.js, .jsx, .mjs, .cjs)
    JavaScript,
    /// Rust
    Rust,
    /// Go
    Go,
    /// Java
    Java,
    /// C
    C,
    /// C++ (.cpp, .cc, .cxx, .hpp, .hxx, .h treated ambiguously with C)
    Cpp,
    /// C#
    CSharp,
    /// CSS / SCSS
    Css,
    /// Ruby
    Ruby,
    /// PHP (embedded-JS host)
    Php,
    /// Swift
    Swift,
    /// Kotlin
    Kotlin,
    /// HTML / XHTML (embedded-JS host)
    Html,
    /// Svelte (embedded-JS host)
    Svelte,
    /// Markdown
    Markdown,
    /// Accepted tag with no dedicated grammar; carries the canonical tag text.
    Other(&'static str),
    /// Extension outside the closed alphabet.
    Unknown,
}

impl Language {
    /// Detect a language from a canonical extension/tag, accepting every
    /// member of the closed alphabet in §6 of the specification. Never
    /// fails: unrecognized extensions map to `Unknown`.
    #[allow(clippy::too_many_lines)]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "python" | "py" => Self::Python,
            "typescript" | "ts" | "tsx" => Self::TypeScript,
            "javascript" | "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "rust" | "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "h" => Self::Cpp,
            "csharp" | "cs" => Self::CSharp,
            "css" | "scss" => Self::Css,
            "ruby" | "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kotlin" | "kt" | "kts" => Self::Kotlin,
            "html" | "htm" | "xhtml" => Self::Html,
            "svelte" => Self::Svelte,
            "markdown" | "md" => Self::Markdown,

            "lua" => Self::Other("lua"),
            "sql" => Self::Other("sql"),
            "proto" | "protobuf" => Self::Other("proto"),
            "bash" | "sh" | "shell" => Self::Other("bash"),
            "dockerfile" => Self::Other("dockerfile"),
            "yaml" | "yml" => Self::Other("yaml"),
            "hcl" | "tf" | "terraform" => Self::Other("hcl"),
            "elixir" | "ex" | "exs" => Self::Other("elixir"),
            "elm" => Self::Other("elm"),
            "groovy" | "gradle" => Self::Other("groovy"),
            "ocaml" | "ml" | "mli" => Self::Other("ocaml"),
            "toml" => Self::Other("toml"),
            "cue" => Self::Other("cue"),
            "pascal" | "pas" | "dpr" | "pp" | "delphi" | "freepascal" => Self::Other("pascal"),
            "vbnet" | "vb" | "visualbasic" | "vb.net" => Self::Other("vbnet"),
            "scala" | "sc" => Self::Other("scala"),

            _ => Self::Unknown,
        }
    }

    /// Canonical tag string, used as the `language` field of persisted
    /// chunks/symbols and as the storage-layer filter value.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Css => "css",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Html => "html",
            Self::Svelte => "svelte",
            Self::Markdown => "markdown",
            Self::Other(tag) => tag,
            Self::Unknown => "unknown",
        }
    }

    /// True iff this language's files embed JavaScript fragments that must
    /// be lifted and re-parsed with restored line numbers (§4.4).
    pub fn is_embedded_js_host(&self) -> bool {
        matches!(self, Self::Html | Self::Svelte | Self::Php)
    }

    /// True iff a dedicated tree-sitter grammar and node classifier exist
    /// for this language (i.e. it is not routed to whole-file fallback).
    pub fn has_dedicated_grammar(&self) -> bool {
        !matches!(self, Self::Other(_) | Self::Unknown)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SourceFile
// ---------------------------------------------------------------------------

/// An in-memory view of a file to be chunked. Ephemeral: the hash is the
/// change-detection key, nothing else about this type is persisted as-is.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// Raw file bytes.
    pub content: Vec<u8>,
    /// Detected language tag.
    pub language: Language,
    /// SHA-256 hex digest of `content`.
    pub content_hash: String,
}

impl SourceFile {
    /// Build a `SourceFile`, computing its content hash and detecting its
    /// language from the path's extension.
    pub fn new(path: PathBuf, content: Vec<u8>) -> Self {
        let content_hash = sha256_hex(&content);
        let language = language_from_path(&path);
        Self {
            path,
            content,
            language,
            content_hash,
        }
    }

    /// Lossy UTF-8 view of the content, for text-oriented parsing.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Detect a `Language` from a file path's extension (closed, explicit
/// mapping — unknown extensions map to the `Unknown` sentinel).
pub fn language_from_path(path: &std::path::Path) -> Language {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if ext.is_empty() && path.file_name().and_then(|n| n.to_str()) == Some("Dockerfile") {
        return Language::Other("dockerfile");
    }
    Language::from_tag(&ext)
}

/// SHA-256 hex digest of arbitrary bytes. Used for content hashes and chunk
/// identity fragments throughout the crate.
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// The kind of code construct a chunk represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Free-standing function.
    Function,
    /// Method attached to a type.
    Method,
    /// Class, struct, interface, trait, enum, or record definition.
    Class,
    /// A nested block that earned its own chunk (e.g. a large top-level statement group).
    Block,
    /// Synthesized whole-file fallback chunk.
    File,
}

impl ChunkKind {
    /// Convert to the storage-layer string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Block => "block",
            Self::File => "file",
        }
    }

    /// Parse from a storage-layer string, defaulting to `Block` for anything
    /// unrecognized (defensive against schema drift, never used on fresh writes).
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "file" => Self::File,
            _ => Self::Block,
        }
    }
}

/// A bounded-size semantic chunk of source, the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// `"<file>:<start_line>:<first-8-hex-of-sha256(content)>"`.
    pub id: String,
    /// Path relative to the repository root.
    pub file_path: String,
    /// Resolved language of the chunk's content (not necessarily the host file's language).
    pub language: String,
    /// Source text, truncated to `max_chunk_bytes` if necessary.
    pub content: String,
    /// What kind of construct this chunk represents.
    pub chunk_kind: ChunkKind,
    /// Name of the construct (function/class/etc. name), possibly suffixed `" (truncated)"`.
    pub name: String,
    /// Enclosing construct's name, if any (e.g. the class a method belongs to).
    pub parent_name: Option<String>,
    /// 1-based starting line in the original file.
    pub start_line: u32,
    /// 1-based ending line in the original file, inclusive.
    pub end_line: u32,
    /// SHA-256 hex digest of `content`.
    pub content_hash: String,
}

impl Chunk {
    /// Compute the deterministic chunk id from its defining fields.
    pub fn compute_id(file_path: &str, start_line: u32, content: &str) -> String {
        let digest = sha256_hex(content.as_bytes());
        format!("{file_path}:{start_line}:{}", &digest[..8])
    }
}

// ---------------------------------------------------------------------------
// Symbol
// ---------------------------------------------------------------------------

/// The kind of named definition a symbol represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// Free-standing function.
    Function,
    /// Method attached to a type.
    Method,
    /// Class, struct, enum, or record.
    Type,
    /// Interface, trait, or protocol.
    Interface,
    /// Constant or static value.
    Constant,
    /// Module-level or instance variable.
    Variable,
}

impl SymbolKind {
    /// Convert to the storage-layer string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Type => "type",
            Self::Interface => "interface",
            Self::Constant => "constant",
            Self::Variable => "variable",
        }
    }

    /// Parse from a storage-layer string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "method" => Self::Method,
            "type" => Self::Type,
            "interface" => Self::Interface,
            "constant" => Self::Constant,
            _ => Self::Variable,
        }
    }
}

/// Visibility of a code symbol, derived per-language (see each classifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Accessible from outside the defining package/module.
    Public,
    /// Accessible only within the defining scope.
    Private,
    /// Accessible from subclasses.
    Protected,
    /// Accessible within the defining package/crate but not beyond.
    Internal,
}

impl Visibility {
    /// Convert to the storage-layer string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Protected => "protected",
            Self::Internal => "internal",
        }
    }

    /// Parse from a storage-layer string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "public" => Self::Public,
            "protected" => Self::Protected,
            "internal" => Self::Internal,
            _ => Self::Private,
        }
    }
}

/// A named, locatable definition extracted from the AST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    /// `"<file>:<name>:<start_line>"`.
    pub id: String,
    /// Symbol name as written in source.
    pub name: String,
    /// What kind of definition this is.
    pub kind: SymbolKind,
    /// Path relative to the repository root.
    pub file_path: String,
    /// 1-based starting line.
    pub start_line: u32,
    /// 1-based ending line, inclusive.
    pub end_line: u32,
    /// `end_line - start_line + 1`.
    pub line_count: u32,
    /// Extracted signature text (parameter list, return type, etc.), if derivable.
    pub signature: Option<String>,
    /// Language-derived visibility.
    pub visibility: Visibility,
    /// Extracted doc comment, if present immediately above the definition.
    pub doc_comment: Option<String>,
}

impl Symbol {
    /// Compute the deterministic symbol id from its defining fields.
    pub fn compute_id(file_path: &str, name: &str, start_line: u32) -> String {
        format!("{file_path}:{name}:{start_line}")
    }
}

// ---------------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------------

/// The kind of usage relation a reference represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Function or method invocation.
    Call,
    /// Use of a type outside its own defining position.
    TypeUse,
    /// Import/use/include statement.
    Import,
}

impl ReferenceKind {
    /// Convert to the storage-layer string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::TypeUse => "type_use",
            Self::Import => "import",
        }
    }

    /// Parse from a storage-layer string.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "type_use" => Self::TypeUse,
            "import" => Self::Import,
            _ => Self::Call,
        }
    }
}

/// A directed, line-located usage relation between two names.
///
/// `from_symbol`/`to_symbol` are names (optionally package-qualified as
/// `pkg.Name`), not resolved symbol ids — resolution is the call graph's
/// job (§4.9), not the extractor's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    /// `"<file>:<line>:<kind>:<to>"`.
    pub id: String,
    /// Name of the referencing site (often a function/method name).
    pub from_symbol: String,
    /// Name of the referenced target, optionally package-qualified.
    pub to_symbol: String,
    /// What kind of usage this is.
    pub kind: ReferenceKind,
    /// Path relative to the repository root.
    pub file_path: String,
    /// 1-based line number.
    pub line: u32,
    /// True when `to_symbol` does not resolve to any local symbol.
    pub is_external: bool,
}

impl Reference {
    /// Compute the deterministic reference id from its defining fields.
    pub fn compute_id(file_path: &str, line: u32, kind: ReferenceKind, to_symbol: &str) -> String {
        format!("{file_path}:{line}:{}:{to_symbol}", kind.as_str())
    }
}

// ---------------------------------------------------------------------------
// Git history
// ---------------------------------------------------------------------------

/// A parsed commit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit SHA.
    pub hash: String,
    /// Parent commit SHA, if any (root commits have none).
    pub parent: Option<String>,
    /// Author name.
    pub author: String,
    /// Commit timestamp, ISO 8601.
    pub date: String,
    /// Commit message (first line / subject).
    pub message: String,
    /// `(insertions, deletions)` per file from `--numstat`.
    pub numstat: Vec<(String, u32, u32)>,
}

/// The kind of change a file underwent in a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// File was created.
    Added,
    /// File was modified.
    Modified,
    /// File was deleted.
    Deleted,
    /// File was renamed (old path retained).
    Renamed,
}

/// A single file's change within a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    /// Commit hash this change belongs to.
    pub commit_hash: String,
    /// What kind of change this is.
    pub kind: ChangeKind,
    /// Path after the change.
    pub file_path: String,
    /// Path before the change, if this was a rename.
    pub old_path: Option<String>,
    /// Raw unified diff text for this file in this commit.
    pub diff_text: String,
    /// Function/method names the hunks appear to touch, best-effort.
    pub affected_functions: Vec<String>,
    /// Chunk ids overlapping the changed line ranges, if resolvable at ingest time.
    pub affected_chunk_ids: Vec<String>,
}

/// Links a chunk to a commit that touched it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHistoryEntry {
    /// The chunk touched.
    pub chunk_id: String,
    /// The commit that touched it.
    pub commit_hash: String,
    /// What kind of change this represents for the chunk.
    pub kind: ChangeKind,
}

// ---------------------------------------------------------------------------
// Index metadata
// ---------------------------------------------------------------------------

/// Schema/config/provenance record persisted in the `metadata` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Storage schema version.
    pub schema_version: u32,
    /// Crate version that produced this index.
    pub tool_version: String,
    /// Embedding provider name (`EmbeddingProvider::name`).
    pub embedding_provider: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Embedding vector dimensionality.
    pub embedding_dimensions: usize,
    /// Chunking strategy name (`ChunkingStrategy::name`).
    pub chunker_name: String,
    /// Digest of the indexing configuration, used to invalidate file caches on change.
    pub config_hash: String,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Filters that compose via `IN` clauses in vector/BM25/hybrid search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Restrict to these languages, if non-empty.
    pub languages: Vec<String>,
    /// Restrict to these chunk kinds, if non-empty.
    pub chunk_kinds: Vec<ChunkKind>,
}

/// A scored hybrid search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched chunk.
    pub chunk: Chunk,
    /// Final fused score (higher is better).
    pub score: f64,
    /// Vector-search component score, if the chunk matched semantically.
    pub vector_score: Option<f64>,
    /// BM25 component score, if the chunk matched lexically.
    pub bm25_score: Option<f64>,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Which phase of `Indexer::index` is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    /// Walking/listing files.
    Scanning,
    /// Parsing and chunking files in the worker pool.
    Chunking,
    /// Computing embeddings in batches.
    Embedding,
    /// Writing results to storage.
    Storing,
}

/// A snapshot of indexing progress, delivered via the injected callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexProgress {
    /// Current phase.
    pub phase: IndexPhase,
    /// Total files discovered this run.
    pub total_files: usize,
    /// Files processed so far this run.
    pub processed_files: usize,
    /// Total chunks produced so far this run.
    pub total_chunks: usize,
    /// Chunks processed (e.g. embedded) so far this run.
    pub processed_chunks: usize,
    /// File currently being processed, if applicable.
    pub current_file: Option<PathBuf>,
}
