//! # codegraph-core
//!
//! Local code-intelligence engine: multi-language chunking and symbol/reference
//! extraction, a hybrid vector+lexical storage engine, a parallel incremental
//! indexer, and a reachability-based dead-code analyzer.
//!
//! ## Architecture
//!
//! - **`config`** -- Configuration loading and validation
//! - **`parser`** -- Tree-sitter parser registry, per-language node classifiers,
//!   and the embedded-JS extractor for HTML/Svelte/PHP
//! - **`chunker`** -- AST walker and top-level chunking contract
//! - **`embedder`** -- `EmbeddingProvider` trait and its implementations
//! - **`index`** -- SQL storage engine: schema, vector/BM25/hybrid search
//! - **`graph`** -- Call-graph construction, reachability, dead-code scoring
//! - **`search`** -- Hybrid ranking glue shared by chunk and temporal search
//! - **`watcher`** -- Debounced filesystem watcher
//! - **`pipeline`** -- Orchestrates scan/filter/chunk/embed/persist
//! - **`complexity`** -- Cyclomatic/cognitive complexity analysis
//! - **`commits`** -- Git commit/diff ingestion
//! - **`blame`** -- Git blame aggregation
//! - **`journal`** -- Append-only memory journal with three-way merge
//!
//! Modules communicate via the shared types in `types`.

pub mod config;
pub mod error;
pub mod types;

pub mod parser;
pub mod chunker;
pub mod embedder;
pub mod index;
pub mod graph;
pub mod search;
pub mod watcher;
pub mod pipeline;
pub mod complexity;

pub mod commits;
pub mod blame;
pub mod journal;

pub use config::Config;
pub use error::{IndexError, IndexResult};
pub use pipeline::Indexer;
