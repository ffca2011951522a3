//! Memory journal (peripheral, reduced depth per the overview).
//!
//! Append-only newline-delimited JSON files under `<data_dir>/journal/` are
//! the source of truth; `StorageEngine::upsert_memory_entry` (§4.13-§4.14)
//! is only a search-only mirror rebuilt from these files. A three-way merge
//! on git conflict is a simplified union-by-id policy: divergent edits to
//! the same id are kept as separate entries tagged `conflict` rather than
//! interactively resolved.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::embedder::EmbeddingProvider;
use crate::error::{IndexError, IndexResult};
use crate::index::StorageEngine;

/// A single journal entry, serialized one-per-line as ndjson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub kind: String,
    pub text: String,
    pub tags: Vec<String>,
    pub importance: f32,
    pub created_at_unix: i64,
    pub related_chunk_ids: Vec<String>,
}

const CONFLICT_TAG: &str = "conflict";

/// Append-only journal over `<data_dir>/journal/*.ndjson`.
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn open(dir: &Path) -> IndexResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    fn path_for_kind(&self, kind: &str) -> PathBuf {
        self.dir.join(format!("{}.ndjson", kind_to_filename(kind)))
    }

    /// Append one entry to its kind's file.
    pub fn append(&self, entry: &MemoryEntry) -> IndexResult<()> {
        let path = self.path_for_kind(&entry.kind);
        let line = serde_json::to_string(entry).map_err(|e| IndexError::Serialization(e.to_string()))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read every entry for a kind, in file order. Malformed lines are
    /// logged and skipped rather than failing the whole read.
    pub fn read_all(&self, kind: &str) -> IndexResult<Vec<MemoryEntry>> {
        let path = self.path_for_kind(kind);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        let mut entries = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MemoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(path = %path.display(), line = i, error = %e, "skipping malformed journal line"),
            }
        }
        Ok(entries)
    }

    /// Rebuild the search-only SQLite mirror for one kind from the journal
    /// files, embedding each entry's text when the provider is available.
    pub async fn sync_to_storage(
        &self,
        storage: &StorageEngine,
        provider: &dyn EmbeddingProvider,
        kind: &str,
    ) -> IndexResult<usize> {
        let entries = self.read_all(kind)?;
        let mut synced = 0;
        for entry in &entries {
            let embedding = if provider.is_available() {
                provider
                    .embed(std::slice::from_ref(&entry.text))
                    .await
                    .ok()
                    .and_then(|v| v.into_iter().next())
            } else {
                None
            };
            storage.upsert_memory_entry(
                &entry.id,
                &entry.kind,
                &entry.text,
                &entry.tags,
                entry.importance,
                entry.created_at_unix,
                &entry.related_chunk_ids,
                embedding.as_deref(),
            )?;
            synced += 1;
        }
        Ok(synced)
    }

    /// Three-way merge two conflicting versions of a kind's ndjson file.
    /// Union by id; where an id's content diverges between `ours` and
    /// `theirs`, keep both copies tagged `conflict`. Result sorted by
    /// `created_at_unix`.
    pub fn merge(ours: &[MemoryEntry], theirs: &[MemoryEntry]) -> Vec<MemoryEntry> {
        let mut by_id: HashMap<String, Vec<MemoryEntry>> = HashMap::new();
        for entry in ours.iter().chain(theirs.iter()) {
            let group = by_id.entry(entry.id.clone()).or_default();
            if !group.contains(entry) {
                group.push(entry.clone());
            }
        }

        let mut merged = Vec::new();
        for (_, mut group) in by_id {
            if group.len() == 1 {
                if let Some(entry) = group.pop() {
                    merged.push(entry);
                }
            } else {
                for mut entry in group {
                    if !entry.tags.iter().any(|t| t == CONFLICT_TAG) {
                        entry.tags.push(CONFLICT_TAG.to_string());
                    }
                    merged.push(entry);
                }
            }
        }
        merged.sort_by_key(|e| e.created_at_unix);
        merged
    }
}

fn kind_to_filename(kind: &str) -> &'static str {
    match kind {
        "note" => "notes",
        "decision" => "decisions",
        "todo" => "todos",
        "issue" => "issues",
        _ => "notes",
    }
}
