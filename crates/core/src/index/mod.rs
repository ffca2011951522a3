//! SQL storage engine: schema, vector/BM25/hybrid search (§4.6).
//!
//! Single SQLite database file per project, opened in WAL mode. There is no
//! sqlite-vec-style extension available, so `chunk_embeddings` and its
//! sibling tables are plain tables storing embeddings as little-endian f32
//! BLOBs; `cosine_distance` is a scalar function registered on the
//! connection and evaluated brute-force by the query planner. Everything
//! else (chunks, symbols, refs, FTS5 tables and their sync triggers) is
//! ordinary SQL, defined in `schema.sql`.

use std::path::Path;

use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::embedder::cosine_similarity;
use crate::error::{IndexError, IndexResult};
use crate::types::{
    Change, ChangeKind, Chunk, ChunkHistoryEntry, ChunkKind, Commit, IndexMetadata, Reference,
    ReferenceKind, SearchFilters, SearchResult, Symbol, SymbolKind, Visibility,
};

/// Sort order for [`StorageEngine::find_symbols`] (§6 storage contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolSortBy {
    /// Longest functions first (the historical default).
    LineCount,
    /// Alphabetical by symbol name.
    Name,
    /// Alphabetical by file path, then by start line within a file.
    FilePath,
}

impl SymbolSortBy {
    fn order_by_clause(self) -> &'static str {
        match self {
            Self::LineCount => "line_count DESC",
            Self::Name => "name ASC",
            Self::FilePath => "file_path ASC, start_line ASC",
        }
    }
}

/// Entity kind for [`StorageEngine::hybrid_search_entity`] (§4.14). A
/// `Change`'s id is `"{commit_hash}:{file_path}"` since `changes` has no
/// single-column primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEntityKind {
    Commit,
    Change,
    Memory,
}

fn encode_embedding(vec: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Wrap query tokens containing FTS5 special characters in double quotes so
/// user input can't be interpreted as query syntax.
fn escape_fts_query(query: &str) -> String {
    const SPECIAL: &[char] = &['*', '"', '(', ')', ':', '-', '^', '~'];
    query
        .split_whitespace()
        .map(|token| {
            if token.chars().any(|c| SPECIAL.contains(&c)) {
                format!("\"{}\"", token.replace('"', "\"\""))
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// SQL storage engine: chunks/symbols/refs, commits/changes/chunk-history,
/// and the memory-journal search mirror, all behind one SQLite connection.
pub struct StorageEngine {
    conn: Connection,
}

impl StorageEngine {
    /// Open or create the database at `db_path`, applying the schema and
    /// registering the `cosine_distance` scalar function.
    pub fn open(db_path: &Path) -> IndexResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", "5000")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        register_cosine_distance(&conn)?;

        let engine = Self { conn };
        engine.conn.execute_batch(include_str!("schema.sql"))?;
        Ok(engine)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> IndexResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        register_cosine_distance(&conn)?;
        let engine = Self { conn };
        engine.conn.execute_batch(include_str!("schema.sql"))?;
        Ok(engine)
    }

    /// Raw connection access for callers that need it (journal/commits ingestors).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // -- FTS integrity --------------------------------------------------

    /// Probe `chunks_fts` against `chunks` by rowid.
    pub fn fts_health_check(&self) -> IndexResult<bool> {
        let result: rusqlite::Result<i64> = self.conn.query_row(
            "SELECT count(*) FROM chunks_fts JOIN chunks ON chunks.rowid = chunks_fts.rowid",
            [],
            |row| row.get(0),
        );
        Ok(result.is_ok())
    }

    /// Issue the FTS5 `rebuild` command.
    pub fn fts_rebuild(&self) -> IndexResult<()> {
        self.conn
            .execute("INSERT INTO chunks_fts(chunks_fts) VALUES ('rebuild')", [])
            .map_err(|e| IndexError::FtsCorruption {
                details: format!("rebuild failed: {e}"),
            })?;
        Ok(())
    }

    // -- Chunks -----------------------------------------------------------

    /// Insert or replace chunks and their embeddings (when present) in one transaction.
    pub fn upsert_chunks(&mut self, chunks: &[Chunk], embeddings: &[(String, Vec<f32>)]) -> IndexResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chunks
                 (id, file_path, language, content, chunk_kind, name, parent_name, start_line, end_line, content_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for c in chunks {
                stmt.execute(params![
                    c.id,
                    c.file_path,
                    c.language,
                    c.content,
                    c.chunk_kind.as_str(),
                    c.name,
                    c.parent_name,
                    c.start_line,
                    c.end_line,
                    c.content_hash,
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding, dims) VALUES (?1, ?2, ?3)",
            )?;
            for (chunk_id, vec) in embeddings {
                stmt.execute(params![chunk_id, encode_embedding(vec), vec.len() as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete all chunks (and cascading embeddings), symbols, and refs for a file.
    pub fn delete_file(&mut self, file_path: &str) -> IndexResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM chunks WHERE file_path = ?1", params![file_path])?;
        tx.execute("DELETE FROM symbols WHERE file_path = ?1", params![file_path])?;
        tx.execute("DELETE FROM refs WHERE file_path = ?1", params![file_path])?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_chunk(&self, id: &str) -> IndexResult<Option<Chunk>> {
        self.conn
            .query_row("SELECT * FROM chunks WHERE id = ?1", params![id], row_to_chunk)
            .optional()
            .map_err(IndexError::from)
    }

    /// Functions/methods above `min_lines`, longest first.
    pub fn find_long_functions(&self, min_lines: u32, limit: usize) -> IndexResult<Vec<Chunk>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM chunks WHERE chunk_kind IN ('function','method')
             AND (end_line - start_line + 1) >= ?1
             ORDER BY (end_line - start_line) DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![min_lines, limit as i64], row_to_chunk)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(IndexError::from)
    }

    // -- Symbols ------------------------------------------------------------

    pub fn upsert_symbols(&mut self, symbols: &[Symbol]) -> IndexResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO symbols
                 (id, name, kind, file_path, start_line, end_line, line_count, signature, visibility, doc_comment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for s in symbols {
                stmt.execute(params![
                    s.id,
                    s.name,
                    s.kind.as_str(),
                    s.file_path,
                    s.start_line,
                    s.end_line,
                    s.line_count,
                    s.signature,
                    s.visibility.as_str(),
                    s.doc_comment,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_symbol(&self, id: &str) -> IndexResult<Option<Symbol>> {
        self.conn
            .query_row("SELECT * FROM symbols WHERE id = ?1", params![id], row_to_symbol)
            .optional()
            .map_err(IndexError::from)
    }

    /// All symbols, used by the call-graph builder.
    pub fn get_all_symbols(&self) -> IndexResult<Vec<Symbol>> {
        let mut stmt = self.conn.prepare("SELECT * FROM symbols")?;
        let rows = stmt.query_map([], row_to_symbol)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(IndexError::from)
    }

    pub fn find_symbols(
        &self,
        name_pattern: &str,
        kind: Option<SymbolKind>,
        min_lines: u32,
        sort_by: SymbolSortBy,
        limit: usize,
    ) -> IndexResult<Vec<Symbol>> {
        let pattern = format!("%{name_pattern}%");
        let query = format!(
            "SELECT * FROM symbols WHERE name LIKE ?1 AND line_count >= ?2
             AND (?3 IS NULL OR kind = ?3)
             ORDER BY {} LIMIT ?4",
            sort_by.order_by_clause()
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(
            params![pattern, min_lines, kind.map(|k| k.as_str().to_string()), limit as i64],
            row_to_symbol,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(IndexError::from)
    }

    // -- References ----------------------------------------------------------

    pub fn upsert_references(&mut self, refs: &[Reference]) -> IndexResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO refs
                 (id, from_symbol, to_symbol, kind, file_path, line, is_external)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for r in refs {
                stmt.execute(params![
                    r.id,
                    r.from_symbol,
                    r.to_symbol,
                    r.kind.as_str(),
                    r.file_path,
                    r.line,
                    r.is_external as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All internal (non-external) references, used by the call-graph builder.
    pub fn get_internal_references(&self) -> IndexResult<Vec<Reference>> {
        let mut stmt = self.conn.prepare("SELECT * FROM refs WHERE is_external = 0")?;
        let rows = stmt.query_map([], row_to_reference)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(IndexError::from)
    }

    pub fn get_all_references(&self, limit: usize) -> IndexResult<Vec<Reference>> {
        let mut stmt = self.conn.prepare("SELECT * FROM refs LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], row_to_reference)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(IndexError::from)
    }

    pub fn find_references_by_kind(&self, kind: ReferenceKind, limit: usize) -> IndexResult<Vec<Reference>> {
        let mut stmt = self.conn.prepare("SELECT * FROM refs WHERE kind = ?1 LIMIT ?2")?;
        let rows = stmt.query_map(params![kind.as_str(), limit as i64], row_to_reference)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(IndexError::from)
    }

    /// §4.6: match `to_symbol` against the full id, bare name, heuristic
    /// `pkg.Name`, and a `LIKE '%.Name'` suffix.
    pub fn get_callers(&self, symbol_id: &str, name: &str, package: &str, limit: usize) -> IndexResult<Vec<Reference>> {
        let pkg_name = format!("{package}.{name}");
        let suffix = format!("%.{name}");
        let mut stmt = self.conn.prepare(
            "SELECT * FROM refs WHERE to_symbol IN (?1, ?2, ?3) OR to_symbol LIKE ?4
             GROUP BY id LIMIT ?5",
        )?;
        let rows = stmt.query_map(params![symbol_id, name, pkg_name, suffix, limit as i64], row_to_reference)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(IndexError::from)
    }

    /// §4.6: match `from_symbol` against the full id or bare name.
    pub fn get_callees(&self, symbol_id: &str, name: &str, limit: usize) -> IndexResult<Vec<Reference>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM refs WHERE from_symbol IN (?1, ?2) GROUP BY id LIMIT ?3")?;
        let rows = stmt.query_map(params![symbol_id, name, limit as i64], row_to_reference)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(IndexError::from)
    }

    // -- File cache / metadata ------------------------------------------------

    pub fn get_file_cache(&self, file_path: &str) -> IndexResult<Option<(String, String)>> {
        self.conn
            .query_row(
                "SELECT file_hash, config_hash FROM file_cache WHERE file_path = ?1",
                params![file_path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(IndexError::from)
    }

    pub fn set_file_cache(&self, file_path: &str, file_hash: &str, config_hash: &str) -> IndexResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO file_cache (file_path, file_hash, config_hash) VALUES (?1, ?2, ?3)",
            params![file_path, file_hash, config_hash],
        )?;
        Ok(())
    }

    pub fn get_metadata(&self) -> IndexResult<Option<IndexMetadata>> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = 'index_metadata'", [], |row| row.get(0))
            .optional()?;
        match value {
            Some(v) => serde_json::from_str(&v)
                .map(Some)
                .map_err(|e| IndexError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn set_metadata(&self, metadata: &IndexMetadata) -> IndexResult<()> {
        let value = serde_json::to_string(metadata).map_err(|e| IndexError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('index_metadata', ?1)",
            params![value],
        )?;
        Ok(())
    }

    /// Drop and recreate embedding tables when the configured dimensionality
    /// no longer matches what was last persisted. Non-concurrent; the caller
    /// must quiesce writers before calling this.
    pub fn ensure_embedding_dimensions(&mut self, dims: usize) -> IndexResult<()> {
        let prior = self.get_metadata()?.map(|m| m.embedding_dimensions);
        if prior == Some(dims) || prior.is_none() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for table in ["chunk_embeddings", "commit_embeddings", "change_embeddings", "memory_embeddings", "todo_embeddings"] {
            tx.execute(&format!("DELETE FROM {table}"), [])?;
        }
        tx.commit()?;
        Ok(())
    }

    // -- Search -----------------------------------------------------------

    /// Top-`k` chunks by ascending cosine distance (`score = 1 - distance`, clamped to `[0, 1]`).
    pub fn vector_search(&self, query_vec: &[f32], filters: &SearchFilters, k: usize) -> IndexResult<Vec<SearchResult>> {
        let query_blob = encode_embedding(query_vec);
        let (filter_sql, filter_params) = build_filter_sql(filters);
        let sql = format!(
            "SELECT chunks.*, cosine_distance(chunk_embeddings.embedding, ?) AS dist
             FROM chunk_embeddings JOIN chunks ON chunks.id = chunk_embeddings.chunk_id
             WHERE 1=1 {filter_sql}
             ORDER BY dist ASC LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&query_blob];
        for p in &filter_params {
            params_vec.push(p.as_ref());
        }
        let k_i64 = k as i64;
        params_vec.push(&k_i64);
        let rows = stmt.query_map(params_vec.as_slice(), |row| {
            let chunk = row_to_chunk(row)?;
            let dist: f64 = row.get("dist")?;
            Ok((chunk, dist))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (chunk, dist) = row?;
            let score = (1.0 - dist).clamp(0.0, 1.0);
            out.push(SearchResult {
                chunk,
                score,
                vector_score: Some(score),
                bm25_score: None,
            });
        }
        Ok(out)
    }

    /// Top-`k` chunks by ascending `bm25()`, normalized to `1 / (1 + |raw|)`.
    pub fn bm25_search(&self, query_text: &str, filters: &SearchFilters, k: usize) -> IndexResult<Vec<SearchResult>> {
        let escaped = escape_fts_query(query_text);
        let (filter_sql, filter_params) = build_filter_sql(filters);
        let sql = format!(
            "SELECT chunks.*, bm25(chunks_fts) AS raw_score
             FROM chunks_fts JOIN chunks ON chunks.rowid = chunks_fts.rowid
             WHERE chunks_fts MATCH ? {filter_sql}
             ORDER BY raw_score ASC LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(|e| IndexError::FtsCorruption {
            details: e.to_string(),
        })?;
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&escaped];
        for p in &filter_params {
            params_vec.push(p.as_ref());
        }
        let k_i64 = k as i64;
        params_vec.push(&k_i64);
        let rows = stmt
            .query_map(params_vec.as_slice(), |row| {
                let chunk = row_to_chunk(row)?;
                let raw: f64 = row.get("raw_score")?;
                Ok((chunk, raw))
            })
            .map_err(|e| IndexError::FtsCorruption { details: e.to_string() })?;
        let mut out = Vec::new();
        for row in rows {
            let (chunk, raw) = row.map_err(|e| IndexError::FtsCorruption { details: e.to_string() })?;
            let score = 1.0 / (1.0 + raw.abs());
            out.push(SearchResult {
                chunk,
                score,
                vector_score: None,
                bm25_score: Some(score),
            });
        }
        Ok(out)
    }

    /// Merge vector and BM25 legs: `score = vector_score * w_v + bm25_score * w_b`.
    /// Falls back to vector-only if BM25 is unavailable (FTS corruption) and
    /// vector results exist.
    pub fn hybrid_search(
        &self,
        query_text: &str,
        query_vec: &[f32],
        filters: &SearchFilters,
        k: usize,
        vector_weight: f64,
        bm25_weight: f64,
        oversample_factor: usize,
    ) -> IndexResult<Vec<SearchResult>> {
        let oversampled = k * oversample_factor.max(1);
        let vector_hits = self.vector_search(query_vec, filters, oversampled)?;
        let bm25_hits = match self.bm25_search(query_text, filters, oversampled) {
            Ok(hits) => hits,
            Err(IndexError::FtsCorruption { .. }) if !vector_hits.is_empty() => {
                let mut sorted = vector_hits;
                sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                sorted.truncate(k);
                return Ok(sorted);
            }
            Err(e) => return Err(e),
        };

        let mut merged: std::collections::HashMap<String, SearchResult> = std::collections::HashMap::new();
        for hit in vector_hits {
            merged.insert(hit.chunk.id.clone(), hit);
        }
        for hit in bm25_hits {
            merged
                .entry(hit.chunk.id.clone())
                .and_modify(|existing| existing.bm25_score = hit.bm25_score)
                .or_insert(hit);
        }

        let mut results: Vec<SearchResult> = merged
            .into_values()
            .map(|mut r| {
                let v = r.vector_score.unwrap_or(0.0);
                let b = r.bm25_score.unwrap_or(0.0);
                r.score = v * vector_weight + b * bm25_weight;
                r
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        Ok(results)
    }

    // -- Git history (§4.11) ------------------------------------------------

    pub fn insert_commit(&self, commit: &Commit) -> IndexResult<()> {
        let files_changed: Vec<&str> = commit.numstat.iter().map(|(f, _, _)| f.as_str()).collect();
        let files_json = serde_json::to_string(&files_changed).map_err(|e| IndexError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO commits (hash, parent, author, date, message, files_changed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![commit.hash, commit.parent, commit.author, commit.date, commit.message, files_json],
        )?;
        Ok(())
    }

    pub fn insert_change(&self, change: &Change) -> IndexResult<()> {
        let functions_json =
            serde_json::to_string(&change.affected_functions).map_err(|e| IndexError::Serialization(e.to_string()))?;
        let chunks_json =
            serde_json::to_string(&change.affected_chunk_ids).map_err(|e| IndexError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO changes (commit_hash, kind, file_path, old_path, diff_text, affected_functions, affected_chunk_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                change.commit_hash,
                change_kind_str(change.kind),
                change.file_path,
                change.old_path,
                change.diff_text,
                functions_json,
                chunks_json,
            ],
        )?;
        Ok(())
    }

    pub fn insert_chunk_history(&self, entry: &ChunkHistoryEntry) -> IndexResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO chunk_history (chunk_id, commit_hash, kind) VALUES (?1, ?2, ?3)",
            params![entry.chunk_id, entry.commit_hash, change_kind_str(entry.kind)],
        )?;
        Ok(())
    }

    /// `LIKE` scan over the JSON `files_changed` column (§4.11: acceptable at
    /// this peripheral-feature depth; no separate join table).
    pub fn find_commits_for_file(&self, file_path: &str, limit: usize) -> IndexResult<Vec<Commit>> {
        let pattern = format!("%\"{file_path}\"%");
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM commits WHERE files_changed LIKE ?1 ORDER BY date DESC LIMIT ?2")?;
        let rows = stmt.query_map(params![pattern, limit as i64], row_to_commit)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(IndexError::from)
    }

    /// All file-level `Change` rows for one commit, in `file_path` order.
    /// The read path `commits.rs`'s module doc promises: answering "what
    /// changed here" without re-shelling to git.
    pub fn find_changes_for_commit(&self, commit_hash: &str) -> IndexResult<Vec<Change>> {
        let mut stmt = self.conn.prepare("SELECT * FROM changes WHERE commit_hash = ?1 ORDER BY file_path")?;
        let rows = stmt.query_map(params![commit_hash], row_to_change)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(IndexError::from)
    }

    // -- Memory journal search mirror (§4.13-§4.14) --------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn upsert_memory_entry(
        &self,
        id: &str,
        kind: &str,
        text: &str,
        tags: &[String],
        importance: f32,
        created_at_unix: i64,
        related_chunk_ids: &[String],
        embedding: Option<&[f32]>,
    ) -> IndexResult<()> {
        let tags_json = serde_json::to_string(tags).map_err(|e| IndexError::Serialization(e.to_string()))?;
        let related_json =
            serde_json::to_string(related_chunk_ids).map_err(|e| IndexError::Serialization(e.to_string()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO memory_entries (id, kind, text, tags, importance, created_at_unix, related_chunk_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, kind, text, tags_json, importance, created_at_unix, related_json],
        )?;
        if let Some(vec) = embedding {
            self.conn.execute(
                "INSERT OR REPLACE INTO memory_embeddings (memory_id, embedding, dims) VALUES (?1, ?2, ?3)",
                params![id, encode_embedding(vec), vec.len() as i64],
            )?;
        }
        Ok(())
    }

    /// Hybrid search over commits, changes, or memory entries — the same
    /// vector-plus-BM25 machinery `hybrid_search` uses over chunks,
    /// parameterized per entity kind, with the combined score further
    /// multiplied by a recency factor `exp(-age_days / half_life_days)` and,
    /// for memory entries only, by `importance` (§4.14).
    pub fn hybrid_search_entity(
        &self,
        kind: SearchEntityKind,
        query_text: &str,
        query_vec: &[f32],
        now_unix: i64,
        half_life_days: f64,
        k: usize,
    ) -> IndexResult<Vec<(String, f64)>> {
        let escaped = escape_fts_query(query_text);
        let query_blob = encode_embedding(query_vec);
        let oversample = (k * 3) as i64;

        let vector_scores = self.entity_vector_scores(kind, &query_blob, oversample)?;
        let bm25_scores = self.entity_bm25_scores(kind, &escaped, oversample)?;

        let mut ids: std::collections::HashSet<String> = vector_scores.keys().cloned().collect();
        ids.extend(bm25_scores.keys().cloned());

        let mut out = Vec::new();
        for id in ids {
            let v = vector_scores.get(&id).copied().unwrap_or(0.0);
            let b = bm25_scores.get(&id).copied().unwrap_or(0.0);
            let base = v * 0.7 + b * 0.3;
            let age_days = self.entity_age_days(kind, &id, now_unix)?;
            let recency = (-age_days / half_life_days.max(1e-6)).exp();
            let importance = self.entity_importance(kind, &id)?;
            out.push((id, base * recency * importance));
        }
        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(k);
        Ok(out)
    }

    fn entity_vector_scores(
        &self,
        kind: SearchEntityKind,
        query_blob: &[u8],
        limit: i64,
    ) -> IndexResult<std::collections::HashMap<String, f64>> {
        let (table, id_expr) = match kind {
            SearchEntityKind::Commit => ("commit_embeddings", "commit_hash"),
            SearchEntityKind::Change => ("change_embeddings", "commit_hash || ':' || file_path"),
            SearchEntityKind::Memory => ("memory_embeddings", "memory_id"),
        };
        let sql = format!("SELECT {id_expr} AS id, cosine_distance(embedding, ?1) AS dist FROM {table} ORDER BY dist ASC LIMIT ?2");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![query_blob, limit], |row| {
            let id: String = row.get(0)?;
            let dist: f64 = row.get(1)?;
            Ok((id, (1.0 - dist).clamp(0.0, 1.0)))
        })?;
        let mut out = std::collections::HashMap::new();
        for row in rows {
            let (id, score) = row?;
            out.insert(id, score);
        }
        Ok(out)
    }

    fn entity_bm25_scores(
        &self,
        kind: SearchEntityKind,
        escaped_query: &str,
        limit: i64,
    ) -> IndexResult<std::collections::HashMap<String, f64>> {
        let (fts_table, base_table, id_expr, join_on) = match kind {
            SearchEntityKind::Commit => ("commits_fts", "commits", "commits.hash", "commits.rowid = commits_fts.rowid"),
            SearchEntityKind::Change => (
                "changes_fts",
                "changes",
                "changes.commit_hash || ':' || changes.file_path",
                "changes.rowid = changes_fts.rowid",
            ),
            SearchEntityKind::Memory => (
                "memory_fts",
                "memory_entries",
                "memory_entries.id",
                "memory_entries.rowid = memory_fts.rowid",
            ),
        };
        let sql = format!(
            "SELECT {id_expr} AS id, bm25({fts_table}) AS raw FROM {fts_table}
             JOIN {base_table} ON {join_on}
             WHERE {fts_table} MATCH ?1 ORDER BY raw ASC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut out = std::collections::HashMap::new();
        if let Ok(rows) = stmt.query_map(params![escaped_query, limit], |row| {
            let id: String = row.get(0)?;
            let raw: f64 = row.get(1)?;
            Ok((id, 1.0 / (1.0 + raw.abs())))
        }) {
            for row in rows.flatten() {
                out.insert(row.0, row.1);
            }
        }
        Ok(out)
    }

    fn entity_age_days(&self, kind: SearchEntityKind, id: &str, now_unix: i64) -> IndexResult<f64> {
        let created_at_unix: i64 = match kind {
            SearchEntityKind::Commit => {
                self.conn
                    .query_row("SELECT unixepoch(date) FROM commits WHERE hash = ?1", params![id], |row| row.get(0))?
            }
            SearchEntityKind::Change => {
                let commit_hash = id.split_once(':').map_or(id, |(hash, _)| hash);
                self.conn.query_row(
                    "SELECT unixepoch(date) FROM commits WHERE hash = ?1",
                    params![commit_hash],
                    |row| row.get(0),
                )?
            }
            SearchEntityKind::Memory => self.conn.query_row(
                "SELECT created_at_unix FROM memory_entries WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?,
        };
        Ok(((now_unix - created_at_unix).max(0) as f64) / 86400.0)
    }

    fn entity_importance(&self, kind: SearchEntityKind, id: &str) -> IndexResult<f64> {
        if kind != SearchEntityKind::Memory {
            return Ok(1.0);
        }
        self.conn
            .query_row("SELECT importance FROM memory_entries WHERE id = ?1", params![id], |row| row.get(0))
            .map_err(IndexError::from)
    }

    /// Look up a cached blame result, if present, as its raw JSON entries.
    pub fn get_blame_cache(&self, file_path: &str, line_range_hash: &str) -> IndexResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT entries_json FROM blame_cache WHERE file_path = ?1 AND line_range_hash = ?2",
                params![file_path, line_range_hash],
                |row| row.get(0),
            )
            .optional()
            .map_err(IndexError::from)
    }

    /// Upsert a blame result, keyed by `(file_path, line_range_hash)`.
    pub fn set_blame_cache(
        &self,
        file_path: &str,
        line_range_hash: &str,
        start_line: u32,
        end_line: u32,
        entries_json: &str,
    ) -> IndexResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO blame_cache (file_path, line_range_hash, start_line, end_line, entries_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![file_path, line_range_hash, start_line, end_line, entries_json],
        )?;
        Ok(())
    }
}

fn register_cosine_distance(conn: &Connection) -> IndexResult<()> {
    conn.create_scalar_function(
        "cosine_distance",
        2,
        FunctionFlags::SQLITE_DETERMINISTIC | FunctionFlags::SQLITE_UTF8,
        move |ctx| {
            let a: Vec<u8> = ctx.get(0)?;
            let b: Vec<u8> = ctx.get(1)?;
            let va = decode_embedding(&a);
            let vb = decode_embedding(&b);
            Ok(1.0 - cosine_similarity(&va, &vb))
        },
    )?;
    Ok(())
}

fn build_filter_sql(filters: &SearchFilters) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
    let mut sql = String::new();
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    if !filters.languages.is_empty() {
        let placeholders = filters.languages.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        sql.push_str(&format!(" AND chunks.language IN ({placeholders})"));
        for l in &filters.languages {
            params_vec.push(Box::new(l.clone()));
        }
    }
    if !filters.chunk_kinds.is_empty() {
        let placeholders = filters.chunk_kinds.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        sql.push_str(&format!(" AND chunks.chunk_kind IN ({placeholders})"));
        for k in &filters.chunk_kinds {
            params_vec.push(Box::new(k.as_str().to_string()));
        }
    }
    (sql, params_vec)
}

fn change_kind_str(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Added => "added",
        ChangeKind::Modified => "modified",
        ChangeKind::Deleted => "deleted",
        ChangeKind::Renamed => "renamed",
    }
}

fn change_kind_from_str(s: &str) -> ChangeKind {
    match s {
        "added" => ChangeKind::Added,
        "deleted" => ChangeKind::Deleted,
        "renamed" => ChangeKind::Renamed,
        _ => ChangeKind::Modified,
    }
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get("id")?,
        file_path: row.get("file_path")?,
        language: row.get("language")?,
        content: row.get("content")?,
        chunk_kind: ChunkKind::from_str_lossy(&row.get::<_, String>("chunk_kind")?),
        name: row.get("name")?,
        parent_name: row.get("parent_name")?,
        start_line: row.get("start_line")?,
        end_line: row.get("end_line")?,
        content_hash: row.get("content_hash")?,
    })
}

fn row_to_symbol(row: &Row<'_>) -> rusqlite::Result<Symbol> {
    Ok(Symbol {
        id: row.get("id")?,
        name: row.get("name")?,
        kind: SymbolKind::from_str_lossy(&row.get::<_, String>("kind")?),
        file_path: row.get("file_path")?,
        start_line: row.get("start_line")?,
        end_line: row.get("end_line")?,
        line_count: row.get("line_count")?,
        signature: row.get("signature")?,
        visibility: Visibility::from_str_lossy(&row.get::<_, String>("visibility")?),
        doc_comment: row.get("doc_comment")?,
    })
}

fn row_to_reference(row: &Row<'_>) -> rusqlite::Result<Reference> {
    Ok(Reference {
        id: row.get("id")?,
        from_symbol: row.get("from_symbol")?,
        to_symbol: row.get("to_symbol")?,
        kind: ReferenceKind::from_str_lossy(&row.get::<_, String>("kind")?),
        file_path: row.get("file_path")?,
        line: row.get("line")?,
        is_external: row.get::<_, i64>("is_external")? != 0,
    })
}

fn row_to_commit(row: &Row<'_>) -> rusqlite::Result<Commit> {
    let files_json: String = row.get("files_changed")?;
    let files: Vec<String> = serde_json::from_str(&files_json).unwrap_or_default();
    Ok(Commit {
        hash: row.get("hash")?,
        parent: row.get("parent")?,
        author: row.get("author")?,
        date: row.get("date")?,
        message: row.get("message")?,
        numstat: files.into_iter().map(|f| (f, 0, 0)).collect(),
    })
}

fn row_to_change(row: &Row<'_>) -> rusqlite::Result<Change> {
    let functions_json: String = row.get("affected_functions")?;
    let chunks_json: String = row.get("affected_chunk_ids")?;
    Ok(Change {
        commit_hash: row.get("commit_hash")?,
        kind: change_kind_from_str(&row.get::<_, String>("kind")?),
        file_path: row.get("file_path")?,
        old_path: row.get("old_path")?,
        diff_text: row.get("diff_text")?,
        affected_functions: serde_json::from_str(&functions_json).unwrap_or_default(),
        affected_chunk_ids: serde_json::from_str(&chunks_json).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkKind;

    fn sample_chunk(id: &str, file_path: &str, language: &str, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            file_path: file_path.to_string(),
            language: language.to_string(),
            content: content.to_string(),
            chunk_kind: ChunkKind::Function,
            name: "foo".to_string(),
            parent_name: None,
            start_line: 1,
            end_line: 3,
            content_hash: crate::types::sha256_hex(content.as_bytes()),
        }
    }

    #[test]
    fn open_creates_schema_and_passes_integrity() {
        let engine = StorageEngine::open_in_memory().expect("open");
        assert!(engine.fts_health_check().expect("health check"));
    }

    #[test]
    fn upsert_and_get_chunk_round_trips() {
        let mut engine = StorageEngine::open_in_memory().expect("open");
        let chunk = sample_chunk("a.go:1:aaaaaaaa", "a.go", "go", "func foo() {}");
        engine.upsert_chunks(&[chunk.clone()], &[]).expect("upsert");
        let fetched = engine.get_chunk(&chunk.id).expect("get").expect("present");
        assert_eq!(fetched.name, "foo");
    }

    #[test]
    fn delete_file_removes_chunk() {
        let mut engine = StorageEngine::open_in_memory().expect("open");
        let chunk = sample_chunk("a.go:1:aaaaaaaa", "a.go", "go", "func foo() {}");
        engine.upsert_chunks(&[chunk.clone()], &[]).expect("upsert");
        engine.delete_file("a.go").expect("delete");
        assert!(engine.get_chunk(&chunk.id).expect("get").is_none());
    }

    #[test]
    fn vector_search_ranks_closer_embedding_first() {
        let mut engine = StorageEngine::open_in_memory().expect("open");
        let a = sample_chunk("a:1:aaaaaaaa", "a.go", "go", "alpha");
        let b = sample_chunk("b:1:bbbbbbbb", "b.go", "go", "beta");
        engine
            .upsert_chunks(&[a.clone(), b.clone()], &[(a.id.clone(), vec![1.0, 0.0]), (b.id.clone(), vec![0.0, 1.0])])
            .expect("upsert");
        let results = engine.vector_search(&[1.0, 0.0], &SearchFilters::default(), 2).expect("search");
        assert_eq!(results[0].chunk.id, a.id);
    }

    #[test]
    fn bm25_search_finds_matching_content() {
        let mut engine = StorageEngine::open_in_memory().expect("open");
        let chunk = sample_chunk("a:1:aaaaaaaa", "a.go", "go", "func handleLogin() {}");
        engine.upsert_chunks(&[chunk.clone()], &[]).expect("upsert");
        let results = engine.bm25_search("handleLogin", &SearchFilters::default(), 5).expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, chunk.id);
    }

    #[test]
    fn hybrid_search_weights_vector_over_bm25_per_defaults() {
        let mut engine = StorageEngine::open_in_memory().expect("open");
        let a = sample_chunk("a:1:aaaaaaaa", "a.go", "go", "vector leaning chunk");
        let b = sample_chunk("b:1:bbbbbbbb", "b.go", "go", "bm25 leaning chunk unique_term_xyz");
        engine
            .upsert_chunks(&[a.clone(), b.clone()], &[(a.id.clone(), vec![1.0, 0.0]), (b.id.clone(), vec![0.0, 0.01])])
            .expect("upsert");
        let results = engine
            .hybrid_search("unique_term_xyz", &[1.0, 0.0], &SearchFilters::default(), 2, 0.7, 0.3, 3)
            .expect("search");
        assert!(!results.is_empty());
    }

    fn sample_symbol(id: &str, name: &str, file_path: &str, start_line: u32, line_count: u32) -> Symbol {
        Symbol {
            id: id.to_string(),
            name: name.to_string(),
            kind: SymbolKind::Function,
            file_path: file_path.to_string(),
            start_line,
            end_line: start_line + line_count - 1,
            line_count,
            signature: None,
            visibility: Visibility::Public,
            doc_comment: None,
        }
    }

    #[test]
    fn find_symbols_sorts_by_line_count_by_default() {
        let mut engine = StorageEngine::open_in_memory().expect("open");
        engine
            .upsert_symbols(&[
                sample_symbol("a", "foo_a", "a.go", 1, 5),
                sample_symbol("b", "foo_b", "b.go", 1, 20),
            ])
            .expect("upsert");
        let results = engine.find_symbols("foo", None, 0, SymbolSortBy::LineCount, 10).expect("find");
        assert_eq!(results[0].id, "b");
        assert_eq!(results[1].id, "a");
    }

    #[test]
    fn find_symbols_sorts_by_name_ascending() {
        let mut engine = StorageEngine::open_in_memory().expect("open");
        engine
            .upsert_symbols(&[
                sample_symbol("a", "zeta", "a.go", 1, 5),
                sample_symbol("b", "alpha", "b.go", 1, 5),
            ])
            .expect("upsert");
        let results = engine.find_symbols("", None, 0, SymbolSortBy::Name, 10).expect("find");
        assert_eq!(results[0].name, "alpha");
        assert_eq!(results[1].name, "zeta");
    }

    #[test]
    fn find_symbols_sorts_by_file_path() {
        let mut engine = StorageEngine::open_in_memory().expect("open");
        engine
            .upsert_symbols(&[
                sample_symbol("a", "foo", "z.go", 1, 5),
                sample_symbol("b", "bar", "a.go", 1, 5),
            ])
            .expect("upsert");
        let results = engine.find_symbols("", None, 0, SymbolSortBy::FilePath, 10).expect("find");
        assert_eq!(results[0].file_path, "a.go");
        assert_eq!(results[1].file_path, "z.go");
    }

    #[test]
    fn filter_by_language_excludes_other_languages() {
        let mut engine = StorageEngine::open_in_memory().expect("open");
        let go_chunk = sample_chunk("a:1:aaaaaaaa", "a.go", "go", "func foo() {}");
        let py_chunk = sample_chunk("b:1:bbbbbbbb", "b.py", "python", "def foo(): pass");
        engine
            .upsert_chunks(
                &[go_chunk.clone(), py_chunk.clone()],
                &[(go_chunk.id.clone(), vec![1.0, 0.0]), (py_chunk.id.clone(), vec![1.0, 0.0])],
            )
            .expect("upsert");
        let filters = SearchFilters {
            languages: vec!["go".to_string()],
            chunk_kinds: vec![],
        };
        let results = engine.vector_search(&[1.0, 0.0], &filters, 10).expect("search");
        assert!(results.iter().all(|r| r.chunk.language == "go"));
    }

    #[test]
    fn get_callers_matches_bare_name_and_suffix() {
        let mut engine = StorageEngine::open_in_memory().expect("open");
        let reference = Reference {
            id: "a.go:3:call:pkg.Foo".to_string(),
            from_symbol: "Bar".to_string(),
            to_symbol: "pkg.Foo".to_string(),
            kind: ReferenceKind::Call,
            file_path: "a.go".to_string(),
            line: 3,
            is_external: false,
        };
        engine.upsert_references(&[reference]).expect("upsert");
        let callers = engine.get_callers("x.go:Foo:1", "Foo", "x", 10).expect("callers");
        assert_eq!(callers.len(), 1);
    }

    #[test]
    fn find_commits_for_file_matches_json_array() {
        let engine = StorageEngine::open_in_memory().expect("open");
        let commit = Commit {
            hash: "abc123".to_string(),
            parent: None,
            author: "dev".to_string(),
            date: "2026-01-01".to_string(),
            message: "init".to_string(),
            numstat: vec![("src/main.rs".to_string(), 10, 0)],
        };
        engine.insert_commit(&commit).expect("insert");
        let found = engine.find_commits_for_file("src/main.rs", 10).expect("find");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].hash, "abc123");
    }

    #[test]
    fn find_changes_for_commit_round_trips() {
        let engine = StorageEngine::open_in_memory().expect("open");
        let commit = Commit {
            hash: "abc123".to_string(),
            parent: None,
            author: "dev".to_string(),
            date: "2026-01-01".to_string(),
            message: "init".to_string(),
            numstat: vec![("src/main.rs".to_string(), 10, 0)],
        };
        engine.insert_commit(&commit).expect("insert commit");
        let change = Change {
            commit_hash: "abc123".to_string(),
            kind: ChangeKind::Modified,
            file_path: "src/main.rs".to_string(),
            old_path: None,
            diff_text: "+ fn helper() {}".to_string(),
            affected_functions: vec!["helper".to_string()],
            affected_chunk_ids: vec![],
        };
        engine.insert_change(&change).expect("insert change");

        let found = engine.find_changes_for_commit("abc123").expect("find");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_path, "src/main.rs");
        assert_eq!(found[0].kind, ChangeKind::Modified);
        assert_eq!(found[0].affected_functions, vec!["helper".to_string()]);
    }

    #[test]
    fn hybrid_search_entity_finds_commits_by_message() {
        let engine = StorageEngine::open_in_memory().expect("open");
        engine
            .insert_commit(&Commit {
                hash: "abc123".to_string(),
                parent: None,
                author: "dev".to_string(),
                date: "2026-01-01".to_string(),
                message: "fix unique_login_bug".to_string(),
                numstat: vec![],
            })
            .expect("insert commit");

        let results = engine
            .hybrid_search_entity(SearchEntityKind::Commit, "unique_login_bug", &[], 1_800_000_000, 30.0, 5)
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "abc123");
    }

    #[test]
    fn hybrid_search_entity_finds_changes_by_diff_text() {
        let engine = StorageEngine::open_in_memory().expect("open");
        engine
            .insert_commit(&Commit {
                hash: "abc123".to_string(),
                parent: None,
                author: "dev".to_string(),
                date: "2026-01-01".to_string(),
                message: "init".to_string(),
                numstat: vec![],
            })
            .expect("insert commit");
        engine
            .insert_change(&Change {
                commit_hash: "abc123".to_string(),
                kind: ChangeKind::Modified,
                file_path: "src/main.rs".to_string(),
                old_path: None,
                diff_text: "+ unique_diff_marker_xyz".to_string(),
                affected_functions: vec![],
                affected_chunk_ids: vec![],
            })
            .expect("insert change");

        let results = engine
            .hybrid_search_entity(SearchEntityKind::Change, "unique_diff_marker_xyz", &[], 1_800_000_000, 30.0, 5)
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "abc123:src/main.rs");
    }

    #[test]
    fn hybrid_search_entity_weighs_memory_importance() {
        let engine = StorageEngine::open_in_memory().expect("open");
        engine
            .upsert_memory_entry("m1", "note", "remember the unique_recall_term", &[], 1.0, 1_800_000_000, &[], None)
            .expect("upsert important");
        engine
            .upsert_memory_entry("m2", "note", "also mentions unique_recall_term", &[], 0.1, 1_800_000_000, &[], None)
            .expect("upsert unimportant");

        let results = engine
            .hybrid_search_entity(SearchEntityKind::Memory, "unique_recall_term", &[], 1_800_000_000, 30.0, 5)
            .expect("search");
        assert_eq!(results[0].0, "m1");
    }

    #[test]
    fn escape_fts_query_quotes_special_characters() {
        assert_eq!(escape_fts_query("plain words"), "plain words");
        assert_eq!(escape_fts_query("weird-term"), "\"weird-term\"");
    }
}
