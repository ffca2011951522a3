//! Incremental indexer (§4.7): scan -> filter -> chunk -> embed -> persist.
//!
//! Scanning and chunking are CPU-bound and run synchronously (chunking
//! fans out across a rayon pool, one `ChunkingStrategy` per call site rather
//! than a shared parser — tree-sitter parsers aren't `Send`, so nothing
//! about this design needs them to be). Embedding is the only phase that
//! talks to the network, so it's the only `await` point; it runs after all
//! files for this pass have been chunked, batched by the provider's
//! declared `max_batch_size`.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::chunker::{ChunkingStrategy, TreeSitterChunker};
use crate::config::{Config, IndexingConfig};
use crate::embedder::{build_provider, EmbeddingProvider};
use crate::error::{IndexError, IndexResult};
use crate::index::StorageEngine;
use crate::types::{
    Chunk, IndexMetadata, IndexPhase, IndexProgress, Reference, SourceFile, Symbol,
};

/// Delivered after each file or batch; not guaranteed at any fixed cadence.
pub type ProgressCallback = Box<dyn Fn(IndexProgress) + Send + Sync>;

/// Summary of one `Indexer::run` pass.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_processed: usize,
    pub files_skipped_unchanged: usize,
    pub files_failed: usize,
    pub chunks_created: usize,
    pub symbols_extracted: usize,
    pub references_extracted: usize,
    pub embeddings_generated: usize,
}

/// Owns the storage engine, embedding provider, and chunking strategy for
/// one repository, and drives a full or incremental indexing pass.
pub struct Indexer {
    config: Config,
    storage: StorageEngine,
    provider: Box<dyn EmbeddingProvider>,
    strategy: Box<dyn ChunkingStrategy>,
}

struct ChunkedFile {
    file_path: String,
    file_hash: String,
    chunks: Vec<Chunk>,
    symbols: Vec<Symbol>,
    references: Vec<Reference>,
}

impl Indexer {
    pub fn new(config: Config) -> IndexResult<Self> {
        std::fs::create_dir_all(config.data_dir())?;
        let storage = StorageEngine::open(&config.database_path())?;
        let provider = build_provider(&config.embedding)?;
        let strategy: Box<dyn ChunkingStrategy> = Box::new(TreeSitterChunker::new(config.indexing.max_chunk_bytes()));
        Ok(Self {
            config,
            storage,
            provider,
            strategy,
        })
    }

    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut StorageEngine {
        &mut self.storage
    }

    /// Run one indexing pass. `force` bypasses the file-cache short-circuit
    /// and reprocesses every scanned file.
    pub async fn run(
        &mut self,
        force: bool,
        progress: Option<ProgressCallback>,
        cancellation: &CancellationToken,
    ) -> IndexResult<IndexReport> {
        let mut report = IndexReport::default();
        let config_hash = self.config.config_hash();

        report_progress(&progress, IndexPhase::Scanning, 0, 0, 0, 0, None);
        let files = scan_files(&self.config.repo_path, &self.config.indexing)?;
        report.files_scanned = files.len();
        tracing::info!(files = files.len(), "scan complete");

        if cancellation.is_cancelled() {
            return Err(IndexError::Cancelled { reason: "cancelled during scan".into() });
        }

        self.storage.ensure_embedding_dimensions(self.provider.dimensions())?;

        let to_process: Vec<PathBuf> = files
            .into_iter()
            .filter(|path| {
                let rel = relative_path(&self.config.repo_path, path);
                if force {
                    return true;
                }
                match self.storage.get_file_cache(&rel) {
                    Ok(Some((hash, cached_config_hash))) => {
                        let current_hash = std::fs::read(path)
                            .map(|bytes| crate::types::sha256_hex(&bytes))
                            .unwrap_or_default();
                        !(hash == current_hash && cached_config_hash == config_hash)
                    }
                    _ => true,
                }
            })
            .collect();
        report.files_skipped_unchanged = report.files_scanned - to_process.len();

        report_progress(&progress, IndexPhase::Chunking, to_process.len(), 0, 0, 0, None);
        let strategy = self.strategy.as_ref();
        let repo_path = self.config.repo_path.clone();
        let cancel_flag = cancellation.clone();
        let worker_pool = build_worker_pool(self.config.indexing.resolved_workers())?;
        let results: Vec<IndexResult<ChunkedFile>> = worker_pool.install(|| {
            to_process
                .par_iter()
                .map(|path| {
                    if cancel_flag.is_cancelled() {
                        return Err(IndexError::Cancelled { reason: "cancelled during chunking".into() });
                    }
                    chunk_one_file(&repo_path, path, strategy)
                })
                .collect()
        });

        let mut chunked_files = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(cf) => {
                    report.files_processed += 1;
                    report.chunks_created += cf.chunks.len();
                    report.symbols_extracted += cf.symbols.len();
                    report.references_extracted += cf.references.len();
                    chunked_files.push(cf);
                }
                Err(IndexError::Cancelled { reason }) => return Err(IndexError::Cancelled { reason }),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to process file");
                    report.files_failed += 1;
                }
            }
        }

        if cancellation.is_cancelled() {
            return Err(IndexError::Cancelled { reason: "cancelled before embedding".into() });
        }

        report_progress(&progress, IndexPhase::Embedding, chunked_files.len(), chunked_files.len(), report.chunks_created, 0, None);
        let embeddings = if self.provider.is_available() {
            self.embed_chunks(&chunked_files, cancellation).await?
        } else {
            tracing::warn!(provider = self.provider.name(), "embedding provider unavailable, indexing keyword-only");
            Vec::new()
        };
        report.embeddings_generated = embeddings.len();

        report_progress(&progress, IndexPhase::Storing, chunked_files.len(), chunked_files.len(), report.chunks_created, report.chunks_created, None);
        self.persist(&chunked_files, &embeddings, &config_hash)?;

        tracing::info!(
            processed = report.files_processed,
            skipped = report.files_skipped_unchanged,
            failed = report.files_failed,
            chunks = report.chunks_created,
            embeddings = report.embeddings_generated,
            "indexing pass complete"
        );
        Ok(report)
    }

    async fn embed_chunks(&self, files: &[ChunkedFile], cancellation: &CancellationToken) -> IndexResult<Vec<(String, Vec<f32>)>> {
        let texts: Vec<(String, String)> = files
            .iter()
            .flat_map(|f| f.chunks.iter().map(|c| (c.id.clone(), format_chunk_for_embedding(c))))
            .collect();

        let batch_size = self.provider.max_batch_size().max(1);
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            if cancellation.is_cancelled() {
                return Err(IndexError::Cancelled { reason: "cancelled during embedding".into() });
            }
            let inputs: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let vectors = self.provider.embed(&inputs).await?;
            for ((id, _), vector) in batch.iter().zip(vectors) {
                out.push((id.clone(), vector));
            }
        }
        Ok(out)
    }

    fn persist(&mut self, files: &[ChunkedFile], embeddings: &[(String, Vec<f32>)], config_hash: &str) -> IndexResult<()> {
        for file in files {
            self.storage.delete_file(&file.file_path)?;
        }
        let all_chunks: Vec<Chunk> = files.iter().flat_map(|f| f.chunks.clone()).collect();
        self.storage.upsert_chunks(&all_chunks, embeddings)?;
        let all_symbols: Vec<Symbol> = files.iter().flat_map(|f| f.symbols.clone()).collect();
        self.storage.upsert_symbols(&all_symbols)?;
        let all_refs: Vec<Reference> = files.iter().flat_map(|f| f.references.clone()).collect();
        self.storage.upsert_references(&all_refs)?;
        for file in files {
            self.storage.set_file_cache(&file.file_path, &file.file_hash, config_hash)?;
        }
        let metadata = IndexMetadata {
            schema_version: 1,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            embedding_provider: self.provider.name().to_string(),
            embedding_model: self.provider.name().to_string(),
            embedding_dimensions: self.provider.dimensions(),
            chunker_name: self.strategy.name().to_string(),
            config_hash: config_hash.to_string(),
        };
        self.storage.set_metadata(&metadata)?;
        Ok(())
    }
}

fn format_chunk_for_embedding(chunk: &Chunk) -> String {
    format!("{} {} {}\n{}", chunk.language, chunk.chunk_kind.as_str(), chunk.name, chunk.content)
}

/// Builds the scoped worker pool the chunking phase runs on, sized per §5's
/// "worker pool of size `max(1, workers)`" rather than rayon's shared global
/// pool, so `IndexingConfig::resolved_workers` actually bounds parallelism.
fn build_worker_pool(workers: usize) -> IndexResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| IndexError::Internal(format!("failed to build worker pool: {e}")))
}

fn relative_path(repo_path: &Path, path: &Path) -> String {
    path.strip_prefix(repo_path).unwrap_or(path).to_string_lossy().replace('\\', "/")
}

fn chunk_one_file(repo_path: &Path, path: &Path, strategy: &dyn ChunkingStrategy) -> IndexResult<ChunkedFile> {
    let bytes = std::fs::read(path)?;
    let file_hash = crate::types::sha256_hex(&bytes);
    let rel = relative_path(repo_path, path);
    let file = SourceFile::new(PathBuf::from(&rel), bytes);

    let chunks = strategy.chunk(&file)?;
    let symbols = strategy.extract_symbols(&file)?;
    let references = strategy.extract_references(&file)?;

    Ok(ChunkedFile {
        file_path: rel,
        file_hash,
        chunks,
        symbols,
        references,
    })
}

#[allow(clippy::too_many_arguments)]
fn report_progress(
    callback: &Option<ProgressCallback>,
    phase: IndexPhase,
    total_files: usize,
    processed_files: usize,
    total_chunks: usize,
    processed_chunks: usize,
    current_file: Option<PathBuf>,
) {
    if let Some(cb) = callback {
        cb(IndexProgress {
            phase,
            total_files,
            processed_files,
            total_chunks,
            processed_chunks,
            current_file,
        });
    }
}

fn build_globset(patterns: &[String]) -> IndexResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| IndexError::Config {
            details: format!("invalid glob pattern {pattern}: {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| IndexError::Config { details: e.to_string() })
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Scan the repository tree for candidate files, preferring `git ls-files`
/// when `vcs_aware` is set (falls back to a filesystem walk if git is
/// unavailable or the directory isn't a repository).
fn scan_files(repo_path: &Path, indexing: &IndexingConfig) -> IndexResult<Vec<PathBuf>> {
    let include = build_globset(&indexing.include_patterns)?;
    let exclude = build_globset(&indexing.exclude_patterns)?;

    let mut out = Vec::new();
    if indexing.vcs_aware {
        if let Some(tracked) = git_ls_files(repo_path) {
            for rel in tracked {
                if out.len() >= indexing.max_files {
                    break;
                }
                let full = repo_path.join(&rel);
                if accepts(&rel, &full, &include, &exclude, indexing) {
                    out.push(full);
                }
            }
            return Ok(out);
        }
    }

    walk_dir(repo_path, repo_path, &include, &exclude, indexing, &mut out)?;
    Ok(out)
}

fn git_ls_files(repo_path: &Path) -> Option<Vec<String>> {
    let output = std::process::Command::new("git")
        .arg("-C")
        .arg(repo_path)
        .args(["ls-files", "--cached", "--others", "--exclude-standard"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Some(text.lines().map(str::to_string).collect())
}

fn accepts(rel: &str, full: &Path, include: &GlobSet, exclude: &GlobSet, indexing: &IndexingConfig) -> bool {
    if exclude.is_match(rel) {
        return false;
    }
    if !include.is_empty() && !include.is_match(rel) {
        return false;
    }
    match std::fs::metadata(full) {
        Ok(meta) => meta.is_file() && meta.len() <= indexing.max_file_size,
        Err(_) => false,
    }
}

fn walk_dir(repo_path: &Path, dir: &Path, include: &GlobSet, exclude: &GlobSet, indexing: &IndexingConfig, out: &mut Vec<PathBuf>) -> IndexResult<()> {
    if out.len() >= indexing.max_files {
        return Ok(());
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };
    for entry in entries.flatten() {
        if out.len() >= indexing.max_files {
            return Ok(());
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if is_hidden(&name) {
            continue;
        }
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        if file_type.is_symlink() && !indexing.follow_symlinks {
            continue;
        }
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if metadata.is_dir() {
            walk_dir(repo_path, &path, include, exclude, indexing, out)?;
        } else if metadata.is_file() {
            let rel = relative_path(repo_path, &path);
            if accepts(&rel, &path, include, exclude, indexing) {
                out.push(path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, content).expect("write");
    }

    #[tokio::test]
    async fn indexing_empty_repo_produces_empty_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::defaults(dir.path());
        let mut indexer = Indexer::new(config).expect("indexer");
        let report = indexer.run(false, None, &CancellationToken::new()).await.expect("run");
        assert_eq!(report.files_scanned, 0);
        assert_eq!(report.chunks_created, 0);
    }

    #[tokio::test]
    async fn indexing_single_go_file_produces_chunks_and_embeddings() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "main.go", "package main\nfunc main() {\n\tHelper()\n}\n\nfunc Helper() {}\n");
        let config = Config::defaults(dir.path());
        let mut indexer = Indexer::new(config).expect("indexer");
        let report = indexer.run(false, None, &CancellationToken::new()).await.expect("run");
        assert_eq!(report.files_processed, 1);
        assert!(report.chunks_created >= 2);
        assert_eq!(report.embeddings_generated, report.chunks_created);
    }

    #[tokio::test]
    async fn reindexing_unchanged_file_skips_reprocessing() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "main.go", "package main\nfunc main() {}\n");
        let config = Config::defaults(dir.path());
        let mut indexer = Indexer::new(config).expect("indexer");
        let first = indexer.run(false, None, &CancellationToken::new()).await.expect("first run");
        assert_eq!(first.files_processed, 1);
        let second = indexer.run(false, None, &CancellationToken::new()).await.expect("second run");
        assert_eq!(second.files_processed, 0);
        assert_eq!(second.files_skipped_unchanged, 1);
    }

    #[tokio::test]
    async fn forced_reindex_reprocesses_unchanged_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "main.go", "package main\nfunc main() {}\n");
        let config = Config::defaults(dir.path());
        let mut indexer = Indexer::new(config).expect("indexer");
        indexer.run(false, None, &CancellationToken::new()).await.expect("first run");
        let second = indexer.run(true, None, &CancellationToken::new()).await.expect("forced run");
        assert_eq!(second.files_processed, 1);
    }

    #[test]
    fn build_worker_pool_honors_requested_thread_count() {
        let pool = build_worker_pool(3).expect("build pool");
        assert_eq!(pool.current_num_threads(), 3);
    }

    #[test]
    fn build_worker_pool_clamps_zero_to_one() {
        let pool = build_worker_pool(0).expect("build pool");
        assert_eq!(pool.current_num_threads(), 1);
    }

    #[tokio::test]
    async fn configured_worker_count_bounds_the_chunking_pool() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "main.go", "package main\nfunc main() {}\n");
        write_file(dir.path(), "other.go", "package main\nfunc Other() {}\n");
        let mut config = Config::defaults(dir.path());
        config.indexing.workers = 1;
        let mut indexer = Indexer::new(config).expect("indexer");
        let report = indexer.run(false, None, &CancellationToken::new()).await.expect("run");
        assert_eq!(report.files_processed, 2);
    }

    #[tokio::test]
    async fn cancellation_before_scan_aborts_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "main.go", "package main\nfunc main() {}\n");
        let config = Config::defaults(dir.path());
        let mut indexer = Indexer::new(config).expect("indexer");
        let token = CancellationToken::new();
        token.cancel();
        let result = indexer.run(false, None, &token).await;
        assert!(matches!(result, Err(IndexError::Cancelled { .. })));
    }
}
