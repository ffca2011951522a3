//! Configuration loading and validation.
//!
//! Configuration is resolved with the following precedence (highest wins):
//!
//! 1. Environment variables (`CODEGRAPH_*`)
//! 2. Project config (`.codegraph/config.toml`)
//! 3. User config (`~/.config/codegraph/config.toml`)
//! 4. Compiled-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};

/// Top-level configuration for the indexing engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Repository root path to index.
    pub repo_path: PathBuf,

    /// Indexing configuration.
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Watcher configuration.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Indexing-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// File patterns to exclude from indexing (glob syntax, `**` supported).
    #[serde(default = "IndexingConfig::default_excludes")]
    pub exclude_patterns: Vec<String>,

    /// File patterns to include; empty means "everything not excluded".
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Maximum file size to index (in bytes). Files larger than this are skipped.
    #[serde(default = "IndexingConfig::default_max_file_size")]
    pub max_file_size: u64,

    /// Ceiling on the number of files scanned in a single run.
    #[serde(default = "IndexingConfig::default_max_files")]
    pub max_files: usize,

    /// Worker pool size for parallel chunking. `0` means "number of cores".
    #[serde(default)]
    pub workers: usize,

    /// Maximum chunk size in tokens. `max_chunk_bytes = max_chunk_tokens * 4`.
    #[serde(default = "IndexingConfig::default_max_chunk_tokens")]
    pub max_chunk_tokens: u32,

    /// Whether to follow symbolic links while walking the filesystem.
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Prefer a VCS-aware file listing (tracked + untracked-not-ignored) over a raw walk.
    #[serde(default = "IndexingConfig::default_vcs_aware")]
    pub vcs_aware: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Self::default_excludes(),
            include_patterns: Vec::new(),
            max_file_size: Self::default_max_file_size(),
            max_files: Self::default_max_files(),
            workers: 0,
            max_chunk_tokens: Self::default_max_chunk_tokens(),
            follow_symlinks: false,
            vcs_aware: Self::default_vcs_aware(),
        }
    }
}

impl IndexingConfig {
    fn default_excludes() -> Vec<String> {
        vec![
            ".git/**".into(),
            "node_modules/**".into(),
            "target/**".into(),
            "__pycache__/**".into(),
            ".venv/**".into(),
            "venv/**".into(),
            "dist/**".into(),
            "build/**".into(),
            ".next/**".into(),
            "*.lock".into(),
            "*.min.js".into(),
            "*.min.css".into(),
            "*.map".into(),
        ]
    }

    fn default_max_file_size() -> u64 {
        5 * 1024 * 1024 // 5MB
    }

    fn default_max_files() -> usize {
        200_000
    }

    fn default_max_chunk_tokens() -> u32 {
        2000
    }

    fn default_vcs_aware() -> bool {
        true
    }

    /// Resolved worker count: `workers` if set, else the number of available cores.
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        }
    }

    /// `max_chunk_tokens * 4`, the byte budget the AST walker truncates chunks to.
    pub fn max_chunk_bytes(&self) -> usize {
        self.max_chunk_tokens as usize * 4
    }
}

/// Search-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results to return.
    #[serde(default = "SearchConfig::default_limit")]
    pub default_limit: usize,

    /// Maximum number of results to return.
    #[serde(default = "SearchConfig::default_max_limit")]
    pub max_limit: usize,

    /// Weight given to the vector-search component of the hybrid score.
    #[serde(default = "SearchConfig::default_vector_weight")]
    pub vector_weight: f64,

    /// Weight given to the BM25 component of the hybrid score.
    #[serde(default = "SearchConfig::default_bm25_weight")]
    pub bm25_weight: f64,

    /// Multiplier applied to `k` when oversampling each leg of a hybrid search.
    #[serde(default = "SearchConfig::default_oversample_factor")]
    pub oversample_factor: usize,

    /// Recency half-life (days) for temporal/memory search ranking.
    #[serde(default = "SearchConfig::default_half_life_days")]
    pub half_life_days: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: Self::default_limit(),
            max_limit: Self::default_max_limit(),
            vector_weight: Self::default_vector_weight(),
            bm25_weight: Self::default_bm25_weight(),
            oversample_factor: Self::default_oversample_factor(),
            half_life_days: Self::default_half_life_days(),
        }
    }
}

impl SearchConfig {
    fn default_limit() -> usize {
        10
    }
    fn default_max_limit() -> usize {
        100
    }
    fn default_vector_weight() -> f64 {
        0.7
    }
    fn default_bm25_weight() -> f64 {
        0.3
    }
    fn default_oversample_factor() -> usize {
        3
    }
    fn default_half_life_days() -> f64 {
        30.0
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which provider to construct: `"deterministic"` or `"http"`.
    #[serde(default = "EmbeddingConfig::default_provider")]
    pub provider: String,

    /// Endpoint URL for the HTTP provider. Unused by the deterministic provider.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model identifier recorded in `IndexMetadata`.
    #[serde(default = "EmbeddingConfig::default_model")]
    pub model: String,

    /// Output embedding dimensionality.
    #[serde(default = "EmbeddingConfig::default_dimensions")]
    pub dimensions: usize,

    /// Maximum number of texts per `embed()` call.
    #[serde(default = "EmbeddingConfig::default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            endpoint: None,
            model: Self::default_model(),
            dimensions: Self::default_dimensions(),
            max_batch_size: Self::default_max_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    fn default_provider() -> String {
        "deterministic".into()
    }
    fn default_model() -> String {
        "deterministic-sha256-v1".into()
    }
    fn default_dimensions() -> usize {
        256
    }
    fn default_max_batch_size() -> usize {
        32
    }
}

/// File watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// How long a path must be stable before it is re-indexed (milliseconds).
    #[serde(default = "WatcherConfig::default_debounce_ms")]
    pub debounce_ms: u64,

    /// Drain-ticker interval (milliseconds).
    #[serde(default = "WatcherConfig::default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce_ms(),
            tick_ms: Self::default_tick_ms(),
        }
    }
}

impl WatcherConfig {
    fn default_debounce_ms() -> u64 {
        500
    }
    fn default_tick_ms() -> u64 {
        100
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Whether to output logs as JSON.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".into()
    }
}

impl Config {
    /// Load configuration from defaults, then overlay user config, then project config,
    /// then environment variables.
    pub fn load(repo_path: &Path) -> IndexResult<Self> {
        let mut config = Self::defaults(repo_path);

        if let Some(user_config_dir) = dirs::config_dir() {
            let user_config_path = user_config_dir.join("codegraph").join("config.toml");
            if user_config_path.exists() {
                config.merge_from_file(&user_config_path)?;
            }
        }

        let project_config_path = repo_path.join(".codegraph").join("config.toml");
        if project_config_path.exists() {
            config.merge_from_file(&project_config_path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Create a default configuration for the given repo path.
    pub fn defaults(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Returns the data directory for this repo's index files.
    pub fn data_dir(&self) -> PathBuf {
        let hash = self.repo_hash();
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("codegraph")
            .join("repos")
            .join(&hash)
    }

    /// Path to the SQL database file within `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("index").join("codegraph.db")
    }

    /// Path to the memory journal directory within `data_dir`.
    pub fn journal_dir(&self) -> PathBuf {
        self.data_dir().join("journal")
    }

    /// Digest of the fields that, if changed, invalidate the file-content cache:
    /// embedding provider/model/dimensions and chunking strategy/chunk size.
    pub fn config_hash(&self) -> String {
        let material = format!(
            "{}|{}|{}|{}",
            self.embedding.provider,
            self.embedding.model,
            self.embedding.dimensions,
            self.indexing.max_chunk_tokens,
        );
        crate::types::sha256_hex(material.as_bytes())
    }

    fn merge_from_file(&mut self, path: &Path) -> IndexResult<()> {
        let content = std::fs::read_to_string(path)?;
        let overlay: toml::Value = toml::from_str(&content).map_err(|e| IndexError::Config {
            details: format!("invalid TOML in {}: {e}", path.display()),
        })?;

        if let Some(indexing) = overlay.get("indexing") {
            if let Ok(parsed) = indexing.clone().try_into::<IndexingConfig>() {
                self.indexing = parsed;
            }
        }
        if let Some(search) = overlay.get("search") {
            if let Ok(parsed) = search.clone().try_into::<SearchConfig>() {
                self.search = parsed;
            }
        }
        if let Some(embedding) = overlay.get("embedding") {
            if let Ok(parsed) = embedding.clone().try_into::<EmbeddingConfig>() {
                self.embedding = parsed;
            }
        }
        if let Some(watcher) = overlay.get("watcher") {
            if let Ok(parsed) = watcher.clone().try_into::<WatcherConfig>() {
                self.watcher = parsed;
            }
        }
        if let Some(logging) = overlay.get("logging") {
            if let Ok(parsed) = logging.clone().try_into::<LoggingConfig>() {
                self.logging = parsed;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("CODEGRAPH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(endpoint) = std::env::var("CODEGRAPH_EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = Some(endpoint);
        }
        if let Ok(provider) = std::env::var("CODEGRAPH_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
    }

    /// Compute a short hash of the repo path for the data directory name.
    ///
    /// Normalizes the path to avoid Windows `\\?\` extended path prefix
    /// causing different hashes for the same physical directory.
    fn repo_hash(&self) -> String {
        let path_str = self.repo_path.to_string_lossy();
        let normalized = path_str.strip_prefix(r"\\?\").unwrap_or(&path_str);
        crate::types::sha256_hex(normalized.as_bytes())[..8].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::defaults(Path::new("/tmp/test-repo"));
        assert_eq!(config.indexing.max_file_size, 5 * 1024 * 1024);
        assert_eq!(config.indexing.max_chunk_tokens, 2000);
        assert_eq!(config.indexing.max_chunk_bytes(), 8000);
        assert_eq!(config.search.default_limit, 10);
        assert!((config.search.vector_weight - 0.7).abs() < f64::EPSILON);
        assert!((config.search.bm25_weight - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.watcher.debounce_ms, 500);
        assert_eq!(config.watcher.tick_ms, 100);
    }

    #[test]
    fn resolved_workers_falls_back_to_core_count() {
        let mut config = Config::defaults(Path::new("/tmp/test-repo"));
        config.indexing.workers = 0;
        assert!(config.indexing.resolved_workers() >= 1);
        config.indexing.workers = 4;
        assert_eq!(config.indexing.resolved_workers(), 4);
    }

    #[test]
    fn config_hash_changes_with_chunk_size() {
        let mut a = Config::defaults(Path::new("/tmp/test-repo"));
        let mut b = a.clone();
        b.indexing.max_chunk_tokens = 999;
        assert_ne!(a.config_hash(), b.config_hash());
        a.indexing.max_chunk_tokens = 999;
        assert_eq!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn env_override_applies_log_level() {
        std::env::set_var("CODEGRAPH_LOG_LEVEL", "trace");
        let mut config = Config::defaults(Path::new("/tmp/test-repo"));
        config.apply_env_overrides();
        assert_eq!(config.logging.level, "trace");
        std::env::remove_var("CODEGRAPH_LOG_LEVEL");
    }
}
