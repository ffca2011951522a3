//! Embedding providers: turn chunk text into vectors for the vector-search
//! leg of hybrid search (§4.6).
//!
//! Two implementations ship:
//!
//! - [`DeterministicEmbeddingProvider`]: no network, no model file. Derives a
//!   pseudo-embedding from repeated SHA-256 hashing of the input text. Used
//!   as the zero-dependency default and in every test, where reproducibility
//!   matters more than semantic quality.
//! - [`HttpEmbeddingProvider`]: posts batches to an external embedding
//!   endpoint (`EmbeddingConfig::endpoint`) and parses back a JSON array of
//!   float vectors.
//!
//! Both providers expose [`EmbeddingProvider::is_available`] so the pipeline
//! can fall back to keyword-only (BM25) search when embedding fails, rather
//! than aborting the whole run: a chunk without a vector is still findable
//! through full-text search.

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{IndexError, IndexResult};

/// Produces embedding vectors for batches of chunk text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider identifier recorded in `IndexMetadata::embedding_provider`.
    fn name(&self) -> &str;

    /// Output embedding dimensionality.
    fn dimensions(&self) -> usize;

    /// Maximum number of texts accepted per `embed` call.
    fn max_batch_size(&self) -> usize;

    /// Embed a batch of texts, one vector per input in the same order.
    async fn embed(&self, texts: &[String]) -> IndexResult<Vec<Vec<f32>>>;

    /// Whether this provider is currently able to serve requests. Checked
    /// once before a run; `false` routes the pipeline to keyword-only mode.
    fn is_available(&self) -> bool {
        true
    }
}

/// Construct the configured provider.
pub fn build_provider(config: &EmbeddingConfig) -> IndexResult<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "deterministic" => Ok(Box::new(DeterministicEmbeddingProvider::new(config))),
        "http" => Ok(Box::new(HttpEmbeddingProvider::new(config)?)),
        other => Err(IndexError::Config {
            details: format!("unknown embedding provider: {other}"),
        }),
    }
}

/// L2-normalize a vector in place. A zero vector is left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}

/// No-network embedding provider: expands a SHA-256 digest of the input
/// text into `dimensions` floats by re-hashing with an incrementing
/// counter, then L2-normalizes. Deterministic and collision-resistant
/// enough for tests and offline use; carries no semantic signal.
pub struct DeterministicEmbeddingProvider {
    dimensions: usize,
    model: String,
}

impl DeterministicEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            dimensions: config.dimensions,
            model: config.model.clone(),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};

        let mut out = Vec::with_capacity(self.dimensions);
        let mut counter: u32 = 0;
        while out.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks_exact(4) {
                if out.len() >= self.dimensions {
                    break;
                }
                let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // Map to [-1.0, 1.0).
                out.push((bits as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
            }
            counter += 1;
        }
        l2_normalize(&mut out);
        out
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicEmbeddingProvider {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        usize::MAX
    }

    async fn embed(&self, texts: &[String]) -> IndexResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[derive(serde::Serialize)]
struct HttpEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(serde::Deserialize)]
struct HttpEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding provider backed by an HTTP endpoint. Posts `{model, input}` and
/// expects back `{embeddings: [[f32; dimensions]; N]}`.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_batch_size: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> IndexResult<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| IndexError::Config {
            details: "embedding.endpoint is required for the http provider".into(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| IndexError::Embedding {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_batch_size: config.max_batch_size,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn embed(&self, texts: &[String]) -> IndexResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch_size.max(1)) {
            let request = HttpEmbedRequest {
                model: &self.model,
                input: batch,
            };
            let response = self
                .client
                .post(&self.endpoint)
                .json(&request)
                .send()
                .await
                .map_err(|e| IndexError::Embedding {
                    message: format!("embedding request failed: {e}"),
                })?;
            if !response.status().is_success() {
                return Err(IndexError::Embedding {
                    message: format!("embedding endpoint returned {}", response.status()),
                });
            }
            let parsed: HttpEmbedResponse = response.json().await.map_err(|e| IndexError::Embedding {
                message: format!("invalid embedding response: {e}"),
            })?;
            if parsed.embeddings.len() != batch.len() {
                return Err(IndexError::Embedding {
                    message: format!(
                        "embedding endpoint returned {} vectors for {} inputs",
                        parsed.embeddings.len(),
                        batch.len()
                    ),
                });
            }
            results.extend(parsed.embeddings);
        }
        Ok(results)
    }

    fn is_available(&self) -> bool {
        !self.endpoint.is_empty()
    }
}
