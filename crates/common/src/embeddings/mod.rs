//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI-compatible endpoints (text-embedding-3-large, text-embedding-3-small)
//! - A deterministic local hashing embedder for offline runs and tests
//!
//! The embedder used for queries must be the one the corpus was indexed with.

use crate::config::{EmbeddingConfig, ResilienceConfig};
use crate::errors::{status_is_retryable, AppError, Result};
use crate::metrics;
use crate::resilience::{call_with_retry, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let model = model.unwrap_or_else(|| "text-embedding-3-large".to_string());
        let dimension = match model.as_str() {
            "text-embedding-ada-002" => 1536,
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            _ => 768,
        };

        let client = reqwest::Client::builder()
            .timeout(retry.timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            dimension,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            retry,
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let result = call_with_retry(&self.retry, "embedding.request", || self.make_request(texts)).await;
        metrics::record_embedding(start.elapsed().as_secs_f64(), &self.model, texts.len(), result.is_ok());
        result
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: texts,
            model: &self.model,
        };

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Embedding {
                message: format!("Request failed: {}", e),
                retryable: true,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding {
                message: format!("API error {}: {}", status, body),
                retryable: status_is_retryable(status),
            });
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| {
            AppError::Embedding {
                message: format!("Failed to parse response: {}", e),
                retryable: false,
            }
        })?;

        if result.data.len() != texts.len() {
            return Err(AppError::Embedding {
                message: format!("Expected {} embeddings, got {}", texts.len(), result.data.len()),
                retryable: false,
            });
        }

        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::Embedding {
            message: "Empty response".to_string(),
            retryable: false,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic embedder over character unigrams and bigrams.
///
/// Whitespace is ignored, so it behaves the same for scripts written without
/// word separators. Vectors are L2-normalised.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> usize {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) % self.dimension as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let chars: Vec<char> = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        let mut vector = vec![0.0f32; self.dimension];
        for (i, c) in chars.iter().enumerate() {
            vector[self.bucket(&c.to_string())] += 1.0;
            if let Some(next) = chars.get(i + 1) {
                let bigram: String = [*c, *next].iter().collect();
                vector[self.bucket(&bigram)] += 2.0;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn model_name(&self) -> &str {
        "hashing-char-bigram"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig, resilience: &ResilienceConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "OpenAI API key required".to_string(),
            })?;
            let retry = RetryPolicy::from_config(resilience, Duration::from_secs(config.timeout_secs));
            Ok(Arc::new(OpenAIEmbedder::new(
                key,
                Some(config.model.clone()),
                config.api_base.clone(),
                retry,
            )?))
        }
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}

/// Cosine similarity between two vectors; 0.0 when either is zero
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_embedder_dimension() {
        let embedder = HashingEmbedder::new(256);
        let embedding = embedder.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 256);
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic_and_ignores_spaces() {
        let embedder = HashingEmbedder::new(512);
        let a = embedder.embed("การเบิก ค่าใช้จ่าย").await.unwrap();
        let b = embedder.embed("การเบิกค่าใช้จ่าย").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hashing_embedder_similarity_tracks_overlap() {
        let embedder = HashingEmbedder::new(512);
        let query = embedder.embed("การเบิกค่าใช้จ่ายในการเดินทางไปราชการ").await.unwrap();
        let related = embedder
            .embed("หลักเกณฑ์การเบิกค่าใช้จ่ายในการเดินทางไปราชการ ให้ยื่นภายใน 15 วัน")
            .await
            .unwrap();
        let unrelated = embedder.embed("Library opening hours are posted weekly").await.unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_create_embedder() {
        let resilience = ResilienceConfig::default();

        let mut config = EmbeddingConfig::default();
        config.provider = "hashing".into();
        config.dimension = 128;
        let embedder = create_embedder(&config, &resilience).unwrap();
        assert_eq!(embedder.dimension(), 128);

        config.provider = "openai".into();
        config.api_key = None;
        assert!(create_embedder(&config, &resilience).is_err());

        config.provider = "unknown".into();
        assert!(create_embedder(&config, &resilience).is_err());
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
