//! Brute-force in-process passage index
//!
//! Scores every stored passage against the query with the configured metric.
//! Used for local runs and tests.

use super::{PassageIndex, RetrievedPassage};
use finchat_common::config::{DistanceMetric, ScoreDirection};
use finchat_common::embeddings::cosine_similarity;
use finchat_common::errors::{AppError, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

struct StoredPassage {
    embedding: Vec<f32>,
    content: String,
    source_filename: String,
    page: Option<u32>,
}

pub struct InMemoryPassageIndex {
    metric: DistanceMetric,
    collections: RwLock<HashMap<String, Vec<StoredPassage>>>,
}

impl InMemoryPassageIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Create an empty collection; no-op if it exists
    pub async fn create_collection(&self, collection: &str) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default();
    }

    /// Store one embedded passage, creating the collection if needed
    pub async fn insert(
        &self,
        collection: &str,
        embedding: Vec<f32>,
        content: impl Into<String>,
        source_filename: impl Into<String>,
        page: Option<u32>,
    ) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(StoredPassage {
                embedding,
                content: content.into(),
                source_filename: source_filename.into(),
                page,
            });
    }

    fn score(&self, query: &[f32], stored: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::Cosine => cosine_similarity(query, stored),
            DistanceMetric::Dot => query.iter().zip(stored).map(|(a, b)| a * b).sum(),
            DistanceMetric::Euclid => query
                .iter()
                .zip(stored)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Manhattan => query.iter().zip(stored).map(|(a, b)| (a - b).abs()).sum(),
        }
    }
}

#[async_trait::async_trait]
impl PassageIndex for InMemoryPassageIndex {
    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        let collections = self.collections.read().await;
        let passages = collections.get(collection).ok_or_else(|| AppError::Index {
            message: format!("Collection `{}` not found", collection),
            retryable: false,
        })?;

        let mut hits = Vec::with_capacity(passages.len());
        for stored in passages {
            if stored.embedding.len() != query_embedding.len() {
                return Err(AppError::Index {
                    message: format!(
                        "Vector dimension mismatch: expected {}, got {}",
                        stored.embedding.len(),
                        query_embedding.len()
                    ),
                    retryable: false,
                });
            }
            hits.push(RetrievedPassage {
                content: stored.content.clone(),
                source_filename: stored.source_filename.clone(),
                page: stored.page,
                raw_score: self.score(query_embedding, &stored.embedding),
            });
        }

        match self.metric.score_direction() {
            ScoreDirection::HigherIsBetter => hits.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score)),
            ScoreDirection::LowerIsBetter => hits.sort_by(|a, b| a.raw_score.total_cmp(&b.raw_score)),
        }
        hits.truncate(top_k);
        Ok(hits)
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
