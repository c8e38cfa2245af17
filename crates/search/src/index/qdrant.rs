//! Qdrant REST adapter
//!
//! Searches a collection through `POST /collections/{name}/points/search`.
//! Payloads follow the LangChain layout: passage text under `page_content`,
//! document metadata (`filename` or `source`, `page`) under `metadata`.

use super::{PassageIndex, RetrievedPassage, UNKNOWN_SOURCE};
use finchat_common::config::{DistanceMetric, IndexConfig};
use finchat_common::errors::{status_is_retryable, AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Passage index backed by a Qdrant collection
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    metric: DistanceMetric,
    content_key: String,
    metadata_key: String,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, Value>>,
}

impl QdrantIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            metric: config.metric,
            content_key: config.content_key.clone(),
            metadata_key: config.metadata_key.clone(),
        })
    }

    /// Convert one scored point; points without passage text are skipped
    fn to_passage(&self, point: ScoredPoint) -> Option<RetrievedPassage> {
        let payload = point.payload?;
        let content = payload.get(&self.content_key)?.as_str()?.to_string();
        let metadata = payload.get(&self.metadata_key);

        let source_filename = metadata
            .and_then(|m| m.get("filename").or_else(|| m.get("source")))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(UNKNOWN_SOURCE)
            .to_string();

        let page = metadata.and_then(|m| m.get("page")).and_then(parse_page);

        Some(RetrievedPassage {
            content,
            source_filename,
            page,
            raw_score: point.score,
        })
    }
}

/// Page numbers arrive as integers or numeric strings depending on the loader
fn parse_page(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait::async_trait]
impl PassageIndex for QdrantIndex {
    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        let url = format!("{}/collections/{}/points/search", self.base_url, collection);
        let body = SearchBody {
            vector: query_embedding,
            limit: top_k,
            with_payload: true,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request.send().await.map_err(|e| AppError::Index {
            message: format!("Qdrant request failed: {}", e),
            retryable: true,
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Index {
                message: format!("Qdrant error {}: {}", status, body),
                retryable: status_is_retryable(status),
            });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| AppError::Index {
            message: format!("Failed to parse Qdrant response: {}", e),
            retryable: false,
        })?;

        let total = parsed.result.len();
        let passages: Vec<RetrievedPassage> = parsed
            .result
            .into_iter()
            .filter_map(|point| self.to_passage(point))
            .collect();

        if passages.len() < total {
            tracing::debug!(
                collection = collection,
                skipped = total - passages.len(),
                "Skipped points without passage content"
            );
        }

        Ok(passages)
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
