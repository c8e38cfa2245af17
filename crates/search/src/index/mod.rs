//! Passage index contract
//!
//! A passage index answers nearest-neighbour queries over embedded passage
//! chunks of one collection. Scores are returned raw: whether higher or lower
//! means "more relevant" depends on the index metric.

mod memory;
mod qdrant;

pub use memory::InMemoryPassageIndex;
pub use qdrant::QdrantIndex;

use finchat_common::config::DistanceMetric;
use finchat_common::errors::Result;
use serde::{Deserialize, Serialize};

/// Fallback filename when passage metadata carries none
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// One hit returned by a passage index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Passage text
    pub content: String,

    /// Filename of the source document
    pub source_filename: String,

    /// Page within the source document, when known
    pub page: Option<u32>,

    /// Score as reported by the index, in the metric's own convention
    pub raw_score: f32,
}

/// Vector similarity search over embedded passages
#[async_trait::async_trait]
pub trait PassageIndex: Send + Sync {
    /// Nearest passages to `query_embedding`, at most `top_k`
    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>>;

    /// Metric the collection scores with
    fn metric(&self) -> DistanceMetric;
}
