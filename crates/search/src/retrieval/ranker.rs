//! Passage ranking
//!
//! Deduplicates raw hits by content, orders them by score in the direction
//! the index metric defines as "more relevant", and caps the result.
//! Ranking is pure: the same hits and direction always give the same list.

use crate::index::RetrievedPassage;
use finchat_common::config::ScoreDirection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// A deduplicated passage with its ranking score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPassage {
    pub passage: RetrievedPassage,

    /// Raw index score of the first occurrence of this content.
    ///
    /// Read it with the ranker's [`ScoreDirection`]: for distance metrics
    /// (euclid, manhattan) a lower value is the more relevant passage.
    pub confidence_score: f32,

    /// Hex SHA-256 of the passage content
    pub content_hash: String,
}

/// Hex SHA-256 identity of a passage's text
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[derive(Debug, Clone, Copy)]
pub struct PassageRanker {
    direction: ScoreDirection,
    cap: usize,
}

impl PassageRanker {
    pub fn new(direction: ScoreDirection, cap: usize) -> Self {
        Self { direction, cap }
    }

    pub fn direction(&self) -> ScoreDirection {
        self.direction
    }

    /// Rank raw hits.
    ///
    /// Hits with a non-finite score are dropped before deduplication. Among
    /// hits with identical content the first one encountered wins. Equal
    /// scores keep their encounter order.
    pub fn rank(&self, hits: Vec<RetrievedPassage>) -> Vec<RankedPassage> {
        let total = hits.len();
        let mut seen = HashSet::with_capacity(total);
        let mut ranked: Vec<RankedPassage> = Vec::with_capacity(total);

        for passage in hits {
            if !passage.raw_score.is_finite() {
                continue;
            }
            let hash = content_hash(&passage.content);
            if !seen.insert(hash.clone()) {
                continue;
            }
            ranked.push(RankedPassage {
                confidence_score: passage.raw_score,
                content_hash: hash,
                passage,
            });
        }

        match self.direction {
            ScoreDirection::HigherIsBetter => {
                ranked.sort_by(|a, b| b.confidence_score.total_cmp(&a.confidence_score))
            }
            ScoreDirection::LowerIsBetter => {
                ranked.sort_by(|a, b| a.confidence_score.total_cmp(&b.confidence_score))
            }
        }
        ranked.truncate(self.cap);

        tracing::debug!(
            hits = total,
            kept = ranked.len(),
            direction = ?self.direction,
            "Ranked passages"
        );

        ranked
    }
}
