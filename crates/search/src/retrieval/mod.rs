//! Retrieval pipeline stages
//!
//! - Query expansion (one utterance to several query variants)
//! - Per-variant passage search with partial-failure tolerance
//! - Deduplication, ordering and capping of raw hits

mod expander;
mod ranker;
mod retriever;

pub use expander::{QueryExpansionStrategy, ThaiQueryExpander};
pub use ranker::{content_hash, PassageRanker, RankedPassage};
pub use retriever::Retriever;
