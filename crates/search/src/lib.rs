//! FinChat Search Library
//!
//! Passage retrieval for the answering pipeline:
//! - Passage index contract with Qdrant and in-memory adapters
//! - Query expansion for Thai utterances
//! - Multi-variant retrieval and passage ranking

pub mod index;
pub mod retrieval;

pub use index::{InMemoryPassageIndex, PassageIndex, QdrantIndex, RetrievedPassage};
pub use retrieval::{PassageRanker, QueryExpansionStrategy, RankedPassage, Retriever, ThaiQueryExpander};
