//! Per-variant passage retrieval
//!
//! Every query variant is embedded and searched independently. Variants run
//! concurrently and their hits are concatenated in variant order, so the
//! merged list is the same as a sequential run. A failing variant contributes
//! no hits; only the failure of every variant is an error.

use crate::index::{PassageIndex, RetrievedPassage};
use finchat_common::embeddings::Embedder;
use finchat_common::errors::{AppError, Result};
use finchat_common::metrics;
use finchat_common::resilience::{call_with_retry, RetryPolicy};
use futures::future::join_all;
use std::sync::Arc;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn PassageIndex>,
    collection: String,
    top_k: usize,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn PassageIndex>,
        collection: impl Into<String>,
        top_k: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
            top_k,
            retry,
        }
    }

    /// Concatenated hits of all variants, each with its raw index score.
    ///
    /// Blank variants are never searched. Returns `AppError::Retrieval` when
    /// every searched variant failed.
    pub async fn retrieve(&self, variants: &[String]) -> Result<Vec<RetrievedPassage>> {
        let searchable: Vec<&str> = variants
            .iter()
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .collect();

        if searchable.is_empty() {
            return Err(AppError::validation("query", "no non-blank query variant to search"));
        }

        let outcomes = join_all(searchable.iter().map(|variant| self.search_variant(variant))).await;

        let mut hits = Vec::new();
        let mut failures = 0usize;
        let mut last_error = None;

        for (variant, outcome) in searchable.iter().zip(outcomes) {
            match outcome {
                Ok(passages) => {
                    metrics::record_retrieval_variant(true);
                    tracing::debug!(variant = %variant, hits = passages.len(), "Variant searched");
                    hits.extend(passages);
                }
                Err(e) => {
                    metrics::record_retrieval_variant(false);
                    tracing::warn!(
                        variant = %variant,
                        error = %e,
                        error_code = e.code().as_str(),
                        "Query variant failed, continuing without its hits"
                    );
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == searchable.len() {
            let cause = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(AppError::Retrieval {
                message: format!("all {} query variants failed; last error: {}", failures, cause),
            });
        }

        Ok(hits)
    }

    async fn search_variant(&self, variant: &str) -> Result<Vec<RetrievedPassage>> {
        let embedding = self.embedder.embed(variant).await?;
        call_with_retry(&self.retry, "index.search", || {
            self.index.search(&self.collection, &embedding, self.top_k)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryPassageIndex;
    use async_trait::async_trait;
    use finchat_common::config::DistanceMetric;
    use finchat_common::embeddings::HashingEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails every search whose query vector equals the embedding of `poison`
    struct SelectiveIndex {
        inner: InMemoryPassageIndex,
        poison: Option<Vec<f32>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PassageIndex for SelectiveIndex {
        async fn search(&self, collection: &str, query: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.poison {
                Some(p) if p.as_slice() == query => Err(AppError::Index {
                    message: "connection refused".into(),
                    retryable: false,
                }),
                None => Err(AppError::Index {
                    message: "connection refused".into(),
                    retryable: true,
                }),
                _ => self.inner.search(collection, query, top_k).await,
            }
        }

        fn metric(&self) -> DistanceMetric {
            DistanceMetric::Cosine
        }
    }

    /// Never answers searches whose query vector equals `stall`, or any search when unset
    struct StallingIndex {
        inner: InMemoryPassageIndex,
        stall: Option<Vec<f32>>,
    }

    #[async_trait]
    impl PassageIndex for StallingIndex {
        async fn search(&self, collection: &str, query: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>> {
            let stalls = self.stall.as_deref().map_or(true, |s| s == query);
            if stalls {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            self.inner.search(collection, query, top_k).await
        }

        fn metric(&self) -> DistanceMetric {
            DistanceMetric::Cosine
        }
    }

    fn short_timeout() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(20),
            ..policy()
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            timeout: Duration::from_secs(1),
        }
    }

    async fn corpus(embedder: &HashingEmbedder) -> InMemoryPassageIndex {
        let index = InMemoryPassageIndex::new(DistanceMetric::Cosine);
        for (text, page) in [("ค่าเดินทางไปราชการ", 1), ("เบี้ยเลี้ยง", 2), ("ค่าที่พัก", 3)] {
            let embedding = embedder.embed(text).await.unwrap();
            index.insert("docs", embedding, text, "manual.pdf", Some(page)).await;
        }
        index
    }

    #[tokio::test]
    async fn test_hits_from_every_variant_are_concatenated() {
        let embedder = HashingEmbedder::new(128);
        let index = corpus(&embedder).await;
        let retriever = Retriever::new(Arc::new(embedder), Arc::new(index), "docs", 2, policy());

        let variants = vec!["ค่าเดินทาง".to_string(), "เบี้ยเลี้ยง".to_string()];
        let hits = retriever.retrieve(&variants).await.unwrap();
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[2].content, "เบี้ยเลี้ยง");
    }

    #[tokio::test]
    async fn test_partial_failure_is_tolerated() {
        let embedder = HashingEmbedder::new(128);
        let poison = embedder.embed("เบี้ยเลี้ยง").await.unwrap();
        let index = SelectiveIndex {
            inner: corpus(&embedder).await,
            poison: Some(poison),
            calls: AtomicUsize::new(0),
        };
        let retriever = Retriever::new(Arc::new(embedder), Arc::new(index), "docs", 3, policy());

        let variants = vec!["ค่าเดินทาง".to_string(), "เบี้ยเลี้ยง".to_string()];
        let hits = tokio_test::assert_ok!(retriever.retrieve(&variants).await);
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_total_failure_is_retrieval_error() {
        let embedder = HashingEmbedder::new(128);
        let index = Arc::new(SelectiveIndex {
            inner: InMemoryPassageIndex::new(DistanceMetric::Cosine),
            poison: None,
            calls: AtomicUsize::new(0),
        });
        let retriever = Retriever::new(Arc::new(embedder), index.clone(), "docs", 3, policy());

        let variants = vec!["ค่าเดินทาง".to_string(), "ค่าเดินทาง ".to_string()];
        let err = tokio_test::assert_err!(retriever.retrieve(&variants).await);
        assert!(matches!(err, AppError::Retrieval { .. }));
        // Two variants, each tried twice
        assert_eq!(index.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_timeout_on_every_variant_is_retrieval_error() {
        let embedder = HashingEmbedder::new(128);
        let index = StallingIndex {
            inner: corpus(&embedder).await,
            stall: None,
        };
        let retriever = Retriever::new(Arc::new(embedder), Arc::new(index), "docs", 3, short_timeout());

        let variants = vec!["ค่าเดินทาง".to_string(), "เบี้ยเลี้ยง".to_string()];
        let err = tokio_test::assert_err!(retriever.retrieve(&variants).await);
        assert!(matches!(err, AppError::Retrieval { .. }));
        assert!(err.to_string().contains("index.search timed out after 20ms"));
    }

    #[tokio::test]
    async fn test_timed_out_variant_is_skipped() {
        let embedder = HashingEmbedder::new(128);
        let stall = embedder.embed("เบี้ยเลี้ยง").await.unwrap();
        let index = StallingIndex {
            inner: corpus(&embedder).await,
            stall: Some(stall),
        };
        let retriever = Retriever::new(Arc::new(embedder), Arc::new(index), "docs", 2, short_timeout());

        let variants = vec!["เบี้ยเลี้ยง".to_string(), "ค่าที่พัก".to_string()];
        let hits = tokio_test::assert_ok!(retriever.retrieve(&variants).await);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "ค่าที่พัก");
    }

    #[tokio::test]
    async fn test_blank_variants_are_never_searched() {
        let embedder = HashingEmbedder::new(128);
        let index = Arc::new(SelectiveIndex {
            inner: corpus(&embedder).await,
            poison: Some(vec![]),
            calls: AtomicUsize::new(0),
        });
        let retriever = Retriever::new(Arc::new(embedder), index.clone(), "docs", 1, policy());

        let variants = vec!["ค่าที่พัก".to_string(), "   ".to_string(), String::new()];
        let hits = retriever.retrieve(&variants).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(index.calls.load(Ordering::SeqCst), 1);

        let only_blank = retriever.retrieve(&["  ".to_string()]).await;
        assert!(matches!(only_blank, Err(AppError::Validation { .. })));
    }
}
