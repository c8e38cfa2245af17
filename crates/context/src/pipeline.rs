//! Answering pipeline - one user turn from utterance to grounded answer
//!
//! A turn moves through `Deciding -> {Retrieving, Generating} -> Done`.
//! The decision model either requests retrieval or answers directly; at most
//! one retrieval round happens per turn and control never returns to
//! `Deciding`.
//!
//! [`RagPipeline::answer`] is the entry point for callers: it never fails and
//! turns every error into the configured fallback sentence.

use crate::assembler::ContextAssembler;
use crate::decision::{Decision, ToolDecisionEngine};
use crate::generator::{AnswerGenerator, SourceDocument};
use finchat_common::config::AppConfig;
use finchat_common::conversation::{ConversationId, ConversationMessage};
use finchat_common::embeddings::Embedder;
use finchat_common::errors::{AppError, Result};
use finchat_common::llm::ChatModel;
use finchat_common::metrics;
use finchat_common::resilience::RetryPolicy;
use finchat_search::{PassageIndex, PassageRanker, QueryExpansionStrategy, Retriever, ThaiQueryExpander};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Pipeline states of one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Deciding,
    Retrieving,
    Generating,
    Done,
}

/// How the answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerPath {
    /// Model answered without retrieval
    Direct,
    /// Answer grounded on retrieved passages
    Retrieval,
    /// Retrieval found nothing usable
    NoEvidence,
}

impl AnswerPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerPath::Direct => "direct",
            AnswerPath::Retrieval => "retrieval",
            AnswerPath::NoEvidence => "no_evidence",
        }
    }
}

/// Identifiers attached to every log line of one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnContext {
    pub conversation_id: ConversationId,
    pub turn_id: Uuid,
}

impl TurnContext {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            turn_id: Uuid::now_v7(),
        }
    }
}

/// Result of a successful turn
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub source_documents: Vec<SourceDocument>,
    pub path: AnswerPath,
    /// States visited, in order
    pub states: Vec<PipelineState>,
}

/// Response handed to the web layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub message: String,
    /// Filename of the top-ranked source, if any
    pub source_document: Option<String>,
    /// Page of the top-ranked source, if any
    pub source_document_page: Option<u32>,
    pub source_documents: Vec<SourceDocument>,
}

impl AnswerResponse {
    /// Response with text only
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source_document: None,
            source_document_page: None,
            source_documents: Vec::new(),
        }
    }
}

impl From<Answer> for AnswerResponse {
    fn from(answer: Answer) -> Self {
        let top = answer.source_documents.first();
        Self {
            source_document: top.map(|d| d.filename.clone()),
            source_document_page: top.and_then(|d| d.page),
            message: answer.text,
            source_documents: answer.source_documents,
        }
    }
}

pub struct RagPipeline {
    expander: Arc<dyn QueryExpansionStrategy>,
    retriever: Retriever,
    ranker: PassageRanker,
    decision: ToolDecisionEngine,
    assembler: ContextAssembler,
    generator: AnswerGenerator,
    error_fallback_message: String,
}

impl RagPipeline {
    pub fn new(
        expander: Arc<dyn QueryExpansionStrategy>,
        retriever: Retriever,
        ranker: PassageRanker,
        decision: ToolDecisionEngine,
        assembler: ContextAssembler,
        generator: AnswerGenerator,
        error_fallback_message: impl Into<String>,
    ) -> Self {
        Self {
            expander,
            retriever,
            ranker,
            decision,
            assembler,
            generator,
            error_fallback_message: error_fallback_message.into(),
        }
    }

    /// Wire every stage from configuration around the given collaborators
    pub fn from_config(
        config: &AppConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn PassageIndex>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        // Rank by the metric the index actually scores with
        let metric = index.metric();
        if metric != config.index.metric {
            tracing::warn!(
                configured = ?config.index.metric,
                reported = ?metric,
                "Index metric differs from configuration, ranking by the reported metric"
            );
        }
        let ranker = PassageRanker::new(config.index.score_direction_for(metric), config.retrieval.max_passages);

        let retriever = Retriever::new(
            embedder,
            index,
            config.index.collection.clone(),
            config.retrieval.top_k_per_variant,
            RetryPolicy::from_config(&config.resilience, config.index_timeout()),
        );
        let decision = ToolDecisionEngine::new(model.clone(), config.llm.temperature, config.llm.max_tokens);
        let generator = AnswerGenerator::new(
            model,
            config.llm.temperature,
            config.llm.max_tokens,
            config.retrieval.preview_chars,
            config.assistant.insufficient_evidence_message.clone(),
        );

        Self::new(
            Arc::new(ThaiQueryExpander::new(config.retrieval.function_words.clone())),
            retriever,
            ranker,
            decision,
            ContextAssembler::new(&config.assistant),
            generator,
            config.assistant.error_fallback_message.clone(),
        )
    }

    /// Answer one utterance. Never fails: errors are logged and replaced by
    /// the error fallback sentence.
    pub async fn answer(
        &self,
        turn: &TurnContext,
        utterance: &str,
        history: &[ConversationMessage],
    ) -> AnswerResponse {
        let span = tracing::info_span!(
            "pipeline.turn",
            conversation_id = %turn.conversation_id,
            turn_id = %turn.turn_id,
        );

        async {
            let start = Instant::now();
            match self.run(utterance, history).await {
                Ok(answer) => {
                    metrics::record_answer(start.elapsed().as_secs_f64(), answer.path.as_str());
                    tracing::info!(
                        path = answer.path.as_str(),
                        passages = answer.source_documents.len(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Turn answered"
                    );
                    answer.into()
                }
                Err(e) => {
                    metrics::record_pipeline_error(e.code().as_str());
                    tracing::error!(
                        conversation_id = %turn.conversation_id,
                        turn_id = %turn.turn_id,
                        error_code = e.code().as_str(),
                        error = %e,
                        "Turn failed, returning fallback message"
                    );
                    AnswerResponse::message_only(self.error_fallback_message.clone())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the state machine for one turn
    pub async fn run(&self, utterance: &str, history: &[ConversationMessage]) -> Result<Answer> {
        if utterance.trim().is_empty() {
            return Err(AppError::validation("utterance", "utterance must not be blank"));
        }

        let mut states = vec![PipelineState::Deciding];

        let decision_context = self.assembler.assemble(history, utterance, &[]);
        let decision = self.decision.decide(decision_context.to_messages()).await?;

        match &decision {
            Decision::RespondDirectly(text) => {
                states.extend([PipelineState::Generating, PipelineState::Done]);
                tracing::debug!(?states, "Direct answer");
                Ok(Answer {
                    text: text.clone(),
                    source_documents: Vec::new(),
                    path: AnswerPath::Direct,
                    states,
                })
            }
            Decision::InvokeCapability { .. } => {
                states.push(PipelineState::Retrieving);
                let query = decision.requested_query().unwrap_or(utterance);
                let variants = self.expander.expand(query);
                tracing::debug!(query = %query, variants = variants.len(), "Retrieving passages");

                let hits = self.retriever.retrieve(&variants).await?;
                let ranked = self.ranker.rank(hits);
                metrics::record_ranked(ranked.len());

                states.push(PipelineState::Generating);
                let context = self.assembler.assemble(history, utterance, &ranked);
                let generated = self.generator.generate(&context).await?;
                states.push(PipelineState::Done);

                let path = if generated.insufficient_evidence {
                    AnswerPath::NoEvidence
                } else {
                    AnswerPath::Retrieval
                };
                tracing::debug!(?states, ranked = ranked.len(), "Grounded answer");

                Ok(Answer {
                    text: generated.text,
                    source_documents: generated.source_documents,
                    path,
                    states,
                })
            }
        }
    }
}
