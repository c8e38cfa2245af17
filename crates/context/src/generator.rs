//! Answer Generator - grounded answer from the assembled context
//!
//! Provides:
//! - One tool-free model call over the assembled context
//! - Source attribution derived from the passages actually supplied
//! - The insufficient-evidence sentence when no passage survived ranking

use crate::assembler::GenerationContext;
use crate::decision::as_generation_error;
use finchat_common::errors::{AppError, Result};
use finchat_common::llm::{ChatCompletion, ChatModel, ChatRequest};
use finchat_common::metrics;
use finchat_search::RankedPassage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// A passage the answer was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub filename: String,
    pub page: Option<u32>,
    /// Ranking score as returned by the index. Higher is better for cosine
    /// and dot collections, lower is better for euclid and manhattan.
    pub confidence_score: f32,
    /// First `preview_chars` characters of the passage
    pub content_preview: String,
    pub full_content: String,
}

/// Generated text plus the passages it was grounded on
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub text: String,
    pub source_documents: Vec<SourceDocument>,
    /// True when no model call was made for lack of passages
    pub insufficient_evidence: bool,
}

/// Attribution entries for `passages`, in ranked order
pub fn source_documents(passages: &[RankedPassage], preview_chars: usize) -> Vec<SourceDocument> {
    passages
        .iter()
        .map(|ranked| SourceDocument {
            filename: ranked.passage.source_filename.clone(),
            page: ranked.passage.page,
            confidence_score: ranked.confidence_score,
            content_preview: ranked.passage.content.chars().take(preview_chars).collect(),
            full_content: ranked.passage.content.clone(),
        })
        .collect()
}

pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    temperature: f32,
    max_tokens: usize,
    preview_chars: usize,
    insufficient_evidence_message: String,
}

impl AnswerGenerator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        temperature: f32,
        max_tokens: usize,
        preview_chars: usize,
        insufficient_evidence_message: impl Into<String>,
    ) -> Self {
        Self {
            model,
            temperature,
            max_tokens,
            preview_chars,
            insufficient_evidence_message: insufficient_evidence_message.into(),
        }
    }

    pub async fn generate(&self, context: &GenerationContext) -> Result<GeneratedAnswer> {
        if context.passages_used.is_empty() {
            return Ok(GeneratedAnswer {
                text: self.insufficient_evidence_message.clone(),
                source_documents: Vec::new(),
                insufficient_evidence: true,
            });
        }

        let request = ChatRequest {
            messages: context.to_messages(),
            tools: Vec::new(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let start = Instant::now();
        let result = self.model.complete(&request).await;
        metrics::record_model_call(start.elapsed().as_secs_f64(), "generation", result.is_ok());

        let text = match result.map_err(as_generation_error)? {
            ChatCompletion::Text(text) => text,
            ChatCompletion::ToolCalls(_) => {
                return Err(AppError::generation("Model requested a tool call during answer generation"))
            }
        };

        Ok(GeneratedAnswer {
            text,
            source_documents: source_documents(&context.passages_used, self.preview_chars),
            insufficient_evidence: false,
        })
    }
}
