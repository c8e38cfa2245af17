//! FinChat Context Engine
//!
//! Turns one user utterance into a grounded answer:
//! - Tool decision (retrieve or answer directly)
//! - Context assembly (history filtering, system instruction)
//! - Answer generation with source attribution
//! - The per-turn pipeline and the conversation-scoped service around it

pub mod assembler;
pub mod decision;
pub mod generator;
pub mod pipeline;
pub mod service;

#[cfg(test)]
mod testing;

pub use assembler::{ContextAssembler, GenerationContext};
pub use decision::{Decision, ToolDecisionEngine};
pub use generator::{AnswerGenerator, SourceDocument};
pub use pipeline::{Answer, AnswerPath, AnswerResponse, PipelineState, RagPipeline, TurnContext};
pub use service::ConversationService;
