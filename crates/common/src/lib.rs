//! FinChat Common Library
//!
//! Shared code for the FinChat answering services including:
//! - Error types and handling
//! - Configuration management
//! - Conversation messages and the conversation store contract
//! - Embedding client abstraction
//! - Chat model client abstraction
//! - Timeouts and retries around external calls
//! - Metrics and observability

pub mod config;
pub mod conversation;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod resilience;

// Re-export commonly used types
pub use config::AppConfig;
pub use conversation::{ConversationMessage, ConversationStore};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::ChatModel;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
