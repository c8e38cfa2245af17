//! Tool decision - lets the model choose between retrieval and a direct reply
//!
//! The model is offered a single `retrieve` capability. Its reply becomes an
//! explicit [`Decision`] the pipeline switches on.

use finchat_common::conversation::ConversationMessage;
use finchat_common::errors::{AppError, Result};
use finchat_common::llm::{ChatCompletion, ChatModel, ChatRequest, ToolSpec};
use finchat_common::metrics;
use std::sync::Arc;
use std::time::Instant;

/// Name of the declared retrieval capability
pub const RETRIEVE_TOOL: &str = "retrieve";

/// Outcome of the decision call
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Answer without retrieval
    RespondDirectly(String),

    /// Run the named capability with the given arguments
    InvokeCapability {
        name: String,
        arguments: serde_json::Value,
        call_id: String,
    },
}

impl Decision {
    /// Non-blank `query` argument of a capability call
    pub fn requested_query(&self) -> Option<&str> {
        match self {
            Decision::InvokeCapability { arguments, .. } => arguments
                .get("query")
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty()),
            Decision::RespondDirectly(_) => None,
        }
    }
}

/// Declaration of the retrieval capability offered to the model
pub fn retrieve_tool() -> ToolSpec {
    ToolSpec {
        name: RETRIEVE_TOOL.to_string(),
        description: "Retrieve information related to a query from Thai documents.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        }),
    }
}

/// Any failure at a model call site surfaces as a generation error
pub(crate) fn as_generation_error(error: AppError) -> AppError {
    match error {
        AppError::Generation { .. } => error,
        other => AppError::Generation {
            message: other.to_string(),
            retryable: false,
        },
    }
}

pub struct ToolDecisionEngine {
    model: Arc<dyn ChatModel>,
    temperature: f32,
    max_tokens: usize,
}

impl ToolDecisionEngine {
    pub fn new(model: Arc<dyn ChatModel>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            model,
            temperature,
            max_tokens,
        }
    }

    /// One tool-enabled model call over the visible conversation
    pub async fn decide(&self, messages: Vec<ConversationMessage>) -> Result<Decision> {
        let request = ChatRequest {
            messages,
            tools: vec![retrieve_tool()],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let start = Instant::now();
        let result = self.model.complete(&request).await;
        metrics::record_model_call(start.elapsed().as_secs_f64(), "decision", result.is_ok());

        match result.map_err(as_generation_error)? {
            ChatCompletion::Text(text) => Ok(Decision::RespondDirectly(text)),
            ChatCompletion::ToolCalls(calls) => {
                if calls.len() > 1 {
                    tracing::debug!(requested = calls.len(), "Model requested several tool calls, using the first");
                }
                let call = calls
                    .into_iter()
                    .next()
                    .ok_or_else(|| AppError::generation("Model returned an empty tool call list"))?;

                if call.name != RETRIEVE_TOOL {
                    return Err(AppError::generation(format!(
                        "Model requested unknown capability `{}`",
                        call.name
                    )));
                }

                Ok(Decision::InvokeCapability {
                    name: call.name,
                    arguments: call.arguments,
                    call_id: call.id,
                })
            }
        }
    }
}
