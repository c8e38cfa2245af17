//! Chat model abstraction
//!
//! One trait for every chat completion call the pipeline makes, with an
//! OpenAI-compatible implementation that supports tool declarations.

use crate::config::{LlmConfig, ResilienceConfig};
use crate::conversation::{ConversationMessage, Role, ToolCall};
use crate::errors::{status_is_retryable, AppError, Result};
use crate::resilience::{call_with_retry, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A capability the model may invoke instead of answering
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

/// Input of one chat completion call
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
    /// Empty means the model cannot call tools
    pub tools: Vec<ToolSpec>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// What the model produced
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCompletion {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

/// Chat completion provider
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion>;

    fn model_name(&self) -> &str;
}

// Wire format

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionSpec<'a>,
}

#[derive(Serialize)]
struct WireFunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments object
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

fn function_kind() -> String {
    "function".to_string()
}

impl<'a> From<&'a ConversationMessage> for WireMessage<'a> {
    fn from(message: &'a ConversationMessage) -> Self {
        Self {
            role: message.role.as_str(),
            content: &message.content,
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: match message.role {
                Role::Tool => message.tool_call_id.as_deref(),
                _ => None,
            },
        }
    }
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        let arguments = if call.function.arguments.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                tracing::warn!(tool = %call.function.name, error = %e, "Tool arguments are not valid JSON");
                serde_json::Value::Object(Default::default())
            })
        };
        ToolCall {
            id: call.id,
            name: call.function.name,
            arguments,
        }
    }
}

/// Interpret the first choice of a chat completion response
fn into_completion(response: WireResponse) -> Result<ChatCompletion> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| AppError::generation("Empty response from LLM"))?;

    if !message.tool_calls.is_empty() {
        return Ok(ChatCompletion::ToolCalls(
            message.tool_calls.into_iter().map(ToolCall::from).collect(),
        ));
    }

    match message.content {
        Some(text) if !text.trim().is_empty() => Ok(ChatCompletion::Text(text)),
        _ => Err(AppError::generation("LLM returned neither text nor tool calls")),
    }
}

/// OpenAI-compatible chat completions client
pub struct OpenAIChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig, resilience: &ResilienceConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "llm.api_key is required".to_string(),
        })?;
        let timeout = Duration::from_secs(config.timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            retry: RetryPolicy::from_config(resilience, timeout),
        })
    }

    async fn call_llm(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let body = WireRequest {
            model: &self.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunctionSpec {
                        name: &tool.name,
                        description: &tool.description,
                        parameters: &tool.parameters,
                    },
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Generation {
                message: format!("LLM API request failed: {}", e),
                retryable: true,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation {
                message: format!("LLM API error {}: {}", status, body),
                retryable: status_is_retryable(status),
            });
        }

        let parsed: WireResponse = response.json().await.map_err(|e| {
            AppError::generation(format!("Failed to parse LLM response: {}", e))
        })?;

        into_completion(parsed)
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        call_with_retry(&self.retry, "llm.chat_completion", || self.call_llm(request)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<ChatCompletion> {
        into_completion(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_text_completion() {
        let completion = parse(json!({
            "choices": [{ "message": { "role": "assistant", "content": "สวัสดีครับ" } }]
        }))
        .unwrap();
        assert_eq!(completion, ChatCompletion::Text("สวัสดีครับ".into()));
    }

    #[test]
    fn test_tool_call_completion() {
        let completion = parse(json!({
            "choices": [{ "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_abc",
                    "type": "function",
                    "function": { "name": "retrieve", "arguments": "{\"query\":\"ค่าเดินทาง\"}" }
                }]
            } }]
        }))
        .unwrap();

        match completion {
            ChatCompletion::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "call_abc");
                assert_eq!(calls[0].name, "retrieve");
                assert_eq!(calls[0].arguments["query"], "ค่าเดินทาง");
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_arguments_become_empty_object() {
        let completion = parse(json!({
            "choices": [{ "message": { "tool_calls": [{
                "id": "call_1",
                "function": { "name": "retrieve", "arguments": "{not json" }
            }] } }]
        }))
        .unwrap();

        let ChatCompletion::ToolCalls(calls) = completion else {
            panic!("expected tool calls");
        };
        assert!(calls[0].arguments.as_object().is_some_and(|o| o.is_empty()));
    }

    #[test]
    fn test_empty_completion_is_generation_error() {
        let no_choices = parse(json!({ "choices": [] }));
        assert!(matches!(no_choices, Err(AppError::Generation { .. })));

        let blank = parse(json!({ "choices": [{ "message": { "content": "   " } }] }));
        assert!(matches!(blank, Err(AppError::Generation { .. })));
    }

    #[test]
    fn test_wire_message_carries_tool_fields() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "retrieve".into(),
            arguments: json!({ "query": "q" }),
        };
        let request = ConversationMessage::tool_request(vec![call]);
        let wire = serde_json::to_value(WireMessage::from(&request)).unwrap();
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], "{\"query\":\"q\"}");
        assert!(wire.get("tool_call_id").is_none());

        let result = ConversationMessage::tool_result("call_1", "passages");
        let wire = serde_json::to_value(WireMessage::from(&result)).unwrap();
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_1");
    }

    #[test]
    fn test_requires_api_key() {
        let config = LlmConfig::default();
        assert!(OpenAIChatModel::new(&config, &ResilienceConfig::default()).is_err());
    }
}
