//! Conversation messages and the conversation store contract
//!
//! History is always scoped to one conversation id. The store owns the
//! sequences; callers read a bounded window and append new messages.

use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Conversation identifier
pub type ConversationId = Uuid;

/// Message author role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// Structured request from the model to invoke a declared capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back by the tool result message
    pub id: String,

    /// Capability name
    pub name: String,

    /// Parsed JSON arguments
    pub arguments: serde_json::Value,
}

/// One message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,

    pub content: String,

    /// Present on assistant messages that requested a tool invocation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Present on tool result messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Assistant stub carrying tool calls instead of text
    pub fn tool_request(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::new(Role::Assistant, "")
        }
    }

    /// Result of a tool invocation
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// True for assistant messages that only request tool calls
    pub fn is_tool_request(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// Persistence collaborator for conversation history
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Most recent `limit` messages of one conversation, oldest first
    async fn history(&self, conversation_id: ConversationId, limit: usize) -> Result<Vec<ConversationMessage>>;

    /// Append messages to one conversation
    async fn append(&self, conversation_id: ConversationId, messages: Vec<ConversationMessage>) -> Result<()>;
}

/// Process-local store keyed by conversation id
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<ConversationId, Vec<ConversationMessage>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn history(&self, conversation_id: ConversationId, limit: usize) -> Result<Vec<ConversationMessage>> {
        let conversations = self.conversations.read().await;
        let messages = match conversations.get(&conversation_id) {
            Some(messages) => messages,
            None => return Ok(Vec::new()),
        };
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    async fn append(&self, conversation_id: ConversationId, messages: Vec<ConversationMessage>) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations.entry(conversation_id).or_default().extend(messages);
        Ok(())
    }
}
