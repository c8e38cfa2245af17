//! Test doubles shared by the context crate's tests

use async_trait::async_trait;
use finchat_common::config::{AppConfig, DistanceMetric};
use finchat_common::conversation::{Role, ToolCall};
use finchat_common::embeddings::{Embedder, HashingEmbedder};
use finchat_common::errors::{AppError, Result};
use finchat_common::llm::{ChatCompletion, ChatModel, ChatRequest};
use finchat_search::{InMemoryPassageIndex, PassageIndex, RetrievedPassage};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

const EMBEDDING_DIMENSION: usize = 256;

/// Runnable configuration with a local embedder and fast retries
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.embedding.provider = "hashing".into();
    config.embedding.dimension = EMBEDDING_DIMENSION;
    config.llm.api_key = Some("sk-test".into());
    config.resilience.max_retries = 1;
    config.resilience.initial_backoff_ms = 1;
    config.resilience.max_backoff_ms = 2;
    config
}

pub fn hashing_embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::new(EMBEDDING_DIMENSION))
}

/// Small finance-manual corpus plus one unrelated passage
pub async fn seeded_index() -> Arc<dyn PassageIndex> {
    let collection = test_config().index.collection;
    let embedder = HashingEmbedder::new(EMBEDDING_DIMENSION);
    let index = InMemoryPassageIndex::new(DistanceMetric::Cosine);

    let corpus = [
        (
            "หลักเกณฑ์การเบิกค่าใช้จ่ายในการเดินทางไปราชการ ผู้เดินทางต้องยื่นเอกสารภายใน 15 วัน",
            "travel.pdf",
            Some(3),
        ),
        ("อัตราค่าเบี้ยเลี้ยงเดินทางไปราชการในประเทศ วันละ 240 บาท", "rates.pdf", Some(5)),
        ("Library opening hours are posted weekly on the notice board", "notice.pdf", None),
    ];
    for (content, filename, page) in corpus {
        let embedding = embedder.embed(content).await.unwrap();
        index.insert(&collection, embedding, content, filename, page).await;
    }

    Arc::new(index)
}

/// Single retrieve call with the given query argument
pub fn tool_call(name: &str, query: &str) -> ChatCompletion {
    ChatCompletion::ToolCalls(vec![ToolCall {
        id: "call_0".into(),
        name: name.into(),
        arguments: serde_json::json!({ "query": query }),
    }])
}

/// Replays scripted completions in order and records every request
pub struct ScriptedChatModel {
    script: Mutex<VecDeque<Result<ChatCompletion>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatModel {
    pub fn new(script: Vec<Result<ChatCompletion>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::generation("script exhausted")))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Answers every turn directly by echoing the latest user message
#[derive(Default)]
pub struct EchoChatModel {
    requests: Mutex<Vec<ChatRequest>>,
}

impl EchoChatModel {
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for EchoChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        self.requests.lock().unwrap().push(request.clone());
        // Yield so concurrent turns interleave
        tokio::task::yield_now().await;
        let last = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatCompletion::Text(format!("รับทราบ: {}", last)))
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

/// Index that is always unreachable
pub struct FailingIndex;

#[async_trait]
impl PassageIndex for FailingIndex {
    async fn search(&self, _: &str, _: &[f32], _: usize) -> Result<Vec<RetrievedPassage>> {
        Err(AppError::Index {
            message: "connection refused".into(),
            retryable: true,
        })
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }
}

/// Log output captured by [`capture_logs`]
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route this thread's tracing output into a buffer until the guard drops
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
