//! Configuration management for FinChat services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use crate::errors::{AppError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Passage index (vector store) configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Query expansion, retrieval and ranking
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Retry and backoff around external calls
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Persona, response rules and fallback sentences
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashing
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use. Must match the model the corpus was indexed with.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (used by the hashing provider)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// API key for the chat completions endpoint
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Chat model
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Similarity metric the passage collection was built with
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclid,
    Manhattan,
}

/// Which end of the score range means "more relevant"
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDirection {
    /// Similarity scores (cosine, dot product)
    HigherIsBetter,
    /// Distance scores (euclidean, manhattan)
    LowerIsBetter,
}

impl DistanceMetric {
    /// Score direction implied by the metric
    pub fn score_direction(&self) -> ScoreDirection {
        match self {
            DistanceMetric::Cosine | DistanceMetric::Dot => ScoreDirection::HigherIsBetter,
            DistanceMetric::Euclid | DistanceMetric::Manhattan => ScoreDirection::LowerIsBetter,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Qdrant REST URL
    #[serde(default = "default_index_url")]
    pub url: String,

    /// Qdrant API key (optional)
    pub api_key: Option<String>,

    /// Collection holding the embedded passages
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Metric the collection was created with
    #[serde(default = "default_metric")]
    pub metric: DistanceMetric,

    /// Overrides the direction derived from `metric`
    pub score_direction: Option<ScoreDirection>,

    /// Payload key holding the passage text
    #[serde(default = "default_content_key")]
    pub content_key: String,

    /// Payload key holding filename/page metadata
    #[serde(default = "default_metadata_key")]
    pub metadata_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,
}

impl IndexConfig {
    /// Ranking direction for an index that reports `metric`
    pub fn score_direction_for(&self, metric: DistanceMetric) -> ScoreDirection {
        self.score_direction.unwrap_or_else(|| metric.score_direction())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Hits requested per query variant
    #[serde(default = "default_top_k")]
    pub top_k_per_variant: usize,

    /// Maximum ranked passages handed to generation
    #[serde(default = "default_max_passages")]
    pub max_passages: usize,

    /// High-frequency words stripped to build an extra query variant
    #[serde(default = "default_function_words")]
    pub function_words: Vec<String>,

    /// Characters kept in a source document preview
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResilienceConfig {
    /// Extra attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff interval in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantConfig {
    /// Persona and domain scope, first paragraph of the system instruction
    #[serde(default = "default_persona")]
    pub persona: String,

    /// Response-format rules, rendered as a bullet list
    #[serde(default = "default_rules")]
    pub rules: Vec<String>,

    /// Sentence used when the documents do not contain the answer
    #[serde(default = "default_insufficient_evidence")]
    pub insufficient_evidence_message: String,

    /// Sentence returned when the pipeline fails
    #[serde(default = "default_error_fallback")]
    pub error_fallback_message: String,

    /// Prior messages supplied to each turn
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-large".to_string() }
fn default_embedding_dimension() -> usize { 3072 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_llm_api_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_temperature() -> f32 { 0.2 }
fn default_max_tokens() -> usize { 1500 }
fn default_llm_timeout() -> u64 { 60 }
fn default_index_url() -> String { "http://localhost:6333".to_string() }
fn default_collection() -> String { "01_docs".to_string() }
fn default_metric() -> DistanceMetric { DistanceMetric::Cosine }
fn default_content_key() -> String { "page_content".to_string() }
fn default_metadata_key() -> String { "metadata".to_string() }
fn default_index_timeout() -> u64 { 10 }
fn default_top_k() -> usize { 5 }
fn default_max_passages() -> usize { 10 }
fn default_preview_chars() -> usize { 200 }
fn default_max_retries() -> u32 { 2 }
fn default_initial_backoff() -> u64 { 200 }
fn default_max_backoff() -> u64 { 2_000 }
fn default_history_window() -> usize { 20 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 0 }
fn default_service_name() -> String { "finchat".to_string() }

fn default_function_words() -> Vec<String> {
    vec!["การ".to_string(), "ค่า".to_string(), "ใน".to_string()]
}

fn default_persona() -> String {
    "คุณคือ LannaFinChat ผู้ช่วยอัจฉริยะทางการเงินของมหาวิทยาลัยเทคโนโลยีราชมงคลล้านนา น่าน\n\n\
     คุณมีความเชี่ยวชาญในการให้คำปรึกษาเกี่ยวกับ **\"คู่มือปฏิบัติงานด้านการเงินและการเบิกจ่ายค่าใช้จ่ายในการดำเนินงาน\"**"
        .to_string()
}

fn default_rules() -> Vec<String> {
    vec![
        "ใช้ **ภาษาไทย** เท่านั้น".to_string(),
        "ตอบในรูปแบบ **Markdown**".to_string(),
        "ให้คำตอบที่ **ชัดเจน ละเอียด เป็นลำดับขั้นตอน**".to_string(),
        "หากจำเป็น สรุปเป็น **ตาราง Markdown**".to_string(),
        "ลงท้ายว่า \"**ครับ**\" หรือ \"**ไม่ครับ**\"".to_string(),
        "คำตอบควรมี **ความสุภาพ อารมณ์ดี และเป็นมิตร**".to_string(),
    ]
}

fn default_insufficient_evidence() -> String {
    "LannaFinChat ไม่สามารถหาคำตอบจากเอกสารได้ครับ".to_string()
}

fn default_error_fallback() -> String {
    "ขออภัยครับ เกิดข้อผิดพลาดในการประมวลผลคำถาม".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_llm_api_base(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            api_key: None,
            collection: default_collection(),
            metric: default_metric(),
            score_direction: None,
            content_key: default_content_key(),
            metadata_key: default_metadata_key(),
            timeout_secs: default_index_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_per_variant: default_top_k(),
            max_passages: default_max_passages(),
            function_words: default_function_words(),
            preview_chars: default_preview_chars(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            rules: default_rules(),
            insufficient_evidence_message: default_insufficient_evidence(),
            error_fallback_message: default_error_fallback(),
            history_window: default_history_window(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__LLM__MODEL=gpt-4o
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k_per_variant == 0 {
            return Err(config_error("retrieval.top_k_per_variant must be at least 1"));
        }
        if self.retrieval.max_passages == 0 {
            return Err(config_error("retrieval.max_passages must be at least 1"));
        }
        if self.index.collection.trim().is_empty() {
            return Err(config_error("index.collection must not be empty"));
        }
        let assistant = &self.assistant;
        if assistant.insufficient_evidence_message.trim().is_empty()
            || assistant.error_fallback_message.trim().is_empty()
        {
            return Err(config_error("assistant fallback messages must not be empty"));
        }
        if assistant.insufficient_evidence_message == assistant.error_fallback_message {
            return Err(config_error(
                "assistant.error_fallback_message must differ from insufficient_evidence_message",
            ));
        }
        if self.embedding.provider == "openai" && is_blank(&self.embedding.api_key) {
            return Err(config_error("embedding.api_key is required for the openai provider"));
        }
        if is_blank(&self.llm.api_key) {
            return Err(config_error("llm.api_key is required"));
        }
        Ok(())
    }

    /// Timeout for one embedding request
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }

    /// Timeout for one index search
    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index.timeout_secs)
    }

    /// Timeout for one chat model call
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn config_error(message: &str) -> AppError {
    AppError::Configuration {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable() -> AppConfig {
        let mut config = AppConfig::default();
        config.embedding.api_key = Some("sk-embed".into());
        config.llm.api_key = Some("sk-chat".into());
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.top_k_per_variant, 5);
        assert_eq!(config.retrieval.max_passages, 10);
        assert_eq!(config.retrieval.preview_chars, 200);
        assert_eq!(config.index.collection, "01_docs");
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_metric_direction() {
        assert_eq!(DistanceMetric::Cosine.score_direction(), ScoreDirection::HigherIsBetter);
        assert_eq!(DistanceMetric::Dot.score_direction(), ScoreDirection::HigherIsBetter);
        assert_eq!(DistanceMetric::Euclid.score_direction(), ScoreDirection::LowerIsBetter);
        assert_eq!(DistanceMetric::Manhattan.score_direction(), ScoreDirection::LowerIsBetter);
    }

    #[test]
    fn test_direction_override() {
        let mut index = IndexConfig::default();
        assert_eq!(index.score_direction_for(DistanceMetric::Cosine), ScoreDirection::HigherIsBetter);
        assert_eq!(index.score_direction_for(DistanceMetric::Euclid), ScoreDirection::LowerIsBetter);

        index.score_direction = Some(ScoreDirection::LowerIsBetter);
        assert_eq!(index.score_direction_for(DistanceMetric::Cosine), ScoreDirection::LowerIsBetter);
    }

    #[test]
    fn test_validation() {
        assert!(runnable().validate().is_ok());

        let missing_key = AppConfig::default();
        assert!(matches!(missing_key.validate(), Err(AppError::Configuration { .. })));

        let mut zero_cap = runnable();
        zero_cap.retrieval.max_passages = 0;
        assert!(zero_cap.validate().is_err());

        let mut same_fallbacks = runnable();
        same_fallbacks.assistant.error_fallback_message =
            same_fallbacks.assistant.insufficient_evidence_message.clone();
        assert!(same_fallbacks.validate().is_err());

        let mut local = runnable();
        local.embedding.provider = "hashing".into();
        local.embedding.api_key = None;
        assert!(local.validate().is_ok());
    }

    #[test]
    fn test_metric_deserialization() {
        let metric: DistanceMetric = serde_json::from_str("\"euclid\"").unwrap();
        assert_eq!(metric, DistanceMetric::Euclid);
    }
}
