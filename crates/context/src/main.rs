//! FinChat Context Engine
//!
//! Line-oriented front end for the answering pipeline: every stdin line is
//! one utterance in a single conversation, every answer is printed as one
//! JSON line on stdout.

use finchat_common::{
    config::AppConfig,
    conversation::InMemoryConversationStore,
    embeddings::{create_embedder, Embedder},
    llm::OpenAIChatModel,
    metrics::{self, LATENCY_BUCKETS},
    VERSION,
};
use finchat_context::{ConversationService, RagPipeline};
use finchat_search::QdrantIndex;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    info!(
        service = %config.observability.service_name,
        "Starting FinChat Context Engine v{}", VERSION
    );

    config.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets(LATENCY_BUCKETS)?
            .install()?;
        metrics::register_metrics();
        info!("Metrics exporter listening on {}", addr);
    }

    // Wire collaborators
    let embedder = create_embedder(&config.embedding, &config.resilience)?;
    let index = Arc::new(QdrantIndex::new(&config.index)?);
    let model = Arc::new(OpenAIChatModel::new(&config.llm, &config.resilience)?);
    info!(
        embedding_model = embedder.model_name(),
        chat_model = %config.llm.model,
        collection = %config.index.collection,
        metric = ?config.index.metric,
        "Pipeline configured"
    );

    let pipeline = Arc::new(RagPipeline::from_config(&config, embedder, index, model));
    let store = Arc::new(InMemoryConversationStore::new());
    let service = ConversationService::new(pipeline, store, config.assistant.history_window);

    let conversation_id = Uuid::now_v7();
    info!(%conversation_id, "Ready, reading utterances from stdin");

    tokio::select! {
        result = serve(&service, conversation_id) => result?,
        _ = shutdown_signal() => {}
    }

    info!("Context Engine shutting down");
    Ok(())
}

/// Answer stdin lines until EOF
async fn serve(service: &ConversationService, conversation_id: Uuid) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = service.reply(conversation_id, &line).await?;
        let mut json = serde_json::to_string(&response)?;
        json.push('\n');
        stdout.write_all(json.as_bytes()).await?;
        stdout.flush().await?;
    }

    info!("End of input");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
