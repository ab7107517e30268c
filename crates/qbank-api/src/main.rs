//! qbank-api - HTTP API server for qbank.
//!
//! Wires the storage layer, inference backends, worker pool, and HTTP
//! surface together. Task processing runs in-process alongside the server;
//! additional instances may point at the same database and share the queue
//! safely (claims are store-enforced).

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qbank_core::{defaults, ArticleRepository, EmbeddingBackend, QueueRepository};
use qbank_db::{Database, DedupEngine, PgArticleRepository, PgQueueRepository, PoolConfig};
use qbank_inference::{OllamaBackend, PromptTemplate, QuestionEnricher};
use qbank_jobs::{TaskPipeline, WorkerPool, WorkerPoolConfig};

use handlers::AppState;

/// Initialize tracing.
///
/// `RUST_LOG` sets the filter (default `qbank_api=debug,tower_http=info`),
/// `LOG_FORMAT=json` switches to JSON output, and `LOG_FILE=<path>` routes
/// events to a daily-rolling file instead of stderr. The returned guard
/// must stay alive for the process lifetime or buffered file output is lost.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "qbank_api=debug,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json");
    let registry = tracing_subscriber::registry().with(filter);

    match std::env::var("LOG_FILE").ok() {
        Some(path) => {
            let path = std::path::Path::new(&path);
            let appender = tracing_appender::rolling::daily(
                path.parent().unwrap_or(std::path::Path::new(".")),
                path.file_name()
                    .and_then(|f| f.to_str())
                    .unwrap_or("qbank-api.log"),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            if json {
                registry.with(layer.json()).init();
            } else {
                registry.with(layer).init();
            }
            Some(guard)
        }
        None => {
            let layer = tracing_subscriber::fmt::layer();
            if json {
                registry.with(layer.json()).init();
            } else {
                registry.with(layer).init();
            }
            None
        }
    }
}

/// Resolve SIGINT/SIGTERM into a graceful-shutdown future.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing();

    // Get configuration from environment
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/qbank".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::SERVER_PORT);

    let merge_threshold: f64 = std::env::var("QBANK_MERGE_THRESHOLD")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::MERGE_THRESHOLD);

    // Connect to database and run pending migrations
    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Inference backends
    let backend = Arc::new(OllamaBackend::from_env());
    info!(
        embed_model = EmbeddingBackend::model_name(backend.as_ref()),
        dimension = backend.dimension(),
        "Inference backend initialized"
    );

    let mut enricher = QuestionEnricher::new(backend.clone());
    if let Ok(template_path) = std::env::var("QBANK_ENRICH_TEMPLATE") {
        enricher = enricher.with_template(PromptTemplate::from_file(&template_path)?);
        info!(template = %template_path, "Loaded enrichment prompt template");
    }

    // Worker pool
    let queue: Arc<dyn QueueRepository> = Arc::new(PgQueueRepository::new(db.pool.clone()));
    let articles: Arc<dyn ArticleRepository> = Arc::new(PgArticleRepository::new(db.pool.clone()));

    let pipeline = Arc::new(TaskPipeline::new(
        queue.clone(),
        Arc::new(enricher),
        backend.clone(),
        DedupEngine::with_threshold(articles, merge_threshold),
    ));

    let worker_config = WorkerPoolConfig::from_env();
    let worker_handle = WorkerPool::new(queue, pipeline, worker_config).start();

    // HTTP surface
    let state = AppState {
        db,
        embedding: backend,
    };

    let app = Router::new()
        .route("/api/tasks", post(handlers::create_task))
        .route("/api/tasks/:id", get(handlers::get_task))
        .route("/api/articles", get(handlers::list_articles))
        .route("/api/articles/:id", get(handlers::get_article))
        .route("/api/articles/:id/similar", get(handlers::similar_articles))
        .route("/api/search", post(handlers::search_articles))
        .route("/api/tags", get(handlers::list_tags))
        .route("/api/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!(%addr, "qbank API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight tasks finish before exiting.
    info!("Stopping worker pool...");
    worker_handle.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}
