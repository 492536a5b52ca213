//! RagForge API Gateway
//!
//! HTTP entry point for the knowledge base:
//! - File upload with indexing
//! - Global and per-document question answering
//! - Observability (logging, metrics, health)

mod handlers;
mod middleware;
mod storage;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use ragforge_common::{config::AppConfig, metrics, telemetry};
use ragforge_context::RagOrchestrator;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storage::FileStorage;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

/// Multipart framing allowance on top of the file size limit
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<RagOrchestrator>,
    pub storage: Arc<dyn FileStorage>,
    pub metrics: PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    telemetry::init_tracing(&config.observability)?;

    info!("Starting RagForge API Gateway v{}", ragforge_common::VERSION);

    // Every required value is checked before anything touches the network
    config.validate().inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    let config = Arc::new(config);

    let metrics_handle = install_metrics_recorder(&config.observability.service_name)?;
    metrics::register_metrics();

    let orchestrator = Arc::new(RagOrchestrator::from_config(&config)?);
    let storage = storage::from_config(&config.storage).await?;
    info!(provider = ?storage.provider(), "File storage ready");

    let state = AppState {
        config: config.clone(),
        orchestrator,
        storage,
        metrics: metrics_handle,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host / server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn install_metrics_recorder(service_name: &str) -> anyhow::Result<PrometheusHandle> {
    Ok(prometheus_builder(service_name)?.install_recorder()?)
}

/// Exporter with histogram buckets and every series tagged with the service name
fn prometheus_builder(service_name: &str) -> anyhow::Result<PrometheusBuilder> {
    let builder = PrometheusBuilder::new()
        .add_global_label("service", service_name)
        .set_buckets_for_metric(
            Matcher::Suffix("request_duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("embedding_duration_seconds".to_string()),
            metrics::PROVIDER_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("generation_duration_seconds".to_string()),
            metrics::PROVIDER_BUCKETS,
        )?;
    Ok(builder)
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let body_limit = state.config.server.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let timeout = state.config.request_timeout();
    let max_concurrent = state.config.server.max_concurrent_requests.max(1);

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))

        // Upload endpoints
        .route("/upload", post(handlers::upload::upload_file))
        .route("/upload/ask-instant", post(handlers::upload::ask_instant))

        // Knowledge base endpoints
        .route("/rag/ask-global", post(handlers::rag::ask_global))

        .layer(from_fn(middleware::metrics::track_metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(request_timeout_layer(timeout))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Requests exceeding the deadline are answered with 408
fn request_timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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
