//! AcuKG API Gateway
//!
//! HTTP front door of the QA service.
//! Handles:
//! - Question answering (`POST /api/qa`)
//! - Liveness and readiness probes
//! - Vocabulary cache refresh
//! - Rate limiting, CORS, request ids, observability

mod handlers;
mod middleware;

use acukg_common::{
    config::AppConfig,
    graph::{create_graph_store, GraphStore},
    llm::create_chat_model,
    metrics::{self, GRAPH_QUERY_BUCKETS, METRICS_PREFIX, QA_LATENCY_BUCKETS},
    QaService,
};
use axum::{
    extract::Request,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub qa: Arc<QaService>,
    pub graph: Arc<dyn GraphStore>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    init_tracing(&config);
    info!(
        service = %config.observability.service_name,
        "Starting AcuKG gateway v{}",
        acukg_common::VERSION
    );

    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;
    let config = Arc::new(config);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        init_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    // External services
    let graph = create_graph_store(&config.graph)?;
    let chat = create_chat_model(&config.llm)?;
    info!(provider = chat.provider_name(), base_url = %config.llm.base_url, "Chat model configured");
    let qa = Arc::new(QaService::from_config(&config, chat, graph.clone())?);

    // Create app state
    let state = AppState {
        config: config.clone(),
        qa,
        graph,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let stopping = Arc::new(Notify::new());
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let stopping = stopping.clone();
        async move {
            shutdown_signal().await;
            stopping.notify_one();
        }
    });

    drain_with_deadline(server.into_future(), stopping, config.shutdown_timeout()).await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics_exporter(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_qa_duration_seconds", METRICS_PREFIX)),
            QA_LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_graph_query_duration_seconds", METRICS_PREFIX)),
            GRAPH_QUERY_BUCKETS,
        )?
        .install()?;

    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();
    let service_name = config.observability.service_name.clone();

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes, rate limited when enabled
    let mut api_routes = Router::new()
        .route("/qa", post(handlers::qa::ask))
        .route("/vocabulary/refresh", post(handlers::vocabulary::refresh));

    if config.rate_limit.enabled {
        let limiter = create_rate_limiter(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(limiter, rate_limit));
    }

    // Compose the app
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http().make_span_with(move |request: &Request| {
            info_span!(
                "http_request",
                service = %service_name,
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .layer(cors_layer(&config.server.cors_origins))
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// CORS for the configured origins; an empty list allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(origins))
}

/// Wait for `server` to finish draining, giving up `grace` after `stopping` fires
async fn drain_with_deadline<F, E>(server: F, stopping: Arc<Notify>, grace: Duration) -> Result<(), E>
where
    F: Future<Output = Result<(), E>>,
{
    let deadline = async {
        stopping.notified().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result,
        _ = deadline => {
            warn!(grace_secs = grace.as_secs(), "Shutdown timeout elapsed, dropping open connections");
            Ok(())
        }
    }
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
