use crate::config::Config;
use crate::segments::SegmentStore;
use crate::supervisor::StreamSupervisor;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use camcast_av::HlsTranscodeSettings;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod routes_hls;
pub mod routes_stream;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub supervisor: Arc<StreamSupervisor>,
    pub store: SegmentStore,
}

impl AppContext {
    /// Wire a supervisor and store from `config`, launching `program` as the
    /// transcoder.
    pub fn new(config: Config, program: PathBuf) -> Self {
        let store = SegmentStore::new(&config.store.dir);
        let supervisor = StreamSupervisor::new(
            config.supervisor.clone(),
            HlsTranscodeSettings::from(&config.transcoder),
            program,
            store.clone(),
        );

        Self {
            config: Arc::new(config),
            supervisor: Arc::new(supervisor),
            store,
        }
    }
}

pub fn create_router(ctx: AppContext) -> Router {
    // The browser client is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .merge(routes_stream::stream_routes())
        .merge(routes_hls::hls_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Resolve the transcoder binary: configured path, then PATH, then the bare
/// name so a missing ffmpeg surfaces as a launch error per request.
pub fn resolve_transcoder(config: &Config) -> PathBuf {
    match camcast_av::get_tool_path("ffmpeg", config.transcoder.ffmpeg_path.as_deref()) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("{}; stream starts will fail until it is installed", e);
            PathBuf::from("ffmpeg")
        }
    }
}

pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let program = resolve_transcoder(&config);
    tracing::info!("Using transcoder {:?}", program);

    let ctx = AppContext::new(config, program);

    ctx.store
        .ensure_dir()
        .await
        .with_context(|| format!("Failed to create segment directory {:?}", ctx.store.dir()))?;

    // Leftovers from a previous run must never be served alongside a new session
    let report = ctx.store.purge().await;
    if report.removed > 0 {
        tracing::info!(removed = report.removed, "Removed stale segments");
    }

    let supervisor = ctx.supervisor.clone();
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
