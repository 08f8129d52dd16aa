//! Stream control routes: start, stop and status.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::error::AppError;
use super::AppContext;
use crate::error::Error;
use crate::supervisor::StreamStatus;

pub fn stream_routes() -> Router<AppContext> {
    Router::new()
        .route("/stream_start", post(start_stream))
        .route("/stream_stop", post(stop_stream))
        .route("/stream_status", get(stream_status))
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub rtsp_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub message: String,
    pub stream_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start (or replace) the stream.
///
/// A missing body, malformed JSON and an absent address are all the same
/// client error.
async fn start_stream(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Option<Json<StartRequest>>,
) -> Result<Json<StartResponse>, AppError> {
    let rtsp_url = body
        .and_then(|Json(req)| req.rtsp_url)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| Error::validation("RTSP url is required"))?;

    // Run the transition on its own task so a client hanging up mid-startup
    // cannot abandon it half way.
    let supervisor = ctx.supervisor.clone();
    let playback = tokio::spawn(async move { supervisor.start_stream(&rtsp_url).await })
        .await
        .map_err(|e| Error::Launch(format!("startup task failed: {}", e)))??;

    let base = base_url(&ctx, &headers);
    Ok(Json(StartResponse {
        message: "Stream started".to_string(),
        stream_url: playback.url(&base),
    }))
}

async fn stop_stream(State(ctx): State<AppContext>) -> Result<Json<MessageResponse>, AppError> {
    let supervisor = ctx.supervisor.clone();
    let ack = tokio::spawn(async move { supervisor.stop_stream().await })
        .await
        .map_err(|e| Error::Termination(format!("stop task failed: {}", e)))??;

    tracing::debug!(session_id = %ack.session_id, removed = ack.files_removed, "Stop acknowledged");

    Ok(Json(MessageResponse {
        message: "Stream stopped".to_string(),
    }))
}

async fn stream_status(State(ctx): State<AppContext>) -> Json<StreamStatus> {
    Json(ctx.supervisor.status())
}

/// Externally reachable origin for playlist URLs.
fn base_url(ctx: &AppContext, headers: &HeaderMap) -> String {
    if let Some(ref public) = ctx.config.server.public_url {
        return public.trim_end_matches('/').to_string();
    }

    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| v == "http" || v == "https")
        .unwrap_or_else(|| "http".to_string());

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("localhost:{}", ctx.config.server.port));

    format!("{}://{}", proto, host)
}
