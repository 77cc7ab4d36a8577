//! Route handlers.

use std::convert::Infallible;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::{Value, json};
use tracing::debug;
use warden_core::GatewayError;

use crate::error::ApiError;
use crate::health::{HealthResponse, health_check};
use crate::identity::Caller;
use crate::server::AppState;

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Caller(identity): Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: Value = serde_json::from_slice(&body).map_err(|e| {
        debug!(client_id = %identity, error = %e, "unparseable chat body");
        GatewayError::Validation("Invalid JSON body".into())
    })?;

    let frames = state.gateway.handle(&identity, &body).await?;
    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

/// GET /api/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let conversation = state.gateway.conversation(&id).await?;
    Ok(Json(conversation).into_response())
}

/// DELETE /api/conversations/{id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.gateway.clear(&id).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/rate-limit/stats
pub async fn rate_limit_stats(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> Result<Response, ApiError> {
    let stats = state.gateway.stats(&identity).await?;
    Ok(Json(json!({ "clientId": identity, "stats": stats })).into_response())
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(state.start_time))
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
