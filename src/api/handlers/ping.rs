/*
 * Responsibility
 * - GET /api/ping (公開, 疎通用)
 * - GET /api/secure/ping (evaluation.read が必要)
 */
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::api::extractors::Authenticated;

pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"message": "pong"})))
}

pub async fn secure_ping(Authenticated(token): Authenticated) -> impl IntoResponse {
    tracing::debug!(
        sub = token.subject().unwrap_or("-"),
        scopes = ?token.scopes(),
        "secure ping"
    );
    (StatusCode::OK, Json(json!({"message": "pong-secure"})))
}
