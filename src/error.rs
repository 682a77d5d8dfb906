/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body / WWW-Authenticate)
 * - 認証 (AuthError) / 認可 (ScopeError) の失敗を固定メッセージに変換
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::auth::{AuthError, ScopeError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),
    #[error(transparent)]
    Forbidden(#[from] ScopeError),
    // Handler expected a verified token but the route has no gate in front of it.
    #[error("Could not retrieve token from context")]
    MissingAuthContext,
    #[error("internal server error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, challenge) = match &self {
            AppError::Unauthorized(AuthError::MissingHeader) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", Some("Bearer"))
            }
            AppError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                Some("Bearer error=\"invalid_token\""),
            ),
            AppError::Forbidden(ScopeError::Insufficient) => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                Some("Bearer error=\"insufficient_scope\""),
            ),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", None),
            AppError::MissingAuthContext => {
                tracing::error!("protected handler reached without a verified token");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", None)
            }
            AppError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", None),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message: self.to_string(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(challenge) = challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        response
    }
}
