use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::auth::VerifiedToken;

/// Handler で、検証済みトークンを受け取るための extractor
/// access middleware が VerifiedToken を request.extensions() に insert 済みである前提
/// 見つからない場合はクライアントの問題ではなく配線ミスなので 500 を返す (fail closed)
#[derive(Debug, Clone)]
pub struct Authenticated(pub VerifiedToken);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedToken>()
            .cloned()
            .map(Authenticated)
            .ok_or(AppError::MissingAuthContext)
    }
}
