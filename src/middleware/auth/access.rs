//! Bearer token gate: verification stage → scope stage → handler.
//!
//! Both stages run inside one middleware function and the `VerifiedToken` is
//! passed explicitly from the first to the second, so the scope check can
//! never run on an unverified request.
//!
//! On success the token is also inserted into request extensions so handlers
//! can take it through the `Authenticated` extractor.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::auth::{Authenticator, check_scope};
use crate::state::AppState;

#[derive(Clone)]
struct AccessGate {
    auth: Arc<Authenticator>,
    required_scope: Arc<str>,
}

/// Protect every route of `router` with a bearer token carrying `required_scope`.
///
/// 例：
/// ```ignore
/// let secure = Router::new().route("/secure/ping", get(secure_ping));
/// let secure = middleware::auth::access::apply(secure, &state, "evaluation.read");
/// ```
pub fn apply<S>(router: Router<S>, state: &AppState, required_scope: &str) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let gate = AccessGate {
        auth: Arc::clone(&state.auth),
        required_scope: Arc::from(required_scope),
    };

    router.layer(middleware::from_fn_with_state(gate, access_middleware))
}

async fn access_middleware(
    State(gate): State<AccessGate>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // 1) verification: header → signature → iss/aud/exp
    let token = gate.auth.authenticate(req.headers())?;

    // 2) scope: reads only the token returned above
    if let Err(err) = check_scope(&token, &gate.required_scope) {
        tracing::warn!(
            error = %err,
            required_scope = %gate.required_scope,
            sub = token.subject().unwrap_or("-"),
            "scope check failed"
        );
        return Err(err.into());
    }

    tracing::debug!(
        sub = token.subject().unwrap_or("-"),
        kid = token.kid(),
        exp = token.expires_at(),
        "request authorized"
    );

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(token);

    Ok(next.run(req).await)
}
