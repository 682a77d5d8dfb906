/*
 * Responsibility
 * - /api 配下の URL 構造を定義
 * - 公開ルートと保護ルートを分け、保護ルートには access middleware を scope 付きで掛ける
 */
use axum::{Router, routing::get};

use crate::api::handlers::ping::{ping, secure_ping};
use crate::middleware;
use crate::state::AppState;

/// Scope required by the evaluation read endpoints.
pub const EVALUATION_READ_SCOPE: &str = "evaluation.read";

pub fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new().route("/ping", get(ping));

    let secure = Router::new().route("/secure/ping", get(secure_ping));
    let secure = middleware::auth::access::apply(secure, state, EVALUATION_READ_SCOPE);

    public.merge(secure)
}
