/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - auth: Authenticator (鍵キャッシュ + 期待する iss/aud)
 * - Clone 前提で持つ (内部は Arc)
 */
use std::sync::Arc;

use crate::services::auth::Authenticator;

#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: Arc<Authenticator>,
}

impl AppState {
    pub fn new(auth: Arc<Authenticator>) -> Self {
        Self { auth }
    }
}
