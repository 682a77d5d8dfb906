/*
 * Responsibility
 * - middleware の公開インターフェース
 * - auth: Bearer 検証 + scope 認可 (ルート単位)
 * - http: request-id / trace / panic / timeout (全ルート共通)
 */
pub mod auth;
pub mod http;
