/*
 * Responsibility
 * - evaluation-service の本体 (bin と integration test から使う)
 * - Bearer トークン検証 (JWKS) と scope 認可のゲート
 */
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
