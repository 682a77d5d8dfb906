/*!
 * Authentication context extractor
 *
 * Responsibility:
 * - access middleware が検証した VerifiedToken を handler に提供する
 * - トークン型そのものは services::auth 側で定義 (ここでは再検証しない)
 */

mod core;

pub use self::core::Authenticated;
