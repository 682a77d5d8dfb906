/// Factory: build the process-wide `Authenticator` from application `Config`.
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::services::auth::{Authenticator, HttpKeySetSource, KeyResolver, KeyResolverError};

pub async fn build_authenticator(
    config: &Config,
    shutdown: CancellationToken,
) -> Result<Arc<Authenticator>, KeyResolverError> {
    let source = Arc::new(HttpKeySetSource::new(config.auth_jwks_url.as_str()));

    // Fail-fast: an unreachable or malformed key set aborts startup.
    let keys = KeyResolver::initialize(source, config.auth_jwks_refresh_interval, shutdown).await?;

    Ok(Arc::new(Authenticator::new(
        keys,
        &config.auth_issuer,
        &config.auth_audience,
    )))
}
