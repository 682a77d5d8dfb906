use std::{error::Error as StdError, fmt, sync::Arc};

use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, Validation};
use thiserror::Error;

use crate::services::auth::jwks::KeyResolver;
use crate::services::auth::token::{AccessTokenClaims, VerifiedToken};

/// Client-facing outcome of the verification stage.
///
/// Messages are fixed and never say which check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authorization header is required")]
    MissingHeader,
    #[error("Invalid token format")]
    InvalidFormat,
    #[error("Invalid token")]
    InvalidToken,
}

// Why a bearer token was rejected. Only logged, collapsed to `AuthError::InvalidToken`.
#[derive(Debug)]
pub enum TokenError {
    Header(jsonwebtoken::errors::Error),
    MissingKid,
    UnknownKid(String),
    AlgorithmMismatch { kid: String, alg: Algorithm },
    Jwt(jsonwebtoken::errors::Error),
    Expired { exp: i64, now: i64 },
    IssuedInFuture { iat: i64, now: i64 },
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(e) => write!(f, "invalid token header: {}", e),
            Self::MissingKid => write!(f, "token header has no 'kid'"),
            Self::UnknownKid(kid) => write!(f, "no key with kid '{}' in current key set", kid),
            Self::AlgorithmMismatch { kid, alg } => {
                write!(f, "alg {:?} not allowed for key '{}'", alg, kid)
            }
            Self::Jwt(e) => write!(f, "jwt verification failed: {}", e),
            Self::Expired { exp, now } => write!(f, "token expired (exp={}, now={})", exp, now),
            Self::IssuedInFuture { iat, now } => {
                write!(f, "token issued in the future (iat={}, now={})", iat, now)
            }
        }
    }
}

impl StdError for TokenError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Header(e) | Self::Jwt(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(_: TokenError) -> Self {
        AuthError::InvalidToken
    }
}

/// Verifies bearer tokens against the cached key set and the configured issuer/audience.
///
/// Built once at startup and shared read-only across requests.
pub struct Authenticator {
    keys: Arc<KeyResolver>,
    issuer: String,
    audience: String,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("keys", &self.keys.location())
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl Authenticator {
    pub fn new(keys: Arc<KeyResolver>, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn keys(&self) -> &Arc<KeyResolver> {
        &self.keys
    }

    /// Verification stage for one request: `Authorization: Bearer <jwt>` → `VerifiedToken`.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<VerifiedToken, AuthError> {
        let auth = match headers.get(header::AUTHORIZATION) {
            None => return Err(AuthError::MissingHeader),
            Some(value) if value.is_empty() => return Err(AuthError::MissingHeader),
            // Present but not visible ASCII: credentials were sent, they are just unusable.
            Some(value) => value.to_str().map_err(|_| {
                tracing::warn!("authorization header is not visible ASCII");
                AuthError::InvalidToken
            })?,
        };

        let token = auth
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidFormat)?;

        match self.verify(token) {
            Ok(verified) => Ok(verified),
            Err(err) => {
                tracing::warn!(error = %err, "access token verification failed");
                Err(err.into())
            }
        }
    }

    /// Verify signature and claims of a compact JWT.
    ///
    /// `jsonwebtoken::Validation` checks:
    /// - signature with the single algorithm declared by the token
    /// - `iss` equality and `aud` membership
    /// - presence of `exp`/`iss`/`aud`, and `nbf` if present
    ///
    /// This method additionally enforces `iat <= now < exp` with zero leeway.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let header = jsonwebtoken::decode_header(token).map_err(TokenError::Header)?;
        let kid = header.kid.ok_or(TokenError::MissingKid)?;

        // A kid miss is a verification failure; the resolver never fetches here.
        let key = self
            .keys
            .resolve(&kid)
            .ok_or_else(|| TokenError::UnknownKid(kid.clone()))?;

        if !key.accepts(header.alg) {
            return Err(TokenError::AlgorithmMismatch {
                kid,
                alg: header.alg,
            });
        }

        let validation = self.validation(header.alg);
        let data = jsonwebtoken::decode::<AccessTokenClaims>(token, key.decoding_key(), &validation)
            .map_err(TokenError::Jwt)?;
        let claims = data.claims;

        let now = chrono::Utc::now().timestamp();
        if now >= claims.exp {
            return Err(TokenError::Expired {
                exp: claims.exp,
                now,
            });
        }
        if let Some(iat) = claims.iat {
            if iat > now {
                return Err(TokenError::IssuedInFuture { iat, now });
            }
        }

        Ok(VerifiedToken::new(kid, claims))
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.validate_nbf = true;
        validation.leeway = 0;
        validation
    }
}
