use serde::Deserialize;
use serde_json::{Map, Value};

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(aud) => vec![aud],
            Audience::Many(auds) => auds,
        }
    }
}

/// Claims as they come out of a signature-checked token.
///
/// Registered claims are typed; everything else (including `scp`) is kept as raw JSON.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AccessTokenClaims {
    pub iss: String,
    pub aud: Audience,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A bearer token whose signature, issuer, audience and time window were all checked.
///
/// Only the verification stage (`Authenticator::verify`) can build one, so code
/// holding a `VerifiedToken` never re-verifies it.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    kid: String,
    issuer: String,
    audience: Vec<String>,
    subject: Option<String>,
    issued_at: Option<i64>,
    expires_at: i64,
    claims: Map<String, Value>,
}

impl VerifiedToken {
    pub(crate) fn new(kid: impl Into<String>, claims: AccessTokenClaims) -> Self {
        Self {
            kid: kid.into(),
            issuer: claims.iss,
            audience: claims.aud.into_vec(),
            subject: claims.sub,
            issued_at: claims.iat,
            expires_at: claims.exp,
            claims: claims.extra,
        }
    }

    /// Key id the token was verified with.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Raw private (non-registered) claim by name, e.g. `scp`.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// String entries of `scp`, for logging and handlers. Authorization goes through `scope::check_scope`.
    pub fn scopes(&self) -> Vec<&str> {
        self.claim(super::scope::SCOPE_CLAIM)
            .and_then(Value::as_array)
            .map(|scopes| scopes.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn audience_accepts_string_or_array() {
        let single: AccessTokenClaims =
            serde_json::from_value(json!({"iss": "i", "aud": "a", "exp": 10})).unwrap();
        let many: AccessTokenClaims =
            serde_json::from_value(json!({"iss": "i", "aud": ["a", "b"], "exp": 10})).unwrap();

        assert_eq!(VerifiedToken::new("k", single).audience(), ["a"]);
        assert_eq!(VerifiedToken::new("k", many).audience(), ["a", "b"]);
    }

    #[test]
    fn keeps_private_claims_and_lists_string_scopes() {
        let claims: AccessTokenClaims = serde_json::from_value(json!({
            "iss": "i",
            "aud": "a",
            "exp": 10,
            "iat": 5,
            "sub": "user-1",
            "scp": ["evaluation.read", 7, "evaluation.write"]
        }))
        .unwrap();
        let token = VerifiedToken::new("k", claims);

        assert_eq!(token.subject(), Some("user-1"));
        assert_eq!(token.issued_at(), Some(5));
        assert_eq!(token.scopes(), vec!["evaluation.read", "evaluation.write"]);
        assert!(token.claim("iss").is_none());
    }
}
