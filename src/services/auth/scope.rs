//! Scope enforcement for an already verified token.
//!
//! The `scp` claim must be an array; a route passes if any string entry equals
//! the route's required scope exactly (no wildcard or prefix matching).

use serde_json::Value;
use thiserror::Error;

use super::token::VerifiedToken;

/// Name of the scope claim.
pub const SCOPE_CLAIM: &str = "scp";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("Forbidden: scp claim is missing")]
    Missing,
    // A non-array `scp` from a trusted issuer is still answered as a client error (403).
    #[error("Forbidden: scp claim has invalid format")]
    Malformed,
    #[error("Forbidden: insufficient scope")]
    Insufficient,
}

pub fn check_scope(token: &VerifiedToken, required_scope: &str) -> Result<(), ScopeError> {
    let claim = token.claim(SCOPE_CLAIM).ok_or(ScopeError::Missing)?;

    let Value::Array(scopes) = claim else {
        return Err(ScopeError::Malformed);
    };

    // Non-string entries are ignored.
    if scopes
        .iter()
        .any(|scope| scope.as_str() == Some(required_scope))
    {
        Ok(())
    } else {
        Err(ScopeError::Insufficient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::token::AccessTokenClaims;
    use serde_json::json;

    fn token_with(extra: Value) -> VerifiedToken {
        let mut claims = json!({"iss": "test-issuer", "aud": "test-audience", "exp": 10});
        if let (Some(base), Some(extra)) = (claims.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        let claims: AccessTokenClaims = serde_json::from_value(claims).unwrap();
        VerifiedToken::new("test-kid", claims)
    }

    #[test]
    fn passes_on_exact_match_anywhere_in_the_list() {
        let token = token_with(json!({"scp": ["other.scope", "evaluation.read"]}));
        assert_eq!(check_scope(&token, "evaluation.read"), Ok(()));
    }

    #[test]
    fn missing_claim() {
        let token = token_with(json!({}));
        assert_eq!(
            check_scope(&token, "evaluation.read"),
            Err(ScopeError::Missing)
        );
    }

    #[test]
    fn non_array_claim_is_malformed() {
        for scp in [json!("evaluation.read"), json!(null), json!({"a": 1}), json!(1)] {
            let token = token_with(json!({ "scp": scp }));
            assert_eq!(
                check_scope(&token, "evaluation.read"),
                Err(ScopeError::Malformed)
            );
        }
    }

    #[test]
    fn no_prefix_wildcard_or_case_folding() {
        let token = token_with(json!({"scp": ["evaluation", "evaluation.*", "EVALUATION.READ", "evaluation.read.all"]}));
        assert_eq!(
            check_scope(&token, "evaluation.read"),
            Err(ScopeError::Insufficient)
        );
    }

    #[test]
    fn non_string_entries_are_skipped() {
        let token = token_with(json!({"scp": [1, null, {"x": "evaluation.read"}, "evaluation.read"]}));
        assert_eq!(check_scope(&token, "evaluation.read"), Ok(()));

        let token = token_with(json!({"scp": [1, null]}));
        assert_eq!(
            check_scope(&token, "evaluation.read"),
            Err(ScopeError::Insufficient)
        );

        let token = token_with(json!({"scp": []}));
        assert_eq!(
            check_scope(&token, "evaluation.read"),
            Err(ScopeError::Insufficient)
        );
    }
}
