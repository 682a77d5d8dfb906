//! Shared fixtures: Ed25519 test keys, a mocked JWKS endpoint and request helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use evaluation_service::app::build_router;
use evaluation_service::config::Config;
use evaluation_service::services::auth::{Authenticator, build_authenticator};
use evaluation_service::state::AppState;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ISSUER: &str = "test-issuer";
pub const AUDIENCE: &str = "test-audience";
pub const REQUIRED_SCOPE: &str = "evaluation.read";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Deterministic Ed25519 keypair published under `kid`.
pub struct TestKeypair {
    pub kid: String,
    signing_key: SigningKey,
}

impl TestKeypair {
    pub fn new(seed: u8, kid: &str) -> Self {
        let mut seed_bytes = [0u8; 32];
        for (i, byte) in seed_bytes.iter_mut().enumerate() {
            *byte = seed.wrapping_mul(31).wrapping_add(i as u8);
        }

        Self {
            kid: kid.to_string(),
            signing_key: SigningKey::from_bytes(&seed_bytes),
        }
    }

    pub fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(self.signing_key.verifying_key().as_bytes()),
            "kid": self.kid,
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        self.sign_as(&self.kid, claims)
    }

    /// Sign with this key but advertise another `kid` in the header.
    pub fn sign_as(&self, kid: &str, claims: &Value) -> String {
        let der = self
            .signing_key
            .to_pkcs8_der()
            .expect("encode test key as PKCS#8");
        let encoding_key = EncodingKey::from_ed_der(der.as_bytes());

        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(kid.to_string());

        jsonwebtoken::encode(&header, claims, &encoding_key).expect("sign test token")
    }
}

/// Claims for a token valid for `ttl_secs` from now.
pub fn claims(scp: Value, ttl_secs: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": ISSUER,
        "aud": [AUDIENCE],
        "sub": "user-1",
        "iat": now,
        "exp": now + ttl_secs,
        "scp": scp
    })
}

pub fn jwks(keys: &[&TestKeypair]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

/// Replace whatever the mock JWKS endpoint currently serves.
pub async fn serve_jwks(server: &MockServer, keys: &[&TestKeypair]) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
        .mount(server)
        .await;
}

pub async fn serve_status(server: &MockServer, status: u16) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub fn config_for(server: &MockServer, refresh_secs: u64) -> Config {
    let vars = HashMap::from([
        ("AUTH_ISSUER".to_string(), ISSUER.to_string()),
        ("AUTH_AUDIENCE".to_string(), AUDIENCE.to_string()),
        (
            "AUTH_JWKS_URL".to_string(),
            format!("{}{}", server.uri(), JWKS_PATH),
        ),
        (
            "AUTH_JWKS_REFRESH_INTERVAL_SECONDS".to_string(),
            refresh_secs.to_string(),
        ),
    ]);
    Config::from_vars(&vars).expect("test config")
}

/// Mock JWKS server + authenticator + the service router.
pub struct TestGate {
    pub jwks_server: MockServer,
    pub auth: Arc<Authenticator>,
    pub state: AppState,
    pub router: Router,
    pub shutdown: CancellationToken,
}

impl TestGate {
    pub async fn spawn(keys: &[&TestKeypair]) -> Self {
        Self::spawn_with_refresh(keys, 3600).await
    }

    pub async fn spawn_with_refresh(keys: &[&TestKeypair], refresh_secs: u64) -> Self {
        let jwks_server = MockServer::start().await;
        serve_jwks(&jwks_server, keys).await;

        let shutdown = CancellationToken::new();
        let auth = build_authenticator(&config_for(&jwks_server, refresh_secs), shutdown.clone())
            .await
            .expect("authenticator");

        let state = AppState::new(auth.clone());
        let router = build_router(state.clone());

        Self {
            jwks_server,
            auth,
            state,
            router,
            shutdown,
        }
    }
}

impl Drop for TestGate {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("json body")
    }
}

/// GET `uri` with an optional raw `Authorization` header value.
pub async fn send(router: &Router, uri: &str, authorization: Option<&str>) -> TestResponse {
    let mut req = Request::builder().method("GET").uri(uri);
    if let Some(value) = authorization {
        req = req.header(header::AUTHORIZATION, value);
    }
    let req = req.body(Body::empty()).expect("request");

    send_request(router, req).await
}

/// GET `uri` with an `Authorization` header that need not be valid UTF-8.
pub async fn send_raw_authorization(router: &Router, uri: &str, value: &[u8]) -> TestResponse {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .header(
            header::AUTHORIZATION,
            HeaderValue::from_bytes(value).expect("header bytes"),
        )
        .body(Body::empty())
        .expect("request");

    send_request(router, req).await
}

async fn send_request(router: &Router, req: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(req).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");

    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

pub async fn send_bearer(router: &Router, uri: &str, token: &str) -> TestResponse {
    let authorization = format!("Bearer {token}");
    send(router, uri, Some(authorization.as_str())).await
}
