//! Remote key set (JWKS) resolver.
//!
//! Keeps a locally cached snapshot of the issuer's public keys and refreshes it
//! on a timer, so request verification never waits on the network.
//!
//! - `initialize` fetches once synchronously (fail-fast) and starts the refresh task.
//! - `resolve` only reads the current snapshot. A `kid` miss is NOT a fetch trigger.
//! - A failed refresh keeps the previous snapshot (stale-but-available).
//!
//! The snapshot is held in an `ArcSwap`: readers load an `Arc<KeySet>` without
//! locking and the refresh path swaps in a new set wholesale.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default interval between background refreshes (15 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Timeout for a single key set fetch (connect + response).
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// `tokio::time::interval` rejects a zero period.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum KeyResolverError {
    #[error("failed to fetch key set from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("key set endpoint {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("malformed key set document from {url}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("key set from {url} contains no usable signing keys")]
    NoUsableKeys { url: String },
}

/// Where key set documents come from.
///
/// Production uses [`HttpKeySetSource`]. Implementations return the raw JSON
/// document; parsing and filtering stay in the resolver.
#[async_trait]
pub trait KeySetSource: Send + Sync + 'static {
    // Human-readable location (URL) for logs and errors.
    fn location(&self) -> &str;

    async fn fetch(&self) -> Result<Value, KeyResolverError>;
}

/// Fetches the key set document with a plain GET.
#[derive(Debug, Clone)]
pub struct HttpKeySetSource {
    url: String,
    client: reqwest::Client,
}

impl HttpKeySetSource {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build key set HTTP client with timeout, using defaults");
                reqwest::Client::new()
            });

        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    fn location(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Value, KeyResolverError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| KeyResolverError::Fetch {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyResolverError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| KeyResolverError::Malformed {
                url: self.url.clone(),
                reason: e.to_string(),
            })
    }
}

/// Key families a JWK can belong to. Used to pin the token `alg` to the key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    EcP256,
    EcP384,
    Ed25519,
}

impl KeyFamily {
    fn of(jwk: &Jwk) -> Option<Self> {
        match &jwk.algorithm {
            AlgorithmParameters::RSA(_) => Some(Self::Rsa),
            AlgorithmParameters::EllipticCurve(params) => match params.curve {
                EllipticCurve::P256 => Some(Self::EcP256),
                EllipticCurve::P384 => Some(Self::EcP384),
                _ => None,
            },
            AlgorithmParameters::OctetKeyPair(params) => match params.curve {
                EllipticCurve::Ed25519 => Some(Self::Ed25519),
                _ => None,
            },
            // Symmetric keys never verify bearer tokens here.
            AlgorithmParameters::OctetKey(_) => None,
        }
    }

    pub fn supports(self, alg: Algorithm) -> bool {
        match self {
            Self::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            Self::EcP256 => alg == Algorithm::ES256,
            Self::EcP384 => alg == Algorithm::ES384,
            Self::Ed25519 => alg == Algorithm::EdDSA,
        }
    }
}

/// Verification key for one `kid`, plus the metadata its JWK declared.
#[derive(Clone)]
pub struct ResolvedKey {
    kid: String,
    decoding_key: DecodingKey,
    family: KeyFamily,
    algorithm: Option<Algorithm>,
}

impl ResolvedKey {
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Whether a token declaring `alg` may be verified with this key.
    pub fn accepts(&self, alg: Algorithm) -> bool {
        if let Some(pinned) = self.algorithm {
            if pinned != alg {
                return false;
            }
        }
        self.family.supports(alg)
    }
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("ResolvedKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// One immutable snapshot of the remote key set.
pub struct KeySet {
    keys: HashMap<String, Arc<ResolvedKey>>,
    generation: u64,
    fetched_at: DateTime<Utc>,
}

impl KeySet {
    /// Build a key set from a JWKS document (`{"keys": [...]}`).
    ///
    /// Unusable entries are skipped: no `kid`, `use` other than `sig`,
    /// symmetric or unsupported key types, unparsable key material.
    /// The first entry wins on duplicate `kid`.
    fn from_document(document: &Value, generation: u64) -> Result<Self, String> {
        let entries = document
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| "expected an object with a \"keys\" array".to_string())?;

        let mut keys = HashMap::with_capacity(entries.len());
        for entry in entries {
            let Some(resolved) = parse_key(entry) else {
                continue;
            };
            if keys.contains_key(&resolved.kid) {
                debug!(kid = %resolved.kid, "duplicate kid in key set, keeping the first");
                continue;
            }
            keys.insert(resolved.kid.clone(), Arc::new(resolved));
        }

        Ok(Self {
            keys,
            generation,
            fetched_at: Utc::now(),
        })
    }

    pub fn get(&self, kid: &str) -> Option<Arc<ResolvedKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 1 for the startup fetch, +1 for each successful refresh.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .field("generation", &self.generation)
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

fn parse_key(entry: &Value) -> Option<ResolvedKey> {
    let Some(kid) = entry.get("kid").and_then(Value::as_str) else {
        debug!("skipping JWK without kid");
        return None;
    };

    if let Some(key_use) = entry.get("use").and_then(Value::as_str) {
        if key_use != "sig" {
            debug!(kid, key_use, "skipping JWK not meant for signatures");
            return None;
        }
    }

    let algorithm = match entry.get("alg").and_then(Value::as_str) {
        Some(alg) => match Algorithm::from_str(alg) {
            Ok(alg) => Some(alg),
            Err(_) => {
                debug!(kid, alg, "skipping JWK with unsupported alg");
                return None;
            }
        },
        None => None,
    };

    let jwk: Jwk = match serde_json::from_value(entry.clone()) {
        Ok(jwk) => jwk,
        Err(e) => {
            debug!(kid, error = %e, "skipping unparsable JWK");
            return None;
        }
    };

    let Some(family) = KeyFamily::of(&jwk) else {
        debug!(kid, "skipping JWK with unsupported key type");
        return None;
    };

    if let Some(alg) = algorithm {
        if !family.supports(alg) {
            debug!(kid, ?alg, ?family, "skipping JWK whose alg does not match its key type");
            return None;
        }
    }

    let decoding_key = match DecodingKey::from_jwk(&jwk) {
        Ok(key) => key,
        Err(e) => {
            debug!(kid, error = %e, "skipping JWK (cannot create DecodingKey)");
            return None;
        }
    };

    Some(ResolvedKey {
        kid: kid.to_string(),
        decoding_key,
        family,
        algorithm,
    })
}

/// Cached view of one remote key set, refreshed in the background.
pub struct KeyResolver {
    source: Arc<dyn KeySetSource>,
    current: ArcSwap<KeySet>,
    refresh_interval: Duration,
    // Serializes writers so generations stay ordered.
    refresh_lock: Mutex<()>,
}

impl KeyResolver {
    /// Fetch the key set once (fail-fast), then start the background refresh task.
    ///
    /// The task stops when `shutdown` is cancelled or the resolver is dropped.
    pub async fn initialize(
        source: Arc<dyn KeySetSource>,
        refresh_interval: Duration,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>, KeyResolverError> {
        let initial = load(source.as_ref(), 1).await?;

        info!(
            url = source.location(),
            kids = ?initial.kids().collect::<Vec<_>>(),
            refresh_interval_secs = refresh_interval.as_secs(),
            "key set loaded"
        );

        let resolver = Arc::new(Self {
            source,
            current: ArcSwap::from_pointee(initial),
            refresh_interval: refresh_interval.max(MIN_REFRESH_INTERVAL),
            refresh_lock: Mutex::new(()),
        });

        resolver.spawn_refresh(shutdown);

        Ok(resolver)
    }

    /// Key for `kid` from the current snapshot. `None` means "verification fails".
    pub fn resolve(&self, kid: &str) -> Option<Arc<ResolvedKey>> {
        self.current.load().get(kid)
    }

    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current.load_full()
    }

    pub fn location(&self) -> &str {
        self.source.location()
    }

    /// Re-fetch and swap in the new key set.
    ///
    /// On error the current snapshot stays in effect.
    pub async fn refresh(&self) -> Result<Arc<KeySet>, KeyResolverError> {
        let _guard = self.refresh_lock.lock().await;

        let generation = self.current.load().generation() + 1;
        let next = Arc::new(load(self.source.as_ref(), generation).await?);
        self.current.store(Arc::clone(&next));

        Ok(next)
    }

    fn spawn_refresh(self: &Arc<Self>, shutdown: CancellationToken) {
        let resolver: Weak<Self> = Arc::downgrade(self);
        let period = self.refresh_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("key set refresh task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(resolver) = resolver.upgrade() else {
                            break;
                        };
                        match resolver.refresh().await {
                            Ok(set) => info!(
                                url = resolver.location(),
                                kids = ?set.kids().collect::<Vec<_>>(),
                                generation = set.generation(),
                                fetched_at = %set.fetched_at(),
                                "key set refreshed"
                            ),
                            Err(err) => warn!(
                                url = resolver.location(),
                                error = %err,
                                "key set refresh failed, keeping previous keys"
                            ),
                        }
                    }
                }
            }
        });
    }
}

impl std::fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolver")
            .field("url", &self.source.location())
            .field("current", &self.current.load())
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

async fn load(source: &dyn KeySetSource, generation: u64) -> Result<KeySet, KeyResolverError> {
    let document = source.fetch().await?;

    let set = KeySet::from_document(&document, generation).map_err(|reason| {
        KeyResolverError::Malformed {
            url: source.location().to_string(),
            reason,
        }
    })?;

    if set.is_empty() {
        return Err(KeyResolverError::NoUsableKeys {
            url: source.location().to_string(),
        });
    }

    Ok(set)
}
