/*
 * Responsibility
 * - 環境変数の読み込み (AUTH_ISSUER, AUTH_AUDIENCE, AUTH_JWKS_URL など)
 * - 設定値のバリデーション (不正なら起動失敗)
 * - テストからは from_vars() で環境変数に触れずに組み立てる
 */
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::services::auth::jwks::DEFAULT_REFRESH_INTERVAL;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_AUTH_ISSUER: &str = "http://localhost:8999";
const DEFAULT_AUTH_AUDIENCE: &str = "evaluation-service";
const DEFAULT_AUTH_JWKS_URL: &str = "http://localhost:8999/.well-known/jwks.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<&str>) -> Self {
        match value
            .unwrap_or("development")
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub auth_issuer: String,
    pub auth_audience: String,
    pub auth_jwks_url: Url,
    pub auth_jwks_refresh_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an explicit map (tests, embedding).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port: u16 = match get("HTTP_SERVER_PORT") {
            Some(s) => s
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("HTTP_SERVER_PORT"))?,
            None => DEFAULT_PORT,
        };

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("HTTP_SERVER_PORT"))?;

        let app_env = AppEnv::parse(get("APP_ENV").as_deref());

        let auth_issuer = non_empty(&get, "AUTH_ISSUER", DEFAULT_AUTH_ISSUER)?;
        let auth_audience = non_empty(&get, "AUTH_AUDIENCE", DEFAULT_AUTH_AUDIENCE)?;

        let auth_jwks_url = non_empty(&get, "AUTH_JWKS_URL", DEFAULT_AUTH_JWKS_URL)?;
        let auth_jwks_url =
            Url::parse(&auth_jwks_url).map_err(|_| ConfigError::Invalid("AUTH_JWKS_URL"))?;
        if !matches!(auth_jwks_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid("AUTH_JWKS_URL"));
        }

        let auth_jwks_refresh_interval = match get("AUTH_JWKS_REFRESH_INTERVAL_SECONDS") {
            Some(s) => match s.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::Invalid("AUTH_JWKS_REFRESH_INTERVAL_SECONDS")),
            },
            None => DEFAULT_REFRESH_INTERVAL,
        };

        Ok(Self {
            addr,
            app_env,
            auth_issuer,
            auth_audience,
            auth_jwks_url,
            auth_jwks_refresh_interval,
        })
    }
}

// Unset falls back to the default; set-but-blank is a configuration error.
fn non_empty(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<String, ConfigError> {
    match get(key) {
        Some(v) if v.trim().is_empty() => Err(ConfigError::Missing(key)),
        Some(v) => Ok(v.trim().to_string()),
        None => Ok(default.to_string()),
    }
}
