use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use crate::logging::LogConfig;
use crate::srs::SchedulerConfig;

/// Placeholder secret shipped for local development only.
pub const DEFAULT_JWT_SECRET: &str = "ufam-hub-dev-secret-replace-me-before-deploying-anywhere";

/// Process configuration, one section per concern. Every value comes from
/// the environment (after `.env` is loaded) and falls back to a default.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub sled_path: String,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub worker: WorkerConfig,
    pub srs: SchedulerConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub cors_origin: String,
    /// Honour `x-forwarded-for` / `x-real-ip` for client addresses.
    pub trust_proxy: bool,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: u64,
}

/// Fixed-window budgets per client. Review submissions are counted apart
/// from the rest of `/api`.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub api_max_requests: u64,
    pub review_max_requests: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            log: LogConfig::from_env(),
            sled_path: env_or("SLED_PATH", "./data/ufam-hub.sled"),
            auth: AuthConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            worker: WorkerConfig::from_env(),
            srs: SchedulerConfig::from_env(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::LOCALHOST)),
            port: env_or_parse("PORT", 3000_u16),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            trust_proxy: env_or_bool("TRUST_PROXY", false),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            jwt_secret: env_or("JWT_SECRET", DEFAULT_JWT_SECRET),
            token_ttl_hours: env_or_parse("JWT_EXPIRES_IN_HOURS", 24_u64).max(1),
        }
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"***REDACTED***")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .finish()
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            window_secs: env_or_parse("RATE_LIMIT_WINDOW_SECS", 900_u64).max(1),
            api_max_requests: env_or_parse("RATE_LIMIT_MAX", 500_u64),
            review_max_requests: env_or_parse("RATE_LIMIT_REVIEWS_MAX", 300_u64),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            is_leader: env_or_bool("WORKER_LEADER", true),
        }
    }
}

/// Trimmed value of `key`; unset and blank read the same.
fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

pub fn env_or(key: &str, default: &str) -> String {
    env_value(key).unwrap_or_else(|| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = env_value(key) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Ignoring unparsable env var");
            default
        }
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    let Some(raw) = env_value(key) else {
        return default;
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring non-boolean env var");
            default
        }
    }
}
