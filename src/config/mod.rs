use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Timeout tier for outbound calls.
///
/// Auth calls are latency-sensitive and run on a shorter deadline than
/// general gateway traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutTier {
    Auth,
    General,
}

/// Upstream gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the upstream API gateway
    pub gateway_base_url: String,

    /// Base URL of the upstream auth service
    pub auth_base_url: String,

    /// Path prefix for auth-service endpoints (e.g. "/auth")
    pub auth_path_prefix: String,

    /// Shared secret for HTTP Basic service authentication
    pub basic_auth_secret: Option<String>,

    /// Timeout for latency-sensitive auth calls, in seconds
    pub auth_timeout_seconds: u64,

    /// Timeout for general gateway calls, in seconds
    pub request_timeout_seconds: u64,

    /// TCP connect timeout, in seconds
    pub connect_timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            gateway_base_url: "http://127.0.0.1:9000".to_string(),
            auth_base_url: "http://127.0.0.1:9001".to_string(),
            auth_path_prefix: "/auth".to_string(),
            basic_auth_secret: None,
            auth_timeout_seconds: 5,
            request_timeout_seconds: 30,
            connect_timeout_seconds: 10,
        }
    }
}

impl UpstreamConfig {
    /// Resolve the timeout for the given tier.
    pub fn timeout_for(&self, tier: TimeoutTier) -> Duration {
        match tier {
            TimeoutTier::Auth => Duration::from_secs(self.auth_timeout_seconds),
            TimeoutTier::General => Duration::from_secs(self.request_timeout_seconds),
        }
    }

    /// Full URL of the auth-service token refresh endpoint.
    pub fn refresh_url(&self) -> String {
        format!("{}{}/refresh", self.auth_base_url, self.auth_path_prefix)
    }
}

/// Main proxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Production deployment flag; controls the Secure cookie attribute
    #[serde(default)]
    pub production: bool,
}

impl ProxyConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server: ServerConfig {
                host: env_string("BFF_HOST", &defaults.server.host),
                port: env_parsed("BFF_PORT", defaults.server.port),
            },
            upstream: UpstreamConfig {
                gateway_base_url: env_string(
                    "BFF_GATEWAY_BASE_URL",
                    &defaults.upstream.gateway_base_url,
                ),
                auth_base_url: env_string("BFF_AUTH_BASE_URL", &defaults.upstream.auth_base_url),
                auth_path_prefix: env_string(
                    "BFF_AUTH_PATH_PREFIX",
                    &defaults.upstream.auth_path_prefix,
                ),
                basic_auth_secret: env::var("BFF_BASIC_AUTH_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty()),
                auth_timeout_seconds: env_parsed(
                    "BFF_AUTH_TIMEOUT_SECONDS",
                    defaults.upstream.auth_timeout_seconds,
                ),
                request_timeout_seconds: env_parsed(
                    "BFF_REQUEST_TIMEOUT_SECONDS",
                    defaults.upstream.request_timeout_seconds,
                ),
                connect_timeout_seconds: env_parsed(
                    "BFF_CONNECT_TIMEOUT_SECONDS",
                    defaults.upstream.connect_timeout_seconds,
                ),
            },
            production: env_parsed("BFF_PRODUCTION", false),
        }
    }

    /// Validate the configuration.
    ///
    /// Called once at boot so misconfiguration fails the process instead of
    /// the first request that needs the missing value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.gateway_base_url.is_empty() {
            return Err(ConfigError::MissingValue("gateway_base_url".to_string()));
        }

        if self.upstream.auth_base_url.is_empty() {
            return Err(ConfigError::MissingValue("auth_base_url".to_string()));
        }

        match &self.upstream.basic_auth_secret {
            Some(secret) if !secret.is_empty() => {}
            _ => return Err(ConfigError::MissingValue("basic_auth_secret".to_string())),
        }

        if self.upstream.auth_timeout_seconds == 0 || self.upstream.request_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
