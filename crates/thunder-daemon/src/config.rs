// crates/thunder-daemon/src/config.rs
//
// Runtime configuration for the Thunder daemon.
// Loaded from a TOML file or populated with sensible defaults.

use serde::Deserialize;
use std::fs;

use thunder_core::jwt::JWT_SECRET_ENV;
use thunder_rpc::middleware::auth::default_exempt_methods;
use thunder_rpc::LimiterSettings;

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Host address both servers bind to.
    #[serde(default = "default_rpc_host")]
    pub rpc_host: String,

    /// Port for the native RPC server.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Port for the REST/GraphQL gateway.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Shared HMAC secret for bearer tokens. Falls back to `JWT_SECRET`.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Required `iss` claim, if any.
    #[serde(default)]
    pub jwt_issuer: Option<String>,

    /// Operations reachable without a credential.
    #[serde(default = "default_exempt_methods")]
    pub exempt_methods: Vec<String>,

    /// Seconds between sweeps of expired rate limiters.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Per-client rate limiting.
    #[serde(default)]
    pub rate_limit: LimiterSettings,
}

fn default_rpc_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_port() -> u16 {
    50051
}

fn default_http_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            rpc_host: default_rpc_host(),
            rpc_port: default_rpc_port(),
            http_port: default_http_port(),
            log_level: default_log_level(),
            jwt_secret: None,
            jwt_issuer: None,
            exempt_methods: default_exempt_methods(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            rate_limit: LimiterSettings::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: DaemonConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// The configured secret, else `JWT_SECRET`, else empty.
    pub fn resolve_jwt_secret(&self) -> String {
        match &self.jwt_secret {
            Some(secret) if !secret.is_empty() => secret.clone(),
            _ => std::env::var(JWT_SECRET_ENV).unwrap_or_default(),
        }
    }
}
