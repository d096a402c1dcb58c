//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use rentease_shared::constants::{
    DEFAULT_CORS_ORIGIN, DEFAULT_HTTP_PORT, DEFAULT_MAX_MESSAGE_BYTES, HARD_MESSAGE_LIMIT,
};

use crate::gateway::RelayMode;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`, or `PORT` to change only the port.
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: platform data directory (see `Database::default_path`).
    pub database_path: Option<PathBuf>,

    /// Largest accepted `sendMessage` payload, in bytes. Kept below the
    /// 16 MiB hard limit.
    /// Env: `MAX_MESSAGE_BYTES`
    /// Default: 15 MiB
    pub max_message_bytes: usize,

    /// Origins allowed by CORS.
    /// Env: `CORS_ORIGIN` (comma-separated)
    /// Default: `http://localhost:3000`
    pub cors_origins: Vec<String>,

    /// Reject realtime messages that carry neither text nor media.
    /// Env: `REQUIRE_MESSAGE_CONTENT` (true/false)
    /// Default: `false` (stored, logged as a warning)
    pub require_message_content: bool,

    /// Only the sender or receiver may delete a message over REST.
    /// Env: `DELETE_REQUIRES_PARTICIPANT` (true/false)
    /// Default: `false`
    pub delete_requires_participant: bool,

    /// Where relayed events go when one identity has several connections.
    /// Env: `PRESENCE_FANOUT` (true/false)
    /// Default: `false` (last join wins)
    pub relay_mode: RelayMode,

    /// Sustained HTTP requests per second per client IP.
    /// Env: `RATE_LIMIT_PER_SEC`
    pub rate_limit_per_sec: f64,

    /// HTTP burst capacity per client IP.
    /// Env: `RATE_LIMIT_BURST`
    pub rate_limit_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            cors_origins: vec![DEFAULT_CORS_ORIGIN.to_string()],
            require_message_content: false,
            delete_requires_participant: false,
            relay_mode: RelayMode::LastJoinWins,
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(port) = var("PORT") {
            match port.parse::<u16>() {
                Ok(p) => config.http_addr.set_port(p),
                Err(_) => tracing::warn!(value = %port, "Invalid PORT, ignoring"),
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = var("MAX_MESSAGE_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 && n <= HARD_MESSAGE_LIMIT => config.max_message_bytes = n,
                _ => tracing::warn!(
                    value = %val,
                    hard_limit = HARD_MESSAGE_LIMIT,
                    "Invalid MAX_MESSAGE_BYTES, using default"
                ),
            }
        }

        if let Some(origins) = var("CORS_ORIGIN") {
            let parsed: Vec<String> = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.cors_origins = parsed;
            }
        }

        if let Some(val) = var("REQUIRE_MESSAGE_CONTENT") {
            config.require_message_content = parse_flag(&val);
        }

        if let Some(val) = var("DELETE_REQUIRES_PARTICIPANT") {
            config.delete_requires_participant = parse_flag(&val);
        }

        if let Some(val) = var("PRESENCE_FANOUT") {
            if parse_flag(&val) {
                config.relay_mode = RelayMode::FanOut;
            }
        }

        if let Some(val) = var("RATE_LIMIT_PER_SEC") {
            match parse_positive(&val) {
                Some(n) => config.rate_limit_per_sec = n,
                None => tracing::warn!(value = %val, "Invalid RATE_LIMIT_PER_SEC, using default"),
            }
        }

        if let Some(val) = var("RATE_LIMIT_BURST") {
            match parse_positive(&val) {
                Some(n) => config.rate_limit_burst = n,
                None => tracing::warn!(value = %val, "Invalid RATE_LIMIT_BURST, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

/// A finite number greater than zero.
fn parse_positive(val: &str) -> Option<f64> {
    val.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n > 0.0)
}

fn parse_flag(val: &str) -> bool {
    matches!(val.trim(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert_eq!(config.max_message_bytes, 15 * 1024 * 1024);
        assert_eq!(config.relay_mode, RelayMode::LastJoinWins);
        assert!(!config.delete_requires_participant);
    }

    #[test]
    fn test_port_overrides_addr_port() {
        let config = lookup(&[("HTTP_ADDR", "127.0.0.1:9000"), ("PORT", "7000")]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 7000).into());
    }

    #[test]
    fn test_cors_origin_list() {
        let config = lookup(&[("CORS_ORIGIN", "https://a.example, https://b.example,")]);
        assert_eq!(
            config.cors_origins,
            ["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_max_message_bytes_above_hard_limit_is_ignored() {
        let config = lookup(&[("MAX_MESSAGE_BYTES", "999999999")]);
        assert_eq!(config.max_message_bytes, DEFAULT_MAX_MESSAGE_BYTES);
    }

    #[test]
    fn test_flags() {
        let config = lookup(&[
            ("PRESENCE_FANOUT", "true"),
            ("DELETE_REQUIRES_PARTICIPANT", "1"),
            ("REQUIRE_MESSAGE_CONTENT", "no"),
        ]);
        assert_eq!(config.relay_mode, RelayMode::FanOut);
        assert!(config.delete_requires_participant);
        assert!(!config.require_message_content);
    }

    #[test]
    fn test_rate_limits_must_be_positive_and_finite() {
        let config = lookup(&[("RATE_LIMIT_PER_SEC", "2.5"), ("RATE_LIMIT_BURST", "8")]);
        assert_eq!(config.rate_limit_per_sec, 2.5);
        assert_eq!(config.rate_limit_burst, 8.0);

        for bad in ["-1", "0", "NaN", "inf", "fast"] {
            let config = lookup(&[("RATE_LIMIT_PER_SEC", bad), ("RATE_LIMIT_BURST", bad)]);
            assert_eq!(config.rate_limit_per_sec, 10.0, "rate {bad}");
            assert_eq!(config.rate_limit_burst, 30.0, "burst {bad}");
        }
    }
}
