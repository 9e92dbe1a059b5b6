//! Configuration schema definitions.
//!
//! One root type per balancer. All types derive Serde traits for
//! deserialization from TOML or JSON files; every field has a default so
//! minimal configs work.

use serde::{Deserialize, Serialize};

/// Root configuration of the RTMP balancer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RtmpLbConfig {
    /// Control API listen address (e.g., "tcp://127.0.0.1:9100").
    pub api: String,

    /// Client-facing RTMP listeners.
    pub rtmp: RtmpListenConfig,

    /// Backend dial and retry settings.
    pub backend: BackendConfig,

    pub log: LogConfig,

    pub metrics: MetricsConfig,
}

impl Default for RtmpLbConfig {
    fn default() -> Self {
        Self {
            api: "tcp://127.0.0.1:9100".to_string(),
            rtmp: RtmpListenConfig::default(),
            backend: BackendConfig::default(),
            log: LogConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// RTMP listen addresses.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RtmpListenConfig {
    /// One or more `tcp://`, `tcp4://` or `tcp6://` addresses.
    pub listens: Vec<String>,
}

impl Default for RtmpListenConfig {
    fn default() -> Self {
        Self {
            listens: vec!["tcp://:1935".to_string()],
        }
    }
}

/// How the RTMP proxy dials the active backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Deadline of one dial in milliseconds.
    pub connect_timeout_ms: u64,

    /// Total dial attempts per client connection.
    pub retry_max: u32,

    /// Pause between two dial attempts in milliseconds.
    pub retry_interval_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3000,
            retry_max: 3,
            retry_interval_ms: 3000,
        }
    }
}

/// Root configuration of the HTTP (FLV/HLS+) balancer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpLbConfig {
    /// Control API listen address.
    pub api: String,

    /// Client-facing HTTP listener.
    pub http: HttpListenConfig,

    /// HLS+ session tracking.
    pub hls_plus: HlsPlusConfig,

    /// Outbound transports towards the backend.
    pub upstream: UpstreamConfig,

    pub log: LogConfig,

    pub metrics: MetricsConfig,
}

impl Default for HttpLbConfig {
    fn default() -> Self {
        Self {
            api: "tcp://127.0.0.1:9101".to_string(),
            http: HttpListenConfig::default(),
            hls_plus: HlsPlusConfig::default(),
            upstream: UpstreamConfig::default(),
            log: LogConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpListenConfig {
    /// Exactly one listen address.
    pub listen: String,
}

impl Default for HttpListenConfig {
    fn default() -> Self {
        Self {
            listen: "tcp://:8080".to_string(),
        }
    }
}

/// HLS+ virtual connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HlsPlusConfig {
    /// A session untouched for longer than this is evicted.
    pub session_timeout_secs: u64,

    /// How often idle sessions are swept.
    pub sweep_interval_secs: u64,
}

impl Default for HlsPlusConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 120,
            sweep_interval_secs: 10,
        }
    }
}

/// Shape of the outbound HTTP transports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub connect_timeout_secs: u64,
    pub keepalive_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            keepalive_secs: 30,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error. `RUST_LOG` takes precedence.
    pub level: String,

    /// "console" or "file".
    pub tank: String,

    /// Log file for the file tank.
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            tank: "console".to_string(),
            file: None,
        }
    }
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Exporter bind address (e.g., "127.0.0.1:9090").
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: RtmpLbConfig = toml::from_str(
            r#"
            api = "tcp://127.0.0.1:9000"

            [rtmp]
            listens = ["tcp4://:1935", "tcp6://:1935"]
            "#,
        )
        .unwrap();

        assert_eq!(config.api, "tcp://127.0.0.1:9000");
        assert_eq!(config.rtmp.listens.len(), 2);
        assert_eq!(config.backend, BackendConfig::default());
        assert_eq!(config.log.tank, "console");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn http_json_overrides() {
        let config: HttpLbConfig = serde_json::from_str(
            r#"{
                "api": "tcp://127.0.0.1:9001",
                "http": {"listen": "tcp://:8081"},
                "hls_plus": {"session_timeout_secs": 30}
            }"#,
        )
        .unwrap();

        assert_eq!(config.http.listen, "tcp://:8081");
        assert_eq!(config.hls_plus.session_timeout_secs, 30);
        assert_eq!(config.hls_plus.sweep_interval_secs, 10);
        assert_eq!(config.upstream.connect_timeout_secs, 30);
    }
}
