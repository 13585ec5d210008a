// SPDX-License-Identifier: MIT
//! Daemon configuration.
//!
//! Loaded from `config.toml` in the data directory, every section optional
//! with full defaults, then overridden by CLI flags / environment in main.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

const DEFAULT_PORT: u16 = 4800;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── ServerConfig ────────────────────────────────────────────────────────────

/// HTTP server configuration (`[server]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: default_bind_address(),
        }
    }
}

// ─── DeliveryConfig ──────────────────────────────────────────────────────────

/// Delivery queue tuning (`[delivery]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Number of concurrent delivery workers.
    pub workers: usize,
    /// Worker poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Terminal jobs older than this are removed by the janitor (hours).
    pub clean_after_hours: i64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 1000,
            clean_after_hours: 7 * 24,
        }
    }
}

// ─── EmailConfig / SmsConfig ─────────────────────────────────────────────────

/// Email provider (`[email]` in config.toml). Disabled when `api_url` is
/// empty — email jobs are then simply not enqueued.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from_address: String,
}

impl EmailConfig {
    pub fn enabled(&self) -> bool {
        !self.api_url.is_empty()
    }
}

/// SMS provider (`[sms]` in config.toml). Disabled when `api_url` is empty.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SmsConfig {
    pub api_url: String,
    pub api_key: String,
    pub sender_id: String,
}

impl SmsConfig {
    pub fn enabled(&self) -> bool {
        !self.api_url.is_empty()
    }
}

// ─── RetentionConfig ─────────────────────────────────────────────────────────

/// Retention windows (`[retention]` in config.toml). The audit log is never
/// pruned.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Activity log rows older than this are pruned (days).
    pub activity_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { activity_days: 180 }
    }
}

// ─── ObservabilityConfig ─────────────────────────────────────────────────────

/// Observability knobs (`[observability]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log SQLite queries that exceed this threshold (milliseconds). Default: 100.
    /// Set to 0 to disable slow query logging.
    pub slow_query_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 100,
        }
    }
}

// ─── DaemonConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub delivery: DeliveryConfig,
    pub email: EmailConfig,
    pub sms: SmsConfig,
    pub retention: RetentionConfig,
    pub observability: ObservabilityConfig,
}

impl DaemonConfig {
    /// Load `config.toml` from the data directory. Missing file means all
    /// defaults; a malformed file is logged and ignored rather than fatal.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("config.toml");
        match std::fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), err = %e, "config.toml is malformed, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.delivery.workers >= 1);
        assert!(!config.email.enabled());
        assert!(!config.sms.enabled());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [email]
            api_url = "https://mail.example.com/send"
            api_key = "k"
            from_address = "noreply@example.com"
            "#,
        )
        .expect("parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert!(config.email.enabled());
        assert!(!config.sms.enabled());
        assert_eq!(config.retention.activity_days, 180);
    }
}
