use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";
/// Environment variable holding the server base URL (also read from `.env`).
pub const BASE_URL_ENV: &str = "CHAT_API_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("base url `{0}` must start with http:// or https://")]
    InvalidBaseUrl(String),
    #[error("server_timeout_secs ({server}) must be greater than keep_alive_interval_secs ({keep_alive})")]
    KeepAliveTooSlow { keep_alive: u64, server: u64 },
    #[error("keep_alive_interval_secs must be greater than zero")]
    ZeroKeepAlive,
    #[error("invocation_timeout_secs must be greater than zero")]
    ZeroInvocationTimeout,
    #[error("failed to write config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Shared by the hub endpoint and the history API.
    pub base_url: String,
    pub hub_path: String,
    pub broadcast_history_limit: u32,
    pub http_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub keep_alive_interval_secs: u64,
    pub server_timeout_secs: u64,
    /// Upper bound on waiting for the hub to complete a send.
    pub invocation_timeout_secs: u64,
    /// Delays before each automatic reconnect attempt; empty disables reconnecting.
    pub reconnect_delays_ms: Vec<u64>,
    /// Connect the websocket directly, without the negotiate round trip.
    pub skip_negotiation: bool,
    /// Append our own sends locally instead of waiting for the hub to echo them.
    pub echo_sent_messages: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            hub_path: "/chathub".to_string(),
            broadcast_history_limit: 50,
            http_timeout_secs: 10,
            handshake_timeout_secs: 15,
            keep_alive_interval_secs: 15,
            server_timeout_secs: 30,
            invocation_timeout_secs: 15,
            reconnect_delays_ms: vec![0, 2_000, 10_000, 30_000],
            skip_negotiation: false,
            echo_sent_messages: false,
        }
    }
}

impl AppConfig {
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(base_url) = base_url {
            self.base_url = base_url;
        }
        self
    }

    /// Normalises the base url and hub path and checks the timing knobs.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url));
        }
        self.base_url = base_url;

        let hub_path = self.hub_path.trim().trim_matches('/');
        self.hub_path = format!("/{hub_path}");

        if self.keep_alive_interval_secs == 0 {
            return Err(ConfigError::ZeroKeepAlive);
        }
        if self.invocation_timeout_secs == 0 {
            return Err(ConfigError::ZeroInvocationTimeout);
        }
        if self.server_timeout_secs <= self.keep_alive_interval_secs {
            return Err(ConfigError::KeepAliveTooSlow {
                keep_alive: self.keep_alive_interval_secs,
                server: self.server_timeout_secs,
            });
        }
        Ok(self)
    }

    pub fn hub_url(&self) -> String {
        format!("{}{}", self.base_url, self.hub_path)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn reconnect_delays(&self) -> Vec<Duration> {
        self.reconnect_delays_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_hub() {
        let config = AppConfig::default().validate().unwrap();
        assert_eq!(config.hub_url(), "http://localhost:5000/chathub");
        assert_eq!(config.broadcast_history_limit, 50);
        assert_eq!(
            config.reconnect_delays(),
            vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(10),
                Duration::from_secs(30),
            ]
        );
    }

    #[test]
    fn validate_normalises_slashes() {
        let config = AppConfig {
            base_url: " https://chat.example.com/api/ ".into(),
            hub_path: "chathub/".into(),
            ..AppConfig::default()
        }
        .validate()
        .unwrap();

        assert_eq!(config.base_url, "https://chat.example.com/api");
        assert_eq!(config.hub_url(), "https://chat.example.com/api/chathub");
    }

    #[test]
    fn validate_rejects_non_http_urls() {
        let err = AppConfig::default()
            .with_base_url(Some("ftp://chat.example.com".into()))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl(_)));
    }

    #[test]
    fn validate_rejects_keep_alive_slower_than_timeout() {
        let config = AppConfig {
            keep_alive_interval_secs: 30,
            server_timeout_secs: 30,
            invocation_timeout_secs: 15,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::KeepAliveTooSlow { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_invocation_timeout() {
        let config = AppConfig {
            invocation_timeout_secs: 0,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroInvocationTimeout)
        ));
        assert_eq!(AppConfig::default().invocation_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn base_url_override_wins_only_when_present() {
        let config = AppConfig::default().with_base_url(None);
        assert_eq!(config.base_url, "http://localhost:5000");

        let config = config.with_base_url(Some("http://10.0.0.2:8080".into()));
        assert_eq!(config.base_url, "http://10.0.0.2:8080");
    }

    #[test]
    fn load_config_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        fs::write(
            &path,
            r#"{ "base_url": "http://chat.local", "echo_sent_messages": true }"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.base_url, "http://chat.local");
        assert!(config.echo_sent_messages);
        assert_eq!(config.hub_path, "/chathub");
        assert_eq!(config.server_timeout_secs, 30);
    }

    #[test]
    fn load_config_falls_back_on_missing_or_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(load_config(missing.to_str().unwrap()), AppConfig::default());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        assert_eq!(load_config(broken.to_str().unwrap()), AppConfig::default());
    }

    #[test]
    fn save_then_load_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.json");
        let path = path.to_str().unwrap();
        let config = AppConfig {
            base_url: "https://chat.example.com".into(),
            reconnect_delays_ms: vec![500],
            ..AppConfig::default()
        };

        save_config(path, &config).unwrap();
        assert_eq!(load_config(path), config);
    }
}
