use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::{duration, parse_default};

/// Environment variable prefix; nested keys are separated by `__`
/// (e.g. `SITE_FAVICONS_FAVICONS__REFRESH_INTERVAL=12h`).
pub const ENV_PREFIX: &str = "SITE_FAVICONS_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub favicons: FaviconConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

/// Favicon discovery, caching and refresh settings.
///
/// Intervals are global; there are no per-site overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaviconConfig {
    /// How long fetched icon bytes stay fresh before a refresh is due
    #[serde(default = "default_refresh_interval", with = "duration")]
    pub refresh_interval: Duration,
    /// Back-off after a failed attempt while no icon is cached
    #[serde(default = "default_retry_interval", with = "duration")]
    pub retry_interval: Duration,
    /// Period of the background staleness scan across all sites
    #[serde(default = "default_scan_interval", with = "duration")]
    pub scan_interval: Duration,
    /// Run one staleness scan as soon as the manager starts
    #[serde(default = "default_scan_on_start")]
    pub scan_on_start: bool,
    /// Bounded work queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long an enqueue may wait for space when the queue is full
    #[serde(default = "default_enqueue_timeout", with = "duration")]
    pub enqueue_timeout: Duration,
    /// Per-subscriber event buffer
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    /// Outbound HTTP request timeout
    #[serde(default = "default_http_timeout", with = "duration")]
    pub http_timeout: Duration,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Ceiling for a single icon payload
    #[serde(default = "default_max_icon_bytes")]
    pub max_icon_bytes: usize,
    /// Ceiling for an HTML page probed for `<link rel="icon">`
    #[serde(default = "default_max_html_bytes")]
    pub max_html_bytes: usize,
    /// TTL of the resolved-URL cache (negative outcomes included)
    #[serde(default = "default_resolve_cache_ttl", with = "duration")]
    pub resolve_cache_ttl: Duration,
    /// User agent sent to tenant origins; defaults to `<crate>/<version>`
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_refresh_interval() -> Duration {
    parse_default(DEFAULT_REFRESH_INTERVAL)
}

fn default_retry_interval() -> Duration {
    parse_default(DEFAULT_RETRY_INTERVAL)
}

fn default_scan_interval() -> Duration {
    parse_default(DEFAULT_SCAN_INTERVAL)
}

fn default_scan_on_start() -> bool {
    DEFAULT_SCAN_ON_START
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_enqueue_timeout() -> Duration {
    parse_default(DEFAULT_ENQUEUE_TIMEOUT)
}

fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}

fn default_http_timeout() -> Duration {
    parse_default(DEFAULT_HTTP_TIMEOUT)
}

fn default_max_redirects() -> usize {
    DEFAULT_MAX_REDIRECTS
}

fn default_max_icon_bytes() -> usize {
    DEFAULT_MAX_ICON_BYTES
}

fn default_max_html_bytes() -> usize {
    DEFAULT_MAX_HTML_BYTES
}

fn default_resolve_cache_ttl() -> Duration {
    parse_default(DEFAULT_RESOLVE_CACHE_TTL)
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for FaviconConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            retry_interval: default_retry_interval(),
            scan_interval: default_scan_interval(),
            scan_on_start: default_scan_on_start(),
            queue_capacity: default_queue_capacity(),
            enqueue_timeout: default_enqueue_timeout(),
            subscriber_buffer: default_subscriber_buffer(),
            http_timeout: default_http_timeout(),
            max_redirects: default_max_redirects(),
            max_icon_bytes: default_max_icon_bytes(),
            max_html_bytes: default_max_html_bytes(),
            resolve_cache_ttl: default_resolve_cache_ttl(),
            user_agent: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: Some(DEFAULT_MAX_CONNECTIONS),
            },
            favicons: FaviconConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl FaviconConfig {
    /// Validate values that would otherwise stall the pipeline
    pub fn validate(&self) -> Result<(), String> {
        let intervals = [
            ("refresh_interval", self.refresh_interval),
            ("retry_interval", self.retry_interval),
            ("scan_interval", self.scan_interval),
            ("http_timeout", self.http_timeout),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(format!("favicons.{name} must be greater than zero"));
            }
        }

        let sizes = [
            ("queue_capacity", self.queue_capacity),
            ("subscriber_buffer", self.subscriber_buffer),
            ("max_icon_bytes", self.max_icon_bytes),
            ("max_html_bytes", self.max_html_bytes),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(format!("favicons.{name} must be greater than zero"));
            }
        }

        Ok(())
    }

    /// User agent presented to tenant origins
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    /// Load configuration layered as defaults, then TOML file, then environment.
    ///
    /// A missing file is created with the default configuration.
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if !std::path::Path::new(config_file).exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            std::fs::write(config_file, contents)
                .with_context(|| format!("Failed to write default config to {config_file}"))?;
            info!("Created default config file: {}", config_file);
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {config_file}"))?;

        config
            .favicons
            .validate()
            .map_err(|message| anyhow::anyhow!("Invalid configuration: {message}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_favicon_config() {
        let config = FaviconConfig::default();

        assert_eq!(config.refresh_interval, Duration::from_secs(24 * 3600));
        assert_eq!(config.retry_interval, Duration::from_secs(30 * 60));
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.subscriber_buffer, 8);
        assert_eq!(config.enqueue_timeout, Duration::from_secs(1));
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.max_icon_bytes, 128 * 1024);
        assert_eq!(config.max_html_bytes, 512 * 1024);
        assert_eq!(config.resolve_cache_ttl, Duration::from_secs(6 * 3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let config = FaviconConfig {
            queue_capacity: 0,
            ..FaviconConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FaviconConfig {
            retry_interval: Duration::ZERO,
            ..FaviconConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_layers_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[database]
url = "sqlite::memory:"

[favicons]
refresh_interval = "12h"
queue_capacity = 16
"#,
        )
        .unwrap();

        let config = Config::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.favicons.refresh_interval, Duration::from_secs(12 * 3600));
        assert_eq!(config.favicons.queue_capacity, 16);
        // Untouched keys keep their defaults
        assert_eq!(config.favicons.retry_interval, Duration::from_secs(30 * 60));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.toml");

        let config = Config::load_from_file(path.to_str().unwrap()).unwrap();
        assert!(path.exists());
        assert_eq!(config.database.url, DEFAULT_DATABASE_URL);
    }
}
