use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/marvel.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct BuildConfig {
    /// Records written per batch inside the build transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,
    /// Key rate limits on the first `X-Forwarded-For` entry instead of the
    /// peer address. Only safe behind a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_connections: default_max_connections(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            trust_forwarded_for: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}
fn default_max_connections() -> u32 {
    8
}
fn default_page_size() -> i64 {
    50
}
fn default_max_page_size() -> i64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Table size at which refilled client buckets are pruned.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            burst: default_burst(),
            max_clients: default_max_clients(),
        }
    }
}

fn default_requests_per_minute() -> u32 {
    60
}
fn default_burst() -> u32 {
    30
}
fn default_max_clients() -> usize {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.build.batch_size == 0 {
        anyhow::bail!("build.batch_size must be > 0");
    }

    if config.server.max_connections == 0 {
        anyhow::bail!("server.max_connections must be > 0");
    }
    if config.server.default_page_size < 1 {
        anyhow::bail!("server.default_page_size must be >= 1");
    }
    if config.server.max_page_size < config.server.default_page_size {
        anyhow::bail!("server.max_page_size must be >= server.default_page_size");
    }

    if config.rate_limit.requests_per_minute == 0 {
        anyhow::bail!("rate_limit.requests_per_minute must be > 0");
    }
    if config.rate_limit.burst == 0 {
        anyhow::bail!("rate_limit.burst must be > 0");
    }
    if config.rate_limit.max_clients == 0 {
        anyhow::bail!("rate_limit.max_clients must be > 0");
    }

    Ok(())
}
