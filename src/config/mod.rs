// src/config/mod.rs
pub mod ai;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::ingest::providers::{mapserver::DEFAULT_MAPSERVER_URL, spc_rss::DEFAULT_FEED_URL};
use crate::ingest::FetchRetry;
use crate::notify::Destination;
use ai::SummarizerConfig;

pub const ENV_CONFIG_PATH: &str = "SPC_NOTIFIER_CONFIG";
const FALLBACK_PATHS: &[&str] = &["config/spc_notifier.toml", "spc_notifier.toml"];

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}
fn default_mapserver_url() -> String {
    DEFAULT_MAPSERVER_URL.to_string()
}
fn default_cache_file() -> PathBuf {
    PathBuf::from("./seen_products.json")
}
fn default_cache_size() -> usize {
    DEFAULT_CAPACITY
}
fn default_poll_interval_secs() -> u64 {
    60
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_fetch_attempts() -> u32 {
    3
}
fn default_fetch_backoff_secs() -> u64 {
    2
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mapserver_url")]
    pub url: String,
}

impl Default for MapServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_mapserver_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default)]
    pub mapserver: MapServerConfig,
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Per-request timeout for feed, map server and webhook calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_fetch_backoff_secs")]
    pub fetch_backoff_secs: u64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Address for the Prometheus scrape endpoint, e.g. "127.0.0.1:9184".
    #[serde(default)]
    pub metrics_listen: Option<String>,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub webhooks: Vec<Destination>,
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn fetch_retry(&self) -> FetchRetry {
        FetchRetry {
            attempts: self.fetch_attempts.max(1),
            backoff: Duration::from_secs(self.fetch_backoff_secs),
        }
    }
}

/// Parse and validate a config document. Webhook URLs of the form
/// `ENV:NAME` are read from the environment.
pub fn parse_config(s: &str) -> Result<AppConfig> {
    let mut cfg: AppConfig = toml::from_str(s).context("parsing notifier config")?;

    if cfg.webhooks.is_empty() {
        bail!("config must define at least one [[webhooks]] entry");
    }
    for (i, hook) in cfg.webhooks.iter_mut().enumerate() {
        hook.url = resolve_env_ref(hook.url.trim())
            .with_context(|| format!("webhooks[{i}].url"))?;
        if hook.url.is_empty() {
            bail!("webhooks[{i}].url is empty");
        }
        hook.mention_id = hook.mention_id.trim().to_string();
    }
    if cfg.feed_url.trim().is_empty() {
        bail!("feed_url is empty");
    }
    if cfg.cache_size == 0 {
        cfg.cache_size = default_cache_size();
    }
    cfg.summarizer = cfg.summarizer.resolve()?;
    Ok(cfg)
}

fn resolve_env_ref(value: &str) -> Result<String> {
    match value.strip_prefix("ENV:") {
        Some(name) => std::env::var(name.trim()).map_err(|_| anyhow!("missing env var {}", name.trim())),
        None => Ok(value.to_string()),
    }
}

/// Load config from an explicit path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    parse_config(&content).with_context(|| format!("in {}", path.display()))
}

/// Locate the config file:
/// 1) explicit path (CLI)
/// 2) $SPC_NOTIFIER_CONFIG
/// 3) config/spc_notifier.toml
/// 4) spc_notifier.toml
pub fn find_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(pb);
        }
        bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
    }
    FALLBACK_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("no config file found (tried {})", FALLBACK_PATHS.join(", ")))
}

pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = find_config_path(explicit)?;
    load_config_from(&path)
}
