// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "AGGREGATOR_CONFIG_PATH";
pub const ENV_INTERVAL_SECS: &str = "AGGREGATOR_INTERVAL_SECS";
pub const ENV_BATCH_SIZE: &str = "AGGREGATOR_BATCH_SIZE";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "AGGREGATOR_FETCH_TIMEOUT_SECS";
pub const ENV_SNAPSHOT_PATH: &str = "AGGREGATOR_SNAPSHOT_PATH";

fn default_interval_secs() -> u64 {
    60
}
fn default_batch_size() -> usize {
    10
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    concat!("rss-aggregator/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_posts_limit() -> usize {
    20
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Sources ingested per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Deadline for one feed fetch, including the body.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// How long an in-flight batch may run after shutdown is requested.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// `limit` used by `GET /v1/posts` when the query has none.
    #[serde(default = "default_posts_limit")]
    pub posts_default_limit: usize,
    /// Where the store snapshot lives; `None` keeps everything in memory.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            user_agent: default_user_agent(),
            posts_default_limit: default_posts_limit(),
            snapshot_path: None,
        }
    }
}

impl AggregatorConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = match ext.as_str() {
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("parsing json config {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("parsing toml config {}", path.display()))?,
        };
        Ok(sanitize(cfg))
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $AGGREGATOR_CONFIG_PATH
    /// 2) config/aggregator.toml
    /// 3) config/aggregator.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new("config/aggregator.toml").exists() {
            Self::load_from(Path::new("config/aggregator.toml"))?
        } else if Path::new("config/aggregator.json").exists() {
            Self::load_from(Path::new("config/aggregator.json"))?
        } else {
            Self::default()
        };
        base.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_parse::<u64>(ENV_INTERVAL_SECS)? {
            self.interval_secs = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_BATCH_SIZE)? {
            self.batch_size = v;
        }
        if let Some(v) = env_parse::<u64>(ENV_FETCH_TIMEOUT_SECS)? {
            self.fetch_timeout_secs = v;
        }
        if let Ok(p) = std::env::var(ENV_SNAPSHOT_PATH) {
            let p = p.trim();
            self.snapshot_path = (!p.is_empty()).then(|| PathBuf::from(p));
        }
        Ok(sanitize(self))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}")),
        Err(_) => Ok(None),
    }
}

// Zero interval or batch would stall the scheduler.
fn sanitize(mut cfg: AggregatorConfig) -> AggregatorConfig {
    cfg.interval_secs = cfg.interval_secs.max(1);
    cfg.batch_size = cfg.batch_size.max(1);
    cfg.fetch_timeout_secs = cfg.fetch_timeout_secs.max(1);
    cfg.posts_default_limit = cfg.posts_default_limit.max(1);
    cfg
}
