//! Configuration system for maintme.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dedup::DedupConfig;
use crate::error::{MaintmeError, MaintmeResult};
use crate::notify::WebhookConfig;
use crate::poller::PollerConfig;

/// GitHub API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// API base URL.
    pub api_url: String,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Events requested per page (GitHub caps this at 100).
    pub per_page: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            user_agent: concat!("maintme/", env!("CARGO_PKG_VERSION")).to_string(),
            per_page: 100,
            timeout_secs: 30,
        }
    }
}

/// Subscriber database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let maintme_dir = dirs::home_dir()
            .map(|h| h.join(".maintme"))
            .unwrap_or_else(|| PathBuf::from(".maintme"));

        Self {
            path: maintme_dir.join("maintme.db"),
        }
    }
}

/// Where accepted events are delivered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotifierConfig {
    /// One line per event on standard output.
    #[default]
    Stdout,
    /// Signed JSON posted to an HTTP endpoint.
    Webhook(WebhookConfig),
}

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintmeConfig {
    /// Poller loop configuration.
    pub poller: PollerConfig,
    /// Dedup cache configuration.
    pub dedup: DedupConfig,
    /// GitHub client configuration.
    pub github: GitHubConfig,
    /// Store configuration.
    pub store: StoreConfig,
    /// Notifier configuration.
    pub notifier: NotifierConfig,
}

impl MaintmeConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> MaintmeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| MaintmeError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| MaintmeError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| MaintmeError::Configuration(e.to_string())),
            _ => Err(MaintmeError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from `MAINTME_*` environment variables.
    pub fn from_env() -> MaintmeResult<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from a variable lookup, defaults for anything unset.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> MaintmeResult<Self> {
        let mut config = Self::default();

        if let Some(v) = var("MAINTME_TICK_INTERVAL_SECS") {
            config.poller.tick_interval_secs = parse("MAINTME_TICK_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = var("MAINTME_MAX_CONCURRENCY") {
            config.poller.max_concurrency = parse("MAINTME_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = var("MAINTME_MAX_PAGES") {
            config.poller.max_pages = parse("MAINTME_MAX_PAGES", &v)?;
        }
        if let Some(v) = var("MAINTME_DEDUP_RETENTION_SECS") {
            config.dedup.retention_secs = parse("MAINTME_DEDUP_RETENTION_SECS", &v)?;
        }
        if let Some(v) = var("MAINTME_DEDUP_CAPACITY") {
            config.dedup.capacity = parse("MAINTME_DEDUP_CAPACITY", &v)?;
        }
        if let Some(url) = var("MAINTME_GITHUB_API_URL") {
            config.github.api_url = url;
        }
        if let Some(agent) = var("MAINTME_GITHUB_USER_AGENT") {
            config.github.user_agent = agent;
        }
        if let Some(path) = var("MAINTME_DB_PATH") {
            config.store.path = PathBuf::from(path);
        }
        if let Some(url) = var("MAINTME_WEBHOOK_URL") {
            let mut webhook = WebhookConfig::new(url);
            webhook.secret = var("MAINTME_WEBHOOK_SECRET");
            config.notifier = NotifierConfig::Webhook(webhook);
        }

        Ok(config)
    }

    /// Create a builder.
    pub fn builder() -> MaintmeConfigBuilder {
        MaintmeConfigBuilder::default()
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> MaintmeResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MaintmeError::Configuration(format!("{} has invalid value {:?}", key, value)))
}

/// Builder for MaintmeConfig.
#[derive(Default)]
pub struct MaintmeConfigBuilder {
    config: MaintmeConfig,
}

impl MaintmeConfigBuilder {
    /// Set poller configuration.
    pub fn poller(mut self, config: PollerConfig) -> Self {
        self.config.poller = config;
        self
    }

    /// Set dedup configuration.
    pub fn dedup(mut self, config: DedupConfig) -> Self {
        self.config.dedup = config;
        self
    }

    /// Set GitHub configuration.
    pub fn github(mut self, config: GitHubConfig) -> Self {
        self.config.github = config;
        self
    }

    /// Set the database path.
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store.path = path.into();
        self
    }

    /// Set notifier configuration.
    pub fn notifier(mut self, config: NotifierConfig) -> Self {
        self.config.notifier = config;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> MaintmeConfig {
        self.config
    }
}
