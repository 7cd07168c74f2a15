use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::paging::PagerConfig;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the remote service
    pub base_url: String,

    /// Collection path below the base URL
    pub resource: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Page and batch sizes
    pub pager: PagerConfig,
}

/// Configuration file contents; every field is optional
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_url: Option<String>,
    resource: Option<String>,
    request_timeout_secs: Option<u64>,
    items_per_page: Option<usize>,
    items_per_page_options: Option<Vec<usize>>,
    primary_batch_pages: Option<usize>,
    lookahead_batch_pages: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            resource: "users".to_string(),
            request_timeout_secs: 30,
            pager: PagerConfig::default(),
        }
    }
}

impl Config {
    /// Initialize configuration from various sources
    pub async fn init() -> Result<Self> {
        debug!("Initializing configuration");

        let mut config = Self::default();

        // Load from environment variables
        config.load_from_env();

        // Configuration files take precedence over the environment
        for path in Self::config_paths() {
            if path.exists() {
                config.load_from_path(&path).await?;
                break;
            }
        }

        Ok(config)
    }

    /// Candidate configuration files, highest priority first
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("./.pagewise.json"),
            PathBuf::from("./pagewise.json"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("pagewise").join("pagewise.json"));
        }

        paths
    }

    /// Load configuration from environment variables
    pub fn load_from_env(&mut self) {
        if let Ok(base_url) = std::env::var("PAGEWISE_BASE_URL") {
            self.base_url = base_url;
        }

        if let Ok(resource) = std::env::var("PAGEWISE_RESOURCE") {
            self.resource = resource;
        }

        if let Ok(per_page) = std::env::var("PAGEWISE_ITEMS_PER_PAGE") {
            if let Ok(per_page) = per_page.parse() {
                self.pager.items_per_page = per_page;
            }
        }

        if let Ok(timeout) = std::env::var("PAGEWISE_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse() {
                self.request_timeout_secs = timeout;
            }
        }
    }

    /// Merge a JSON configuration file into this configuration
    pub async fn load_from_path(&mut self, path: &Path) -> Result<()> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: FileConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        self.merge_with(file);
        Ok(())
    }

    fn merge_with(&mut self, other: FileConfig) {
        if let Some(base_url) = other.base_url {
            self.base_url = base_url;
        }
        if let Some(resource) = other.resource {
            self.resource = resource;
        }
        if let Some(timeout) = other.request_timeout_secs {
            self.request_timeout_secs = timeout;
        }
        if let Some(per_page) = other.items_per_page {
            self.pager.items_per_page = per_page;
        }
        if let Some(options) = other.items_per_page_options {
            self.pager.items_per_page_options = options;
        }
        if let Some(pages) = other.primary_batch_pages {
            self.pager.primary_batch_pages = pages;
        }
        if let Some(pages) = other.lookahead_batch_pages {
            self.pager.lookahead_batch_pages = pages;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(anyhow!("base_url is required. Set PAGEWISE_BASE_URL or pass --base-url"));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(anyhow!("base_url must start with http:// or https://"));
        }

        if self.resource.trim_matches('/').is_empty() {
            return Err(anyhow!("resource must not be empty"));
        }

        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than 0"));
        }

        self.pager.validate()?;
        Ok(())
    }
}
