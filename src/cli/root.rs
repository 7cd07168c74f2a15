use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use pagewise::config::Config;
use pagewise::source::{HttpSource, MemorySource, PaginatedSource};
use pagewise::Pager;

use super::browse::BrowseCommand;
use super::page::PageCommand;

/// Browse a remote paginated collection page by page
#[derive(Parser)]
#[command(
    name = "pagewise",
    version,
    about = "Browse a remote paginated collection page by page",
    long_about = r#"pagewise fetches a server-paginated collection in batches of pages, caches them
and prefetches ahead of the page you are reading.

Examples:
  pagewise                                   # Browse the configured collection
  pagewise --memory 95 browse                # Browse 95 generated records
  pagewise --base-url http://host/api page 3 # Print page 3 and exit"#
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    pub debug: bool,

    /// Base URL of the remote service
    #[arg(long = "base-url", global = true)]
    pub base_url: Option<String>,

    /// Records per page
    #[arg(short = 'n', long = "per-page", global = true)]
    pub per_page: Option<usize>,

    /// Serve COUNT generated records from memory instead of the remote service
    #[arg(long = "memory", value_name = "COUNT", global = true)]
    pub memory: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Navigate the collection interactively (default)
    Browse(BrowseCommand),

    /// Print a single page and exit
    Page(PageCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        if self.debug {
            debug!("Debug logging enabled");
        }

        let mut config = Config::init().await?;
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(per_page) = self.per_page {
            config.pager.items_per_page = per_page;
        }
        config.validate()?;
        debug!("Configuration initialized");

        let pager = self.build_pager(&config)?;
        info!("Using {:?}", pager);

        match &self.command {
            Some(Commands::Page(page_cmd)) => page_cmd.execute(&pager).await,
            Some(Commands::Browse(browse_cmd)) => browse_cmd.execute(&pager).await,
            None => BrowseCommand::default().execute(&pager).await,
        }
    }

    fn build_pager(&self, config: &Config) -> Result<Pager<Value>> {
        let source: Arc<dyn PaginatedSource<Value>> = match self.memory {
            Some(count) => Arc::new(MemorySource::generated(count)),
            None => Arc::new(
                HttpSource::<Value>::new(
                    &config.base_url,
                    &config.resource,
                    Duration::from_secs(config.request_timeout_secs),
                )
                .context("Failed to create HTTP client")?,
            ),
        };

        Ok(Pager::with_config(source, config.pager.clone())?)
    }
}
