use anyhow::Result;
use clap::Args;
use serde_json::Value;
use tracing::debug;

use pagewise::{PageNumber, Pager};

use super::browse::print_state;

/// Print a single page and exit
#[derive(Args)]
pub struct PageCommand {
    /// Page number, starting at 1
    pub page: PageNumber,
}

impl PageCommand {
    pub async fn execute(&self, pager: &Pager<Value>) -> Result<()> {
        debug!("Executing page command for page {}", self.page);

        pager.go_to(self.page).await?;

        print_state(&pager.state());
        Ok(())
    }
}
