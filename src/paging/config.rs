//! Pager configuration

use serde::{Deserialize, Serialize};

use super::errors::{PagerError, PagerResult};

/// Tuning for page size and batch sizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerConfig {
    /// Records per page
    pub items_per_page: usize,

    /// Page sizes offered to the user
    pub items_per_page_options: Vec<usize>,

    /// Pages requested by a blocking load of an uncached page
    pub primary_batch_pages: usize,

    /// Pages requested by a background look-ahead
    pub lookahead_batch_pages: usize,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            items_per_page: 10,
            items_per_page_options: vec![1, 10, 25, 50],
            primary_batch_pages: 3,
            lookahead_batch_pages: 2,
        }
    }
}

impl PagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial page size
    pub fn with_items_per_page(mut self, items_per_page: usize) -> Self {
        self.items_per_page = items_per_page;
        self
    }

    /// Set the batch sizes, in pages, for primary and look-ahead fetches
    pub fn with_batch_pages(mut self, primary: usize, lookahead: usize) -> Self {
        self.primary_batch_pages = primary;
        self.lookahead_batch_pages = lookahead;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> PagerResult<()> {
        if self.items_per_page == 0 {
            return Err(PagerError::InvalidItemsPerPage(0));
        }

        if self.items_per_page_options.iter().any(|&n| n == 0) {
            return Err(PagerError::Config(
                "items_per_page_options must not contain 0".to_string(),
            ));
        }

        if self.primary_batch_pages == 0 {
            return Err(PagerError::Config(
                "primary_batch_pages must be at least 1".to_string(),
            ));
        }

        if self.lookahead_batch_pages == 0 {
            return Err(PagerError::Config(
                "lookahead_batch_pages must be at least 1".to_string(),
            ));
        }

        if !self.batch_fits(self.items_per_page) {
            return Err(PagerError::InvalidItemsPerPage(self.items_per_page));
        }

        Ok(())
    }

    /// Whether a batch of `items_per_page`-sized pages can be addressed
    pub fn batch_fits(&self, items_per_page: usize) -> bool {
        let widest = self.primary_batch_pages.max(self.lookahead_batch_pages);
        items_per_page.checked_mul(widest).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = PagerConfig::default();

        assert_eq!(config.items_per_page, 10);
        assert_eq!(config.items_per_page_options, vec![1, 10, 25, 50]);
        assert_eq!(config.primary_batch_pages, 3);
        assert_eq!(config.lookahead_batch_pages, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            PagerConfig::new().with_items_per_page(0).validate(),
            Err(PagerError::InvalidItemsPerPage(0))
        ));
        assert!(PagerConfig::new().with_batch_pages(0, 2).validate().is_err());
        assert!(PagerConfig::new().with_batch_pages(3, 0).validate().is_err());

        let mut config = PagerConfig::default();
        config.items_per_page_options.push(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_page_rejected() {
        let config = PagerConfig::new();
        assert!(config.batch_fits(50));
        assert!(!config.batch_fits(usize::MAX / 2));
        assert!(matches!(
            PagerConfig::new().with_items_per_page(usize::MAX / 2).validate(),
            Err(PagerError::InvalidItemsPerPage(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PagerConfig = serde_json::from_str(r#"{"items_per_page": 25}"#).unwrap();
        assert_eq!(config.items_per_page, 25);
        assert_eq!(config.primary_batch_pages, 3);
    }
}
