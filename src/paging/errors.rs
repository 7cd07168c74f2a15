//! Error types for the paging core

use thiserror::Error;

use super::PageNumber;
use crate::source::SourceError;

/// A failed range fetch.
///
/// Cloneable so that every caller attached to the same in-flight fetch
/// receives the same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch of {count} records from index {start} failed: {message}")]
pub struct FetchError {
    pub start: usize,
    pub count: usize,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(start: usize, count: usize, source: &SourceError) -> Self {
        Self {
            start,
            count,
            message: source.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PagerError {
    #[error("Failed to load page {page}: {source}")]
    Fetch {
        page: PageNumber,
        #[source]
        source: FetchError,
    },

    #[error("Sync failed: {0}")]
    Execute(#[source] SourceError),

    #[error("Clear failed: {0}")]
    Clear(#[source] SourceError),

    #[error("Invalid page number: {0} (pages start at 1)")]
    InvalidPage(PageNumber),

    #[error("Invalid items per page: {0}")]
    InvalidItemsPerPage(usize),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Load of page {page} was superseded by a cache reset")]
    Stale { page: PageNumber },
}

impl PagerError {
    /// Whether this error should be shown to the user.
    ///
    /// Stale loads are an expected consequence of reconfiguration.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, PagerError::Stale { .. })
    }
}

pub type PagerResult<T> = Result<T, PagerError>;
