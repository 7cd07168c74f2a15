//! Remote paginated collections.
//!
//! A [`PaginatedSource`] is the only thing the paging core talks to over the
//! network: a 1-based range fetch, a remote resync and a remote truncate.
//! Implementations are free to use any transport as long as they honour the
//! range semantics documented on [`PaginatedSource::fetch_range`].

pub mod http;
pub mod memory;

pub use http::HttpSource;
pub use memory::MemorySource;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a [`PaginatedSource`]
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid range: start={start}, count={count} (start and count must be at least 1)")]
    InvalidRange { start: usize, count: usize },

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// One range of records plus the collection size reported alongside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResponse<R> {
    /// Up to `count` consecutive records starting at the requested index
    pub records: Vec<R>,

    /// Total number of records in the remote collection
    pub total_elements: usize,
}

impl<R> RangeResponse<R> {
    pub fn new(records: Vec<R>, total_elements: usize) -> Self {
        Self {
            records,
            total_elements,
        }
    }
}

/// Abstraction over a remote, server-paginated collection
#[async_trait]
pub trait PaginatedSource<R>: Send + Sync {
    /// Fetch up to `count` records beginning at the 1-based index `start`.
    ///
    /// Fewer than `count` records are returned when the collection ends first.
    async fn fetch_range(&self, start: usize, count: usize) -> SourceResult<RangeResponse<R>>;

    /// Trigger a remote resynchronization (re-import) of the collection
    async fn execute(&self) -> SourceResult<()>;

    /// Truncate the remote collection
    async fn clear(&self) -> SourceResult<()>;

    /// Human readable description used in logs
    fn describe(&self) -> String {
        "paginated source".to_string()
    }
}

/// Reject ranges the contract does not allow
pub(crate) fn check_range(start: usize, count: usize) -> SourceResult<()> {
    if start == 0 || count == 0 {
        return Err(SourceError::InvalidRange { start, count });
    }
    Ok(())
}
