//! Paginated record cache with batched look-ahead prefetching over a remote
//! collection.

pub mod config;
pub mod paging;
pub mod source;

pub use paging::{LoadingState, PageNumber, Pager, PagerConfig, PagerError, PagerEvent, PagerState};
pub use source::{PaginatedSource, RangeResponse, SourceError};
