//! Client-side paginated record cache with look-ahead prefetching.
//!
//! [`Pager`] presents a remote, server-paginated collection as a set of
//! fixed-size pages. Pages are fetched in batches, cached in a [`PageCache`]
//! and warmed ahead of the user by the [`PrefetchScheduler`].

pub mod cache;
pub mod config;
pub mod controller;
pub mod errors;
pub mod events;
pub mod scheduler;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::PageCache;
pub use config::PagerConfig;
pub use controller::Pager;
pub use errors::{FetchError, PagerError, PagerResult};
pub use events::PagerEvent;
pub use scheduler::{PrefetchScheduler, Resolved};
pub use state::{LoadingState, PagerState};

/// 1-based page number
pub type PageNumber = usize;
