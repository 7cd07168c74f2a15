//! Observable pager state

use std::sync::Arc;

use super::cache::PageCache;
use super::PageNumber;

/// What the pager is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingState {
    #[default]
    Idle,
    /// Blocking fetch for the page the user is waiting on
    LoadingPrimary,
    /// Non-blocking background fetch
    Prefetching,
    /// Remote resync in progress
    Executing,
    /// Remote truncate in progress
    Clearing,
}

/// Snapshot of everything a view needs to render the pager.
///
/// Published as a whole on every mutation, so a reader never sees a cache
/// update without the matching totals or page.
#[derive(Debug, Clone)]
pub struct PagerState<R> {
    /// Page currently displayed (1-based)
    pub current_page: PageNumber,

    pub items_per_page: usize,

    /// Records of the displayed page
    pub records: Arc<[R]>,

    /// Last total reported by the source; informational only
    pub total_elements: usize,

    /// Message of the most recent failed action
    pub error: Option<String>,

    pub cache: PageCache<R>,

    /// Incremented by every cache-invalidating reset
    pub generation: u64,

    /// Blocking action other than a primary load
    pub(crate) action: LoadingState,
    pub(crate) primary_loads: usize,
    pub(crate) prefetches: usize,
}

impl<R> PagerState<R> {
    /// Empty, idle state on page 1
    pub fn new(items_per_page: usize) -> Self {
        Self {
            current_page: 1,
            items_per_page,
            records: Arc::from(Vec::new()),
            total_elements: 0,
            error: None,
            cache: PageCache::new(),
            generation: 0,
            action: LoadingState::Idle,
            primary_loads: 0,
            prefetches: 0,
        }
    }

    /// Empty the view and cache and start a new generation
    pub(crate) fn reset(&mut self) {
        self.generation += 1;
        self.cache.clear();
        self.current_page = 1;
        self.records = Arc::from(Vec::new());
        self.total_elements = 0;
        self.error = None;
    }

    /// Effective loading state; blocking actions take precedence over prefetching
    pub fn loading_state(&self) -> LoadingState {
        match self.action {
            LoadingState::Executing | LoadingState::Clearing => self.action,
            _ if self.primary_loads > 0 => LoadingState::LoadingPrimary,
            _ if self.prefetches > 0 => LoadingState::Prefetching,
            _ => LoadingState::Idle,
        }
    }

    /// Whether a blocking action is running
    pub fn is_busy(&self) -> bool {
        !matches!(self.loading_state(), LoadingState::Idle | LoadingState::Prefetching)
    }

    /// Whether any look-ahead fetch is in flight
    pub fn is_prefetching(&self) -> bool {
        self.prefetches > 0
    }

    /// Cached page numbers, ascending
    pub fn available_pages(&self) -> Vec<PageNumber> {
        self.cache.keys()
    }

    /// Whether the page after the current one is already cached
    pub fn has_next(&self) -> bool {
        self.cache.contains(self.current_page + 1)
    }

    pub fn has_prev(&self) -> bool {
        self.current_page > 1
    }

    /// Whether any records are known
    pub fn has_data(&self) -> bool {
        !self.cache.is_empty()
    }

    /// Total page count derived from the last reported total
    pub fn total_pages(&self) -> usize {
        if self.items_per_page == 0 {
            return 0;
        }
        self.total_elements.div_ceil(self.items_per_page)
    }
}
