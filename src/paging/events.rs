//! Discrete pager events for listeners

use std::sync::{Arc, PoisonError, RwLock};

use super::PageNumber;

/// Events emitted by the pager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagerEvent {
    /// A page was resolved and is now displayed
    PageLoaded {
        page: PageNumber,
        records: usize,
        from_cache: bool,
    },

    /// A requested page was served from the cache
    CacheHit { page: PageNumber },

    /// A batch fetch was issued
    FetchStarted {
        first_page: PageNumber,
        pages: usize,
        lookahead: bool,
    },

    /// A look-ahead fetch stored its pages
    PrefetchCompleted {
        first_page: PageNumber,
        stored_pages: usize,
    },

    /// A look-ahead fetch failed; the pages stay uncached
    PrefetchFailed { first_page: PageNumber, error: String },

    /// A fetch finished after the cache was reset and was discarded
    StaleDiscarded {
        first_page: PageNumber,
        generation: u64,
    },

    /// The cache was emptied and the generation advanced
    CacheReset { generation: u64 },

    /// The remote collection was resynchronized
    Synced,

    /// The remote collection was truncated
    Cleared,
}

type Listener = Arc<dyn Fn(&PagerEvent) + Send + Sync>;

/// Registered event listeners
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&PagerEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    pub fn emit(&self, event: PagerEvent) {
        // Listeners run outside the lock so they may register further listeners
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in &listeners {
            listener(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .listeners
            .read()
            .map(|l| l.len())
            .unwrap_or_default();
        f.debug_struct("EventBus").field("listeners", &count).finish()
    }
}
