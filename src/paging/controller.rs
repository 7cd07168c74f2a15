//! Navigation over a remote paginated collection.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::config::PagerConfig;
use super::errors::{PagerError, PagerResult};
use super::events::{EventBus, PagerEvent};
use super::scheduler::{PrefetchScheduler, Resolved, StateSender};
use super::state::{LoadingState, PagerState};
use super::PageNumber;
use crate::source::PaginatedSource;

const LOAD_ERROR: &str = "Error loading records.";
const SYNC_ERROR: &str = "Error executing sync.";
const CLEAR_ERROR: &str = "Error clearing records.";

/// Owns the view state of a paginated collection and drives the scheduler.
///
/// Cheap to clone; clones share the same state, cache and in-flight fetches.
/// The pager does not serialize overlapping navigation itself: callers that
/// must not start a load while [`PagerState::is_busy`] should check it first.
pub struct Pager<R> {
    config: Arc<PagerConfig>,
    source: Arc<dyn PaginatedSource<R>>,
    state: StateSender<R>,
    events: Arc<EventBus>,
    scheduler: PrefetchScheduler<R>,
}

impl<R> Clone for Pager<R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            source: Arc::clone(&self.source),
            state: Arc::clone(&self.state),
            events: Arc::clone(&self.events),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<R> Pager<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Create a pager with default configuration
    pub fn new(source: Arc<dyn PaginatedSource<R>>) -> Self {
        Self::build(source, PagerConfig::default())
    }

    /// Create a pager with custom configuration
    pub fn with_config(source: Arc<dyn PaginatedSource<R>>, config: PagerConfig) -> PagerResult<Self> {
        config.validate()?;
        Ok(Self::build(source, config))
    }

    fn build(source: Arc<dyn PaginatedSource<R>>, config: PagerConfig) -> Self {
        let (state, _) = watch::channel(PagerState::new(config.items_per_page));
        let state = Arc::new(state);
        let events = Arc::new(EventBus::default());
        let scheduler = PrefetchScheduler::new(
            Arc::clone(&source),
            Arc::clone(&state),
            Arc::clone(&events),
            &config,
        );

        Self {
            config: Arc::new(config),
            source,
            state,
            events,
            scheduler,
        }
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PagerState<R> {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<PagerState<R>> {
        self.state.subscribe()
    }

    /// Register a listener for discrete events
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&PagerEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener);
    }

    pub fn current_page(&self) -> PageNumber {
        self.state.borrow().current_page
    }

    pub fn items_per_page(&self) -> usize {
        self.state.borrow().items_per_page
    }

    /// Reset everything and load page 1
    pub async fn load_initial(&self) -> PagerResult<()> {
        self.scheduler.invalidate(|_| {}).await;
        self.go_to(1).await
    }

    /// Show `page`, fetching it if it is not cached
    pub async fn go_to(&self, page: PageNumber) -> PagerResult<()> {
        if page == 0 {
            return Err(PagerError::InvalidPage(page));
        }

        self.state.send_modify(|state| state.primary_loads += 1);
        let result = self.scheduler.load(page).await;

        let mut applied = false;
        self.state.send_modify(|state| {
            state.primary_loads = state.primary_loads.saturating_sub(1);
            match &result {
                Ok(resolved) if resolved.generation == state.generation => {
                    state.current_page = page;
                    state.records = Arc::clone(&resolved.records);
                    state.error = None;
                    applied = true;
                }
                Ok(_)
                | Err(PagerError::Stale { .. })
                | Err(PagerError::InvalidPage(_))
                | Err(PagerError::InvalidItemsPerPage(_)) => {}
                Err(e) => state.error = Some(format!("{} {}", LOAD_ERROR, e)),
            }
        });

        match result {
            Ok(Resolved {
                records,
                from_cache,
                ..
            }) if applied => {
                debug!("Showing page {} ({} records)", page, records.len());
                self.events.emit(PagerEvent::PageLoaded {
                    page,
                    records: records.len(),
                    from_cache,
                });
                Ok(())
            }
            Ok(_) => Err(PagerError::Stale { page }),
            Err(e) => {
                if e.is_user_facing() {
                    warn!("{}", e);
                } else {
                    debug!("{}", e);
                }
                Err(e)
            }
        }
    }

    /// Show the page after the current one
    pub async fn next(&self) -> PagerResult<()> {
        let current = self.current_page();
        self.go_to(current.saturating_add(1)).await
    }

    /// Show the page before the current one; no-op on page 1
    pub async fn prev(&self) -> PagerResult<()> {
        let current = self.current_page();
        if current <= 1 {
            return Ok(());
        }
        self.go_to(current - 1).await
    }

    /// Change the page size, drop every cached page and reload page 1
    pub async fn set_items_per_page(&self, items_per_page: usize) -> PagerResult<()> {
        if items_per_page == 0 || !self.config.batch_fits(items_per_page) {
            return Err(PagerError::InvalidItemsPerPage(items_per_page));
        }

        info!("Changing items per page to {}", items_per_page);
        self.scheduler
            .invalidate(|state| state.items_per_page = items_per_page)
            .await;
        self.go_to(1).await
    }

    /// Resynchronize the remote collection, then reload from page 1.
    ///
    /// On failure the cache and view are left as they were.
    pub async fn sync(&self) -> PagerResult<()> {
        self.state
            .send_modify(|state| state.action = LoadingState::Executing);
        info!("Syncing {}", self.source.describe());

        let result = self.source.execute().await;
        self.state.send_modify(|state| {
            state.action = LoadingState::Idle;
            if let Err(e) = &result {
                state.error = Some(format!("{} {}", SYNC_ERROR, e));
            }
        });

        match result {
            Ok(()) => {
                self.events.emit(PagerEvent::Synced);
                self.load_initial().await
            }
            Err(e) => {
                warn!("Sync failed: {}", e);
                Err(PagerError::Execute(e))
            }
        }
    }

    /// Truncate the remote collection and empty the cache.
    ///
    /// On failure the cache and view are left as they were.
    pub async fn clear_all(&self) -> PagerResult<()> {
        self.state
            .send_modify(|state| state.action = LoadingState::Clearing);
        info!("Clearing {}", self.source.describe());

        match self.source.clear().await {
            Ok(()) => {
                self.scheduler
                    .invalidate(|state| state.action = LoadingState::Idle)
                    .await;
                self.events.emit(PagerEvent::Cleared);
                Ok(())
            }
            Err(e) => {
                warn!("Clear failed: {}", e);
                self.state.send_modify(|state| {
                    state.action = LoadingState::Idle;
                    state.error = Some(format!("{} {}", CLEAR_ERROR, e));
                });
                Err(PagerError::Clear(e))
            }
        }
    }

    /// Wait for outstanding fetches of the current generation to finish
    pub async fn wait_for_prefetch(&self) {
        self.scheduler.quiesce().await;
    }
}

impl<R> std::fmt::Debug for Pager<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Pager")
            .field("source", &self.source.describe())
            .field("current_page", &state.current_page)
            .field("items_per_page", &state.items_per_page)
            .field("cached_pages", &state.cache.len())
            .field("generation", &state.generation)
            .finish()
    }
}
