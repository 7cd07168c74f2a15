//! Batched fetching and look-ahead prefetching.
//!
//! The scheduler turns "I need page P" into as few `fetch_range` calls as
//! possible. A miss fetches a batch of `primary_batch_pages` pages starting
//! at P; a hit serves the cache and warms the page after P with a smaller
//! background batch.
//!
//! Every page covered by an outstanding batch is recorded in a flight
//! registry. A request for a registered page attaches to the existing flight
//! instead of issuing another fetch. Flights capture the cache generation
//! they were started under and discard their result if the cache has been
//! reset since.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use super::config::PagerConfig;
use super::errors::{FetchError, PagerError, PagerResult};
use super::events::{EventBus, PagerEvent};
use super::state::PagerState;
use super::PageNumber;
use crate::source::{PaginatedSource, RangeResponse};

pub(crate) type StateSender<R> = Arc<watch::Sender<PagerState<R>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Primary,
    Lookahead,
}

/// A fetched batch sliced into pages
#[derive(Debug)]
struct Batch<R> {
    first_page: PageNumber,
    pages: Vec<Arc<[R]>>,
    generation: u64,
}

impl<R> Batch<R> {
    /// Records of `page`; empty when the collection ended before it
    fn page(&self, page: PageNumber) -> Arc<[R]> {
        page.checked_sub(self.first_page)
            .and_then(|offset| self.pages.get(offset))
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }
}

type FlightOutcome<R> = Result<Arc<Batch<R>>, FetchError>;
type FlightFuture<R> = Shared<BoxFuture<'static, FlightOutcome<R>>>;

struct Flight<R> {
    id: u64,
    kind: FetchKind,
    future: FlightFuture<R>,
}

impl<R> Clone for Flight<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            kind: self.kind,
            future: self.future.clone(),
        }
    }
}

/// Outstanding batches, indexed by every page they cover
struct FlightRegistry<R> {
    next_id: u64,
    pages: HashMap<PageNumber, Flight<R>>,
}

impl<R> FlightRegistry<R> {
    fn new() -> Self {
        Self {
            next_id: 0,
            pages: HashMap::new(),
        }
    }

    fn release(&mut self, id: u64) {
        self.pages.retain(|_, flight| flight.id != id);
    }
}

/// Pages `first_page..end` and the record range that covers them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BatchRange {
    first_page: PageNumber,
    end: PageNumber,
    start: usize,
    count: usize,
}

impl BatchRange {
    /// `None` when any page or record index would not fit in a `usize`
    fn new(first_page: PageNumber, pages: usize, items_per_page: usize) -> Option<Self> {
        let end = first_page.checked_add(pages)?;
        let start = first_page
            .checked_sub(1)?
            .checked_mul(items_per_page)?
            .checked_add(1)?;
        let count = pages.checked_mul(items_per_page)?;
        start.checked_add(count)?;
        Some(Self {
            first_page,
            end,
            start,
            count,
        })
    }

    fn pages(&self) -> usize {
        self.end - self.first_page
    }
}

enum Plan<R> {
    Hit { records: Arc<[R]>, generation: u64 },
    Attach(Flight<R>),
    Issue(Flight<R>),
    OutOfRange(PagerError),
}

/// A page resolved by a primary load
#[derive(Debug, Clone)]
pub struct Resolved<R> {
    pub page: PageNumber,
    pub records: Arc<[R]>,
    pub from_cache: bool,
    pub generation: u64,
}

/// Decides what to fetch and when, and populates the page cache
pub struct PrefetchScheduler<R> {
    source: Arc<dyn PaginatedSource<R>>,
    state: StateSender<R>,
    events: Arc<EventBus>,
    flights: Arc<Mutex<FlightRegistry<R>>>,
    primary_pages: usize,
    lookahead_pages: usize,
}

impl<R> Clone for PrefetchScheduler<R> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            state: Arc::clone(&self.state),
            events: Arc::clone(&self.events),
            flights: Arc::clone(&self.flights),
            primary_pages: self.primary_pages,
            lookahead_pages: self.lookahead_pages,
        }
    }
}

impl<R> PrefetchScheduler<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        source: Arc<dyn PaginatedSource<R>>,
        state: StateSender<R>,
        events: Arc<EventBus>,
        config: &PagerConfig,
    ) -> Self {
        Self {
            source,
            state,
            events,
            flights: Arc::new(Mutex::new(FlightRegistry::new())),
            primary_pages: config.primary_batch_pages,
            lookahead_pages: config.lookahead_batch_pages,
        }
    }

    /// Current cache generation
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Resolve `page`, from the cache if possible.
    ///
    /// A hit schedules a look-ahead for the following page and returns
    /// without touching the network. A miss fetches a batch starting at
    /// `page`, or waits for an outstanding batch that already covers it.
    pub async fn load(&self, page: PageNumber) -> PagerResult<Resolved<R>> {
        let mut retried = false;

        loop {
            let flight = match self.plan_primary(page).await {
                Plan::Hit {
                    records,
                    generation,
                } => {
                    debug!("Cache hit for page {}", page);
                    self.events.emit(PagerEvent::CacheHit { page });
                    self.prefetch(page.saturating_add(1)).await;
                    return Ok(Resolved {
                        page,
                        records,
                        from_cache: true,
                        generation,
                    });
                }
                Plan::Attach(flight) => {
                    debug!("Page {} is already being fetched, waiting for it", page);
                    flight
                }
                Plan::Issue(flight) => flight,
                Plan::OutOfRange(e) => {
                    warn!("Refusing to load page {}: {}", page, e);
                    return Err(e);
                }
            };

            match flight.future.await {
                Ok(batch) => {
                    if batch.generation != self.generation() {
                        return Err(PagerError::Stale { page });
                    }
                    return Ok(Resolved {
                        page,
                        records: batch.page(page),
                        from_cache: false,
                        generation: batch.generation,
                    });
                }
                // A failed look-ahead is never surfaced; fetch the page ourselves
                Err(e) if flight.kind == FetchKind::Lookahead && !retried => {
                    debug!("Look-ahead covering page {} failed ({}), retrying as primary", page, e);
                    retried = true;
                }
                Err(source) => return Err(PagerError::Fetch { page, source }),
            }
        }
    }

    /// Warm the cache for `page` in the background.
    ///
    /// Returns whether a fetch was issued; nothing is fetched when the page is
    /// cached or already covered by an outstanding batch.
    pub async fn prefetch(&self, page: PageNumber) -> bool {
        let mut flights = self.flights.lock().await;
        let (generation, items_per_page, cached) = {
            let state = self.state.borrow();
            (state.generation, state.items_per_page, state.cache.contains(page))
        };

        if cached || flights.pages.contains_key(&page) {
            return false;
        }

        let Some(range) = BatchRange::new(page, self.lookahead_pages, items_per_page) else {
            debug!("Skipping look-ahead for page {}: record range overflows", page);
            return false;
        };

        self.start_flight(
            &mut flights,
            range,
            FetchKind::Lookahead,
            generation,
            items_per_page,
        );
        true
    }

    /// Reset the state under a new generation and forget outstanding flights.
    ///
    /// `update` runs inside the same state update as the reset. Flights that
    /// are still running complete in the background and are discarded.
    pub async fn invalidate<F>(&self, update: F) -> u64
    where
        F: FnOnce(&mut PagerState<R>),
    {
        let mut flights = self.flights.lock().await;
        let mut generation = 0;
        self.state.send_modify(|state| {
            state.reset();
            update(state);
            generation = state.generation;
        });

        let abandoned = flights.pages.len();
        flights.pages.clear();
        drop(flights);

        debug!(
            "Cache reset to generation {} ({} in-flight pages abandoned)",
            generation, abandoned
        );
        self.events.emit(PagerEvent::CacheReset { generation });
        generation
    }

    /// Wait until no batch of the current generation is outstanding
    pub async fn quiesce(&self) {
        loop {
            let pending: Vec<FlightFuture<R>> = {
                let flights = self.flights.lock().await;
                let mut unique = HashMap::new();
                for flight in flights.pages.values() {
                    unique
                        .entry(flight.id)
                        .or_insert_with(|| flight.future.clone());
                }
                unique.into_values().collect()
            };

            if pending.is_empty() {
                return;
            }
            join_all(pending).await;
        }
    }

    async fn plan_primary(&self, page: PageNumber) -> Plan<R> {
        let mut flights = self.flights.lock().await;
        let (generation, items_per_page, cached) = {
            let state = self.state.borrow();
            (state.generation, state.items_per_page, state.cache.get(page))
        };

        if let Some(records) = cached {
            return Plan::Hit {
                records,
                generation,
            };
        }

        if let Some(flight) = flights.pages.get(&page) {
            return Plan::Attach(flight.clone());
        }

        let Some(range) = BatchRange::new(page, self.primary_pages, items_per_page) else {
            // Either the page index or the page size pushes the range past usize
            let error = if self.primary_pages.checked_mul(items_per_page).is_none() {
                PagerError::InvalidItemsPerPage(items_per_page)
            } else {
                PagerError::InvalidPage(page)
            };
            return Plan::OutOfRange(error);
        };

        Plan::Issue(self.start_flight(
            &mut flights,
            range,
            FetchKind::Primary,
            generation,
            items_per_page,
        ))
    }

    /// Register and spawn a batch fetch. The caller holds the registry lock.
    fn start_flight(
        &self,
        flights: &mut FlightRegistry<R>,
        range: BatchRange,
        kind: FetchKind,
        generation: u64,
        items_per_page: usize,
    ) -> Flight<R> {
        let id = flights.next_id;
        flights.next_id += 1;

        let this = self.clone();
        let future = async move {
            this.run_flight(id, kind, range, items_per_page, generation)
                .await
        }
        .boxed()
        .shared();

        let flight = Flight { id, kind, future };
        for page in range.first_page..range.end {
            flights.pages.entry(page).or_insert_with(|| flight.clone());
        }

        if kind == FetchKind::Lookahead {
            self.state.send_modify(|state| state.prefetches += 1);
        }

        tokio::spawn(flight.future.clone());
        self.events.emit(PagerEvent::FetchStarted {
            first_page: range.first_page,
            pages: range.pages(),
            lookahead: kind == FetchKind::Lookahead,
        });
        flight
    }

    async fn run_flight(
        self,
        id: u64,
        kind: FetchKind,
        range: BatchRange,
        items_per_page: usize,
        generation: u64,
    ) -> FlightOutcome<R> {
        let BatchRange {
            first_page,
            start,
            count,
            ..
        } = range;
        let pages = range.pages();
        debug!(
            "Fetching pages {}..{} (records {}+{}) for generation {}",
            first_page,
            range.end,
            start,
            count,
            generation
        );

        let outcome = match self.source.fetch_range(start, count).await {
            Ok(response) => Ok(Arc::new(self.commit(
                kind,
                first_page,
                pages,
                items_per_page,
                generation,
                response,
            ))),
            Err(e) => {
                let error = FetchError::new(start, count, &e);
                match kind {
                    FetchKind::Primary => warn!("Fetch for page {} failed: {}", first_page, e),
                    FetchKind::Lookahead => {
                        warn!("Look-ahead for page {} failed: {}", first_page, e);
                        self.events.emit(PagerEvent::PrefetchFailed {
                            first_page,
                            error: e.to_string(),
                        });
                    }
                }
                Err(error)
            }
        };

        if kind == FetchKind::Lookahead {
            self.state
                .send_modify(|state| state.prefetches = state.prefetches.saturating_sub(1));
        }

        // Deregister only after the cache write so a new request sees either
        // the cached pages or this flight
        self.flights.lock().await.release(id);
        outcome
    }

    /// Slice a response into pages and store the non-empty ones
    fn commit(
        &self,
        kind: FetchKind,
        first_page: PageNumber,
        pages: usize,
        items_per_page: usize,
        generation: u64,
        response: RangeResponse<R>,
    ) -> Batch<R> {
        let RangeResponse {
            records,
            total_elements,
        } = response;
        let chunks = slice_pages(&records, items_per_page, pages);

        let mut stored = 0;
        let applied = self.state.send_if_modified(|state| {
            if state.generation != generation {
                return false;
            }
            for (offset, chunk) in chunks.iter().enumerate() {
                if state.cache.set(first_page + offset, Arc::clone(chunk)) {
                    stored += 1;
                }
            }
            state.total_elements = total_elements;
            true
        });

        if !applied {
            debug!(
                "Discarding pages from {} fetched for stale generation {}",
                first_page, generation
            );
            self.events.emit(PagerEvent::StaleDiscarded {
                first_page,
                generation,
            });
        } else {
            debug!(
                "Stored {} page(s) from {} ({} records, {} total)",
                stored,
                first_page,
                records.len(),
                total_elements
            );
            if kind == FetchKind::Lookahead {
                self.events.emit(PagerEvent::PrefetchCompleted {
                    first_page,
                    stored_pages: stored,
                });
            }
        }

        Batch {
            first_page,
            pages: chunks,
            generation,
        }
    }
}

/// Split `records` into at most `pages` consecutive chunks of `items_per_page`
fn slice_pages<R: Clone>(records: &[R], items_per_page: usize, pages: usize) -> Vec<Arc<[R]>> {
    records
        .chunks(items_per_page)
        .take(pages)
        .map(Arc::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paging::testing::MockSource;

    fn scheduler(source: &Arc<MockSource>, items_per_page: usize) -> PrefetchScheduler<u32> {
        let (state, _) = watch::channel(PagerState::new(items_per_page));
        PrefetchScheduler::new(
            Arc::clone(source) as Arc<dyn PaginatedSource<u32>>,
            Arc::new(state),
            Arc::new(EventBus::default()),
            &PagerConfig::default(),
        )
    }

    fn cached_lengths(scheduler: &PrefetchScheduler<u32>) -> Vec<(PageNumber, usize)> {
        let state = scheduler.state.borrow();
        state
            .cache
            .keys()
            .into_iter()
            .map(|page| (page, state.cache.get(page).map_or(0, |p| p.len())))
            .collect()
    }

    #[test]
    fn test_slice_pages() {
        let records: Vec<u32> = (1..=25).collect();
        let chunks = slice_pages(&records, 10, 3);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].as_ref(), &[21, 22, 23, 24, 25]);
        assert!(slice_pages::<u32>(&[], 10, 3).is_empty());
        assert_eq!(slice_pages(&records, 5, 2).len(), 2);
    }

    #[tokio::test]
    async fn test_batch_slicing() {
        let source = Arc::new(MockSource::with_records(25));
        let scheduler = scheduler(&source, 10);

        let resolved = scheduler.load(1).await.unwrap();

        assert_eq!(resolved.records.len(), 10);
        assert!(!resolved.from_cache);
        assert_eq!(source.calls(), vec![(1, 30)]);
        assert_eq!(cached_lengths(&scheduler), vec![(1, 10), (2, 10), (3, 5)]);
        assert_eq!(scheduler.state.borrow().total_elements, 25);
    }

    #[tokio::test]
    async fn test_empty_chunks_are_omitted() {
        let source = Arc::new(MockSource::with_records(10));
        let scheduler = scheduler(&source, 10);

        scheduler.load(1).await.unwrap();

        assert_eq!(cached_lengths(&scheduler), vec![(1, 10)]);
        assert!(!scheduler.state.borrow().cache.contains(2));
    }

    #[tokio::test]
    async fn test_page_past_end_resolves_empty() {
        let source = Arc::new(MockSource::with_records(25));
        let scheduler = scheduler(&source, 10);

        let resolved = scheduler.load(5).await.unwrap();

        assert!(resolved.records.is_empty());
        assert_eq!(source.calls(), vec![(41, 30)]);
        assert!(scheduler.state.borrow().cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_does_not_fetch_page() {
        let source = Arc::new(MockSource::with_records(30));
        let scheduler = scheduler(&source, 10);
        scheduler.load(1).await.unwrap();

        let resolved = scheduler.load(2).await.unwrap();

        assert!(resolved.from_cache);
        assert_eq!(resolved.records.first(), Some(&11));
        // Page 3 is cached too, so no look-ahead either
        assert_eq!(source.calls(), vec![(1, 30)]);
    }

    #[tokio::test]
    async fn test_hit_schedules_lookahead_for_next_page() {
        let source = Arc::new(MockSource::with_records(100));
        let scheduler = scheduler(&source, 10);
        scheduler.load(1).await.unwrap();

        scheduler.load(3).await.unwrap();
        scheduler.quiesce().await;

        assert_eq!(source.calls(), vec![(1, 30), (31, 20)]);
        assert_eq!(scheduler.state.borrow().cache.keys(), vec![1, 2, 3, 4, 5]);
        assert!(!scheduler.state.borrow().is_prefetching());
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_untouched() {
        let source = Arc::new(MockSource::with_records(100));
        let scheduler = scheduler(&source, 10);
        scheduler.load(1).await.unwrap();

        source.set_fail_fetch(true);
        let result = scheduler.load(7).await;

        assert!(matches!(result, Err(PagerError::Fetch { page: 7, .. })));
        assert_eq!(scheduler.state.borrow().cache.keys(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let source = Arc::new(MockSource::gated(100));
        let scheduler = scheduler(&source, 10);

        let (a, b, _) = tokio::join!(scheduler.load(4), scheduler.load(4), async {
            source.wait_for_calls(1).await;
            source.release(1);
        });

        assert_eq!(a.unwrap().records.as_ref(), b.unwrap().records.as_ref());
        assert_eq!(source.calls(), vec![(31, 30)]);
    }

    #[tokio::test]
    async fn test_load_attaches_to_covering_batch() {
        let source = Arc::new(MockSource::gated(100));
        let scheduler = scheduler(&source, 10);

        // Page 3 is the last page of the batch issued for page 1
        let (first, third, _) = tokio::join!(scheduler.load(1), scheduler.load(3), async {
            source.wait_for_calls(1).await;
            source.release(1);
        });

        assert_eq!(first.unwrap().records.first(), Some(&1));
        assert_eq!(third.unwrap().records.first(), Some(&21));
        assert_eq!(source.calls(), vec![(1, 30)]);
    }

    #[tokio::test]
    async fn test_prefetch_skips_cached_and_in_flight_pages() {
        let source = Arc::new(MockSource::gated(100));
        let scheduler = scheduler(&source, 10);

        assert!(scheduler.prefetch(4).await);
        assert!(!scheduler.prefetch(4).await);
        assert!(!scheduler.prefetch(5).await);
        assert!(scheduler.state.borrow().is_prefetching());

        source.release(1);
        scheduler.quiesce().await;

        assert!(!scheduler.prefetch(4).await);
        assert_eq!(source.calls(), vec![(31, 20)]);
        assert!(!scheduler.state.borrow().is_prefetching());
    }

    #[tokio::test]
    async fn test_primary_retries_after_failed_lookahead() {
        let source = Arc::new(MockSource::gated(100));
        let scheduler = scheduler(&source, 10);
        source.set_fail_fetch(true);

        scheduler.prefetch(4).await;
        let (resolved, _) = tokio::join!(scheduler.load(4), async {
            source.wait_for_calls(1).await;
            source.release(1);
            source.wait_for_calls(2).await;
            source.set_fail_fetch(false);
            source.release(1);
        });

        assert_eq!(resolved.unwrap().records.first(), Some(&31));
        assert_eq!(source.calls(), vec![(31, 20), (31, 30)]);
    }

    #[tokio::test]
    async fn test_stale_batch_is_discarded() {
        let source = Arc::new(MockSource::gated(100));
        let scheduler = scheduler(&source, 10);

        let (result, _) = tokio::join!(scheduler.load(2), async {
            source.wait_for_calls(1).await;
            scheduler.invalidate(|state| state.items_per_page = 25).await;
            source.release(1);
        });

        assert!(matches!(result, Err(PagerError::Stale { page: 2 })));
        let state = scheduler.state.borrow();
        assert!(state.cache.is_empty());
        assert_eq!(state.generation, 1);
        assert_eq!(state.total_elements, 0);
    }

    #[tokio::test]
    async fn test_stale_lookahead_is_discarded() {
        let source = Arc::new(MockSource::gated(100));
        let scheduler = scheduler(&source, 10);
        let discarded = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&discarded);
        scheduler.events.subscribe(move |event| {
            if let PagerEvent::StaleDiscarded { .. } = event {
                seen.lock().unwrap().push(event.clone());
            }
        });

        assert!(scheduler.prefetch(4).await);
        source.wait_for_calls(1).await;
        scheduler.invalidate(|state| state.items_per_page = 25).await;
        assert!(scheduler.state.borrow().is_prefetching());

        let mut updates = scheduler.state.subscribe();
        source.release(1);
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            updates.wait_for(|state| !state.is_prefetching()),
        )
        .await
        .expect("look-ahead never finished")
        .unwrap();

        let state = scheduler.state.borrow();
        assert!(state.cache.is_empty());
        assert_eq!(state.generation, 1);
        assert_eq!(state.items_per_page, 25);
        assert_eq!(
            *discarded.lock().unwrap(),
            vec![PagerEvent::StaleDiscarded {
                first_page: 4,
                generation: 0
            }]
        );
    }

    #[test]
    fn test_batch_range_overflow() {
        let range = BatchRange::new(4, 2, 10).unwrap();
        assert_eq!((range.start, range.count, range.pages()), (31, 20, 2));

        assert!(BatchRange::new(usize::MAX, 3, 1).is_none());
        assert!(BatchRange::new(usize::MAX / 2, 3, 10).is_none());
        assert!(BatchRange::new(1, 3, usize::MAX / 2).is_none());
    }

    #[tokio::test]
    async fn test_unaddressable_pages_are_not_fetched() {
        let source = Arc::new(MockSource::with_records(100));
        let scheduler = scheduler(&source, 10);

        assert!(!scheduler.prefetch(usize::MAX).await);
        assert!(matches!(
            scheduler.load(usize::MAX).await,
            Err(PagerError::InvalidPage(usize::MAX))
        ));
        assert!(source.calls().is_empty());
        assert!(!scheduler.state.borrow().is_prefetching());

        // Nothing stuck in the registry
        scheduler.quiesce().await;
        let resolved = scheduler.load(1).await.unwrap();
        assert_eq!(resolved.records.len(), 10);
    }

    #[tokio::test]
    async fn test_oversized_page_reported_as_items_per_page() {
        let source = Arc::new(MockSource::with_records(100));
        let scheduler = scheduler(&source, usize::MAX / 2);

        assert!(matches!(
            scheduler.load(1).await,
            Err(PagerError::InvalidItemsPerPage(_))
        ));
        assert!(source.calls().is_empty());
    }
}
