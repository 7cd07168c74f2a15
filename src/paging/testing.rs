//! Scripted [`PaginatedSource`] for pager tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::source::{PaginatedSource, RangeResponse, SourceError, SourceResult};

/// Records every fetch and can hold fetches until released or make them fail
pub(crate) struct MockSource {
    records: Mutex<Vec<u32>>,
    resync: Vec<u32>,
    calls: Mutex<Vec<(usize, usize)>>,
    gate: Option<Semaphore>,
    fail_fetch: AtomicBool,
    fail_execute: AtomicBool,
    fail_clear: AtomicBool,
    executes: AtomicUsize,
}

impl MockSource {
    /// Collection of records `1..=count`; `execute` restores the same records
    pub fn with_records(count: u32) -> Self {
        let records: Vec<u32> = (1..=count).collect();
        Self {
            records: Mutex::new(records.clone()),
            resync: records,
            calls: Mutex::new(Vec::new()),
            gate: None,
            fail_fetch: AtomicBool::new(false),
            fail_execute: AtomicBool::new(false),
            fail_clear: AtomicBool::new(false),
            executes: AtomicUsize::new(0),
        }
    }

    /// Like [`MockSource::with_records`], but each fetch waits for [`MockSource::release`]
    pub fn gated(count: u32) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::with_records(count)
        }
    }

    /// Collection that `execute` replaces with `resync`
    pub fn with_resync(mut self, resync: Vec<u32>) -> Self {
        self.resync = resync;
        self
    }

    /// Let `fetches` held fetches proceed
    pub fn release(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_execute(&self, fail: bool) {
        self.fail_execute.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::SeqCst);
    }

    /// Yield until at least `count` fetches have been issued
    pub async fn wait_for_calls(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls.lock().unwrap().len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("timed out waiting for fetches");
    }
}

#[async_trait]
impl PaginatedSource<u32> for MockSource {
    async fn fetch_range(&self, start: usize, count: usize) -> SourceResult<RangeResponse<u32>> {
        self.calls.lock().unwrap().push((start, count));

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| SourceError::Unavailable(e.to_string()))?
                .forget();
        }

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("scripted fetch failure".to_string()));
        }

        let records = self.records.lock().unwrap();
        let page = records.iter().skip(start - 1).take(count).copied().collect();
        Ok(RangeResponse::new(page, records.len()))
    }

    async fn execute(&self) -> SourceResult<()> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        if self.fail_execute.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("scripted execute failure".to_string()));
        }
        *self.records.lock().unwrap() = self.resync.clone();
        Ok(())
    }

    async fn clear(&self) -> SourceResult<()> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("scripted clear failure".to_string()));
        }
        self.records.lock().unwrap().clear();
        Ok(())
    }
}
