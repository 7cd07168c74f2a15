//! In-memory collection used for local browsing and tests.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{check_range, PaginatedSource, RangeResponse, SourceResult};

/// A collection held in memory.
///
/// `execute` re-imports the seed records the source was built with and
/// `clear` truncates the live collection, so the two operations behave like
/// their remote counterparts.
#[derive(Debug)]
pub struct MemorySource<R> {
    seed: Vec<R>,
    records: RwLock<Vec<R>>,
}

impl<R: Clone> MemorySource<R> {
    /// Create a source whose live collection starts out as `records`
    pub fn new(records: Vec<R>) -> Self {
        Self {
            records: RwLock::new(records.clone()),
            seed: records,
        }
    }

    /// Create a source that starts empty and imports `seed` on `execute`
    pub fn unsynced(seed: Vec<R>) -> Self {
        Self {
            seed,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Number of records currently in the live collection
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl MemorySource<serde_json::Value> {
    /// Generate `count` user-like records with ids starting at 1
    pub fn generated(count: usize) -> Self {
        let records = (1..=count)
            .map(|id| {
                serde_json::json!({
                    "id": id,
                    "name": format!("User {}", id),
                    "email": format!("user{}@example.com", id),
                })
            })
            .collect();
        Self::new(records)
    }
}

#[async_trait]
impl<R> PaginatedSource<R> for MemorySource<R>
where
    R: Clone + Send + Sync,
{
    async fn fetch_range(&self, start: usize, count: usize) -> SourceResult<RangeResponse<R>> {
        check_range(start, count)?;

        let records = self.records.read().await;
        let page: Vec<R> = records.iter().skip(start - 1).take(count).cloned().collect();
        debug!("Serving {} of {} records from index {}", page.len(), records.len(), start);

        Ok(RangeResponse::new(page, records.len()))
    }

    async fn execute(&self) -> SourceResult<()> {
        let mut records = self.records.write().await;
        *records = self.seed.clone();
        debug!("Re-imported {} records", records.len());
        Ok(())
    }

    async fn clear(&self) -> SourceResult<()> {
        self.records.write().await.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory collection".to_string()
    }
}
