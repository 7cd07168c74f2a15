//! Sparse page-number to records mapping.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::PageNumber;

/// Cache of fetched pages.
///
/// A page is present only if it was fetched and its slice was non-empty, so a
/// missing entry always means "not yet known" and never "known to be empty".
#[derive(Debug, Clone)]
pub struct PageCache<R> {
    pages: BTreeMap<PageNumber, Arc<[R]>>,
}

impl<R> PageCache<R> {
    pub fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
        }
    }

    /// Records cached for `page`
    pub fn get(&self, page: PageNumber) -> Option<Arc<[R]>> {
        self.pages.get(&page).cloned()
    }

    pub fn contains(&self, page: PageNumber) -> bool {
        self.pages.contains_key(&page)
    }

    /// Store `data` for `page`. Empty slices are ignored.
    ///
    /// Returns whether anything was stored.
    pub fn set(&mut self, page: PageNumber, data: impl Into<Arc<[R]>>) -> bool {
        let data = data.into();
        if data.is_empty() {
            return false;
        }
        self.pages.insert(page, data);
        true
    }

    /// Cached page numbers in ascending order
    pub fn keys(&self) -> Vec<PageNumber> {
        self.pages.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

impl<R> Default for PageCache<R> {
    fn default() -> Self {
        Self::new()
    }
}
