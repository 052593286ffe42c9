use serde::Serialize;

/// A window of results plus the size of the full result set.
///
/// `page_index` is 0-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page_index: u64,
    pub page_size: u64,
}

impl<T> Page<T> {
    /// Build a page; `total_count` is raised to at least `items.len()`.
    pub fn new(items: Vec<T>, total_count: u64, page_index: u64, page_size: u64) -> Self {
        Self {
            total_count: total_count.max(items.len() as u64),
            items,
            page_index,
            page_size,
        }
    }

    /// Number of pages needed for `total_count` items, 0 when the page size is 0.
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            0
        } else {
            self.total_count.div_ceil(self.page_size)
        }
    }

    pub fn has_next(&self) -> bool {
        self.page_index + 1 < self.total_pages()
    }

    /// Map the items, keeping the paging information.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page_index: self.page_index,
            page_size: self.page_size,
        }
    }
}
