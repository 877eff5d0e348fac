//! Pagination types.

use serde::{Deserialize, Serialize};

/// One page of results.
///
/// # Fields
///
/// * `items` - The items of this page.
/// * `count` - Total number of items matching the query, across all pages.
/// * `next_page` - Number of the following page, if there is one.
/// * `previous_page` - Number of the preceding page, if there is one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: usize,
    pub next_page: Option<usize>,
    pub previous_page: Option<usize>,
}

impl<T> Page<T> {
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for [`Page`].
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: usize,
    next_page: Option<usize>,
    previous_page: Option<usize>,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_next_page(mut self, next_page: Option<usize>) -> Self {
        self.next_page = next_page;
        self
    }

    pub fn with_previous_page(mut self, previous_page: Option<usize>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// One-based page number and page size.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    pub page: usize,
    pub per_page: usize,
}

impl PaginationParams {
    /// Page numbers below 1 are treated as 1, page sizes below 1 as 1.
    pub fn new(page: usize, per_page: usize) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Number of items preceding this page, saturating at `usize::MAX`.
    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1).saturating_mul(self.per_page)
    }

    /// Wraps the items of this page, given the total number of matching items.
    pub fn page_of<T>(&self, items: Vec<T>, count: usize) -> Page<T> {
        let end = self.offset().saturating_add(items.len());

        Page::builder(items)
            .with_count(count)
            .with_next_page((end < count).then(|| self.page.saturating_add(1)))
            .with_previous_page((self.page > 1).then(|| self.page - 1))
            .build()
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_page_links_both_ways() {
        let params = PaginationParams::new(2, 3);
        let page = params.page_of(vec![4, 5, 6], 10);

        assert_eq!(params.offset(), 3);
        assert_eq!(page.count, 10);
        assert_eq!(page.next_page, Some(3));
        assert_eq!(page.previous_page, Some(1));
    }

    #[test]
    fn last_page_has_no_next() {
        let page = PaginationParams::new(4, 3).page_of(vec![10], 10);

        assert_eq!(page.next_page, None);
        assert_eq!(page.previous_page, Some(3));
    }

    #[test]
    fn page_zero_is_the_first_page() {
        let params = PaginationParams::new(0, 5);

        assert_eq!(params.page, 1);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let params = PaginationParams { page: usize::MAX, per_page: 2 };

        assert_eq!(params.offset(), usize::MAX);
        let page = params.page_of(vec![1], 5);
        assert_eq!(page.next_page, None);
        assert_eq!(page.previous_page, Some(usize::MAX - 1));
    }
}
