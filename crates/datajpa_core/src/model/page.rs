//! Page and slice containers for windowed queries.
//!
//! # Invariants
//! - Page numbers are 0-based.
//! - A `PageRequest` never has a size below 1.
//! - A `Page` knows the exact total; a `Slice` only knows whether more rows
//!   follow.

use crate::query::Order;
use serde::Serialize;

/// Window + ordering for a paged query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    size: u64,
    sort: Vec<Order>,
}

impl PageRequest {
    /// Creates an unsorted request. A zero `size` is raised to 1.
    pub fn of(page: u64, size: u64) -> Self {
        Self {
            page,
            size: size.max(1),
            sort: Vec::new(),
        }
    }

    pub fn with_sort(mut self, order: Order) -> Self {
        self.sort.push(order);
        self
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn sort(&self) -> &[Order] {
        &self.sort
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self.clone()
        }
    }
}

/// One window of results plus the exact total across all windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    content: Vec<T>,
    number: u64,
    size: u64,
    total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            number: request.page(),
            size: request.size(),
            total_elements,
        }
    }

    /// Builds a page, running `count` only when the content cannot tell the
    /// total by itself.
    ///
    /// The total is implied when the first page is not full, or when any
    /// non-empty page is not full (it must then be the last one).
    pub fn from_content<E, F>(content: Vec<T>, request: &PageRequest, count: F) -> Result<Self, E>
    where
        F: FnOnce() -> Result<u64, E>,
    {
        let fetched = content.len() as u64;
        let total = if request.offset() == 0 && fetched < request.size() {
            fetched
        } else if fetched != 0 && fetched < request.size() {
            request.offset() + fetched
        } else {
            count()?
        };
        Ok(Self::new(content, request, total))
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        self.total_elements.div_ceil(self.size)
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    pub fn has_next(&self) -> bool {
        self.number.saturating_add(1) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    /// Converts the content while keeping the paging metadata.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
        }
    }
}

/// One window of results that only knows whether another window follows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice<T> {
    content: Vec<T>,
    number: u64,
    size: u64,
    has_next: bool,
}

impl<T> Slice<T> {
    /// Builds a slice from a `size + 1` lookahead fetch; the extra row only
    /// sets `has_next` and is dropped.
    pub fn from_lookahead(mut content: Vec<T>, request: &PageRequest) -> Self {
        let size = usize::try_from(request.size()).unwrap_or(usize::MAX);
        let has_next = content.len() > size;
        content.truncate(size);
        Self {
            content,
            number: request.page(),
            size: request.size(),
            has_next,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    pub fn map<U, F>(self, f: F) -> Slice<U>
    where
        F: FnMut(T) -> U,
    {
        Slice {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            has_next: self.has_next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Page, PageRequest, Slice};
    use std::convert::Infallible;

    #[test]
    fn zero_size_is_raised_to_one() {
        let request = PageRequest::of(2, 0);
        assert_eq!(request.size(), 1);
        assert_eq!(request.offset(), 2);
    }

    #[test]
    fn last_addressable_page_does_not_overflow() {
        let request = PageRequest::of(u64::MAX, 3);
        assert_eq!(request.next().page(), u64::MAX);
        assert_eq!(request.offset(), u64::MAX);

        let page = Page::new(vec![1], &request, 5);
        assert!(!page.has_next());
        assert!(page.is_last());
        assert!(page.has_previous());
    }

    #[test]
    fn first_of_two_pages() {
        let page = Page::new(vec![1, 2, 3], &PageRequest::of(0, 3), 5);
        assert_eq!(page.total_pages(), 2);
        assert!(page.is_first());
        assert!(page.has_next());
        assert!(!page.has_previous());
        assert!(!page.is_last());
    }

    #[test]
    fn last_page_has_no_next() {
        let page = Page::new(vec![4, 5], &PageRequest::of(1, 3), 5);
        assert!(page.is_last());
        assert!(page.has_previous());
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let page: Page<i32> = Page::new(Vec::new(), &PageRequest::of(0, 3), 0);
        assert_eq!(page.total_pages(), 0);
        assert!(!page.has_next());
    }

    #[test]
    fn short_first_page_skips_count() {
        let page = Page::from_content(vec![1, 2], &PageRequest::of(0, 3), || -> Result<u64, Infallible> {
            panic!("count must not run")
        })
        .unwrap();
        assert_eq!(page.total_elements(), 2);
    }

    #[test]
    fn short_later_page_derives_total_from_offset() {
        let page = Page::from_content(vec![7], &PageRequest::of(2, 3), || -> Result<u64, Infallible> {
            panic!("count must not run")
        })
        .unwrap();
        assert_eq!(page.total_elements(), 7);
    }

    #[test]
    fn full_page_runs_count() {
        let page =
            Page::from_content(vec![1, 2, 3], &PageRequest::of(0, 3), || Ok::<_, Infallible>(5))
                .unwrap();
        assert_eq!(page.total_elements(), 5);
    }

    #[test]
    fn map_keeps_metadata() {
        let page = Page::new(vec![1, 2, 3], &PageRequest::of(0, 3), 5).map(|n| n * 10);
        assert_eq!(page.content(), &[10, 20, 30]);
        assert_eq!(page.total_elements(), 5);
    }

    #[test]
    fn slice_uses_lookahead_row_for_has_next() {
        let slice = Slice::from_lookahead(vec![1, 2, 3, 4], &PageRequest::of(0, 3));
        assert_eq!(slice.content(), &[1, 2, 3]);
        assert!(slice.has_next());

        let tail = Slice::from_lookahead(vec![4, 5], &PageRequest::of(1, 3));
        assert!(!tail.has_next());
        assert!(tail.is_last());
    }
}
