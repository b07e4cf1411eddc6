//! Page/limit handling for list queries.
//!
//! Page and limit arrive as raw query-string values and are parsed
//! best-effort: anything that is not a positive integer falls back to the
//! defaults instead of failing the request.

use serde::{Deserialize, Serialize};

/// Default number of items per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Maximum allowed items per page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Page number (1-indexed).
    pub page: u32,
    /// Items per page.
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Clamps page to at least 1 and limit to `[1, MAX_PAGE_SIZE]`.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Creates a Pagination from raw query values with the default limit.
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        Self::from_query_with_default(page, limit, DEFAULT_PAGE_SIZE)
    }

    /// Like [`Pagination::from_query`] with an endpoint-specific default limit.
    pub fn from_query_with_default(
        page: Option<&str>,
        limit: Option<&str>,
        default_limit: u32,
    ) -> Self {
        let page = parse_positive(page).unwrap_or(1);
        let limit = parse_positive(limit).unwrap_or(default_limit);
        Self::new(page, limit)
    }

    /// Rows to skip: `(page - 1) * limit`.
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Rows to take.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// `ceil(total / limit)`; zero when there are no items.
    pub fn total_pages(&self, total_items: u64) -> u32 {
        let limit = u64::from(self.limit.max(1));
        total_items.div_ceil(limit) as u32
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|value| *value >= 1)
}

/// Pagination block returned alongside list payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u32,
}

/// One page of rows plus the count of every row the query matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u32,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            pages: pagination.total_pages(total),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The `{page, limit, total, pages}` block for the response envelope.
    pub fn page_info(&self) -> PageInfo {
        PageInfo {
            page: self.page,
            limit: self.limit,
            total: self.total,
            pages: self.pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_default() {
        let p = Pagination::default();
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_pagination_offset() {
        let p = Pagination::new(3, 25);
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn test_non_numeric_query_falls_back_to_defaults() {
        let p = Pagination::from_query(Some("abc"), Some("ten"));
        assert_eq!(p, Pagination::new(1, 10));

        let p = Pagination::from_query(Some("0"), Some("-5"));
        assert_eq!(p, Pagination::new(1, 10));

        let p = Pagination::from_query(Some(" 4 "), Some("500"));
        assert_eq!(p.page, 4);
        assert_eq!(p.limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_endpoint_default_limit() {
        let p = Pagination::from_query_with_default(None, None, 20);
        assert_eq!(p.limit, 20);
    }

    #[test]
    fn test_total_pages_is_ceiling() {
        let p = Pagination::new(1, 10);
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(1), 1);
        assert_eq!(p.total_pages(10), 1);
        assert_eq!(p.total_pages(11), 2);
        assert_eq!(p.total_pages(101), 11);
    }

    #[test]
    fn test_page_beyond_last_keeps_total() {
        let p = Pagination::new(9, 10);
        let result: PaginatedResult<i32> = PaginatedResult::new(vec![], 15, &p);
        assert!(result.is_empty());
        assert_eq!(result.total, 15);
        assert_eq!(result.pages, 2);
        assert_eq!(
            result.page_info(),
            PageInfo {
                page: 9,
                limit: 10,
                total: 15,
                pages: 2
            }
        );
    }
}
