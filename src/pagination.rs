//! This modules defines the common functionality for paging data.

use serde::{Deserialize, Serialize};

/// The config for pagination
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// The page number to default to when not specified in a request.
    pub default_page: u64,
    /// The number of items per page when not specified in a request.
    pub default_page_size: u64,
    /// The largest page size a client may request.
    pub max_page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page: 1,
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

/// The page requested by a client via the query string.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// A resolved page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    /// Apply the defaults and limits in `config` to a client request.
    ///
    /// Page numbers start at 1 and page sizes are clamped to `1..=max_page_size`.
    /// The page is capped so that [PageRequest::offset] fits in an SQLite integer.
    pub fn new(query: &PageQuery, config: &PaginationConfig) -> Self {
        let page_size = query
            .page_size
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size.max(1));
        let max_page = i64::MAX as u64 / page_size;
        let page = query.page.unwrap_or(config.default_page).clamp(1, max_page);

        Self { page, page_size }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

/// One page of results along with the information needed to fetch the others.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// The total number of items across all pages.
    pub count: u64,
    pub page: u64,
    pub page_size: u64,
    pub page_count: u64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: u64, request: PageRequest) -> Self {
        Self {
            count,
            page: request.page,
            page_size: request.page_size,
            page_count: count.div_ceil(request.page_size),
            results,
        }
    }
}
