//! Pagination arithmetic for list endpoints.
//!
//! Everything here is pure integer arithmetic over `(total, page, limit)`.
//! Query extraction is lenient (malformed input falls back to defaults);
//! [`PaginationConfig::validate`] is the strict variant for call sites that
//! want out-of-range values rejected instead of clamped.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

/// Page size bounds, resolved once at startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// Raw, unparsed pagination query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawPageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl RawPageQuery {
    pub fn new(page: impl Into<String>, limit: impl Into<String>) -> Self {
        Self {
            page: Some(page.into()),
            limit: Some(limit.into()),
        }
    }
}

/// Resolved page window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
    pub skip: u64,
}

impl PageRequest {
    fn new(page: u64, limit: u64) -> Self {
        Self {
            page,
            limit,
            skip: (page - 1).saturating_mul(limit),
        }
    }

    /// Take this page's window out of an already-materialized collection.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let take = usize::try_from(self.limit).unwrap_or(usize::MAX);
        items.iter().skip(start).take(take).cloned().collect()
    }
}

/// One page of results plus the size of the full collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T: Clone> Page<T> {
    /// Paginate an in-memory collection.
    pub fn from_slice(all: &[T], request: &PageRequest) -> Self {
        Self {
            items: request.slice(all),
            total: all.len() as u64,
        }
    }
}

/// Derived pagination metadata returned with every list response.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
    pub start_index: u64,
    /// Exclusive end of the window, clamped to `total`.
    pub end_index: u64,
}

/// Navigation links for a paginated collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    pub first: String,
    pub last: String,
    #[serde(rename = "self")]
    pub current: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl PaginationConfig {
    pub fn new(default_limit: u64, max_limit: u64) -> Result<Self, ConfigurationError> {
        if max_limit == 0 {
            return Err(ConfigurationError::invalid(
                "pagination.max_limit",
                "must be at least 1",
            ));
        }
        if default_limit == 0 || default_limit > max_limit {
            return Err(ConfigurationError::invalid(
                "pagination.default_limit",
                format!("must be between 1 and {max_limit}"),
            ));
        }
        Ok(Self {
            default_limit,
            max_limit,
        })
    }

    /// Lenient extraction: unparsable or zero values fall back to defaults,
    /// negatives clamp to 1, oversized limits clamp to `max_limit`.
    pub fn extract(&self, raw: &RawPageQuery) -> PageRequest {
        let page = parse_or(raw.page.as_deref(), DEFAULT_PAGE);
        let limit = parse_or(raw.limit.as_deref(), self.default_limit).min(self.max_limit);
        PageRequest::new(page, limit)
    }

    /// Strict variant of [`extract`](Self::extract).
    pub fn validate(&self, page: i64, limit: i64) -> Result<PageRequest, ConfigurationError> {
        if page < 1 {
            return Err(ConfigurationError::InvalidPagination(format!(
                "page must be at least 1, got {page}"
            )));
        }
        if limit < 1 {
            return Err(ConfigurationError::InvalidPagination(format!(
                "limit must be at least 1, got {limit}"
            )));
        }
        if limit as u64 > self.max_limit {
            return Err(ConfigurationError::InvalidPagination(format!(
                "limit must not exceed {}, got {limit}",
                self.max_limit
            )));
        }
        Ok(PageRequest::new(page as u64, limit as u64))
    }
}

// Zero counts as "not provided"; negatives clamp to 1.
fn parse_or(raw: Option<&str>, default: u64) -> u64 {
    match raw.map(str::trim).and_then(|s| s.parse::<i64>().ok()) {
        Some(0) | None => default,
        Some(v) => u64::try_from(v).unwrap_or(1),
    }
}

/// Compute pagination metadata. A `limit` of 0 is treated as 1.
pub fn compute_meta(total: u64, page: u64, limit: u64) -> PaginationMeta {
    let limit = limit.max(1);
    let page = page.max(1);
    let total_pages = total.div_ceil(limit);
    let start_index = (page - 1).saturating_mul(limit);
    let end_index = start_index.saturating_add(limit).min(total);

    PaginationMeta {
        total,
        page,
        limit,
        total_pages,
        has_next: page < total_pages,
        has_prev: page > 1,
        start_index,
        end_index,
    }
}

/// Build navigation links. `prev` is omitted on the first page and `next`
/// on the last one.
pub fn build_links(base_url: &str, page: u64, total_pages: u64, limit: u64) -> PageLinks {
    let last_page = total_pages.max(1);
    let separator = if base_url.contains('?') { '&' } else { '?' };
    let link = |p: u64| format!("{base_url}{separator}page={p}&limit={limit}");

    PageLinks {
        first: link(1),
        last: link(last_page),
        current: link(page),
        prev: (page > 1).then(|| link(page - 1)),
        next: (page < total_pages).then(|| link(page + 1)),
    }
}
