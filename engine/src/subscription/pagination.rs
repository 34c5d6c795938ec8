//! Cursor pagination over subscription listings.
//!
//! Listings are ordered newest first by uid (UUIDv7, time ordered). A
//! cursor is the uid at the edge of the previous page.

use serde::{Deserialize, Serialize};

/// Which way to move from the cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageDirection {
    #[default]
    Next,
    Prev,
}

/// Page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pageable {
    pub per_page: usize,
    #[serde(default)]
    pub direction: PageDirection,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl Pageable {
    pub fn first(per_page: usize) -> Self {
        Self {
            per_page,
            direction: PageDirection::Next,
            cursor: None,
        }
    }

    /// Replace a zero page size with `default` and cap it at `max`.
    pub fn clamped(mut self, default: usize, max: usize) -> Self {
        if self.per_page == 0 {
            self.per_page = default;
        }
        self.per_page = self.per_page.clamp(1, max.max(1));
        self
    }
}

/// Page metadata returned alongside content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationData {
    pub per_page: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    pub prev_page_cursor: Option<String>,
    pub next_page_cursor: Option<String>,
}

impl PaginationData {
    /// Metadata for a listing that was short-circuited to nothing.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A page of content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedResponse<T> {
    pub content: Vec<T>,
    pub pagination: PaginationData,
}

impl<T> PagedResponse<T> {
    pub fn empty() -> Self {
        Self {
            content: Vec::new(),
            pagination: PaginationData::empty(),
        }
    }
}

/// Listing criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionQuery {
    /// Restrict to these endpoints; empty means all
    #[serde(default)]
    pub endpoint_ids: Vec<String>,
    /// Case-insensitive substring of the subscription name
    #[serde(default)]
    pub name: Option<String>,
}

/// Slice a list already sorted newest first (descending `key`).
pub fn paginate<T: Clone>(
    items: &[T],
    pageable: &Pageable,
    key: impl Fn(&T) -> &str,
) -> (Vec<T>, PaginationData) {
    let per_page = pageable.per_page.max(1);

    let (start, end) = match (&pageable.cursor, pageable.direction) {
        (None, _) => (0, per_page.min(items.len())),
        (Some(cursor), PageDirection::Next) => {
            let start = items.iter().position(|i| key(i) < cursor.as_str()).unwrap_or(items.len());
            (start, (start + per_page).min(items.len()))
        }
        (Some(cursor), PageDirection::Prev) => {
            let end = items.iter().position(|i| key(i) <= cursor.as_str()).unwrap_or(items.len());
            (end.saturating_sub(per_page), end)
        }
    };

    let page = items[start..end].to_vec();
    let data = PaginationData {
        per_page,
        has_next_page: end < items.len(),
        has_prev_page: start > 0,
        prev_page_cursor: page.first().map(|i| key(i).to_string()),
        next_page_cursor: page.last().map(|i| key(i).to_string()),
    };

    (page, data)
}
