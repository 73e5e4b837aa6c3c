//! Listing contract shared by the public site and the dashboard: page
//! arithmetic, filters, the read retry policy and the rendered listing states.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{Months, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tokio_retry2::{Retry, RetryError, strategy::FixedInterval};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::{ApiError, BackendError};
use crate::models::{Document, NewsItem, NewsStatus};

pub const PUBLIC_PAGE_SIZE: u32 = 9;
pub const LATEST_PAGE_SIZE: u32 = 3;
pub const ADMIN_PAGE_SIZE: u32 = 10;
pub const DOCUMENT_PAGE_SIZE: u32 = 12;
pub const REPORT_PAGE_SIZE: u32 = 12;

/// Zero-indexed row window, `end` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: u64,
    pub end: u64,
}

impl RowRange {
    pub fn limit(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// A 1-based page of a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        PageRequest {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn first(page_size: u32) -> Self {
        PageRequest::new(1, page_size)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn range(&self) -> RowRange {
        let size = u64::from(self.page_size);
        let start = u64::from(self.page - 1) * size;
        RowRange {
            start,
            end: start + size - 1,
        }
    }

    /// Keeps the page inside `1..=total_pages`. With no rows the only page is 1.
    pub fn clamp(self, total_pages: u32) -> Self {
        PageRequest {
            page: self.page.min(total_pages.max(1)),
            ..self
        }
    }
}

pub fn total_pages(count: u64, page_size: u32) -> u32 {
    let pages = count.div_ceil(u64::from(page_size.max(1)));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        Page {
            items,
            page: request.page(),
            page_size: request.page_size(),
            total,
            total_pages: total_pages(total, request.page_size()),
        }
    }

    pub fn next_page(&self) -> Option<u32> {
        (self.page < self.total_pages).then_some(self.page + 1)
    }

    pub fn previous_page(&self) -> Option<u32> {
        (self.page > 1).then_some(self.page - 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}

/// What a listing view shows. Each state renders differently.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Listing<T> {
    #[default]
    Loading,
    Error {
        message: String,
    },
    Empty,
    Populated(Page<T>),
}

impl<T> Listing<T> {
    pub fn from_page(page: Page<T>) -> Self {
        if page.items.is_empty() {
            Listing::Empty
        } else {
            Listing::Populated(page)
        }
    }

    pub fn from_result<E: fmt::Display>(result: Result<Page<T>, E>) -> Self {
        match result {
            Ok(page) => Listing::from_page(page),
            Err(err) => Listing::Error {
                message: err.to_string(),
            },
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Listing::Loading)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Listing::Error { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Listing::Empty)
    }

    pub fn items(&self) -> &[T] {
        match self {
            Listing::Populated(page) => &page.items,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Published,
    Draft,
}

impl StatusFilter {
    pub fn status(&self) -> Option<NewsStatus> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Published => Some(NewsStatus::Published),
            StatusFilter::Draft => Some(NewsStatus::Draft),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRangeFilter {
    #[default]
    All,
    Today,
    Week,
    Month,
}

impl DateRangeFilter {
    /// Earliest `created_at` admitted by this window, relative to `now` (UTC).
    pub fn lower_bound(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            DateRangeFilter::All => None,
            DateRangeFilter::Today => Some(now.date().and_time(NaiveTime::MIN)),
            DateRangeFilter::Week => Some(now - chrono::Duration::days(7)),
            DateRangeFilter::Month => now.checked_sub_months(Months::new(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsOrder {
    #[default]
    CreatedAt,
    Title,
}

impl NewsOrder {
    pub fn column(&self) -> &'static str {
        match self {
            NewsOrder::CreatedAt => "created_at",
            NewsOrder::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Dashboard filter as the user picks it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AdminNewsFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: StatusFilter,
    #[serde(default)]
    pub date_range: DateRangeFilter,
    #[serde(default)]
    pub order_by: NewsOrder,
    #[serde(default)]
    pub order_direction: SortDirection,
}

/// Resolved news query handed to a [`crate::backend::NewsStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewsQuery {
    pub search: Option<String>,
    pub status: Option<NewsStatus>,
    pub created_after: Option<NaiveDateTime>,
    pub order_by: NewsOrder,
    pub direction: SortDirection,
}

impl NewsQuery {
    /// Published items, newest first.
    pub fn public() -> Self {
        NewsQuery {
            search: None,
            status: Some(NewsStatus::Published),
            created_after: None,
            order_by: NewsOrder::CreatedAt,
            direction: SortDirection::Desc,
        }
    }

    pub fn from_admin(filter: &AdminNewsFilter, now: NaiveDateTime) -> Self {
        NewsQuery {
            search: normalized_search(filter.search.as_deref()),
            status: filter.status.status(),
            created_after: filter.date_range.lower_bound(now),
            order_by: filter.order_by,
            direction: filter.order_direction,
        }
    }

    /// Reference semantics of the query for a single row.
    pub fn matches(&self, item: &NewsItem) -> bool {
        if self.status.is_some_and(|status| status != item.status) {
            return false;
        }
        if self.created_after.is_some_and(|after| item.created_at < after) {
            return false;
        }
        match &self.search {
            Some(needle) => contains_ignore_case(&item.title, needle)
                || contains_ignore_case(&item.content, needle),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    pub search: Option<String>,
    pub category: Option<String>,
}

impl DocumentQuery {
    pub fn new(search: Option<&str>, category: Option<&str>) -> Self {
        DocumentQuery {
            search: normalized_search(search),
            category: category
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        if let Some(category) = &self.category {
            if &document.category != category {
                return false;
            }
        }
        match &self.search {
            Some(needle) => {
                contains_ignore_case(&document.title, needle)
                    || document
                        .description
                        .as_deref()
                        .is_some_and(|d| contains_ignore_case(d, needle))
            }
            None => true,
        }
    }
}

fn normalized_search(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Retry policy for reads. Writes are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(attempts: usize) -> Self {
        RetryPolicy {
            attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Runs `read` under `policy`, giving up early when `cancel` fires.
pub async fn read_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    operation: &'static str,
    mut read: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let strategy = FixedInterval::new(policy.delay).take(policy.attempts.saturating_sub(1));
    let mut attempt = 0usize;

    let retrying = Retry::spawn(strategy, || {
        attempt += 1;
        let current = attempt;
        let pending = read();
        async move {
            match pending.await {
                Ok(value) => Ok(value),
                Err(err) if err.is_transient() => {
                    warn!(operation, attempt = current, error = %err, "Read failed, will retry");
                    Err(RetryError::Transient {
                        err,
                        retry_after: None,
                    })
                }
                Err(err) => {
                    warn!(operation, attempt = current, error = %err, "Read failed permanently");
                    Err(RetryError::Permanent(err))
                }
            }
        }
    });

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        result = retrying => result.map_err(ApiError::from),
    }
}
