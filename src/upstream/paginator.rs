use chrono::{DateTime, Utc};

use crate::retry::{retry_with_backoff, RetryConfig};

use super::error::UpstreamError;
use super::filter::cursor_predicate;
use super::models::ListingRow;
use super::source::ListingSource;

/// Resume position inside a paginated scan: the (timestamp, key) pair of the
/// last row already returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    pub timestamp: DateTime<Utc>,
    pub key: String,
}

impl SyncCursor {
    /// Cursor before the very first row at or after `start`: the empty key
    /// sorts before every real listing key, so rows stamped exactly `start`
    /// are included.
    pub fn at_start(start: DateTime<Utc>) -> Self {
        Self {
            timestamp: start,
            key: String::new(),
        }
    }
}

/// Which timestamp column a scan is ordered and cursored by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorField {
    Modification,
    MediaChange,
}

impl CursorField {
    pub fn field_name(&self) -> &'static str {
        match self {
            CursorField::Modification => "ModificationTimestamp",
            CursorField::MediaChange => "MediaChangeTimestamp",
        }
    }

    pub fn orderby(&self) -> String {
        format!("{},ListingKey", self.field_name())
    }

    /// The cursor timestamp carried by a row for this ordering. Rows from a
    /// media-ordered scan always carry the media timestamp; the fallback
    /// keeps the cursor monotone if the upstream omits it anyway.
    pub fn value_of(&self, row: &ListingRow) -> DateTime<Utc> {
        match self {
            CursorField::Modification => row.modification_timestamp,
            CursorField::MediaChange => row
                .media_change_timestamp
                .unwrap_or(row.modification_timestamp),
        }
    }
}

/// One scan definition: the fixed filter, the ordering column, and the page
/// size (the upstream caps pages at 500).
#[derive(Debug, Clone)]
pub struct ScanSpec {
    pub base_filter: String,
    pub cursor_field: CursorField,
    pub page_size: usize,
}

pub const MAX_PAGE_SIZE: usize = 500;

/// Keyset paginator over one [`ScanSpec`]. Each page query goes through the
/// retry wrapper; the cursor advances to the last row of each page; a page
/// strictly shorter than the limit ends the stream.
pub struct KeysetPaginator<'a> {
    source: &'a dyn ListingSource,
    retry: &'a RetryConfig,
    spec: ScanSpec,
    cursor: Option<SyncCursor>,
    done: bool,
    pages_fetched: usize,
}

impl<'a> KeysetPaginator<'a> {
    pub fn new(
        source: &'a dyn ListingSource,
        retry: &'a RetryConfig,
        spec: ScanSpec,
        initial_cursor: Option<SyncCursor>,
    ) -> Self {
        let spec = ScanSpec {
            page_size: spec.page_size.clamp(1, MAX_PAGE_SIZE),
            ..spec
        };
        Self {
            source,
            retry,
            spec,
            cursor: initial_cursor,
            done: false,
            pages_fetched: 0,
        }
    }

    /// Fetch the next page, or `None` once the stream has ended.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ListingRow>>, UpstreamError> {
        if self.done {
            return Ok(None);
        }

        let filter = match &self.cursor {
            Some(cursor) => format!(
                "{} and {}",
                self.spec.base_filter,
                cursor_predicate(
                    self.spec.cursor_field.field_name(),
                    &cursor.timestamp,
                    &cursor.key
                )
            ),
            None => self.spec.base_filter.clone(),
        };
        let orderby = self.spec.cursor_field.orderby();
        let source = self.source;
        let page_size = self.spec.page_size;
        let filter_ref = &filter;
        let orderby_ref = &orderby;

        let rows = retry_with_backoff(
            self.retry,
            |e: &UpstreamError| e.retry_action(),
            || source.query_listings(filter_ref, orderby_ref, page_size),
        )
        .await?;

        self.pages_fetched += 1;

        if rows.is_empty() {
            self.done = true;
            return Ok(None);
        }
        if rows.len() < self.spec.page_size {
            self.done = true;
        }
        let last = rows.last().expect("non-empty page");
        self.cursor = Some(SyncCursor {
            timestamp: self.spec.cursor_field.value_of(last),
            key: last.listing_key.clone(),
        });

        Ok(Some(rows))
    }

    /// Drain the scan, collecting listing keys in return order.
    pub async fn collect_keys(&mut self) -> Result<Vec<String>, UpstreamError> {
        let mut keys = Vec::new();
        while let Some(rows) = self.next_page().await? {
            keys.extend(rows.into_iter().map(|r| r.listing_key));
        }
        Ok(keys)
    }

    pub fn cursor(&self) -> Option<&SyncCursor> {
        self.cursor.as_ref()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }
}
