//! Builders for the conjunctive `$filter` expressions the upstream query
//! endpoint understands.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp the way the upstream comparators expect it.
///
/// Microsecond precision so a cursor value compared with `eq` round-trips
/// against what the upstream returned.
pub fn odata_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Escape a string literal for embedding in a filter expression.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Strict keyset boundary predicate after the row (`timestamp`, `key`):
/// matches rows strictly after the cursor in (timestamp, key) order, so a
/// page boundary inside a run of equal timestamps neither revisits nor
/// skips rows.
pub fn cursor_predicate(field: &str, timestamp: &DateTime<Utc>, key: &str) -> String {
    let ts = odata_timestamp(timestamp);
    format!(
        "({field} gt {ts} or ({field} eq {ts} and ListingKey gt {key}))",
        field = field,
        ts = ts,
        key = quote(key),
    )
}

/// `(contains(City,'A') or contains(City,'B') or ...)` over a region chunk.
pub fn region_clause(regions: &[String]) -> String {
    let parts: Vec<String> = regions
        .iter()
        .map(|r| format!("contains(City,{})", quote(r)))
        .collect();
    format!("({})", parts.join(" or "))
}

/// Split the region list into chunks so no single filter expression grows
/// past what the upstream accepts.
pub fn chunk_regions(regions: &[String], chunk_size: usize) -> Vec<Vec<String>> {
    regions
        .chunks(chunk_size.max(1))
        .map(|c| c.to_vec())
        .collect()
}

/// One slice of the authoritative scan: a fixed category/region sub-filter
/// the reconciler runs the paginator over.
#[derive(Debug, Clone)]
pub struct Partition {
    pub label: String,
    pub filter: String,
}

/// Build the partition list: category filters × region chunks, each AND-ed
/// with the status filter. Empty category or region lists collapse to a
/// single unconstrained slot.
pub fn build_partitions(
    category_filters: &[String],
    regions: &[String],
    region_chunk_size: usize,
    status_filter: &str,
) -> Vec<Partition> {
    let categories: Vec<Option<&String>> = if category_filters.is_empty() {
        vec![None]
    } else {
        category_filters.iter().map(Some).collect()
    };
    let region_chunks: Vec<Option<Vec<String>>> = if regions.is_empty() {
        vec![None]
    } else {
        chunk_regions(regions, region_chunk_size)
            .into_iter()
            .map(Some)
            .collect()
    };

    let mut partitions = Vec::new();
    for (c_idx, category) in categories.iter().enumerate() {
        for (r_idx, chunk) in region_chunks.iter().enumerate() {
            let mut clauses = Vec::new();
            if let Some(chunk) = chunk {
                clauses.push(region_clause(chunk));
            }
            if let Some(category) = category {
                clauses.push(format!("({})", category));
            }
            if !status_filter.is_empty() {
                clauses.push(status_filter.to_string());
            }
            partitions.push(Partition {
                label: format!("category-{}/regions-{}", c_idx, r_idx),
                filter: clauses.join(" and "),
            });
        }
    }
    partitions
}
