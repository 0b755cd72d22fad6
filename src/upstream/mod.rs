//! Client side of the upstream catalog: query models, filter expressions,
//! the keyset paginator, and the HTTP implementation of the source trait.

mod error;
pub mod filter;
mod http;
mod models;
mod paginator;
mod source;

pub use error::UpstreamError;
pub use filter::{odata_timestamp, Partition};
pub use http::HttpListingSource;
pub use models::{ListingRow, MediaDescriptor, ODataPage};
pub use paginator::{CursorField, KeysetPaginator, ScanSpec, SyncCursor};
pub use source::ListingSource;

#[cfg(test)]
pub(crate) use source::testing;
