use async_trait::async_trait;

use super::error::UpstreamError;
use super::models::{ListingRow, MediaDescriptor};

/// The upstream catalog as the synchronizer sees it: paged listing queries,
/// per-listing media descriptors, and raw media payloads. Behind a trait so
/// the sync logic runs against a scripted in-memory source in tests.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// One page of listings matching `filter`, ordered by `orderby`, at most
    /// `top` rows.
    async fn query_listings(
        &self,
        filter: &str,
        orderby: &str,
        top: usize,
    ) -> Result<Vec<ListingRow>, UpstreamError>;

    /// Ordered media descriptors for one listing.
    async fn media_for_listing(&self, key: &str) -> Result<Vec<MediaDescriptor>, UpstreamError>;

    /// The binary payload behind one media URL.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, UpstreamError>;
}
