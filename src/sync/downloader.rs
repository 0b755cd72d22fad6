use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::store::ImageStore;
use crate::upstream::{ListingSource, MediaDescriptor, UpstreamError};

/// Aggregate outcome of one download pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub listings_processed: usize,
    pub listings_failed: usize,
    pub images_written: usize,
    pub images_skipped: usize,
}

/// Fetches the photo set of each given listing and writes it as
/// `{key}-{index}.{ext}` files, preferred photo first.
///
/// Listings fan out with bounded concurrency; within one listing the index
/// writes are strictly sequential, so an interrupted run leaves a clean
/// prefix that the next run resumes past (existing index files skip their
/// network fetch).
pub struct ImageDownloader {
    source: Arc<dyn ListingSource>,
    images: Arc<ImageStore>,
    retry: RetryConfig,
    item_delay: Duration,
    concurrency: usize,
}

impl ImageDownloader {
    pub fn new(
        source: Arc<dyn ListingSource>,
        images: Arc<ImageStore>,
        retry: RetryConfig,
        item_delay: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            images,
            retry,
            item_delay,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn download_listings(&self, keys: &[String]) -> DownloadReport {
        let results: Vec<(String, Result<(usize, usize)>)> = stream::iter(keys.iter().cloned())
            .map(|key| async move {
                let outcome = self.download_one(&key).await;
                if self.item_delay > Duration::ZERO {
                    tokio::time::sleep(self.item_delay).await;
                }
                (key, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = DownloadReport::default();
        for (key, outcome) in results {
            report.listings_processed += 1;
            match outcome {
                Ok((written, skipped)) => {
                    report.images_written += written;
                    report.images_skipped += skipped;
                }
                Err(e) => {
                    // One listing failing never stops the loop.
                    warn!("Skipping listing {}: {:#}", key, e);
                    report.listings_failed += 1;
                }
            }
        }
        if report.images_written > 0 || report.listings_failed > 0 {
            info!(
                "Downloaded {} images for {} listings ({} skipped, {} listings failed)",
                report.images_written,
                report.listings_processed,
                report.images_skipped,
                report.listings_failed,
            );
        }
        report
    }

    /// Returns (written, skipped) image counts for one listing.
    async fn download_one(&self, key: &str) -> Result<(usize, usize)> {
        let source = Arc::clone(&self.source);
        let descriptors = retry_with_backoff(
            &self.retry,
            |e: &UpstreamError| e.retry_action(),
            || source.media_for_listing(key),
        )
        .await
        .with_context(|| format!("fetching media descriptors for {}", key))?;

        let ordered = order_preferred_first(descriptors);
        if ordered.is_empty() {
            debug!("No media for listing {}", key);
            return Ok((0, 0));
        }

        let mut written = 0;
        let mut skipped = 0;
        let mut index = 0;
        for descriptor in &ordered {
            let Some(url) = descriptor.url.as_deref() else {
                // Malformed descriptor: log and move on without burning an
                // index, so indices stay gap-free.
                warn!("Listing {} has a media descriptor without a URL", key);
                continue;
            };
            let ext = extension_from_url(url);
            let file_name = ImageStore::asset_file_name(key, index, ext);
            if self.images.asset_path(&file_name).exists() {
                skipped += 1;
                index += 1;
                continue;
            }

            let source = Arc::clone(&self.source);
            let bytes = retry_with_backoff(
                &self.retry,
                |e: &UpstreamError| e.retry_action(),
                || source.fetch_media(url),
            )
            .await
            .with_context(|| format!("fetching {}", url))?;

            self.images
                .write_asset(key, index, ext, &bytes)
                .with_context(|| format!("writing image {} of {}", index, key))?;
            debug!("Downloaded {}", file_name);
            written += 1;
            index += 1;
        }
        Ok((written, skipped))
    }
}

/// Stable sort: preferred photos first, upstream order otherwise.
fn order_preferred_first(mut descriptors: Vec<MediaDescriptor>) -> Vec<MediaDescriptor> {
    descriptors.sort_by_key(|d| !d.is_preferred());
    descriptors
}

/// File extension from a media URL, `jpg` when in doubt.
fn extension_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('.').next().map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "png",
        Some(ext) if ext == "webp" => "webp",
        Some(ext) if ext == "gif" => "gif",
        Some(ext) if ext == "jpeg" || ext == "jpg" => "jpg",
        _ => "jpg",
    }
}
