use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use crate::config::{SyncSettings, UpstreamSettings};
use crate::store::{ActiveSetStore, ImageStore};
use crate::upstream::filter::odata_timestamp;
use crate::upstream::{CursorField, KeysetPaginator, ListingSource, ScanSpec};

use super::downloader::{DownloadReport, ImageDownloader};

/// The time window one delta run covers: `[start, end]` in upstream
/// modification time. The start sits a lookback margin behind now to cover
/// upstream write-propagation delay; the end sits a smaller safety margin
/// behind now to exclude writes not yet consistent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DeltaWindow {
    pub fn at(now: DateTime<Utc>, lookback_minutes: i64, safety_margin_minutes: i64) -> Self {
        Self {
            start: now - ChronoDuration::minutes(lookback_minutes),
            end: now - ChronoDuration::minutes(safety_margin_minutes),
        }
    }
}

/// Outcome of one delta run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaReport {
    pub window: DeltaWindow,
    pub changed: Vec<String>,
    pub download: DownloadReport,
}

/// Time-windowed incremental sync: finds listings changed since the last
/// run and replaces their image sets wholesale.
///
/// A changed listing is always treated as fully stale: its files are
/// purged before the downloader refetches the whole set. "Changed" means
/// modified inside the window, or media changed since the window start;
/// the two conditions run as separate keyset scans so each stays monotone
/// on its own cursor column.
pub struct DeltaSync {
    source: Arc<dyn ListingSource>,
    images: Arc<ImageStore>,
    active_set: Arc<ActiveSetStore>,
    upstream: UpstreamSettings,
    sync: SyncSettings,
}

impl DeltaSync {
    pub fn new(
        source: Arc<dyn ListingSource>,
        images: Arc<ImageStore>,
        active_set: Arc<ActiveSetStore>,
        upstream: UpstreamSettings,
        sync: SyncSettings,
    ) -> Self {
        Self {
            source,
            images,
            active_set,
            upstream,
            sync,
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<DeltaReport> {
        let window = DeltaWindow::at(
            now,
            self.sync.lookback_minutes,
            self.sync.safety_margin_minutes,
        );
        info!(
            "Delta window {} .. {}",
            odata_timestamp(&window.start),
            odata_timestamp(&window.end)
        );

        // Scan failures abort here, before any disk mutation; the lookback
        // margin covers the gap on the next run.
        let changed = self.scan_changed(&window).await?;
        if changed.is_empty() {
            return Ok(DeltaReport {
                window,
                changed,
                download: DownloadReport::default(),
            });
        }
        info!("{} listings changed in window", changed.len());

        // Changed listings are wholly stale: purge, then refetch everything.
        for key in &changed {
            match self.images.remove_listing(key) {
                Ok(removed) if removed > 0 => {
                    info!("Purged {} stale images of {}", removed, key)
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to purge images of {}: {:#}", key, e),
            }
        }

        // Fold the changed keys into the snapshot; written as a whole new
        // value through the same atomic-replace path the reconciler uses.
        let mut active = self.active_set.load()?;
        active.extend(changed.iter().cloned());
        self.active_set
            .replace(&active)
            .context("updating active-listing snapshot")?;

        let downloader = ImageDownloader::new(
            Arc::clone(&self.source),
            Arc::clone(&self.images),
            self.sync.retry.clone(),
            std::time::Duration::from_millis(self.sync.item_delay_ms),
            self.sync.download_concurrency,
        );
        let download = downloader.download_listings(&changed).await;

        Ok(DeltaReport {
            window,
            changed,
            download,
        })
    }

    /// Keys modified inside the window, or with media changes since the
    /// window start, across all partitions. Deduplicated, scan order kept.
    async fn scan_changed(&self, window: &DeltaWindow) -> Result<Vec<String>> {
        let mut seen = BTreeSet::new();
        let mut changed = Vec::new();

        for partition in self.upstream.partitions() {
            let modified_filter = format!(
                "{} and ModificationTimestamp ge {} and ModificationTimestamp le {}",
                partition.filter,
                odata_timestamp(&window.start),
                odata_timestamp(&window.end),
            );
            let media_filter = format!(
                "{} and MediaChangeTimestamp gt {}",
                partition.filter,
                odata_timestamp(&window.start),
            );
            let scans = [
                (modified_filter, CursorField::Modification),
                (media_filter, CursorField::MediaChange),
            ];

            for (base_filter, cursor_field) in scans {
                let spec = ScanSpec {
                    base_filter,
                    cursor_field,
                    page_size: self.upstream.page_size,
                };
                let mut pager =
                    KeysetPaginator::new(self.source.as_ref(), &self.sync.retry, spec, None);
                let keys = pager.collect_keys().await.with_context(|| {
                    format!("delta scan failed in partition {}", partition.label)
                })?;
                for key in keys {
                    if seen.insert(key.clone()) {
                        changed.push(key);
                    }
                }
            }
        }
        Ok(changed)
    }
}
