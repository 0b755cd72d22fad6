use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::UpstreamSettings;
use crate::retry::RetryConfig;
use crate::store::{ActiveSetStore, ImageStore};
use crate::upstream::{CursorField, KeysetPaginator, ListingSource, ScanSpec, SyncCursor};

/// Outcome of one full reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub active: BTreeSet<String>,
    pub partitions_scanned: usize,
    pub orphans_removed: usize,
    pub files_removed: usize,
}

/// Full authoritative reconciliation of the local mirror.
///
/// Scans every configured partition to completion first; only a fully
/// successful scan is allowed to touch disk. Partial information must never
/// cause deletions, so any partition failing after retries aborts the whole
/// run with the images and the persisted snapshot untouched.
pub struct Reconciler {
    source: Arc<dyn ListingSource>,
    images: Arc<ImageStore>,
    active_set: Arc<ActiveSetStore>,
    upstream: UpstreamSettings,
    retry: RetryConfig,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn ListingSource>,
        images: Arc<ImageStore>,
        active_set: Arc<ActiveSetStore>,
        upstream: UpstreamSettings,
        retry: RetryConfig,
    ) -> Self {
        Self {
            source,
            images,
            active_set,
            upstream,
            retry,
        }
    }

    pub async fn run(&self) -> Result<ReconcileReport> {
        let partitions = self.upstream.partitions();
        let mut candidate: BTreeSet<String> = BTreeSet::new();

        for partition in &partitions {
            let spec = ScanSpec {
                base_filter: partition.filter.clone(),
                cursor_field: CursorField::Modification,
                page_size: self.upstream.page_size,
            };
            let mut pager = KeysetPaginator::new(
                self.source.as_ref(),
                &self.retry,
                spec,
                Some(SyncCursor::at_start(self.upstream.full_scan_start)),
            );
            let keys = pager
                .collect_keys()
                .await
                .with_context(|| format!("authoritative scan failed in partition {}", partition.label))?;
            info!(
                "Partition {} returned {} keys over {} pages",
                partition.label,
                keys.len(),
                pager.pages_fetched()
            );
            candidate.extend(keys);
        }

        // Scan complete; from here on disk mutation is allowed.
        let local = self.images.local_keys()?;
        let orphans: Vec<&String> = local.difference(&candidate).collect();

        let mut orphans_removed = 0;
        let mut files_removed = 0;
        for key in orphans {
            match self.images.remove_listing(key) {
                Ok(count) => {
                    orphans_removed += 1;
                    files_removed += count;
                }
                Err(e) => warn!("Failed to remove orphaned images of {}: {:#}", key, e),
            }
        }

        self.active_set
            .replace(&candidate)
            .context("replacing active-listing snapshot")?;

        info!(
            "Reconciled {} active listings; removed {} orphaned listings ({} files)",
            candidate.len(),
            orphans_removed,
            files_removed
        );

        Ok(ReconcileReport {
            active: candidate,
            partitions_scanned: partitions.len(),
            orphans_removed,
            files_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::testing::{row, ScriptedSource};
    use crate::upstream::UpstreamError;
    use tempfile::TempDir;

    fn upstream_settings() -> UpstreamSettings {
        UpstreamSettings {
            base_url: "https://query.example.com/odata".to_string(),
            bearer_token: String::new(),
            page_size: 500,
            request_timeout_secs: 30,
            category_filters: vec![
                "PropertySubType eq 'Sale Of Business'".to_string(),
                "PropertyType eq 'Commercial'".to_string(),
            ],
            regions: Vec::new(),
            region_chunk_size: 15,
            status_filter: "StandardStatus eq 'Active'".to_string(),
            full_scan_start: "2024-01-01T00:00:00Z".parse().unwrap(),
        }
    }

    fn no_delay_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_delay_secs: 0,
            max_delay_secs: 0,
        }
    }

    struct Fixture {
        source: Arc<ScriptedSource>,
        images: Arc<ImageStore>,
        active_set: Arc<ActiveSetStore>,
        reconciler: Reconciler,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new());
        let images = Arc::new(ImageStore::new(dir.path().join("images")).unwrap());
        let active_set = Arc::new(ActiveSetStore::new(dir.path().join("active_listings.json")));
        let reconciler = Reconciler::new(
            Arc::clone(&source) as Arc<dyn ListingSource>,
            Arc::clone(&images),
            Arc::clone(&active_set),
            upstream_settings(),
            no_delay_retry(),
        );
        Fixture {
            source,
            images,
            active_set,
            reconciler,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_orphans_removed_and_snapshot_replaced() {
        let f = fixture();
        // Partition 1 returns A and B, partition 2 returns B and C.
        f.source
            .push_page(vec![row("A", "2025-06-01T00:00:00Z"), row("B", "2025-06-01T00:00:00Z")]);
        f.source.push_page(vec![
            row("B", "2025-06-01T00:00:00Z"),
            row("C", "2025-06-01T00:00:00Z"),
        ]);

        // Locally: B is active, STALE is an orphan.
        f.images.write_asset("B", 0, "jpg", b"b0").unwrap();
        f.images.write_asset("STALE", 0, "jpg", b"s0").unwrap();
        f.images.write_asset("STALE", 1, "jpg", b"s1").unwrap();
        f.active_set
            .replace(&["B".to_string(), "STALE".to_string()].into_iter().collect())
            .unwrap();

        let report = f.reconciler.run().await.unwrap();

        assert_eq!(report.partitions_scanned, 2);
        assert_eq!(report.orphans_removed, 1);
        assert_eq!(report.files_removed, 2);
        // Keys deduplicated across partitions.
        let expected: BTreeSet<String> =
            ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(report.active, expected);
        assert_eq!(f.active_set.load().unwrap(), expected);
        // B kept its images; STALE lost all files and left the snapshot.
        assert!(f.images.has_any("B").unwrap());
        assert!(!f.images.has_any("STALE").unwrap());
    }

    #[tokio::test]
    async fn test_never_deletes_a_key_in_the_candidate_set() {
        let f = fixture();
        f.source.push_page(vec![row("KEEP", "2025-06-01T00:00:00Z")]);
        f.source.push_page(Vec::new());

        f.images.write_asset("KEEP", 0, "jpg", b"k").unwrap();
        f.reconciler.run().await.unwrap();
        assert!(f.images.has_any("KEEP").unwrap());
    }

    #[tokio::test]
    async fn test_partition_failure_leaves_state_untouched() {
        let f = fixture();
        // Partition 1 succeeds, partition 2 fails even after the retry.
        f.source.push_page(vec![row("A", "2025-06-01T00:00:00Z")]);
        f.source
            .push_error(UpstreamError::Transient("down".into()));
        f.source
            .push_error(UpstreamError::Transient("still down".into()));

        f.images.write_asset("STALE", 0, "jpg", b"s").unwrap();
        let before: BTreeSet<String> = ["STALE".to_string()].into_iter().collect();
        f.active_set.replace(&before).unwrap();

        assert!(f.reconciler.run().await.is_err());

        // No deletions, no snapshot replacement.
        assert!(f.images.has_any("STALE").unwrap());
        assert_eq!(f.active_set.load().unwrap(), before);
    }

    #[tokio::test]
    async fn test_rejected_scan_aborts_without_retry_loop() {
        let f = fixture();
        f.source.push_error(UpstreamError::Rejected {
            status: 403,
            message: "bad token".into(),
        });

        assert!(f.reconciler.run().await.is_err());
        assert_eq!(f.source.query_count(), 1);
    }
}
