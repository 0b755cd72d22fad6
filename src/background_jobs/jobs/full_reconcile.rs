//! Full reconciliation background job.
//!
//! Periodically runs the authoritative scan, prunes orphaned images,
//! replaces the active-listing snapshot, and backfills images for active
//! listings that have none on disk yet.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::background_jobs::{BackgroundJob, JobContext, JobError, JobSchedule, ShutdownBehavior};
use crate::config::FullReconcileJobSettings;
use crate::sync::{ImageDownloader, Reconciler};

pub struct FullReconcileJob {
    interval_hours: u64,
    startup_delay_minutes: u64,
}

impl FullReconcileJob {
    pub fn from_settings(settings: &FullReconcileJobSettings) -> Self {
        Self {
            interval_hours: settings.interval_hours,
            startup_delay_minutes: settings.startup_delay_minutes,
        }
    }
}

#[async_trait]
impl BackgroundJob for FullReconcileJob {
    fn id(&self) -> &'static str {
        "full_reconcile"
    }

    fn name(&self) -> &'static str {
        "Full Reconciliation"
    }

    fn description(&self) -> &'static str {
        "Scan all active listings upstream, prune orphaned images, replace the snapshot and backfill missing images"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(self.interval_hours * 60 * 60))
    }

    fn startup_delay(&self) -> Duration {
        // Delayed a little after startup so the serving surface comes up
        // before the first big scan hits the upstream.
        Duration::from_secs(self.startup_delay_minutes * 60)
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let reconciler = Reconciler::new(
            Arc::clone(&ctx.source),
            Arc::clone(&ctx.images),
            Arc::clone(&ctx.active_set),
            ctx.upstream.clone(),
            ctx.sync.retry.clone(),
        );
        let report = reconciler
            .run()
            .await
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?;

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        // Backfill: active listings with nothing on disk yet. Listings with
        // a partial set resume through the downloader's per-index skip.
        let mut missing = Vec::new();
        for key in &report.active {
            let has_any = ctx
                .images
                .has_any(key)
                .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?;
            if !has_any {
                missing.push(key.clone());
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        info!("Backfilling images for {} listings", missing.len());

        let downloader = ImageDownloader::new(
            Arc::clone(&ctx.source),
            Arc::clone(&ctx.images),
            ctx.sync.retry.clone(),
            Duration::from_millis(ctx.sync.item_delay_ms),
            ctx.sync.download_concurrency,
        );
        downloader.download_listings(&missing).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_metadata() {
        let job = FullReconcileJob::from_settings(&FullReconcileJobSettings::default());
        assert_eq!(job.id(), "full_reconcile");
        assert_eq!(job.name(), "Full Reconciliation");
        assert!(!job.description().is_empty());
        assert_eq!(job.shutdown_behavior(), ShutdownBehavior::Cancellable);
    }

    #[test]
    fn test_job_schedule() {
        let job = FullReconcileJob::from_settings(&FullReconcileJobSettings {
            interval_hours: 12,
            startup_delay_minutes: 5,
        });
        match job.schedule() {
            JobSchedule::Interval(duration) => {
                assert_eq!(duration, Duration::from_secs(12 * 60 * 60));
            }
        }
        assert_eq!(job.startup_delay(), Duration::from_secs(5 * 60));
    }
}
