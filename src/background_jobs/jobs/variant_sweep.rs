//! Variant cache sweep job.
//!
//! Periodically drops expired transcoded variants and evicts oldest-first
//! when the cache is over its entry cap.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::background_jobs::{BackgroundJob, JobContext, JobError, JobSchedule, ShutdownBehavior};
use crate::config::VariantSweepJobSettings;

pub struct VariantSweepJob {
    interval_minutes: u64,
}

impl VariantSweepJob {
    pub fn from_settings(settings: &VariantSweepJobSettings) -> Self {
        Self {
            interval_minutes: settings.interval_minutes,
        }
    }
}

#[async_trait]
impl BackgroundJob for VariantSweepJob {
    fn id(&self) -> &'static str {
        "variant_sweep"
    }

    fn name(&self) -> &'static str {
        "Variant Cache Sweep"
    }

    fn description(&self) -> &'static str {
        "Evict expired and excess transcoded image variants"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(self.interval_minutes * 60))
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::RunToCompletion
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let report = ctx.variant_cache.sweep();
        if report.expired_removed > 0 || report.overflow_removed > 0 {
            info!(
                "Variant sweep: {} expired, {} evicted, {} remaining",
                report.expired_removed, report.overflow_removed, report.remaining
            );
        }
        Ok(())
    }
}
