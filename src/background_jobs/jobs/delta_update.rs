//! Delta update background job.
//!
//! Runs the time-windowed incremental sync on a short interval, replacing
//! the image sets of recently changed listings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::background_jobs::{BackgroundJob, JobContext, JobError, JobSchedule, ShutdownBehavior};
use crate::config::DeltaUpdateJobSettings;
use crate::sync::DeltaSync;

pub struct DeltaUpdateJob {
    interval_minutes: u64,
}

impl DeltaUpdateJob {
    pub fn from_settings(settings: &DeltaUpdateJobSettings) -> Self {
        Self {
            interval_minutes: settings.interval_minutes,
        }
    }
}

#[async_trait]
impl BackgroundJob for DeltaUpdateJob {
    fn id(&self) -> &'static str {
        "delta_update"
    }

    fn name(&self) -> &'static str {
        "Delta Update"
    }

    fn description(&self) -> &'static str {
        "Refresh images of listings changed upstream since the last window"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(self.interval_minutes * 60))
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let delta = DeltaSync::new(
            Arc::clone(&ctx.source),
            Arc::clone(&ctx.images),
            Arc::clone(&ctx.active_set),
            ctx.upstream.clone(),
            ctx.sync.clone(),
        );
        delta
            .run(Utc::now())
            .await
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?;
        Ok(())
    }
}
