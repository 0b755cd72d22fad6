use std::time::Duration;

use async_trait::async_trait;

use super::context::JobContext;

/// How long a job run may keep going once shutdown has been requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownBehavior {
    /// The job checks the cancellation token and returns early.
    Cancellable,
    /// The job is short enough to always run to completion.
    RunToCompletion,
}

/// When a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSchedule {
    /// Repeatedly, this long apart.
    Interval(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job cancelled")]
    Cancelled,
    #[error("job failed: {0}")]
    ExecutionFailed(String),
}

/// A unit of periodic background work.
///
/// Jobs are registered with the scheduler at startup and executed strictly
/// one at a time; a failing run is logged and retried at the next scheduled
/// slot, never immediately.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Stable identifier, used in logs and the jobs API.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// One-line description of what the job does.
    fn description(&self) -> &'static str;

    fn schedule(&self) -> JobSchedule;

    /// Delay before the first run after startup.
    fn startup_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior;

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
