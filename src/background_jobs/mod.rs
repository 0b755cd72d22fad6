//! Background job scheduling and execution system.
//!
//! This module provides the infrastructure for the periodic work that keeps
//! the mirror consistent: full reconciliation, delta updates, and variant
//! cache sweeps.

mod context;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior};
pub use scheduler::{create_scheduler, JobInfo, JobScheduler, SchedulerHandle};
