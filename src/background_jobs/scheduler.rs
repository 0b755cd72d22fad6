use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::context::JobContext;
use super::job::{BackgroundJob, JobError, JobSchedule};

/// Snapshot of one registered job, served by the jobs API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub interval_secs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
}

struct RegisteredJob {
    job: Arc<dyn BackgroundJob>,
    next_run: Instant,
}

/// Handle given to the HTTP surface: lists registered jobs and lets an
/// operator trigger one out of schedule.
#[derive(Clone)]
pub struct SchedulerHandle {
    infos: Arc<Mutex<Vec<JobInfo>>>,
    trigger_tx: mpsc::Sender<String>,
}

impl SchedulerHandle {
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.infos.lock().unwrap().clone()
    }

    /// Ask the scheduler to run `job_id` now. Returns false if the
    /// scheduler is gone.
    pub async fn trigger(&self, job_id: &str) -> bool {
        self.trigger_tx.send(job_id.to_string()).await.is_ok()
    }
}

/// Runs registered jobs strictly one at a time.
///
/// Sequential execution is deliberate: the sync jobs mutate the image
/// directory and the snapshot, and exactly one mutator may be active at any
/// moment. A job due while another runs simply starts late.
pub struct JobScheduler {
    jobs: Vec<RegisteredJob>,
    ctx: JobContext,
    shutdown: CancellationToken,
    trigger_rx: mpsc::Receiver<String>,
    infos: Arc<Mutex<Vec<JobInfo>>>,
}

pub fn create_scheduler(
    shutdown: CancellationToken,
    ctx: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let infos = Arc::new(Mutex::new(Vec::new()));
    let (trigger_tx, trigger_rx) = mpsc::channel(16);
    let scheduler = JobScheduler {
        jobs: Vec::new(),
        ctx,
        shutdown,
        trigger_rx,
        infos: Arc::clone(&infos),
    };
    let handle = SchedulerHandle { infos, trigger_tx };
    (scheduler, handle)
}

impl JobScheduler {
    pub fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let JobSchedule::Interval(interval) = job.schedule();
        let next_run = Instant::now() + job.startup_delay();
        self.infos.lock().unwrap().push(JobInfo {
            id: job.id(),
            name: job.name(),
            description: job.description(),
            interval_secs: interval.as_secs(),
            last_run_at: None,
            last_outcome: None,
        });
        info!(
            "Registered job {} (every {}s, first run in {}s)",
            job.id(),
            interval.as_secs(),
            job.startup_delay().as_secs()
        );
        self.jobs.push(RegisteredJob { job, next_run });
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub async fn run(mut self) {
        loop {
            let due = self
                .jobs
                .iter()
                .enumerate()
                .min_by_key(|(_, j)| j.next_run)
                .map(|(idx, j)| (idx, j.next_run));

            match due {
                Some((idx, next_run)) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        triggered = self.trigger_rx.recv() => {
                            if let Some(job_id) = triggered {
                                self.run_triggered(&job_id).await;
                            }
                        }
                        _ = tokio::time::sleep_until(next_run) => {
                            self.run_at(idx).await;
                        }
                    }
                }
                None => {
                    // Nothing registered; only shutdown or a trigger can
                    // wake us, and triggers have nothing to run.
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.trigger_rx.recv() => {}
                    }
                }
            }
        }
        info!("Job scheduler stopped");
    }

    async fn run_triggered(&mut self, job_id: &str) {
        match self.jobs.iter().position(|j| j.job.id() == job_id) {
            Some(idx) => {
                info!("Manual trigger for job {}", job_id);
                self.run_at(idx).await;
            }
            None => warn!("Trigger for unknown job {}", job_id),
        }
    }

    async fn run_at(&mut self, idx: usize) {
        let job = Arc::clone(&self.jobs[idx].job);
        let JobSchedule::Interval(interval) = job.schedule();

        info!("Running job {}", job.id());
        let started = std::time::Instant::now();
        let outcome = job.execute(&self.ctx).await;
        let elapsed = started.elapsed();

        let summary = match &outcome {
            Ok(()) => {
                info!("Job {} finished in {:.1}s", job.id(), elapsed.as_secs_f64());
                "ok".to_string()
            }
            Err(JobError::Cancelled) => {
                info!("Job {} cancelled", job.id());
                "cancelled".to_string()
            }
            Err(e) => {
                // Failed runs wait for their next slot; the sync jobs are
                // written so a failed run leaves state untouched.
                error!("Job {} failed after {:.1}s: {}", job.id(), elapsed.as_secs_f64(), e);
                format!("failed: {}", e)
            }
        };

        self.jobs[idx].next_run = Instant::now() + interval;
        let mut infos = self.infos.lock().unwrap();
        if let Some(info) = infos.iter_mut().find(|i| i.id == job.id()) {
            info.last_run_at = Some(Utc::now());
            info.last_outcome = Some(summary);
        }
    }
}
