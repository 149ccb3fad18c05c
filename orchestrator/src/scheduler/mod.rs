//! In-process job scheduler running on the tokio runtime
//!
//! Supports three trigger kinds:
//! - **Interval**: every `hours:minutes:seconds`, first firing one interval
//!   after registration
//! - **Cron**: five fields (minute hour day month day_of_week) evaluated in
//!   the configured timezone
//! - **Date**: a single firing, after which the job is removed
//!
//! # Firing rules
//!
//! - At most `max_instances` firings of one job run at once; extra firings
//!   are skipped and logged
//! - Several missed firings are coalesced into one catch-up run
//! - A firing later than `misfire_grace_time` is skipped, not retried
//! - `remove_job` takes effect immediately: no firing starts after it returns
//!
//! Jobs may be added before `start()`; they fire once the loop runs.

pub mod cron;
pub mod job;

pub use self::cron::{CronSchedule, CronSpec};
pub use job::{JobFn, JobInfo, Trigger};

use crate::config::SchedulerConfig;
use crate::constants::scheduler::{
    DEFAULT_MAX_INSTANCES, DEFAULT_MISFIRE_GRACE_SECONDS, MAX_IDLE_SLEEP_SECONDS,
};
use crate::errors::{ConfigError, SchedulerError};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::FutureExt;
use job::{plan_due, JobEntry, RunningGuard};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    timezone: Tz,
    misfire_grace: Duration,
    max_instances: usize,
    jobs: Mutex<HashMap<String, JobEntry>>,
    sequence: AtomicU64,
    wakeup: Notify,
    runner: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(
            Tz::UTC,
            Duration::from_secs(DEFAULT_MISFIRE_GRACE_SECONDS),
            DEFAULT_MAX_INSTANCES,
        )
    }
}

impl Scheduler {
    pub fn new(timezone: Tz, misfire_grace: Duration, max_instances: usize) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                timezone,
                misfire_grace,
                max_instances: max_instances.max(1),
                jobs: Mutex::new(HashMap::new()),
                sequence: AtomicU64::new(0),
                wakeup: Notify::new(),
                runner: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.timezone()?,
            config.misfire_grace(),
            config.max_instances,
        ))
    }

    pub fn timezone(&self) -> Tz {
        self.inner.timezone
    }

    pub fn is_running(&self) -> bool {
        self.inner.runner.lock().is_some()
    }

    pub fn add_interval_job(
        &self,
        job: JobFn,
        seconds: u64,
        minutes: u64,
        hours: u64,
        job_id: Option<&str>,
    ) -> Result<String, SchedulerError> {
        let total = seconds + minutes * 60 + hours * 3600;
        let job_id = self.resolve_id("interval", &job, job_id);
        if total == 0 {
            return Err(SchedulerError::InvalidTrigger {
                job_id,
                reason: "interval must be at least one second".to_string(),
            });
        }
        self.add_job(job_id, job, Trigger::Interval(Duration::from_secs(total)))
    }

    pub fn add_cron_job(
        &self,
        job: JobFn,
        spec: &CronSpec,
        job_id: Option<&str>,
    ) -> Result<String, SchedulerError> {
        let job_id = self.resolve_id("cron", &job, job_id);
        let schedule = CronSchedule::parse(spec).map_err(|reason| {
            SchedulerError::InvalidTrigger {
                job_id: job_id.clone(),
                reason,
            }
        })?;
        self.add_job(job_id, job, Trigger::Cron(schedule))
    }

    pub fn add_date_job(
        &self,
        job: JobFn,
        run_at: DateTime<Utc>,
        job_id: Option<&str>,
    ) -> Result<String, SchedulerError> {
        let job_id = self.resolve_id("date", &job, job_id);
        self.add_job(job_id, job, Trigger::Date(run_at))
    }

    fn resolve_id(&self, kind: &str, job: &JobFn, job_id: Option<&str>) -> String {
        match job_id {
            Some(id) => id.to_string(),
            None => {
                let seq = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                format!("{}_{}_{}", kind, job.name(), seq)
            }
        }
    }

    fn add_job(&self, job_id: String, func: JobFn, trigger: Trigger) -> Result<String, SchedulerError> {
        let next_run = trigger.first_run(Utc::now(), self.inner.timezone);
        if next_run.is_none() {
            return Err(SchedulerError::InvalidTrigger {
                job_id,
                reason: "trigger never fires".to_string(),
            });
        }

        let mut jobs = self.inner.jobs.lock();
        if jobs.contains_key(&job_id) {
            return Err(SchedulerError::DuplicateJobId { job_id });
        }

        debug!("Scheduled job '{}' ({}) next run at {:?}", job_id, trigger, next_run);
        jobs.insert(
            job_id.clone(),
            JobEntry {
                id: job_id.clone(),
                func,
                trigger,
                next_run,
                paused: false,
                max_instances: self.inner.max_instances,
                misfire_grace: self.inner.misfire_grace,
                running: Arc::new(AtomicUsize::new(0)),
            },
        );
        drop(jobs);

        self.inner.wakeup.notify_one();
        Ok(job_id)
    }

    /// Remove a job; firings already running are left to finish
    pub fn remove_job(&self, job_id: &str) -> bool {
        let removed = self.inner.jobs.lock().remove(job_id).is_some();
        if removed {
            debug!("Removed job '{}'", job_id);
            self.inner.wakeup.notify_one();
        }
        removed
    }

    pub fn pause_job(&self, job_id: &str) -> bool {
        let mut jobs = self.inner.jobs.lock();
        match jobs.get_mut(job_id) {
            Some(job) => {
                job.paused = true;
                info!("Paused job '{}'", job_id);
                true
            }
            None => false,
        }
    }

    /// Resume a paused job, recomputing its next run from now
    pub fn resume_job(&self, job_id: &str) -> bool {
        let mut jobs = self.inner.jobs.lock();
        let Some(job) = jobs.get_mut(job_id) else {
            return false;
        };
        if job.paused {
            job.paused = false;
            job.next_run = match job.trigger {
                // A one-shot keeps its time and misfires if it already passed
                Trigger::Date(at) => Some(at),
                _ => job.trigger.first_run(Utc::now(), self.inner.timezone),
            };
            info!("Resumed job '{}', next run at {:?}", job_id, job.next_run);
        }
        drop(jobs);
        self.inner.wakeup.notify_one();
        true
    }

    pub fn contains_job(&self, job_id: &str) -> bool {
        self.inner.jobs.lock().contains_key(job_id)
    }

    pub fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        self.inner.jobs.lock().get(job_id).map(JobEntry::info)
    }

    pub fn get_jobs(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self.inner.jobs.lock().values().map(JobEntry::info).collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Spawn the firing loop; calling it on a running scheduler does nothing
    #[instrument(skip(self))]
    pub fn start(&self) {
        let mut runner = self.inner.runner.lock();
        if runner.is_some() {
            debug!("Scheduler already running");
            return;
        }

        let token = CancellationToken::new();
        let inner = self.inner.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { inner.run(loop_token).await });
        *runner = Some((token, handle));

        info!(
            "✓ Scheduler started ({} jobs, timezone {})",
            self.inner.jobs.lock().len(),
            self.inner.timezone
        );
    }

    /// Stop the firing loop. Registered jobs are kept; running firings finish
    /// on their own.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let runner = self.inner.runner.lock().take();
        if let Some((token, handle)) = runner {
            token.cancel();
            if let Err(e) = handle.await {
                error!("Scheduler loop ended abnormally: {}", e);
            }
            info!("Scheduler stopped");
        }
    }
}

impl SchedulerInner {
    async fn run(&self, token: CancellationToken) {
        loop {
            let sleep_for = self.time_until_next_run();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.wakeup.notified() => {}
                _ = tokio::time::sleep(sleep_for) => {}
            }
            if token.is_cancelled() {
                break;
            }
            self.process_due_jobs(Utc::now());
        }
    }

    fn time_until_next_run(&self) -> Duration {
        let max_sleep = Duration::from_secs(MAX_IDLE_SLEEP_SECONDS);
        let now = Utc::now();
        self.jobs
            .lock()
            .values()
            .filter(|job| !job.paused)
            .filter_map(|job| job.next_run)
            .min()
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
            .map_or(max_sleep, |wait| wait.min(max_sleep))
    }

    /// Fire every job that is due at `now`. Spawning happens under the jobs
    /// lock so a concurrent `remove_job` either wins or sees the firing.
    fn process_due_jobs(&self, now: DateTime<Utc>) {
        let mut jobs = self.jobs.lock();
        let mut exhausted = Vec::new();

        for job in jobs.values_mut() {
            if job.paused {
                continue;
            }
            let Some(next_run) = job.next_run else {
                continue;
            };
            if next_run > now {
                continue;
            }

            let plan = plan_due(&job.trigger, next_run, now, job.misfire_grace, self.timezone);

            if plan.misfired {
                warn!(
                    "Run time of job '{}' was missed by {}s, skipping",
                    job.id,
                    (now - plan.run_time).num_seconds()
                );
            } else if job.running.load(Ordering::SeqCst) >= job.max_instances {
                warn!(
                    "Execution of job '{}' skipped: maximum number of running instances reached ({})",
                    job.id, job.max_instances
                );
            } else {
                if plan.coalesced > 1 {
                    debug!("Coalescing {} missed runs of job '{}'", plan.coalesced, job.id);
                }
                spawn_firing(job);
            }

            job.next_run = plan.next;
            if plan.next.is_none() {
                exhausted.push(job.id.clone());
            }
        }

        for job_id in exhausted {
            jobs.remove(&job_id);
            debug!("Removed job '{}' after its final run", job_id);
        }
    }
}

fn spawn_firing(job: &JobEntry) {
    job.running.fetch_add(1, Ordering::SeqCst);
    let guard = RunningGuard(job.running.clone());
    let future = job.func.call();
    let job_id = job.id.clone();

    tokio::spawn(async move {
        let _guard = guard;
        if AssertUnwindSafe(future).catch_unwind().await.is_err() {
            error!("Job '{}' panicked", job_id);
        }
    });
}
