use super::cron::CronSchedule;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cron firings walked one by one before a long gap is treated as a misfire
const MAX_COALESCED_CRON_RUNS: u64 = 10_000;

/// Named async callback fired by the scheduler
#[derive(Clone)]
pub struct JobFn {
    name: String,
    func: Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>,
}

impl JobFn {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move || f().boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self) -> BoxFuture<'static, ()> {
        (self.func)()
    }
}

impl fmt::Debug for JobFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobFn").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub enum Trigger {
    Interval(Duration),
    Cron(CronSchedule),
    Date(DateTime<Utc>),
}

impl Trigger {
    /// First firing for a job registered (or resumed) at `now`
    pub fn first_run(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Interval(every) => Some(now + to_chrono(*every)),
            Trigger::Cron(schedule) => schedule.next_after(now, tz),
            Trigger::Date(at) => Some(*at),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Interval(every) => {
                let secs = every.as_secs();
                write!(
                    f,
                    "interval[{}:{:02}:{:02}]",
                    secs / 3600,
                    (secs % 3600) / 60,
                    secs % 60
                )
            }
            Trigger::Cron(schedule) => write!(f, "{}", schedule),
            Trigger::Date(at) => write!(f, "date[{}]", at.to_rfc3339()),
        }
    }
}

/// Registered job as stored by the scheduler
pub(crate) struct JobEntry {
    pub id: String,
    pub func: JobFn,
    pub trigger: Trigger,
    pub next_run: Option<DateTime<Utc>>,
    pub paused: bool,
    pub max_instances: usize,
    pub misfire_grace: Duration,
    pub running: Arc<AtomicUsize>,
}

impl JobEntry {
    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id.clone(),
            name: self.func.name().to_string(),
            trigger: self.trigger.to_string(),
            next_run_time: if self.paused { None } else { self.next_run },
            paused: self.paused,
            running: self.running.load(Ordering::SeqCst),
        }
    }
}

/// Public view of a scheduled job
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub trigger: String,
    pub next_run_time: Option<DateTime<Utc>>,
    pub paused: bool,
    pub running: usize,
}

/// What to do with a job whose next run time has passed
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DuePlan {
    /// Latest scheduled time not after `now`; the one that runs
    pub run_time: DateTime<Utc>,
    /// Firings folded into this single run
    pub coalesced: u64,
    /// True when `run_time` is older than the grace window
    pub misfired: bool,
    /// Next firing, `None` once the trigger is exhausted
    pub next: Option<DateTime<Utc>>,
}

pub(crate) fn plan_due(
    trigger: &Trigger,
    next_run: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
    tz: Tz,
) -> DuePlan {
    let (run_time, coalesced, next) = match trigger {
        Trigger::Interval(every) => {
            let step_ms = (every.as_millis() as i64).max(1);
            let behind_ms = (now - next_run).num_milliseconds().max(0);
            let skipped = behind_ms / step_ms;
            let run_time = next_run + ChronoDuration::milliseconds(skipped * step_ms);
            (
                run_time,
                skipped as u64 + 1,
                Some(run_time + ChronoDuration::milliseconds(step_ms)),
            )
        }
        Trigger::Cron(schedule) => {
            let mut run_time = next_run;
            let mut coalesced = 1;
            let mut gave_up = false;
            while let Some(candidate) = schedule.next_after(run_time, tz) {
                if candidate > now {
                    break;
                }
                run_time = candidate;
                coalesced += 1;
                if coalesced > MAX_COALESCED_CRON_RUNS {
                    gave_up = true;
                    break;
                }
            }
            if gave_up {
                // Too far behind to tell which firing was the latest
                run_time = next_run;
            }
            (run_time, coalesced, schedule.next_after(now, tz))
        }
        Trigger::Date(at) => (*at, 1, None),
    };

    // The loop always wakes slightly after the due instant
    let lateness = now - run_time;
    DuePlan {
        run_time,
        coalesced,
        misfired: lateness >= ChronoDuration::seconds(1) && lateness > to_chrono(grace),
        next,
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::weeks(52 * 100))
}

/// Decrements a job's running counter when the firing finishes or panics
pub(crate) struct RunningGuard(pub Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
