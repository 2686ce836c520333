//! Recurring job driver.
//!
//! One control loop polls the local wall clock and runs due jobs strictly one
//! after another, so the article store is never touched by two jobs at once.
//!
//! # Jobs
//!
//! | Job | Trigger | Action |
//! |-----|---------|--------|
//! | `daily-collection` | every day at `daily_at` | collect all categories into the store |
//! | `weekly-digest` | `weekly_day` at `weekly_at` | compose, send, clear on success |
//!
//! A collection pass also runs once at startup, before the first poll.
//!
//! # Job states
//!
//! ```text
//! Idle ──(next_run ≤ now)──▶ Due ──▶ Running ──▶ Idle (next_run moved forward)
//! ```
//!
//! A job's next run is always computed strictly after the poll instant that
//! started it, so it cannot become due again within the same poll.

use crate::config::ScheduleSettings;
use crate::fetch::PageFetcher;
use crate::mailer::Mailer;
use crate::pipeline::PipelineContext;
use chrono::{Datelike, Duration, Local, NaiveDateTime, NaiveTime, Weekday};
use std::future::Future;
use std::time::Duration as StdDuration;
use tokio::time::sleep;
use tracing::{info, instrument};

/// When a job becomes eligible to run, in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Daily { at: NaiveTime },
    Weekly { day: Weekday, at: NaiveTime },
}

impl Trigger {
    /// First trigger instant strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        match *self {
            Trigger::Daily { at } => {
                let today = now.date().and_time(at);
                if today > now {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            Trigger::Weekly { day, at } => {
                let ahead = (7 + day.num_days_from_monday() as i64
                    - now.weekday().num_days_from_monday() as i64)
                    % 7;
                let candidate = (now.date() + Duration::days(ahead)).and_time(at);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    DailyCollection,
    WeeklyDigest,
}

impl JobKind {
    pub fn name(self) -> &'static str {
        match self {
            JobKind::DailyCollection => "daily-collection",
            JobKind::WeeklyDigest => "weekly-digest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Due,
    Running,
}

#[derive(Debug, Clone)]
pub struct ScheduledJob {
    kind: JobKind,
    trigger: Trigger,
    next_run: NaiveDateTime,
    state: JobState,
}

impl ScheduledJob {
    pub fn new(kind: JobKind, trigger: Trigger, now: NaiveDateTime) -> Self {
        Self {
            kind,
            trigger,
            next_run: trigger.next_after(now),
            state: JobState::Idle,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn next_run(&self) -> NaiveDateTime {
        self.next_run
    }

    pub fn state(&self) -> JobState {
        self.state
    }
}

#[derive(Debug)]
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    poll_interval: StdDuration,
}

impl Scheduler {
    /// Register the daily collection and weekly digest jobs, in that order.
    pub fn new(settings: &ScheduleSettings, now: NaiveDateTime) -> Self {
        let jobs = vec![
            ScheduledJob::new(
                JobKind::DailyCollection,
                Trigger::Daily { at: settings.daily_at },
                now,
            ),
            ScheduledJob::new(
                JobKind::WeeklyDigest,
                Trigger::Weekly {
                    day: settings.weekly_day,
                    at: settings.weekly_at,
                },
                now,
            ),
        ];
        Self {
            jobs,
            poll_interval: settings.poll_interval,
        }
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Run every job due at `now`, one at a time in registration order.
    ///
    /// Returns the jobs that ran. All of them have finished when this returns.
    pub async fn run_pending<F, M>(
        &mut self,
        ctx: &mut PipelineContext<F, M>,
        now: NaiveDateTime,
    ) -> Vec<JobKind>
    where
        F: PageFetcher,
        M: Mailer,
    {
        for job in &mut self.jobs {
            if job.state == JobState::Idle && job.next_run <= now {
                job.state = JobState::Due;
            }
        }

        let mut ran = Vec::new();
        for job in &mut self.jobs {
            if job.state != JobState::Due {
                continue;
            }
            job.state = JobState::Running;
            execute(job.kind, ctx).await;
            job.next_run = job.trigger.next_after(now);
            job.state = JobState::Idle;
            info!(job = job.kind.name(), next_run = %job.next_run, "Job finished");
            ran.push(job.kind);
        }
        ran
    }

    /// Run an immediate collection pass, then poll until `shutdown` resolves.
    ///
    /// Returns the context so the caller owns the store again on exit.
    #[instrument(level = "info", skip_all)]
    pub async fn run<F, M>(
        mut self,
        mut ctx: PipelineContext<F, M>,
        shutdown: impl Future<Output = ()>,
    ) -> PipelineContext<F, M>
    where
        F: PageFetcher,
        M: Mailer,
    {
        info!("Performing initial collection on startup");
        execute(JobKind::DailyCollection, &mut ctx).await;

        for job in self.jobs() {
            info!(job = job.kind().name(), next_run = %job.next_run(), state = ?job.state(), "Scheduled");
        }

        tokio::pin!(shutdown);
        loop {
            self.run_pending(&mut ctx, Local::now().naive_local()).await;

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopped");
                    break;
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
        ctx
    }
}

async fn execute<F, M>(kind: JobKind, ctx: &mut PipelineContext<F, M>)
where
    F: PageFetcher,
    M: Mailer,
{
    info!(job = kind.name(), "Running job");
    match kind {
        JobKind::DailyCollection => {
            ctx.run_collection().await;
        }
        JobKind::WeeklyDigest => ctx.run_digest_logged().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{EmptyDigestPolicy, SendRetryPolicy};
    use crate::pipeline::tests::{FakeMailer, POLSKA, SWIAT, browser, context};
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn settings(daily_at: NaiveTime, weekly_day: Weekday, weekly_at: NaiveTime) -> ScheduleSettings {
        ScheduleSettings {
            daily_at,
            weekly_day,
            weekly_at,
            poll_interval: StdDuration::from_secs(60),
        }
    }

    #[test]
    fn test_daily_trigger_later_today() {
        let trigger = Trigger::Daily { at: time(10, 0) };
        assert_eq!(trigger.next_after(at(2026, 10, 19, 9, 59)), at(2026, 10, 19, 10, 0));
    }

    #[test]
    fn test_daily_trigger_at_or_after_time_moves_to_tomorrow() {
        let trigger = Trigger::Daily { at: time(10, 0) };
        assert_eq!(trigger.next_after(at(2026, 10, 19, 10, 0)), at(2026, 10, 20, 10, 0));
        assert_eq!(trigger.next_after(at(2026, 10, 31, 23, 0)), at(2026, 11, 1, 10, 0));
    }

    #[test]
    fn test_weekly_trigger() {
        let trigger = Trigger::Weekly {
            day: Weekday::Sat,
            at: time(12, 0),
        };
        // 2026-10-19 is a Monday.
        assert_eq!(trigger.next_after(at(2026, 10, 19, 8, 0)), at(2026, 10, 24, 12, 0));
        assert_eq!(trigger.next_after(at(2026, 10, 24, 11, 0)), at(2026, 10, 24, 12, 0));
        assert_eq!(trigger.next_after(at(2026, 10, 24, 12, 0)), at(2026, 10, 31, 12, 0));
        assert_eq!(trigger.next_after(at(2026, 10, 25, 0, 0)), at(2026, 10, 31, 12, 0));
    }

    #[test]
    fn test_new_scheduler_jobs_start_idle() {
        let now = at(2026, 10, 19, 8, 0);
        let scheduler = Scheduler::new(&settings(time(10, 0), Weekday::Sat, time(12, 0)), now);

        let kinds: Vec<JobKind> = scheduler.jobs().iter().map(|j| j.kind()).collect();
        assert_eq!(kinds, [JobKind::DailyCollection, JobKind::WeeklyDigest]);
        assert!(scheduler.jobs().iter().all(|j| j.state() == JobState::Idle));
        assert_eq!(scheduler.jobs()[0].next_run(), at(2026, 10, 19, 10, 0));
    }

    #[tokio::test]
    async fn test_nothing_runs_before_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(
            &dir,
            browser(Some(POLSKA), Some(SWIAT)),
            FakeMailer::default(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextDailyTick,
        )
        .await;
        let mut scheduler =
            Scheduler::new(&settings(time(10, 0), Weekday::Sat, time(12, 0)), at(2026, 10, 19, 8, 0));

        let ran = scheduler.run_pending(&mut ctx, at(2026, 10, 19, 9, 59)).await;
        assert!(ran.is_empty());
        assert!(ctx.store.is_empty());
    }

    #[tokio::test]
    async fn test_coinciding_jobs_run_sequentially() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = FakeMailer::default();
        let mut ctx = context(
            &dir,
            browser(Some(POLSKA), Some(SWIAT)),
            mailer.clone(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextDailyTick,
        )
        .await;
        // Saturday 12:00 for both jobs.
        let mut scheduler =
            Scheduler::new(&settings(time(12, 0), Weekday::Sat, time(12, 0)), at(2026, 10, 24, 11, 0));

        let now = at(2026, 10, 24, 12, 0);
        let ran = scheduler.run_pending(&mut ctx, now).await;

        assert_eq!(ran, [JobKind::DailyCollection, JobKind::WeeklyDigest]);
        // Collection finished before the digest read the store.
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.article_count(), 5);
        assert!(ctx.store.is_empty());

        assert!(scheduler.jobs().iter().all(|j| j.state() == JobState::Idle));
        assert_eq!(scheduler.jobs()[0].next_run(), at(2026, 10, 25, 12, 0));
        assert_eq!(scheduler.jobs()[1].next_run(), at(2026, 10, 31, 12, 0));
    }

    #[tokio::test]
    async fn test_job_does_not_rerun_in_same_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(
            &dir,
            browser(Some(POLSKA), None),
            FakeMailer::default(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextDailyTick,
        )
        .await;
        let mut scheduler =
            Scheduler::new(&settings(time(10, 0), Weekday::Sat, time(12, 0)), at(2026, 10, 19, 8, 0));

        let first = scheduler.run_pending(&mut ctx, at(2026, 10, 19, 10, 0)).await;
        let second = scheduler.run_pending(&mut ctx, at(2026, 10, 19, 10, 1)).await;

        assert_eq!(first, [JobKind::DailyCollection]);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_run_collects_on_startup_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            &dir,
            browser(Some(POLSKA), Some(SWIAT)),
            FakeMailer::default(),
            EmptyDigestPolicy::Send,
            SendRetryPolicy::NextDailyTick,
        )
        .await;
        let now = Local::now().naive_local();
        let scheduler = Scheduler::new(&settings(time(10, 0), Weekday::Sat, time(12, 0)), now);

        let ctx = scheduler.run(ctx, std::future::ready(())).await;
        assert_eq!(ctx.store.len(), 5);
    }
}
