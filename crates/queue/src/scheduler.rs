//! Weekly timers.
//!
//! Each timer sleeps until the next occurrence of its [`WeeklySchedule`], runs
//! its job, and recomputes. Time is read through a [`Clock`] so tests can
//! drive the schedule.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use movienight_common::{AppResult, Clock, SharedClock, WeeklySchedule};
use movienight_core::{LockOutcome, LockService, WeeklyDigestService};

/// A job run once per week.
#[async_trait]
pub trait WeeklyJob: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn run(&self) -> AppResult<()>;
}

/// Locks the current week's leader.
pub struct LockJob {
    service: LockService,
}

impl LockJob {
    #[must_use]
    pub const fn new(service: LockService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl WeeklyJob for LockJob {
    fn name(&self) -> &'static str {
        "lock"
    }

    async fn run(&self) -> AppResult<()> {
        let result = self.service.lock_current_week().await?;
        match &result.outcome {
            LockOutcome::Locked { winner } => {
                tracing::info!(showtime_id = winner.showtime.id, "Weekly lock applied");
            }
            LockOutcome::AlreadyLocked { winner } => {
                tracing::info!(showtime_id = winner.showtime.id, "Week was already locked");
            }
            LockOutcome::NoShowtimes => {
                tracing::warn!("Nothing to lock this week");
            }
        }
        Ok(())
    }
}

/// Sends the weekly standings email.
pub struct WeeklyDigestJob {
    service: WeeklyDigestService,
}

impl WeeklyDigestJob {
    #[must_use]
    pub const fn new(service: WeeklyDigestService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl WeeklyJob for WeeklyDigestJob {
    fn name(&self) -> &'static str {
        "weekly_digest"
    }

    async fn run(&self) -> AppResult<()> {
        self.service.send_weekly_digest().await.map(|_| ())
    }
}

/// Next fire time after `now` and how long to sleep until it.
#[must_use]
pub fn next_run(schedule: &WeeklySchedule, now: DateTime<Utc>) -> (DateTime<Utc>, Duration) {
    let next = schedule.next_after(now);
    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
    (next, wait)
}

/// Run `job` on `schedule` forever.
pub async fn run_weekly_job(job: Arc<dyn WeeklyJob>, schedule: WeeklySchedule, clock: SharedClock) {
    let mut next = next_run(&schedule, clock.now()).0;
    tracing::info!(job = job.name(), next_run = %next, "Weekly job scheduled");

    loop {
        let now = clock.now();
        if now < next {
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
            // The wall clock may lag the timer; recheck before running.
            continue;
        }

        match job.run().await {
            Ok(()) => tracing::info!(job = job.name(), "Weekly job finished"),
            Err(e) => tracing::error!(job = job.name(), error = %e, "Weekly job failed"),
        }

        next = next_run(&schedule, clock.now()).0;
        tracing::info!(job = job.name(), next_run = %next, "Weekly job scheduled");
    }
}

/// Spawn a weekly timer task.
pub fn spawn_weekly_job(
    job: Arc<dyn WeeklyJob>,
    schedule: WeeklySchedule,
    clock: SharedClock,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_weekly_job(job, schedule, clock))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Weekday};
    use movienight_common::ManualClock;
    use movienight_core::testing::{Harness, sample_showtime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob(AtomicUsize);

    #[async_trait]
    impl WeeklyJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self) -> AppResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn lock_schedule() -> WeeklySchedule {
        WeeklySchedule::new(Weekday::Tue, 16, 30, Harness::TIMEZONE).unwrap()
    }

    fn denver(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Harness::TIMEZONE
            .with_ymd_and_hms(2026, 10, d, h, m, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_next_run_waits_until_lock_time() {
        let (next, wait) = next_run(&lock_schedule(), denver(13, 16, 0));
        assert_eq!(next, denver(13, 16, 30));
        assert_eq!(wait, Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_next_run_after_fire_is_next_week() {
        let (next, _) = next_run(&lock_schedule(), denver(13, 16, 30));
        assert_eq!(next, denver(20, 16, 30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_runs_once_at_schedule() {
        let clock = Arc::new(ManualClock::new(denver(13, 16, 29)));
        let job = Arc::new(CountingJob(AtomicUsize::new(0)));

        let handle = spawn_weekly_job(job.clone(), lock_schedule(), clock.clone());
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(job.0.load(Ordering::SeqCst), 0);

        clock.set(denver(13, 16, 30) + TimeDelta::seconds(1));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(job.0.load(Ordering::SeqCst), 1);

        // Nothing more until next week.
        clock.advance(TimeDelta::days(1));
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(job.0.load(Ordering::SeqCst), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_lock_job_locks_current_week() {
        let harness = Harness::new();
        harness
            .store
            .add_showtime(sample_showtime(1, "Heat", harness.now() + TimeDelta::hours(30)));
        harness.store.seed_vote(5, 1, 2);

        let job = LockJob::new(harness.lock_service());
        job.run().await.unwrap();
        job.run().await.unwrap();

        assert_eq!(harness.ranked().await[0].votes, 1002);
    }
}
