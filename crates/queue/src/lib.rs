//! Background tasks for movienight.
//!
//! - **Scheduler**: weekly timers for the lock and the digest email
//! - **Activity**: ingest and drain loops around the activity coalescer

pub mod activity;
pub mod scheduler;

pub use activity::{ACTIVITY_STANDINGS, ActivityDrain, run_activity_ingest};
pub use scheduler::{
    LockJob, WeeklyDigestJob, WeeklyJob, next_run, run_weekly_job, spawn_weekly_job,
};
