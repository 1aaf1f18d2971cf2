//! Weekly vote windows and recurring weekly instants.
//!
//! A vote cycle is the local calendar week (Sunday 00:00 to the next Sunday
//! 00:00) containing a given instant. Once the week's lock day has passed the
//! cycle rolls forward to the following week, so the days after a lock always
//! collect votes for the next showing.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{AppError, AppResult};

/// Half-open `[start, end)` interval of one voting cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekWindow {
    /// First instant of the cycle (inclusive).
    pub start: DateTime<Utc>,
    /// First instant after the cycle (exclusive).
    pub end: DateTime<Utc>,
}

impl WeekWindow {
    /// Whether `instant` falls inside this window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Maps instants to vote windows for a fixed timezone and lock day.
#[derive(Debug, Clone, Copy)]
pub struct WindowPolicy {
    tz: Tz,
    lock_day: Weekday,
}

impl WindowPolicy {
    /// Create a policy for the given timezone and lock weekday.
    #[must_use]
    pub const fn new(tz: Tz, lock_day: Weekday) -> Self {
        Self { tz, lock_day }
    }

    /// Timezone the calendar week is computed in.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.tz
    }

    /// Returns the vote window active at `instant`.
    #[must_use]
    pub fn window_at(&self, instant: DateTime<Utc>) -> WeekWindow {
        let local = instant.with_timezone(&self.tz);
        let mut date = local.date_naive();
        if local.weekday().num_days_from_sunday() > self.lock_day.num_days_from_sunday() {
            date += TimeDelta::days(7);
        }

        let sunday = start_of_week(date);
        WeekWindow {
            start: local_to_utc(self.tz, sunday.and_time(NaiveTime::default())),
            end: local_to_utc(self.tz, (sunday + TimeDelta::days(7)).and_time(NaiveTime::default())),
        }
    }
}

/// A weekday plus local wall-clock time that recurs every week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySchedule {
    weekday: Weekday,
    time: NaiveTime,
    tz: Tz,
}

impl WeeklySchedule {
    /// Build a schedule, rejecting out-of-range hours and minutes.
    pub fn new(weekday: Weekday, hour: u32, minute: u32, tz: Tz) -> AppResult<Self> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            AppError::Config(format!("Invalid weekly time {hour:02}:{minute:02}"))
        })?;
        Ok(Self { weekday, time, tz })
    }

    /// Weekday the schedule fires on.
    #[must_use]
    pub const fn weekday(&self) -> Weekday {
        self.weekday
    }

    /// Next occurrence strictly after `instant`.
    #[must_use]
    pub fn next_after(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local_date = instant.with_timezone(&self.tz).date_naive();
        let day = start_of_week(local_date)
            + TimeDelta::days(i64::from(self.weekday.num_days_from_sunday()));

        let candidate = local_to_utc(self.tz, day.and_time(self.time));
        if candidate > instant {
            candidate
        } else {
            local_to_utc(self.tz, (day + TimeDelta::days(7)).and_time(self.time))
        }
    }
}

fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - TimeDelta::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// Resolve a local wall-clock time, taking the earlier instant on a DST fold
/// and skipping forward over a DST gap.
fn local_to_utc(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => tz
            .from_local_datetime(&(naive + TimeDelta::hours(1)))
            .earliest()
            .map_or_else(|| Utc.from_utc_datetime(&naive), |dt| dt.with_timezone(&Utc)),
    }
}

/// Parse an IANA timezone name such as `America/Denver`.
pub fn parse_timezone(name: &str) -> AppResult<Tz> {
    name.parse::<Tz>()
        .map_err(|e| AppError::Config(format!("Invalid timezone {name}: {e}")))
}
