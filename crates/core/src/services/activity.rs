//! Debounced vote activity.
//!
//! Vote handlers hand [`ActivityEvent`]s to a bounded queue and return
//! immediately. An ingest loop moves them into the [`ActivityCoalescer`], which
//! keeps at most one pending activity per user. Every new event for a user
//! replaces the pending one and pushes its deadline out again, so a user
//! fiddling with their votes produces one notification once they settle.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use movienight_common::SharedClock;
use movienight_db::entities::user;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::ranking::ShowtimeSummary;

/// Quiet period, in seconds, after a user's last vote before it is announced.
pub const ACTIVITY_DEBOUNCE_SECS: i64 = 90;

/// Longest the drain loop sleeps between scans.
pub const FALLBACK_POLL: Duration = Duration::from_secs(30);

/// Capacity of the queue between vote handlers and the coalescer.
pub const ACTIVITY_QUEUE_CAPACITY: usize = 256;

/// Public view of a user, safe to broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: i32,
    pub name: String,
}

impl From<&user::Model> for UserSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
        }
    }
}

/// One vote of a submission, with the showtime it was cast on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityVote {
    #[serde(flatten)]
    pub showtime: ShowtimeSummary,
    pub vote: i32,
}

/// A successful vote submission, as reported by the vote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    pub user: UserSummary,
    pub votes: Vec<ActivityVote>,
}

/// A pending activity waiting out its debounce period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub user: UserSummary,
    pub votes: Vec<ActivityVote>,
    pub due_at: DateTime<Utc>,
}

/// Per-user debounce queue.
pub struct ActivityCoalescer {
    pending: Mutex<HashMap<i32, Activity>>,
    clock: SharedClock,
}

impl ActivityCoalescer {
    /// Create an empty coalescer.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Insert or replace the pending activity for the event's user.
    ///
    /// Returns the new deadline.
    pub fn record(&self, event: ActivityEvent) -> DateTime<Utc> {
        let due_at = self.clock.now() + TimeDelta::seconds(ACTIVITY_DEBOUNCE_SECS);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

        let replaced = pending
            .insert(
                event.user.id,
                Activity {
                    user: event.user,
                    votes: event.votes,
                    due_at,
                },
            )
            .is_some();

        tracing::debug!(pending = pending.len(), replaced, %due_at, "Recorded vote activity");
        due_at
    }

    /// Remove and return one activity whose deadline has passed, oldest first.
    pub fn pop_due(&self) -> Option<Activity> {
        let now = self.clock.now();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

        let user_id = pending
            .values()
            .filter(|a| a.due_at <= now)
            .min_by_key(|a| a.due_at)
            .map(|a| a.user.id)?;

        pending.remove(&user_id)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|a| a.due_at)
            .min()
    }

    /// How long the drain loop should sleep before scanning again.
    ///
    /// The time until the earliest deadline, never longer than [`FALLBACK_POLL`].
    pub fn wake_after(&self) -> Duration {
        self.next_deadline().map_or(FALLBACK_POLL, |deadline| {
            (deadline - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(FALLBACK_POLL)
        })
    }

    /// Number of users with a pending activity.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Sending half of the activity queue.
///
/// Never blocks: when the queue is full the newest event is dropped.
#[derive(Clone)]
pub struct ActivitySender {
    tx: mpsc::Sender<ActivityEvent>,
}

impl ActivitySender {
    /// Queue an event. Returns whether it was accepted.
    pub fn send(&self, event: ActivityEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    user_id = event.user.id,
                    "Activity queue full, dropping vote activity"
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(
                    user_id = event.user.id,
                    "Activity queue closed, dropping vote activity"
                );
                false
            }
        }
    }
}

/// Create the bounded queue between vote handlers and the ingest loop.
#[must_use]
pub fn activity_channel(capacity: usize) -> (ActivitySender, mpsc::Receiver<ActivityEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ActivitySender { tx }, rx)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use movienight_common::ManualClock;
    use std::sync::Arc;

    fn event(user_id: i32, showtime_id: i32, vote: i32) -> ActivityEvent {
        ActivityEvent {
            user: UserSummary {
                id: user_id,
                name: format!("User {user_id}"),
            },
            votes: vec![ActivityVote {
                showtime: ShowtimeSummary {
                    id: showtime_id,
                    movie_id: 1,
                    movie_title: "Heat".to_string(),
                    poster: None,
                    starts_at: Utc.with_ymd_and_hms(2026, 10, 16, 19, 0, 0).unwrap(),
                    screen: "1".to_string(),
                    location: "Downtown".to_string(),
                },
                vote,
            }],
        }
    }

    fn setup() -> (Arc<ManualClock>, ActivityCoalescer) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 12, 12, 0, 0).unwrap(),
        ));
        let coalescer = ActivityCoalescer::new(clock.clone());
        (clock, coalescer)
    }

    #[test]
    fn test_not_due_before_debounce() {
        let (clock, coalescer) = setup();
        coalescer.record(event(1, 10, 3));

        clock.advance(TimeDelta::seconds(89));
        assert!(coalescer.pop_due().is_none());

        clock.advance(TimeDelta::seconds(1));
        assert!(coalescer.pop_due().is_some());
        assert!(coalescer.pop_due().is_none());
    }

    #[test]
    fn test_later_vote_replaces_and_resets() {
        let (clock, coalescer) = setup();
        coalescer.record(event(1, 10, 3));

        clock.advance(TimeDelta::seconds(10));
        coalescer.record(event(1, 11, 2));
        assert_eq!(coalescer.pending_count(), 1);

        // t0 + 99s: the first deadline has passed but was replaced.
        clock.advance(TimeDelta::seconds(89));
        assert!(coalescer.pop_due().is_none());

        // t0 + 100s
        clock.advance(TimeDelta::seconds(1));
        let activity = coalescer.pop_due().unwrap();
        assert_eq!(activity.votes[0].showtime.id, 11);
        assert_eq!(activity.votes[0].vote, 2);
        assert_eq!(coalescer.pending_count(), 0);
    }

    #[test]
    fn test_users_are_independent() {
        let (clock, coalescer) = setup();
        coalescer.record(event(1, 10, 3));
        clock.advance(TimeDelta::seconds(30));
        coalescer.record(event(2, 10, 1));

        clock.advance(TimeDelta::seconds(60));
        assert_eq!(coalescer.pop_due().unwrap().user.id, 1);
        assert!(coalescer.pop_due().is_none());

        clock.advance(TimeDelta::seconds(30));
        assert_eq!(coalescer.pop_due().unwrap().user.id, 2);
    }

    #[test]
    fn test_pop_due_returns_oldest_first() {
        let (clock, coalescer) = setup();
        coalescer.record(event(1, 10, 3));
        clock.advance(TimeDelta::seconds(5));
        coalescer.record(event(2, 10, 1));

        clock.advance(TimeDelta::seconds(200));
        assert_eq!(coalescer.pop_due().unwrap().user.id, 1);
        assert_eq!(coalescer.pop_due().unwrap().user.id, 2);
    }

    #[test]
    fn test_wake_after_uses_earliest_deadline() {
        let (clock, coalescer) = setup();
        assert_eq!(coalescer.wake_after(), FALLBACK_POLL);

        coalescer.record(event(1, 10, 3));
        clock.advance(TimeDelta::seconds(70));
        // A later deadline for another user must not hide the closer one.
        coalescer.record(event(2, 10, 1));

        assert_eq!(coalescer.wake_after(), Duration::from_secs(20));

        clock.advance(TimeDelta::seconds(30));
        assert_eq!(coalescer.wake_after(), Duration::ZERO);
    }

    #[test]
    fn test_wake_after_capped_by_fallback() {
        let (_clock, coalescer) = setup();
        coalescer.record(event(1, 10, 3));
        assert_eq!(coalescer.wake_after(), FALLBACK_POLL);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let (tx, mut rx) = activity_channel(1);

        assert!(tx.send(event(1, 10, 3)));
        assert!(!tx.send(event(2, 10, 1)));

        assert_eq!(rx.recv().await.unwrap().user.id, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let (tx, rx) = activity_channel(4);
        drop(rx);
        assert!(!tx.send(event(1, 10, 3)));
    }
}
