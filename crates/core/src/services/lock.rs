//! Weekly lock.
//!
//! Locking lifts the current leader by [`LOCK_SENTINEL`] with a vote from the
//! system user, so nothing cast later in the week can overtake it. Locking a
//! window twice is a no-op.

use std::sync::Arc;

use movienight_common::{AppResult, SharedClock, WeekWindow, WindowPolicy};

use super::notification::{DispatchTasks, NotificationDispatcher};
use super::ranking::{LOCK_SENTINEL, ShowtimeTally};
use super::store::VoteStore;

/// What a lock attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The leader was locked by this call.
    Locked { winner: ShowtimeTally },
    /// The leader was already locked; nothing changed.
    AlreadyLocked { winner: ShowtimeTally },
    /// The window has no rankable showtimes.
    NoShowtimes,
}

#[derive(Debug)]
pub struct LockResult {
    pub outcome: LockOutcome,
    /// Lock notifications, empty unless this call locked.
    pub notifications: DispatchTasks,
}

#[derive(Clone)]
pub struct LockService {
    store: Arc<dyn VoteStore>,
    dispatcher: NotificationDispatcher,
    policy: WindowPolicy,
    clock: SharedClock,
}

impl LockService {
    #[must_use]
    pub fn new(
        store: Arc<dyn VoteStore>,
        dispatcher: NotificationDispatcher,
        policy: WindowPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            dispatcher,
            policy,
            clock,
        }
    }

    /// Lock the window votes are currently collected for.
    pub async fn lock_current_week(&self) -> AppResult<LockResult> {
        let window = self.policy.window_at(self.clock.now());
        self.lock_window(&window).await
    }

    pub async fn lock_window(&self, window: &WeekWindow) -> AppResult<LockResult> {
        let leader = self
            .store
            .ranked_showtimes(window, Some(1), None)
            .await?
            .into_iter()
            .next();

        let Some(leader) = leader else {
            tracing::info!(window_start = %window.start, "No showtimes to lock");
            return Ok(LockResult {
                outcome: LockOutcome::NoShowtimes,
                notifications: DispatchTasks::default(),
            });
        };

        if leader.is_locked() {
            tracing::info!(showtime_id = leader.showtime.id, "Vote already locked");
            return Ok(LockResult {
                outcome: LockOutcome::AlreadyLocked { winner: leader },
                notifications: DispatchTasks::default(),
            });
        }

        if !self.store.lock_winner(window, leader.showtime.id).await? {
            // Another lock landed between the read and the write.
            let winner = self
                .store
                .ranked_showtimes(window, Some(1), None)
                .await?
                .into_iter()
                .next()
                .unwrap_or(leader);
            tracing::info!(showtime_id = winner.showtime.id, "Vote already locked");
            return Ok(LockResult {
                outcome: LockOutcome::AlreadyLocked { winner },
                notifications: DispatchTasks::default(),
            });
        }

        let winner = ShowtimeTally {
            votes: leader.votes + LOCK_SENTINEL,
            ..leader
        };
        tracing::info!(
            showtime_id = winner.showtime.id,
            votes = winner.votes,
            "Locked movie night"
        );

        let notifications = self.dispatcher.dispatch_lock(winner.clone(), *window);

        Ok(LockResult {
            outcome: LockOutcome::Locked { winner },
            notifications,
        })
    }
}
