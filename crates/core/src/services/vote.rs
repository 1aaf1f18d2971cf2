//! Vote service.
//!
//! A submission replaces all of the user's votes in the active window at once.
//! It is validated in full before anything is written, and after a successful
//! write the new votes are queued as activity for the debounced notifier.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use movienight_common::{AppError, AppResult, SharedClock, WeekWindow, WindowPolicy};
use movienight_db::entities::user;
use serde::{Deserialize, Serialize};

use super::activity::{ActivityEvent, ActivitySender, ActivityVote, UserSummary};
use super::ranking::{ShowtimeSummary, ShowtimeTally};
use super::store::VoteStore;

/// Largest single vote.
pub const MAX_VOTE: i32 = 3;

/// Smallest single vote (a veto).
pub const MIN_VOTE: i32 = -1;

/// Cap on the sum of the positive votes of one submission.
pub const MAX_POSITIVE_SUM: i32 = 6;

/// One vote of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteInput {
    pub showtime_id: i32,
    pub vote: i32,
}

/// Check a submission's values without touching storage.
pub fn validate_votes(votes: &[VoteInput]) -> AppResult<()> {
    let mut seen = HashSet::with_capacity(votes.len());
    let mut positive_sum = 0;

    for v in votes {
        if v.vote > MAX_VOTE {
            return Err(AppError::Validation(format!(
                "No vote can be greater than {MAX_VOTE}"
            )));
        }
        if v.vote < MIN_VOTE {
            return Err(AppError::Validation(format!(
                "No vote can be less than {MIN_VOTE}"
            )));
        }
        if !seen.insert(v.showtime_id) {
            return Err(AppError::Validation(format!(
                "Showtime {} appears more than once",
                v.showtime_id
            )));
        }
        if v.vote > 0 {
            positive_sum += v.vote;
        }
    }

    if positive_sum > MAX_POSITIVE_SUM {
        return Err(AppError::Validation(format!(
            "Sum of all votes can't exceed {MAX_POSITIVE_SUM}"
        )));
    }

    Ok(())
}

/// Vote submission and ranked listings.
#[derive(Clone)]
pub struct VoteService {
    store: Arc<dyn VoteStore>,
    activity: ActivitySender,
    policy: WindowPolicy,
    clock: SharedClock,
}

impl VoteService {
    #[must_use]
    pub fn new(
        store: Arc<dyn VoteStore>,
        activity: ActivitySender,
        policy: WindowPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            activity,
            policy,
            clock,
        }
    }

    /// The window votes are currently being collected for.
    #[must_use]
    pub fn current_window(&self) -> WeekWindow {
        self.policy.window_at(self.clock.now())
    }

    /// Replace `user`'s votes in the current window.
    pub async fn submit_votes(&self, user: &user::Model, votes: &[VoteInput]) -> AppResult<()> {
        let window = self.current_window();
        self.submit_votes_in_window(user, &window, votes).await
    }

    /// Replace `user`'s votes in `window`.
    ///
    /// Rejects the whole batch if any value is out of range, the positive votes
    /// sum past the cap, or a showtime is not in the window. The store rejects a
    /// change to the user's vote on a locked showtime inside the same write.
    pub async fn submit_votes_in_window(
        &self,
        user: &user::Model,
        window: &WeekWindow,
        votes: &[VoteInput],
    ) -> AppResult<()> {
        validate_votes(votes)?;

        let ids: Vec<i32> = votes.iter().map(|v| v.showtime_id).collect();
        let showtimes: HashMap<i32, ShowtimeSummary> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .find_showtimes(window, &ids)
                .await?
                .into_iter()
                .map(|s| (s.id, s))
                .collect()
        };

        if let Some(missing) = ids.iter().find(|id| !showtimes.contains_key(*id)) {
            return Err(AppError::ShowtimeNotFound(missing.to_string()));
        }

        let pairs: Vec<(i32, i32)> = votes.iter().map(|v| (v.showtime_id, v.vote)).collect();
        self.store.replace_votes(user.id, window, &pairs).await?;

        tracing::info!(user_id = user.id, votes = votes.len(), "Votes replaced");

        let activity: Vec<ActivityVote> = votes
            .iter()
            .filter(|v| v.vote != 0)
            .filter_map(|v| {
                showtimes.get(&v.showtime_id).map(|s| ActivityVote {
                    showtime: s.clone(),
                    vote: v.vote,
                })
            })
            .collect();

        if !activity.is_empty() {
            self.activity.send(ActivityEvent {
                user: UserSummary::from(user),
                votes: activity,
            });
        }

        Ok(())
    }

    /// Ranked showtimes of the current window.
    pub async fn ranked_showtimes(
        &self,
        limit: Option<usize>,
        for_user: Option<i32>,
    ) -> AppResult<Vec<ShowtimeTally>> {
        let window = self.current_window();
        self.store.ranked_showtimes(&window, limit, for_user).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::activity::activity_channel;
    use crate::services::ranking::LOCK_SENTINEL;
    use crate::testing::{Harness, sample_showtime, sample_user};
    use chrono::TimeDelta;
    use movienight_db::entities::user::SYSTEM_USER_ID;

    fn vote(showtime_id: i32, vote: i32) -> VoteInput {
        VoteInput { showtime_id, vote }
    }

    fn seeded() -> Harness {
        let harness = Harness::new();
        for (id, title, hours) in [(1, "Heat", 30), (2, "Alien", 31), (3, "Ran", 32), (4, "Brazil", 33)] {
            harness
                .store
                .add_showtime(sample_showtime(id, title, harness.now() + TimeDelta::hours(hours)));
        }
        harness
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_votes(&[vote(1, 3), vote(2, -1), vote(3, 0)]).is_ok());

        let err = validate_votes(&[vote(1, 4)]).unwrap_err();
        assert_eq!(err.to_string(), "No vote can be greater than 3");

        let err = validate_votes(&[vote(1, -2)]).unwrap_err();
        assert_eq!(err.to_string(), "No vote can be less than -1");
    }

    #[test]
    fn test_validate_positive_sum_ignores_vetoes() {
        assert!(validate_votes(&[vote(1, 3), vote(2, 3), vote(3, -1), vote(4, -1)]).is_ok());

        let err = validate_votes(&[vote(1, 3), vote(2, 2), vote(3, -1), vote(4, 2)]).unwrap_err();
        assert_eq!(err.to_string(), "Sum of all votes can't exceed 6");
    }

    #[test]
    fn test_validate_duplicate_showtime() {
        assert!(matches!(
            validate_votes(&[vote(1, 1), vote(1, 2)]),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_batch_keeps_prior_votes() {
        let harness = seeded();
        let (service, _rx) = harness.vote_service();
        let alice = sample_user(1, "Alice");

        service
            .submit_votes(&alice, &[vote(1, 3), vote(2, 2), vote(3, -1)])
            .await
            .unwrap();

        let result = service
            .submit_votes(&alice, &[vote(1, 3), vote(2, 2), vote(3, -1), vote(4, 2)])
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let mut stored = harness.store.votes_of(1);
        stored.sort_unstable();
        assert_eq!(stored, vec![(1, 3), (2, 2), (3, -1)]);
    }

    #[tokio::test]
    async fn test_submission_round_trips_through_ranking() {
        let harness = seeded();
        let (service, _rx) = harness.vote_service();
        let alice = sample_user(1, "Alice");
        let votes = [vote(1, 1), vote(2, 3)];

        service.submit_votes(&alice, &votes).await.unwrap();
        service.submit_votes(&alice, &votes).await.unwrap();

        let ranked = service.ranked_showtimes(None, Some(1)).await.unwrap();
        let own: HashMap<i32, i32> = ranked
            .iter()
            .map(|t| (t.showtime.id, t.vote.unwrap()))
            .collect();
        assert_eq!(own[&1], 1);
        assert_eq!(own[&2], 3);
        assert_eq!(own[&3], 0);
        assert_eq!(ranked[0].showtime.id, 2);
    }

    #[tokio::test]
    async fn test_unknown_showtime_rejects_batch() {
        let harness = seeded();
        let (service, _rx) = harness.vote_service();

        let result = service
            .submit_votes(&sample_user(1, "Alice"), &[vote(1, 1), vote(99, 1)])
            .await;
        assert!(matches!(result, Err(AppError::ShowtimeNotFound(id)) if id == "99"));
        assert!(harness.store.votes_of(1).is_empty());
    }

    #[tokio::test]
    async fn test_showtime_outside_window_rejected() {
        let harness = seeded();
        harness.store.add_showtime(sample_showtime(
            9,
            "Next Week",
            harness.now() + TimeDelta::days(14),
        ));
        let (service, _rx) = harness.vote_service();

        let result = service.submit_votes(&sample_user(1, "Alice"), &[vote(9, 1)]).await;
        assert!(matches!(result, Err(AppError::ShowtimeNotFound(_))));
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_votes() {
        let harness = seeded();
        let (service, _rx) = harness.vote_service();
        let alice = sample_user(1, "Alice");
        service.submit_votes(&alice, &[vote(1, 2)]).await.unwrap();

        harness.store.set_failing_writes(true);
        let result = service.submit_votes(&alice, &[vote(2, 3)]).await;
        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(harness.store.votes_of(1), vec![(1, 2)]);
    }

    #[tokio::test]
    async fn test_success_queues_nonzero_votes_as_activity() {
        let harness = seeded();
        let (service, mut rx) = harness.vote_service();

        service
            .submit_votes(&sample_user(1, "Alice"), &[vote(1, 2), vote(2, 0)])
            .await
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.user.id, 1);
        assert_eq!(event.votes.len(), 1);
        assert_eq!(event.votes[0].showtime.movie_title, "Heat");
    }

    #[tokio::test]
    async fn test_failed_submission_queues_nothing() {
        let harness = seeded();
        let (service, mut rx) = harness.vote_service();

        let _ = service.submit_votes(&sample_user(1, "Alice"), &[vote(1, 5)]).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_locked_showtime_vote_cannot_change() {
        let harness = seeded();
        let (service, _rx) = harness.vote_service();
        let alice = sample_user(1, "Alice");
        let window = service.current_window();

        service.submit_votes(&alice, &[vote(1, 2)]).await.unwrap();
        harness
            .store
            .seed_vote(SYSTEM_USER_ID, 1, LOCK_SENTINEL);

        // Keeping the same vote on the locked showtime while moving others is fine.
        service
            .submit_votes_in_window(&alice, &window, &[vote(1, 2), vote(2, 3)])
            .await
            .unwrap();

        for changed in [vec![vote(1, 3)], vec![vote(2, 1)]] {
            let result = service.submit_votes_in_window(&alice, &window, &changed).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }

        let mut stored = harness.store.votes_of(1);
        stored.sort_unstable();
        assert_eq!(stored, vec![(1, 2), (2, 3)]);
    }

    #[tokio::test]
    async fn test_empty_submission_clears_votes() {
        let harness = seeded();
        let (tx, mut rx) = activity_channel(4);
        let service = harness.vote_service_with(tx);
        let alice = sample_user(1, "Alice");

        service.submit_votes(&alice, &[vote(1, 2)]).await.unwrap();
        let _ = rx.try_recv();

        service.submit_votes(&alice, &[]).await.unwrap();
        assert!(harness.store.votes_of(1).is_empty());
        assert!(rx.try_recv().is_err());
    }
}
