//! Weekly digest email.

use std::sync::Arc;

use movienight_common::{AppResult, SharedClock, WindowPolicy};
use movienight_db::repositories::NotificationPreference;

use super::email::{EmailSender, EmailTemplate};
use super::store::{UserDirectory, VoteStore};

/// Sends every weekly subscriber the standings of the active window.
#[derive(Clone)]
pub struct WeeklyDigestService {
    store: Arc<dyn VoteStore>,
    users: Arc<dyn UserDirectory>,
    email: Arc<dyn EmailSender>,
    policy: WindowPolicy,
    clock: SharedClock,
}

impl WeeklyDigestService {
    #[must_use]
    pub fn new(
        store: Arc<dyn VoteStore>,
        users: Arc<dyn UserDirectory>,
        email: Arc<dyn EmailSender>,
        policy: WindowPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            users,
            email,
            policy,
            clock,
        }
    }

    /// Send the digest. Returns how many emails went out; a failure for one
    /// recipient is logged and skipped.
    pub async fn send_weekly_digest(&self) -> AppResult<usize> {
        let window = self.policy.window_at(self.clock.now());
        let recipients = self
            .users
            .users_with_preference(NotificationPreference::Weekly)
            .await?;

        let mut sent = 0;
        for user in &recipients {
            let standings = match self
                .store
                .ranked_showtimes(&window, None, Some(user.id))
                .await
            {
                Ok(standings) => standings,
                Err(e) => {
                    tracing::warn!(error = %e, user_id = user.id, "Failed to load standings for digest");
                    continue;
                }
            };

            match self
                .email
                .send_template(user, &EmailTemplate::Weekly { standings }, &window)
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(error = %e, user_id = user.id, "Weekly digest email failed");
                }
            }
        }

        tracing::info!(sent, recipients = recipients.len(), "Weekly digest sent");
        Ok(sent)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testing::{Harness, sample_showtime, sample_user};
    use chrono::TimeDelta;

    #[tokio::test]
    async fn test_digest_carries_each_users_votes() {
        let harness = Harness::new();
        harness
            .store
            .add_showtime(sample_showtime(1, "Heat", harness.now() + TimeDelta::hours(30)));

        let mut alice = sample_user(1, "Alice");
        alice.weekly_notification = true;
        let mut bob = sample_user(2, "Bob");
        bob.weekly_notification = true;
        let mut quiet = sample_user(3, "Carol");
        quiet.weekly_notification = false;
        harness.store.add_user(alice);
        harness.store.add_user(bob);
        harness.store.add_user(quiet);
        harness.store.seed_vote(1, 1, 2);

        let sent = harness.digest_service().send_weekly_digest().await.unwrap();
        assert_eq!(sent, 2);

        for (user_id, template) in harness.email.sent() {
            let EmailTemplate::Weekly { standings } = template else {
                panic!("expected weekly email");
            };
            let expected = if user_id == 1 { 2 } else { 0 };
            assert_eq!(standings[0].vote, Some(expected));
        }
    }

    #[tokio::test]
    async fn test_digest_skips_failed_recipient() {
        let harness = Harness::new();
        for (id, name) in [(1, "Alice"), (2, "Bob")] {
            let mut user = sample_user(id, name);
            user.weekly_notification = true;
            harness.store.add_user(user);
        }
        harness.email.fail_for(1);

        let sent = harness.digest_service().send_weekly_digest().await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(harness.email.recipients(), vec![2]);
    }
}
