//! RSVP service.
//!
//! Attendance replies to the locked showtime, either from a logged-in user or
//! through the signed links in the lock email.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use movienight_common::{AppError, AppResult, SharedClock, verify_rsvp};
use movienight_db::entities::user;
use serde::{Deserialize, Deserializer};

use super::activity::UserSummary;
use super::notification::{DispatchTasks, NotificationDispatcher};
use super::store::{RsvpStore, UserDirectory, VoteStore};

/// Attendance answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsvpStatus {
    Accepted,
    Declined,
}

impl RsvpStatus {
    /// Stored and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::Declined => "DECLINED",
        }
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RsvpStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("accepted") {
            Ok(Self::Accepted)
        } else if s.eq_ignore_ascii_case("declined") {
            Ok(Self::Declined)
        } else {
            Err(AppError::Validation(format!("Invalid RSVP value: {s}")))
        }
    }
}

impl<'de> Deserialize<'de> for RsvpStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Records RSVPs and announces them.
#[derive(Clone)]
pub struct RsvpService {
    store: Arc<dyn VoteStore>,
    rsvps: Arc<dyn RsvpStore>,
    users: Arc<dyn UserDirectory>,
    dispatcher: NotificationDispatcher,
    secret: String,
    clock: SharedClock,
}

impl RsvpService {
    #[must_use]
    pub fn new(
        store: Arc<dyn VoteStore>,
        rsvps: Arc<dyn RsvpStore>,
        users: Arc<dyn UserDirectory>,
        dispatcher: NotificationDispatcher,
        secret: String,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            rsvps,
            users,
            dispatcher,
            secret,
            clock,
        }
    }

    /// Record `user`'s answer for a showtime, then notify in the background.
    pub async fn respond(
        &self,
        user: &user::Model,
        showtime_id: i32,
        status: RsvpStatus,
    ) -> AppResult<DispatchTasks> {
        let showtime = self
            .store
            .find_showtime(showtime_id)
            .await?
            .ok_or_else(|| AppError::ShowtimeNotFound(showtime_id.to_string()))?;

        self.rsvps
            .record_rsvp(user.id, showtime_id, status, self.clock.now())
            .await?;

        tracing::info!(user_id = user.id, showtime_id, value = %status, "RSVP recorded");

        Ok(self
            .dispatcher
            .dispatch_rsvp(UserSummary::from(user), showtime, status))
    }

    /// Record an answer from an emailed link, authenticated by its token.
    pub async fn respond_with_token(
        &self,
        user_id: i32,
        showtime_id: i32,
        status: RsvpStatus,
        token: &str,
    ) -> AppResult<DispatchTasks> {
        if !verify_rsvp(&self.secret, user_id, showtime_id, token) {
            tracing::debug!(user_id, showtime_id, "Rejected RSVP token");
            return Err(AppError::Unauthorized);
        }

        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))?;

        self.respond(&user, showtime_id, status).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_publisher::StreamEvent;
    use crate::testing::{Harness, sample_showtime, sample_user};
    use movienight_common::sign_rsvp;

    #[test]
    fn test_parse_status() {
        assert_eq!("ACCEPTED".parse::<RsvpStatus>().unwrap(), RsvpStatus::Accepted);
        assert_eq!("declined".parse::<RsvpStatus>().unwrap(), RsvpStatus::Declined);
        assert!(matches!(
            "maybe".parse::<RsvpStatus>(),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_respond_records_and_notifies() {
        let harness = Harness::new();
        let alice = sample_user(1, "Alice");
        harness.store.add_user(alice.clone());
        harness.store.add_showtime(sample_showtime(7, "Heat", harness.now()));

        let tasks = harness
            .rsvp_service()
            .respond(&alice, 7, RsvpStatus::Accepted)
            .await
            .unwrap();
        tasks.join().await;

        assert_eq!(harness.store.rsvps(), vec![(1, 7, RsvpStatus::Accepted)]);

        let posts = harness.webhook.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "Movie-Night: RSVP");
        assert!(posts[0].1.starts_with("Alice: ACCEPTED"));

        assert!(matches!(
            harness.events.events().as_slice(),
            [StreamEvent::Rsvp {
                value: RsvpStatus::Accepted,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_repeat_rsvp_replaces() {
        let harness = Harness::new();
        let alice = sample_user(1, "Alice");
        harness.store.add_showtime(sample_showtime(7, "Heat", harness.now()));
        let service = harness.rsvp_service();

        service.respond(&alice, 7, RsvpStatus::Accepted).await.unwrap().join().await;
        service.respond(&alice, 7, RsvpStatus::Declined).await.unwrap().join().await;

        assert_eq!(harness.store.rsvps(), vec![(1, 7, RsvpStatus::Declined)]);
    }

    #[tokio::test]
    async fn test_unknown_showtime() {
        let harness = Harness::new();
        let result = harness
            .rsvp_service()
            .respond(&sample_user(1, "Alice"), 99, RsvpStatus::Accepted)
            .await;
        assert!(matches!(result, Err(AppError::ShowtimeNotFound(_))));
        assert!(harness.store.rsvps().is_empty());
    }

    #[tokio::test]
    async fn test_token_response() {
        let harness = Harness::new();
        harness.store.add_user(sample_user(2, "Bob"));
        harness.store.add_showtime(sample_showtime(7, "Heat", harness.now()));
        let service = harness.rsvp_service();

        let token = sign_rsvp(Harness::RSVP_SECRET, 2, 7);
        service
            .respond_with_token(2, 7, RsvpStatus::Declined, &token)
            .await
            .unwrap()
            .join()
            .await;
        assert_eq!(harness.store.rsvps(), vec![(2, 7, RsvpStatus::Declined)]);

        // Token for another showtime.
        let result = service
            .respond_with_token(2, 8, RsvpStatus::Accepted, &token)
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_token_for_missing_user() {
        let harness = Harness::new();
        harness.store.add_showtime(sample_showtime(7, "Heat", harness.now()));

        let token = sign_rsvp(Harness::RSVP_SECRET, 42, 7);
        let result = harness
            .rsvp_service()
            .respond_with_token(42, 7, RsvpStatus::Accepted, &token)
            .await;
        assert!(matches!(result, Err(AppError::UserNotFound(_))));
    }
}
