//! Persistence seams used by the services.
//!
//! Services talk to storage only through these traits so they can be driven
//! by in-memory stores in tests. [`SeaOrmStore`] is the database-backed
//! implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use movienight_common::{AppResult, WeekWindow};
use movienight_db::entities::user;
use movienight_db::repositories::{
    NotificationPreference, RsvpRepository, ShowtimeRepository, UserRepository, VoteRepository,
};
use sea_orm::DatabaseConnection;

use super::ranking::{LOCK_SENTINEL, ShowtimeSummary, ShowtimeTally, rank};
use super::rsvp::RsvpStatus;

/// Votes and showtimes.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Ranked showtimes of `window`; see [`rank`].
    async fn ranked_showtimes(
        &self,
        window: &WeekWindow,
        limit: Option<usize>,
        for_user: Option<i32>,
    ) -> AppResult<Vec<ShowtimeTally>>;

    /// The subset of `ids` that are showtimes inside `window`.
    async fn find_showtimes(
        &self,
        window: &WeekWindow,
        ids: &[i32],
    ) -> AppResult<Vec<ShowtimeSummary>>;

    /// A showtime by id, in any window.
    async fn find_showtime(&self, id: i32) -> AppResult<Option<ShowtimeSummary>>;

    /// Atomically replace the user's votes in `window` with `votes`
    /// (`(showtime_id, value)` pairs). Zero values are not stored.
    ///
    /// Replacements for one user are serialized. Once the window is locked, a
    /// change to the user's vote on the locked showtime fails with a
    /// validation error and leaves every vote untouched.
    async fn replace_votes(
        &self,
        user_id: i32,
        window: &WeekWindow,
        votes: &[(i32, i32)],
    ) -> AppResult<()>;

    /// Add the lock vote for `showtime_id` unless `window` is already locked.
    /// Organic votes stay in place. Returns whether this call placed the lock.
    async fn lock_winner(&self, window: &WeekWindow, showtime_id: i32) -> AppResult<bool>;
}

/// User lookups.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by id.
    async fn find_user(&self, id: i32) -> AppResult<Option<user::Model>>;

    /// Find a user by API token.
    async fn find_by_token(&self, token: &str) -> AppResult<Option<user::Model>>;

    /// Users opted in to `preference`.
    async fn users_with_preference(
        &self,
        preference: NotificationPreference,
    ) -> AppResult<Vec<user::Model>>;
}

/// Attendance replies.
#[async_trait]
pub trait RsvpStore: Send + Sync {
    /// Record a reply, replacing any earlier one for the same showtime.
    async fn record_rsvp(
        &self,
        user_id: i32,
        showtime_id: i32,
        status: RsvpStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()>;
}

/// Store backed by the sea-orm repositories.
#[derive(Clone)]
pub struct SeaOrmStore {
    users: UserRepository,
    showtimes: ShowtimeRepository,
    votes: VoteRepository,
    rsvps: RsvpRepository,
}

impl SeaOrmStore {
    /// Create a store over one connection pool.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            users: UserRepository::new(db.clone()),
            showtimes: ShowtimeRepository::new(db.clone()),
            votes: VoteRepository::new(db.clone()),
            rsvps: RsvpRepository::new(db),
        }
    }
}

#[async_trait]
impl VoteStore for SeaOrmStore {
    async fn ranked_showtimes(
        &self,
        window: &WeekWindow,
        limit: Option<usize>,
        for_user: Option<i32>,
    ) -> AppResult<Vec<ShowtimeTally>> {
        let showtimes: Vec<ShowtimeSummary> = self
            .showtimes
            .find_in_window_with_movie(window)
            .await?
            .into_iter()
            .map(|(showtime, movie)| ShowtimeSummary::from_models(showtime, movie))
            .collect();

        let ids: Vec<i32> = showtimes.iter().map(|s| s.id).collect();
        let votes = self.votes.find_by_showtimes(&ids).await?;

        Ok(rank(showtimes, &votes, for_user, limit))
    }

    async fn find_showtimes(
        &self,
        window: &WeekWindow,
        ids: &[i32],
    ) -> AppResult<Vec<ShowtimeSummary>> {
        Ok(self
            .showtimes
            .find_by_ids_in_window(window, ids)
            .await?
            .into_iter()
            .map(|(showtime, movie)| ShowtimeSummary::from_models(showtime, movie))
            .collect())
    }

    async fn find_showtime(&self, id: i32) -> AppResult<Option<ShowtimeSummary>> {
        Ok(self
            .showtimes
            .find_by_id_with_movie(id)
            .await?
            .map(|(showtime, movie)| ShowtimeSummary::from_models(showtime, movie)))
    }

    async fn replace_votes(
        &self,
        user_id: i32,
        window: &WeekWindow,
        votes: &[(i32, i32)],
    ) -> AppResult<()> {
        self.votes
            .replace_for_user_in_window(user_id, window, votes)
            .await
    }

    async fn lock_winner(&self, window: &WeekWindow, showtime_id: i32) -> AppResult<bool> {
        self.votes
            .lock_in_window(window, showtime_id, LOCK_SENTINEL)
            .await
    }
}

#[async_trait]
impl UserDirectory for SeaOrmStore {
    async fn find_user(&self, id: i32) -> AppResult<Option<user::Model>> {
        self.users.find_by_id(id).await
    }

    async fn find_by_token(&self, token: &str) -> AppResult<Option<user::Model>> {
        self.users.find_by_token(token).await
    }

    async fn users_with_preference(
        &self,
        preference: NotificationPreference,
    ) -> AppResult<Vec<user::Model>> {
        self.users.find_by_preference(preference).await
    }
}

#[async_trait]
impl RsvpStore for SeaOrmStore {
    async fn record_rsvp(
        &self,
        user_id: i32,
        showtime_id: i32,
        status: RsvpStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.rsvps
            .upsert(user_id, showtime_id, status.as_str(), at)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use movienight_db::entities::{movie, showtime, vote};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn window() -> WeekWindow {
        let start = Utc::now();
        WeekWindow {
            start,
            end: start + TimeDelta::days(7),
        }
    }

    fn pair(id: i32, title: &str, hours: i64) -> (showtime::Model, movie::Model) {
        (
            showtime::Model {
                id,
                movie_id: id,
                starts_at: (Utc::now() + TimeDelta::hours(hours)).into(),
                screen: "1".to_string(),
                location: "Downtown".to_string(),
            },
            movie::Model {
                id,
                title: title.to_string(),
                poster: None,
                imdb_id: None,
            },
        )
    }

    #[tokio::test]
    async fn test_ranked_showtimes_from_database() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[pair(1, "Heat", 24), pair(2, "Alien", 30)]])
                .append_query_results([[
                    vote::Model {
                        user_id: 5,
                        showtime_id: 2,
                        value: 3,
                    },
                    vote::Model {
                        user_id: 6,
                        showtime_id: 1,
                        value: 1,
                    },
                ]])
                .into_connection(),
        );

        let store = SeaOrmStore::new(db);
        let ranked = store
            .ranked_showtimes(&window(), None, Some(5))
            .await
            .unwrap();

        assert_eq!(ranked[0].showtime.movie_title, "Alien");
        assert_eq!(ranked[0].vote, Some(3));
        assert_eq!(ranked[1].votes, 1);
    }
}
