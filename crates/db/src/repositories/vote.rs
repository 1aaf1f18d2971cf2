//! Vote repository.

use std::sync::Arc;

use crate::entities::user::SYSTEM_USER_ID;
use crate::entities::{Showtime, User, Vote, showtime, vote};
use movienight_common::{AppError, AppResult, WeekWindow};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect,
    Set, TransactionTrait,
};

/// Rejection for a change to a vote on the week's locked showtime.
pub const LOCKED_SHOWING_CHANGED: &str = "Votes for this week's locked showing can't be changed";

/// Vote repository for database operations.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All votes cast on the given showtimes.
    pub async fn find_by_showtimes(&self, showtime_ids: &[i32]) -> AppResult<Vec<vote::Model>> {
        if showtime_ids.is_empty() {
            return Ok(vec![]);
        }

        Vote::find()
            .filter(vote::Column::ShowtimeId.is_in(showtime_ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Open a transaction holding the row lock of `user_id`.
    ///
    /// Every write to a user's votes takes this lock first, so overlapping
    /// replacements for one user run one after the other and each one sees
    /// the rows the previous one committed. Organic voters also take a shared
    /// lock on the system user, which the lock write holds exclusively.
    pub async fn begin_for_user(&self, user_id: i32) -> AppResult<DatabaseTransaction> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        User::find_by_id(user_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if user_id != SYSTEM_USER_ID {
            User::find_by_id(SYSTEM_USER_ID)
                .lock_shared()
                .one(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        Ok(txn)
    }

    /// Replace every vote `user_id` holds on showtimes in `window` with `votes`.
    ///
    /// Runs as one transaction: either the old set is fully replaced or nothing
    /// changes. Zero values are dropped rather than stored.
    pub async fn replace_for_user_in_window(
        &self,
        user_id: i32,
        window: &WeekWindow,
        votes: &[(i32, i32)],
    ) -> AppResult<()> {
        let txn = self.begin_for_user(user_id).await?;
        Self::replace_in(&txn, user_id, window, votes).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The replacement itself, inside a transaction from [`Self::begin_for_user`].
    ///
    /// Once the window is locked, a change to the user's vote on the locked
    /// showtime is rejected and nothing is written.
    pub async fn replace_in(
        txn: &DatabaseTransaction,
        user_id: i32,
        window: &WeekWindow,
        votes: &[(i32, i32)],
    ) -> AppResult<()> {
        let window_ids = Self::window_showtime_ids(txn, window).await?;

        let locked = if user_id == SYSTEM_USER_ID {
            None
        } else {
            Self::locked_showtime(txn, &window_ids).await?
        };
        if let Some(locked) = locked {
            let current = Vote::find()
                .filter(vote::Column::UserId.eq(user_id))
                .filter(vote::Column::ShowtimeId.eq(locked))
                .one(txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .map_or(0, |v| v.value);
            let submitted = votes
                .iter()
                .find(|(showtime_id, _)| *showtime_id == locked)
                .map_or(0, |(_, value)| *value);

            if submitted != current {
                tracing::debug!(user_id, showtime_id = locked, "Vote on locked showtime rejected");
                return Err(AppError::Validation(LOCKED_SHOWING_CHANGED.to_string()));
            }
        }

        if !window_ids.is_empty() {
            Vote::delete_many()
                .filter(vote::Column::UserId.eq(user_id))
                .filter(vote::Column::ShowtimeId.is_in(window_ids))
                .exec(txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        let rows: Vec<vote::ActiveModel> = votes
            .iter()
            .filter(|(_, value)| *value != 0)
            .map(|&(showtime_id, value)| vote::ActiveModel {
                user_id: Set(user_id),
                showtime_id: Set(showtime_id),
                value: Set(value),
            })
            .collect();

        if !rows.is_empty() {
            Vote::insert_many(rows)
                .exec_without_returning(txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        Ok(())
    }

    /// Add the system user's `value` vote on `showtime_id` unless the window
    /// already carries one. Returns whether this call placed it.
    pub async fn lock_in_window(
        &self,
        window: &WeekWindow,
        showtime_id: i32,
        value: i32,
    ) -> AppResult<bool> {
        let txn = self.begin_for_user(SYSTEM_USER_ID).await?;
        let window_ids = Self::window_showtime_ids(&txn, window).await?;

        if let Some(locked) = Self::locked_showtime(&txn, &window_ids).await? {
            tracing::info!(showtime_id = locked, "Window already locked");
            return Ok(false);
        }

        Vote::insert(vote::ActiveModel {
            user_id: Set(SYSTEM_USER_ID),
            showtime_id: Set(showtime_id),
            value: Set(value),
        })
        .exec_without_returning(&txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(true)
    }

    async fn window_showtime_ids(
        txn: &DatabaseTransaction,
        window: &WeekWindow,
    ) -> AppResult<Vec<i32>> {
        Ok(Showtime::find()
            .filter(showtime::Column::StartsAt.gte(window.start))
            .filter(showtime::Column::StartsAt.lt(window.end))
            .all(txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .into_iter()
            .map(|s| s.id)
            .collect())
    }

    /// Showtime carrying the system user's vote, if any.
    async fn locked_showtime(
        txn: &DatabaseTransaction,
        window_ids: &[i32],
    ) -> AppResult<Option<i32>> {
        if window_ids.is_empty() {
            return Ok(None);
        }

        Ok(Vote::find()
            .filter(vote::Column::UserId.eq(SYSTEM_USER_ID))
            .filter(vote::Column::ShowtimeId.is_in(window_ids.to_vec()))
            .one(txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .map(|v| v.showtime_id))
    }
}
