//! RSVP repository.

use std::sync::Arc;

use crate::entities::{Rsvp, rsvp};
use chrono::{DateTime, Utc};
use movienight_common::{AppError, AppResult};
use sea_orm::{DatabaseConnection, EntityTrait, Set, sea_query::OnConflict};

/// RSVP repository for database operations.
#[derive(Clone)]
pub struct RsvpRepository {
    db: Arc<DatabaseConnection>,
}

impl RsvpRepository {
    /// Create a new RSVP repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record a reply, replacing any earlier reply for the same showtime.
    pub async fn upsert(
        &self,
        user_id: i32,
        showtime_id: i32,
        value: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let model = rsvp::ActiveModel {
            user_id: Set(user_id),
            showtime_id: Set(showtime_id),
            value: Set(value.to_string()),
            updated_at: Set(at.into()),
        };

        Rsvp::insert(model)
            .on_conflict(
                OnConflict::columns([rsvp::Column::UserId, rsvp::Column::ShowtimeId])
                    .update_columns([rsvp::Column::Value, rsvp::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
