//! User repository.

use std::sync::Arc;

use crate::entities::{User, user};
use movienight_common::{AppError, AppResult};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

/// Email opt-in a user can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPreference {
    /// Saturday standings digest.
    Weekly,
    /// Lock announcement.
    Lock,
    /// Other users' vote activity.
    Activity,
}

impl NotificationPreference {
    const fn column(self) -> user::Column {
        match self {
            Self::Weekly => user::Column::WeeklyNotification,
            Self::Lock => user::Column::LockNotification,
            Self::Activity => user::Column::ActivityNotification,
        }
    }
}

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by API token.
    pub async fn find_by_token(&self, token: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Token.eq(token))
            .filter(user::Column::Id.ne(user::SYSTEM_USER_ID))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Users opted in to the given email, never including the system user.
    pub async fn find_by_preference(
        &self,
        preference: NotificationPreference,
    ) -> AppResult<Vec<user::Model>> {
        User::find()
            .filter(preference.column().eq(true))
            .filter(user::Column::Id.ne(user::SYSTEM_USER_ID))
            .order_by_asc(user::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
