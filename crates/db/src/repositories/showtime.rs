//! Showtime repository.

use std::sync::Arc;

use crate::entities::{Movie, Showtime, movie, showtime};
use movienight_common::{AppError, AppResult, WeekWindow};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

/// Showtime repository for database operations.
#[derive(Clone)]
pub struct ShowtimeRepository {
    db: Arc<DatabaseConnection>,
}

impl ShowtimeRepository {
    /// Create a new showtime repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All showtimes starting inside `window`, with their movie, earliest first.
    pub async fn find_in_window_with_movie(
        &self,
        window: &WeekWindow,
    ) -> AppResult<Vec<(showtime::Model, Option<movie::Model>)>> {
        Showtime::find()
            .filter(showtime::Column::StartsAt.gte(window.start))
            .filter(showtime::Column::StartsAt.lt(window.end))
            .find_also_related(Movie)
            .order_by_asc(showtime::Column::StartsAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The subset of `ids` that start inside `window`, with their movie.
    pub async fn find_by_ids_in_window(
        &self,
        window: &WeekWindow,
        ids: &[i32],
    ) -> AppResult<Vec<(showtime::Model, Option<movie::Model>)>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        Showtime::find()
            .filter(showtime::Column::Id.is_in(ids.to_vec()))
            .filter(showtime::Column::StartsAt.gte(window.start))
            .filter(showtime::Column::StartsAt.lt(window.end))
            .find_also_related(Movie)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a showtime and its movie by ID.
    pub async fn find_by_id_with_movie(
        &self,
        id: i32,
    ) -> AppResult<Option<(showtime::Model, Option<movie::Model>)>> {
        Showtime::find_by_id(id)
            .find_also_related(Movie)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn window() -> WeekWindow {
        let start = Utc::now();
        WeekWindow {
            start,
            end: start + TimeDelta::days(7),
        }
    }

    fn create_test_showtime(id: i32) -> showtime::Model {
        showtime::Model {
            id,
            movie_id: 1,
            starts_at: (Utc::now() + TimeDelta::days(1)).into(),
            screen: "3".to_string(),
            location: "Downtown".to_string(),
        }
    }

    #[tokio::test]
    async fn test_find_by_ids_in_window_empty_skips_query() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = ShowtimeRepository::new(db);
        let result = repo.find_by_ids_in_window(&window(), &[]).await.unwrap();

        assert!(result.is_empty());
    }

    fn create_test_movie() -> movie::Model {
        movie::Model {
            id: 1,
            title: "Heat".to_string(),
            poster: None,
            imdb_id: Some("tt0113277".to_string()),
        }
    }

    #[tokio::test]
    async fn test_find_by_ids_in_window() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    (create_test_showtime(1), create_test_movie()),
                    (create_test_showtime(2), create_test_movie()),
                ]])
                .into_connection(),
        );

        let repo = ShowtimeRepository::new(db);
        let result = repo
            .find_by_ids_in_window(&window(), &[1, 2, 3])
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_find_in_window_with_movie() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[(create_test_showtime(1), create_test_movie())]])
                .into_connection(),
        );

        let repo = ShowtimeRepository::new(db);
        let result = repo.find_in_window_with_movie(&window()).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1.as_ref().unwrap().title, "Heat");
    }
}
