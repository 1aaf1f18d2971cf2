//! Admin endpoints.

use axum::{Router, extract::State, routing::post};
use movienight_common::{AppError, AppResult};
use movienight_core::{LockOutcome, ShowtimeTally};

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Lock the current week's leader ahead of the scheduled lock.
async fn lock(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<ShowtimeTally>> {
    if !user.is_admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let result = state.lock_service.lock_current_week().await?;

    match result.outcome {
        LockOutcome::Locked { winner } => {
            tracing::info!(
                user_id = user.id,
                showtime_id = winner.showtime.id,
                "Vote locked early"
            );
            Ok(ApiResponse::ok(winner))
        }
        LockOutcome::AlreadyLocked { .. } => Err(AppError::Validation(
            "Vote appears to already be locked".to_string(),
        )),
        LockOutcome::NoShowtimes => Err(AppError::Validation(
            "No showtimes to lock this week".to_string(),
        )),
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/lock", post(lock))
}
