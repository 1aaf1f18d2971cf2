//! Showtime and vote endpoints.

use axum::{Json, Router, extract::State, routing::get};
use movienight_common::{AppResult, WeekWindow};
use movienight_core::{ShowtimeTally, VoteInput};
use serde::Serialize;

use crate::{
    extractors::{AuthUser, MaybeAuthUser},
    middleware::AppState,
    response::ApiResponse,
};

/// Showtimes listed to anonymous callers.
const ANONYMOUS_LIMIT: usize = 10;

/// Ranked showtimes response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowtimesResponse {
    pub window: WeekWindow,
    pub showtimes: Vec<ShowtimeTally>,
}

/// Vote submission response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVotesResponse {
    pub accepted: usize,
}

/// Ranked showtimes of the active window, with the caller's own votes.
async fn list(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<ShowtimesResponse>> {
    let (limit, for_user) = match &user {
        Some(user) => (None, Some(user.id)),
        None => (Some(ANONYMOUS_LIMIT), None),
    };

    let showtimes = state
        .vote_service
        .ranked_showtimes(limit, for_user)
        .await?;

    Ok(ApiResponse::ok(ShowtimesResponse {
        window: state.vote_service.current_window(),
        showtimes,
    }))
}

/// Replace the caller's votes for the active window.
async fn submit(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(votes): Json<Vec<VoteInput>>,
) -> AppResult<ApiResponse<SubmitVotesResponse>> {
    state.vote_service.submit_votes(&user, &votes).await?;

    Ok(ApiResponse::ok(SubmitVotesResponse {
        accepted: votes.iter().filter(|v| v.vote != 0).count(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/showtimes", get(list).post(submit).put(submit))
}
