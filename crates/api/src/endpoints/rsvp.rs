//! RSVP endpoint.

use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use movienight_common::{AppError, AppResult};
use movienight_core::RsvpStatus;
use serde::{Deserialize, Serialize};

use crate::{extractors::MaybeAuthUser, middleware::AppState, response::ApiResponse};

/// RSVP query. `userId` and `token` come from the links in the lock email.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpQuery {
    pub showtime_id: i32,
    pub value: RsvpStatus,
    pub user_id: Option<i32>,
    pub token: Option<String>,
}

/// RSVP response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpResponse {
    pub showtime_id: i32,
    pub value: &'static str,
}

/// Record an attendance answer.
async fn respond(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
    Query(query): Query<RsvpQuery>,
) -> AppResult<ApiResponse<RsvpResponse>> {
    // Notifications keep running after the handles are dropped.
    let _notifications = match (query.user_id, query.token.as_deref(), user) {
        (Some(user_id), Some(token), _) => {
            state
                .rsvp_service
                .respond_with_token(user_id, query.showtime_id, query.value, token)
                .await?
        }
        (_, _, Some(user)) => {
            state
                .rsvp_service
                .respond(&user, query.showtime_id, query.value)
                .await?
        }
        _ => return Err(AppError::Unauthorized),
    };

    Ok(ApiResponse::ok(RsvpResponse {
        showtime_id: query.showtime_id,
        value: query.value.as_str(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/rsvp", get(respond))
}
