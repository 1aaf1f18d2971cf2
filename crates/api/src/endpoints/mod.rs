//! API endpoints.

mod admin;
mod rsvp;
mod showtimes;

use axum::Router;

use crate::middleware::AppState;
use crate::sse;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(showtimes::router())
        .merge(rsvp::router())
        .merge(sse::router())
        .nest("/admin", admin::router())
}
