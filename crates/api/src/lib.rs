//! HTTP API layer for movienight.
//!
//! - **Endpoints**: ranked showtimes, vote submission, RSVP, admin lock
//! - **Extractors**: Authentication
//! - **Middleware**: Bearer token authentication
//! - **Streaming**: Server-Sent Events
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod sse;

pub use endpoints::router;
pub use sse::{SseBroadcaster, SseFrame, StreamItem, Subscription};
