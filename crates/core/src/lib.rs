//! Core business logic for movienight.
//!
//! Vote aggregation and locking, activity debouncing, and the notification
//! fan-out to chat, email and live stream subscribers.

pub mod services;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use services::*;
