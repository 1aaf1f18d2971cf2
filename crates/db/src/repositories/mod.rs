//! Repository layer for database operations.

mod rsvp;
mod showtime;
mod user;
mod vote;

pub use rsvp::RsvpRepository;
pub use showtime::ShowtimeRepository;
pub use user::{NotificationPreference, UserRepository};
pub use vote::{LOCKED_SHOWING_CHANGED, VoteRepository};
