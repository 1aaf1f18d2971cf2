//! Database entities.

pub mod movie;
pub mod rsvp;
pub mod showtime;
pub mod user;
pub mod vote;

pub use movie::Entity as Movie;
pub use rsvp::Entity as Rsvp;
pub use showtime::Entity as Showtime;
pub use user::Entity as User;
pub use vote::Entity as Vote;
