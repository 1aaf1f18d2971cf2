//! Common utilities and shared types for movienight.
//!
//! This crate provides foundational components used across all movienight crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Vote windows**: Weekly cycle boundaries via [`WindowPolicy`] and [`WeekWindow`]
//! - **Scheduling**: Recurring weekly instants via [`WeeklySchedule`]
//! - **Time**: Injectable [`Clock`] for deterministic tests
//! - **Signing**: RSVP link tokens
//!
//! # Example
//!
//! ```no_run
//! use movienight_common::{AppResult, Clock, Config, SystemClock};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let policy = config.schedule.window_policy()?;
//!     let window = policy.window_at(SystemClock.now());
//!     println!("Voting for {} .. {}", window.start, window.end);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod window;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use crypto::{sign_rsvp, verify_rsvp};
pub use error::{AppError, AppResult};
pub use window::{WeekWindow, WeeklySchedule, WindowPolicy, parse_timezone};
