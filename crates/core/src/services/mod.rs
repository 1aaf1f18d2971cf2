//! Business logic services.

#![allow(missing_docs)]

pub mod activity;
pub mod digest;
pub mod email;
pub mod event_publisher;
pub mod lock;
pub mod notification;
pub mod ranking;
pub mod rsvp;
pub mod store;
pub mod vote;
pub mod webhook;

pub use activity::{
    ACTIVITY_DEBOUNCE_SECS, ACTIVITY_QUEUE_CAPACITY, Activity, ActivityCoalescer, ActivityEvent,
    ActivitySender, ActivityVote, FALLBACK_POLL, UserSummary, activity_channel,
};
pub use digest::WeeklyDigestService;
pub use email::{EmailConfig, EmailSender, EmailService, EmailTemplate, RenderedEmail};
pub use event_publisher::{EventPublisher, EventPublisherService, NoOpEventPublisher, StreamEvent};
pub use lock::{LockOutcome, LockResult, LockService};
pub use notification::{DispatchTasks, NotificationDispatcher};
pub use ranking::{EXCLUSION_TALLY, LOCK_SENTINEL, ShowtimeSummary, ShowtimeTally, rank};
pub use rsvp::{RsvpService, RsvpStatus};
pub use store::{RsvpStore, SeaOrmStore, UserDirectory, VoteStore};
pub use vote::{MAX_POSITIVE_SUM, MAX_VOTE, MIN_VOTE, VoteInput, VoteService, validate_votes};
pub use webhook::{ChatWebhook, WebhookClient};
