//! Event publisher service.
//!
//! Provides an abstraction for publishing real-time events.
//! The actual implementation is provided by the api crate (server-sent events).

use async_trait::async_trait;
use movienight_common::AppResult;
use serde_json::{Value, json};
use std::sync::Arc;

use super::activity::{ActivityVote, UserSummary};
use super::ranking::ShowtimeTally;
use super::rsvp::RsvpStatus;

/// Event types for real-time updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A user's votes settled.
    Activity {
        user: UserSummary,
        votes: Vec<ActivityVote>,
    },
    /// A user answered the lock invitation.
    Rsvp { user: UserSummary, value: RsvpStatus },
    /// The week's winner was locked.
    Lock { winner: ShowtimeTally },
}

impl StreamEvent {
    /// Event name on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Activity { .. } => "activity",
            Self::Rsvp { .. } => "rsvp",
            Self::Lock { .. } => "lock",
        }
    }

    /// JSON payload on the wire.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Activity { user, votes } => json!({ "user": user, "votes": votes }),
            Self::Rsvp { user, value } => json!({ "user": user, "value": value.as_str() }),
            Self::Lock { winner } => json!({ "winner": winner }),
        }
    }
}

/// Trait for publishing real-time events.
///
/// This allows the core services to publish events
/// without directly depending on the streaming implementation.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to every live subscriber.
    async fn publish(&self, event: StreamEvent) -> AppResult<()>;
}

/// A no-op implementation of `EventPublisher` for testing or when real-time events are disabled.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish(&self, _event: StreamEvent) -> AppResult<()> {
        Ok(())
    }
}

/// Type alias for a shared event publisher.
pub type EventPublisherService = Arc<dyn EventPublisher>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsvp_payload() {
        let event = StreamEvent::Rsvp {
            user: UserSummary {
                id: 3,
                name: "Carol".to_string(),
            },
            value: RsvpStatus::Accepted,
        };

        assert_eq!(event.kind(), "rsvp");
        assert_eq!(
            event.payload(),
            json!({ "user": { "id": 3, "name": "Carol" }, "value": "ACCEPTED" })
        );
    }

    #[tokio::test]
    async fn test_noop_publisher() {
        let publisher = NoOpEventPublisher;
        let result = publisher
            .publish(StreamEvent::Activity {
                user: UserSummary {
                    id: 1,
                    name: "Alice".to_string(),
                },
                votes: vec![],
            })
            .await;
        assert!(result.is_ok());
    }
}
