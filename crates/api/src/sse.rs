//! Server-Sent Events (SSE) for real-time updates.
//!
//! Every open `/events` connection is a subscriber with its own bounded
//! queue. Publishing never waits on a subscriber: one whose queue is full or
//! gone is dropped from the set, which ends its stream.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::stream::{self, Stream, StreamExt};
use movienight_common::AppResult;
use movienight_core::{EventPublisher, StreamEvent};
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::middleware::AppState;

/// Events a subscriber can fall behind by before it is disconnected.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 16;

/// Idle time after which a keep-alive frame is sent.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// One published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub id: u64,
    pub kind: &'static str,
    pub data: String,
}

/// What a subscriber's stream yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Frame(SseFrame),
    KeepAlive,
}

impl StreamItem {
    fn into_event(self) -> Event {
        match self {
            Self::Frame(frame) => Event::default()
                .id(frame.id.to_string())
                .event(frame.kind)
                .data(frame.data),
            Self::KeepAlive => Event::default().event("keepalive").data("{}"),
        }
    }
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<u64, mpsc::Sender<SseFrame>>,
    next_subscriber: u64,
    last_event_id: u64,
}

/// Live subscriber set and event id counter.
#[derive(Clone, Default)]
pub struct SseBroadcaster {
    registry: Arc<RwLock<Registry>>,
}

impl SseBroadcaster {
    /// Create a new SSE broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a subscription. It unsubscribes itself when dropped.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.next_subscriber += 1;
        let id = registry.next_subscriber;
        registry.subscribers.insert(id, tx);

        tracing::debug!(subscriber = id, subscribers = registry.subscribers.len(), "SSE subscriber connected");

        Subscription {
            id,
            rx,
            broadcaster: self.clone(),
        }
    }

    /// Remove a subscriber. Removing one that is already gone is a no-op.
    pub fn unsubscribe(&self, id: u64) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.subscribers.remove(&id).is_some() {
            tracing::debug!(subscriber = id, subscribers = registry.subscribers.len(), "SSE subscriber disconnected");
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }

    /// Send an event to every subscriber. Returns the event id.
    ///
    /// Ids are allocated and queued under one lock, so every subscriber sees
    /// them in increasing order.
    pub fn broadcast(&self, kind: &'static str, payload: &Value) -> u64 {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.last_event_id += 1;
        let frame = SseFrame {
            id: registry.last_event_id,
            kind,
            data: payload.to_string(),
        };

        let mut dropped = Vec::new();
        for (&subscriber, tx) in &registry.subscribers {
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber, event_id = frame.id, "SSE subscriber too slow, disconnecting");
                    dropped.push(subscriber);
                }
                Err(TrySendError::Closed(_)) => dropped.push(subscriber),
            }
        }
        for subscriber in dropped {
            registry.subscribers.remove(&subscriber);
        }

        tracing::debug!(event_id = frame.id, kind, subscribers = registry.subscribers.len(), "SSE event published");
        frame.id
    }
}

#[async_trait]
impl EventPublisher for SseBroadcaster {
    async fn publish(&self, event: StreamEvent) -> AppResult<()> {
        self.broadcast(event.kind(), &event.payload());
        Ok(())
    }
}

/// A live subscription.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<SseFrame>,
    broadcaster: SseBroadcaster,
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Next frame, or a keep-alive after `idle` without one. `None` once the
    /// subscriber has been disconnected and its queue drained.
    pub async fn next_item(&mut self, idle: Duration) -> Option<StreamItem> {
        match tokio::time::timeout(idle, self.rx.recv()).await {
            Ok(Some(frame)) => Some(StreamItem::Frame(frame)),
            Ok(None) => None,
            Err(_) => Some(StreamItem::KeepAlive),
        }
    }

    /// Stream of frames interleaved with keep-alives.
    pub fn into_stream(self, idle: Duration) -> impl Stream<Item = StreamItem> + Send {
        stream::unfold(self, move |mut sub| async move {
            let item = sub.next_item(idle).await?;
            Some((item, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}

/// Live event stream.
async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.broadcaster.subscribe();

    let connected = Event::default()
        .event("connected")
        .data(json!({ "subscribers": state.broadcaster.subscriber_count() }).to_string());

    let frames = subscription
        .into_stream(KEEPALIVE_INTERVAL)
        .map(|item| Ok(item.into_event()));

    Sse::new(stream::once(async move { Ok(connected) }).chain(frames))
}

/// Create SSE router.
pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(events))
}
