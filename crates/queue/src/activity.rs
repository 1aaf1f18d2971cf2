//! Activity ingest and drain loops.
//!
//! The ingest loop moves events from the bounded activity queue into the
//! coalescer. The drain loop sleeps until the coalescer's next deadline (at
//! most [`FALLBACK_POLL`](movienight_core::FALLBACK_POLL)), then dispatches
//! every activity that has come due.

use std::sync::Arc;

use movienight_common::{SharedClock, WindowPolicy};
use movienight_core::{
    ActivityCoalescer, ActivityEvent, DispatchTasks, NotificationDispatcher, VoteStore,
};
use tokio::sync::mpsc;

/// Standings included with an activity notification.
pub const ACTIVITY_STANDINGS: usize = 3;

/// Feed queued vote activity into the coalescer until the queue closes.
pub async fn run_activity_ingest(
    mut rx: mpsc::Receiver<ActivityEvent>,
    coalescer: Arc<ActivityCoalescer>,
) {
    while let Some(event) = rx.recv().await {
        coalescer.record(event);
    }
    tracing::info!("Activity queue closed, ingest loop stopped");
}

/// Dispatches due activities.
pub struct ActivityDrain {
    coalescer: Arc<ActivityCoalescer>,
    store: Arc<dyn VoteStore>,
    dispatcher: NotificationDispatcher,
    policy: WindowPolicy,
    clock: SharedClock,
}

impl ActivityDrain {
    /// Create a drain over `coalescer`.
    #[must_use]
    pub fn new(
        coalescer: Arc<ActivityCoalescer>,
        store: Arc<dyn VoteStore>,
        dispatcher: NotificationDispatcher,
        policy: WindowPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            coalescer,
            store,
            dispatcher,
            policy,
            clock,
        }
    }

    /// Dispatch every activity that is due now.
    ///
    /// Standings are loaded once per scan and shared by every activity in it.
    pub async fn drain_due(&self) -> Vec<DispatchTasks> {
        let Some(first) = self.coalescer.pop_due() else {
            return Vec::new();
        };

        let window = self.policy.window_at(self.clock.now());
        let standings = match self
            .store
            .ranked_showtimes(&window, Some(ACTIVITY_STANDINGS), None)
            .await
        {
            Ok(standings) => standings,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load standings for activity");
                Vec::new()
            }
        };

        let mut dispatched = Vec::new();
        let mut next = Some(first);
        while let Some(activity) = next {
            tracing::debug!(user_id = activity.user.id, "Dispatching vote activity");
            dispatched.push(
                self.dispatcher
                    .dispatch_activity(activity, standings.clone(), window),
            );
            next = self.coalescer.pop_due();
        }

        dispatched
    }

    /// Run forever.
    pub async fn run(self) {
        loop {
            tokio::time::sleep(self.coalescer.wake_after()).await;

            let dispatched = self.drain_due().await;
            if !dispatched.is_empty() {
                tracing::info!(count = dispatched.len(), "Dispatched vote activity");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use movienight_core::testing::{Harness, sample_showtime, sample_user};
    use movienight_core::{StreamEvent, VoteInput, activity_channel};

    fn setup() -> (Harness, Arc<ActivityCoalescer>, ActivityDrain) {
        let harness = Harness::new();
        harness
            .store
            .add_showtime(sample_showtime(1, "Heat", harness.now() + TimeDelta::hours(30)));
        harness
            .store
            .add_showtime(sample_showtime(2, "Alien", harness.now() + TimeDelta::hours(31)));

        let coalescer = Arc::new(ActivityCoalescer::new(harness.clock.clone()));
        let drain = ActivityDrain::new(
            coalescer.clone(),
            harness.store.clone(),
            harness.dispatcher(),
            harness.policy,
            harness.clock.clone(),
        );
        (harness, coalescer, drain)
    }

    async fn join_all(tasks: Vec<DispatchTasks>) {
        for t in tasks {
            t.join().await;
        }
    }

    #[tokio::test]
    async fn test_rapid_votes_produce_one_notification() {
        let (harness, coalescer, drain) = setup();
        let (tx, rx) = activity_channel(16);
        let votes = harness.vote_service_with(tx);
        let ingest = tokio::spawn(run_activity_ingest(rx, coalescer.clone()));

        let alice = sample_user(1, "Alice");
        votes
            .submit_votes(&alice, &[VoteInput { showtime_id: 1, vote: 3 }])
            .await
            .unwrap();
        harness.clock.advance(TimeDelta::seconds(10));
        votes
            .submit_votes(&alice, &[VoteInput { showtime_id: 2, vote: 2 }])
            .await
            .unwrap();

        drop(votes);
        ingest.await.unwrap();
        assert_eq!(coalescer.pending_count(), 1);

        harness.clock.advance(TimeDelta::seconds(89));
        assert!(drain.drain_due().await.is_empty());

        harness.clock.advance(TimeDelta::seconds(1));
        let dispatched = drain.drain_due().await;
        assert_eq!(dispatched.len(), 1);
        join_all(dispatched).await;

        let events = harness.events.events();
        let [StreamEvent::Activity { votes, .. }] = events.as_slice() else {
            unreachable!("expected one activity event, got {events:?}");
        };
        assert_eq!(votes[0].showtime.id, 2);

        let posts = harness.webhook.posts();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].1.contains("Alien@"));
    }

    #[tokio::test]
    async fn test_one_scan_dispatches_every_due_user() {
        let (harness, coalescer, drain) = setup();
        for (id, name) in [(1, "Alice"), (2, "Bob")] {
            coalescer.record(ActivityEvent {
                user: movienight_core::UserSummary {
                    id,
                    name: name.to_string(),
                },
                votes: vec![],
            });
        }

        harness.clock.advance(TimeDelta::seconds(90));
        let dispatched = drain.drain_due().await;
        assert_eq!(dispatched.len(), 2);
        join_all(dispatched).await;

        assert_eq!(coalescer.pending_count(), 0);
        assert_eq!(harness.events.events().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_wakes_for_deadline() {
        let (harness, coalescer, drain) = setup();
        coalescer.record(ActivityEvent {
            user: movienight_core::UserSummary {
                id: 1,
                name: "Alice".to_string(),
            },
            votes: vec![],
        });

        let handle = tokio::spawn(drain.run());
        // The loop polls every 30s; move the clock past the deadline and let it scan.
        harness.clock.advance(TimeDelta::seconds(91));
        tokio::time::sleep(std::time::Duration::from_secs(31)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(coalescer.pending_count(), 0);
        assert_eq!(harness.webhook.posts().len(), 1);
        handle.abort();
    }
}
