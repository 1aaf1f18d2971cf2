//! Notification fan-out.
//!
//! Every notification goes to up to three channels: the chat webhook, email
//! and the live event stream. Each channel runs in its own task so a slow or
//! failing channel never holds up the others, and none of them runs on the
//! request path. Failures are logged and dropped.

use std::future::Future;
use std::sync::Arc;

use chrono_tz::Tz;
use movienight_common::WeekWindow;
use movienight_db::repositories::NotificationPreference;
use tokio::task::JoinHandle;

use super::activity::{Activity, UserSummary};
use super::email::{EmailSender, EmailTemplate};
use super::event_publisher::{EventPublisherService, StreamEvent};
use super::ranking::{ShowtimeSummary, ShowtimeTally};
use super::rsvp::RsvpStatus;
use super::store::UserDirectory;
use super::webhook::ChatWebhook;

const ACTIVITY_TITLE: &str = "Movie-Night: New Votes!";
const LOCK_TITLE: &str = "Movie-Night: Locked";
const RSVP_TITLE: &str = "Movie-Night: RSVP";

/// Handles of the channel tasks spawned for one notification.
///
/// Dropping this detaches the tasks; they still run to completion.
#[derive(Debug, Default)]
pub struct DispatchTasks(Vec<JoinHandle<()>>);

impl DispatchTasks {
    /// Number of channel tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take over another notification's tasks.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Wait for every channel task to finish.
    pub async fn join(self) {
        for handle in self.0 {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Notification task aborted");
            }
        }
    }
}

/// Fans notifications out to chat, email and the event stream.
#[derive(Clone)]
pub struct NotificationDispatcher {
    webhook: Arc<dyn ChatWebhook>,
    email: Arc<dyn EmailSender>,
    events: EventPublisherService,
    users: Arc<dyn UserDirectory>,
    tz: Tz,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(
        webhook: Arc<dyn ChatWebhook>,
        email: Arc<dyn EmailSender>,
        events: EventPublisherService,
        users: Arc<dyn UserDirectory>,
        tz: Tz,
    ) -> Self {
        Self {
            webhook,
            email,
            events,
            users,
            tz,
        }
    }

    /// Announce a settled vote activity. Emails go to every activity
    /// subscriber except the voter.
    pub fn dispatch_activity(
        &self,
        activity: Activity,
        standings: Vec<ShowtimeTally>,
        window: WeekWindow,
    ) -> DispatchTasks {
        let text = activity_text(self.tz, &activity.user, standings.first());
        let actor = activity.user.id;

        let template = EmailTemplate::Activity {
            voter: activity.user.clone(),
            votes: activity.votes.clone(),
            standings,
        };

        DispatchTasks(vec![
            self.spawn_webhook(ACTIVITY_TITLE, text),
            self.spawn_emails(NotificationPreference::Activity, Some(actor), template, window),
            self.spawn_event(StreamEvent::Activity {
                user: activity.user,
                votes: activity.votes,
            }),
        ])
    }

    /// Announce the week's winner to lock subscribers.
    pub fn dispatch_lock(&self, winner: ShowtimeTally, window: WeekWindow) -> DispatchTasks {
        let text = format!(
            "Movie night is locked: {}",
            showtime_label(self.tz, &winner.showtime)
        );

        DispatchTasks(vec![
            self.spawn_webhook(LOCK_TITLE, text),
            self.spawn_emails(
                NotificationPreference::Lock,
                None,
                EmailTemplate::Lock {
                    winner: winner.clone(),
                },
                window,
            ),
            self.spawn_event(StreamEvent::Lock { winner }),
        ])
    }

    /// Announce an attendance reply. Chat and event stream only.
    pub fn dispatch_rsvp(
        &self,
        user: UserSummary,
        showtime: ShowtimeSummary,
        status: RsvpStatus,
    ) -> DispatchTasks {
        let text = format!(
            "{}: {status} ({})",
            user.name,
            showtime_label(self.tz, &showtime)
        );

        DispatchTasks(vec![
            self.spawn_webhook(RSVP_TITLE, text),
            self.spawn_event(StreamEvent::Rsvp {
                user,
                value: status,
            }),
        ])
    }

    fn spawn_webhook(&self, title: &'static str, text: String) -> JoinHandle<()> {
        let webhook = self.webhook.clone();
        spawn_channel("webhook", async move { webhook.post(title, &text).await })
    }

    fn spawn_event(&self, event: StreamEvent) -> JoinHandle<()> {
        let events = self.events.clone();
        spawn_channel("sse", async move { events.publish(event).await })
    }

    fn spawn_emails(
        &self,
        preference: NotificationPreference,
        except: Option<i32>,
        template: EmailTemplate,
        window: WeekWindow,
    ) -> JoinHandle<()> {
        let users = self.users.clone();
        let email = self.email.clone();

        spawn_channel("email", async move {
            let recipients = users.users_with_preference(preference).await?;

            for user in recipients.iter().filter(|u| Some(u.id) != except) {
                if let Err(e) = email.send_template(user, &template, &window).await {
                    tracing::warn!(
                        error = %e,
                        channel = "email",
                        user_id = user.id,
                        template = template.name(),
                        "Email notification failed"
                    );
                }
            }

            Ok(())
        })
    }
}

fn spawn_channel<F>(channel: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = movienight_common::AppResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            tracing::warn!(error = %e, channel, "Notification failed");
        }
    })
}

/// `Heat@7:00PM`
fn showtime_label(tz: Tz, showtime: &ShowtimeSummary) -> String {
    format!(
        "{}@{}",
        showtime.movie_title,
        showtime.starts_at.with_timezone(&tz).format("%-I:%M%p")
    )
}

fn activity_text(tz: Tz, voter: &UserSummary, leader: Option<&ShowtimeTally>) -> String {
    match leader {
        Some(leader) => format!(
            "{} voted for movie night. {} leads with {} votes.",
            voter.name,
            showtime_label(tz, &leader.showtime),
            leader.votes
        ),
        None => format!("{} voted for movie night.", voter.name),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::activity::ActivityVote;
    use crate::testing::{Harness, sample_showtime, sample_user};
    use chrono::{TimeZone, Utc};

    fn activity(harness: &Harness, user_id: i32, name: &str) -> Activity {
        Activity {
            user: UserSummary {
                id: user_id,
                name: name.to_string(),
            },
            votes: vec![ActivityVote {
                showtime: sample_showtime(1, "Heat", harness.now()),
                vote: 3,
            }],
            due_at: harness.now(),
        }
    }

    fn opted_in(id: i32, name: &str) -> movienight_db::entities::user::Model {
        let mut user = sample_user(id, name);
        user.activity_notification = true;
        user.lock_notification = true;
        user
    }

    #[test]
    fn test_activity_text() {
        let tz = movienight_common::parse_timezone("America/Denver").unwrap();
        let mut showtime = sample_showtime(1, "Heat", Utc::now());
        showtime.starts_at = Utc.with_ymd_and_hms(2026, 10, 17, 1, 0, 0).unwrap();
        let voter = UserSummary {
            id: 1,
            name: "Alice".to_string(),
        };

        let leader = ShowtimeTally {
            showtime,
            votes: 7,
            vote: None,
        };
        assert_eq!(
            activity_text(tz, &voter, Some(&leader)),
            "Alice voted for movie night. Heat@7:00PM leads with 7 votes."
        );
        assert_eq!(activity_text(tz, &voter, None), "Alice voted for movie night.");
    }

    #[tokio::test]
    async fn test_activity_reaches_all_channels_except_actor_email() {
        let harness = Harness::new();
        harness.store.add_user(opted_in(1, "Alice"));
        harness.store.add_user(opted_in(2, "Bob"));
        harness.store.add_user(opted_in(3, "Carol"));

        let tasks = harness.dispatcher().dispatch_activity(
            activity(&harness, 1, "Alice"),
            vec![],
            harness.window(),
        );
        assert_eq!(tasks.len(), 3);
        tasks.join().await;

        assert_eq!(harness.webhook.posts().len(), 1);
        let mut recipients = harness.email.recipients();
        recipients.sort();
        assert_eq!(recipients, vec![2, 3]);
        assert!(matches!(
            harness.events.events().as_slice(),
            [StreamEvent::Activity { .. }]
        ));
    }

    #[tokio::test]
    async fn test_failing_webhook_does_not_block_other_channels() {
        let harness = Harness::new();
        harness.webhook.set_failing(true);
        harness.store.add_user(opted_in(2, "Bob"));

        harness
            .dispatcher()
            .dispatch_activity(activity(&harness, 1, "Alice"), vec![], harness.window())
            .join()
            .await;

        assert!(harness.webhook.posts().is_empty());
        assert_eq!(harness.email.recipients(), vec![2]);
        assert_eq!(harness.events.events().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_email_does_not_stop_other_recipients() {
        let harness = Harness::new();
        harness.email.fail_for(2);
        harness.store.add_user(opted_in(2, "Bob"));
        harness.store.add_user(opted_in(3, "Carol"));

        harness
            .dispatcher()
            .dispatch_activity(activity(&harness, 1, "Alice"), vec![], harness.window())
            .join()
            .await;

        assert_eq!(harness.email.recipients(), vec![3]);
        assert_eq!(harness.webhook.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_lock_notifies_lock_subscribers() {
        let harness = Harness::new();
        harness.store.add_user(opted_in(1, "Alice"));
        let mut quiet = sample_user(2, "Bob");
        quiet.lock_notification = false;
        harness.store.add_user(quiet);

        let winner = ShowtimeTally {
            showtime: sample_showtime(1, "Heat", harness.now()),
            votes: 1007,
            vote: None,
        };
        harness
            .dispatcher()
            .dispatch_lock(winner, harness.window())
            .join()
            .await;

        assert_eq!(harness.email.recipients(), vec![1]);
        assert_eq!(harness.webhook.posts()[0].0, LOCK_TITLE);
        assert!(matches!(
            harness.events.events().as_slice(),
            [StreamEvent::Lock { .. }]
        ));
    }
}
