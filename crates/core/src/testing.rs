//! In-memory collaborators for tests.
//!
//! [`InMemoryStore`] implements every storage trait over plain vectors, and
//! the recording channels capture what would have been sent. [`Harness`]
//! wires them to the services around a [`ManualClock`] parked on a Monday
//! noon in Denver.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use movienight_common::{AppError, AppResult, ManualClock, WeekWindow, WindowPolicy};
use movienight_db::entities::user::{self, SYSTEM_USER_ID};
use movienight_db::entities::vote;
use movienight_db::repositories::{LOCKED_SHOWING_CHANGED, NotificationPreference};
use tokio::sync::mpsc;

use crate::services::activity::{ActivityEvent, ActivitySender, activity_channel};
use crate::services::digest::WeeklyDigestService;
use crate::services::email::{EmailSender, EmailTemplate};
use crate::services::event_publisher::{EventPublisher, StreamEvent};
use crate::services::lock::LockService;
use crate::services::notification::NotificationDispatcher;
use crate::services::ranking::{LOCK_SENTINEL, ShowtimeSummary, ShowtimeTally, rank};
use crate::services::rsvp::{RsvpService, RsvpStatus};
use crate::services::store::{RsvpStore, UserDirectory, VoteStore};
use crate::services::vote::VoteService;
use crate::services::webhook::ChatWebhook;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A user with every notification off.
#[must_use]
pub fn sample_user(id: i32, name: &str) -> user::Model {
    user::Model {
        id,
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        token: Some(format!("token-{id}")),
        is_admin: false,
        weekly_notification: false,
        lock_notification: false,
        activity_notification: false,
        created_at: Utc::now().into(),
    }
}

/// A showtime of a movie with the same id.
#[must_use]
pub fn sample_showtime(id: i32, title: &str, starts_at: DateTime<Utc>) -> ShowtimeSummary {
    ShowtimeSummary {
        id,
        movie_id: id,
        movie_title: title.to_string(),
        poster: None,
        starts_at,
        screen: "1".to_string(),
        location: "Downtown".to_string(),
    }
}

#[derive(Default)]
struct StoreState {
    users: Vec<user::Model>,
    showtimes: Vec<ShowtimeSummary>,
    votes: Vec<vote::Model>,
    rsvps: Vec<(i32, i32, RsvpStatus)>,
    failing_writes: bool,
}

impl StoreState {
    fn window_ids(&self, window: &WeekWindow) -> HashSet<i32> {
        self.showtimes
            .iter()
            .filter(|s| window.contains(s.starts_at))
            .map(|s| s.id)
            .collect()
    }

    fn locked_showtime(&self, window_ids: &HashSet<i32>) -> Option<i32> {
        self.votes
            .iter()
            .find(|v| v.user_id == SYSTEM_USER_ID && window_ids.contains(&v.showtime_id))
            .map(|v| v.showtime_id)
    }

    fn value_of(&self, user_id: i32, showtime_id: i32) -> i32 {
        self.votes
            .iter()
            .find(|v| v.user_id == user_id && v.showtime_id == showtime_id)
            .map_or(0, |v| v.value)
    }
}

/// Storage over plain vectors.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: user::Model) {
        lock(&self.state).users.push(user);
    }

    pub fn add_showtime(&self, showtime: ShowtimeSummary) {
        lock(&self.state).showtimes.push(showtime);
    }

    /// Insert a vote row directly, bypassing validation.
    pub fn seed_vote(&self, user_id: i32, showtime_id: i32, value: i32) {
        lock(&self.state).votes.push(vote::Model {
            user_id,
            showtime_id,
            value,
        });
    }

    /// Make every vote write fail with a database error.
    pub fn set_failing_writes(&self, failing: bool) {
        lock(&self.state).failing_writes = failing;
    }

    /// `(showtime_id, value)` of a user's stored votes.
    #[must_use]
    pub fn votes_of(&self, user_id: i32) -> Vec<(i32, i32)> {
        lock(&self.state)
            .votes
            .iter()
            .filter(|v| v.user_id == user_id)
            .map(|v| (v.showtime_id, v.value))
            .collect()
    }

    /// `(user_id, showtime_id, value)` of stored RSVPs.
    #[must_use]
    pub fn rsvps(&self) -> Vec<(i32, i32, RsvpStatus)> {
        lock(&self.state).rsvps.clone()
    }
}

#[async_trait]
impl VoteStore for InMemoryStore {
    async fn ranked_showtimes(
        &self,
        window: &WeekWindow,
        limit: Option<usize>,
        for_user: Option<i32>,
    ) -> AppResult<Vec<ShowtimeTally>> {
        let state = lock(&self.state);
        let showtimes: Vec<ShowtimeSummary> = state
            .showtimes
            .iter()
            .filter(|s| window.contains(s.starts_at))
            .cloned()
            .collect();
        Ok(rank(showtimes, &state.votes, for_user, limit))
    }

    async fn find_showtimes(
        &self,
        window: &WeekWindow,
        ids: &[i32],
    ) -> AppResult<Vec<ShowtimeSummary>> {
        Ok(lock(&self.state)
            .showtimes
            .iter()
            .filter(|s| ids.contains(&s.id) && window.contains(s.starts_at))
            .cloned()
            .collect())
    }

    async fn find_showtime(&self, id: i32) -> AppResult<Option<ShowtimeSummary>> {
        Ok(lock(&self.state)
            .showtimes
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn replace_votes(
        &self,
        user_id: i32,
        window: &WeekWindow,
        votes: &[(i32, i32)],
    ) -> AppResult<()> {
        let mut state = lock(&self.state);
        if state.failing_writes {
            return Err(AppError::Database("write failed".to_string()));
        }

        let in_window = state.window_ids(window);

        let locked = if user_id == SYSTEM_USER_ID {
            None
        } else {
            state.locked_showtime(&in_window)
        };
        if let Some(locked) = locked {
            let current = state.value_of(user_id, locked);
            let submitted = votes
                .iter()
                .find(|(showtime_id, _)| *showtime_id == locked)
                .map_or(0, |(_, value)| *value);
            if submitted != current {
                return Err(AppError::Validation(LOCKED_SHOWING_CHANGED.to_string()));
            }
        }

        state
            .votes
            .retain(|v| v.user_id != user_id || !in_window.contains(&v.showtime_id));
        state.votes.extend(
            votes
                .iter()
                .filter(|(_, value)| *value != 0)
                .map(|&(showtime_id, value)| vote::Model {
                    user_id,
                    showtime_id,
                    value,
                }),
        );
        Ok(())
    }

    async fn lock_winner(&self, window: &WeekWindow, showtime_id: i32) -> AppResult<bool> {
        let mut state = lock(&self.state);
        if state.failing_writes {
            return Err(AppError::Database("write failed".to_string()));
        }

        let in_window = state.window_ids(window);
        if state.locked_showtime(&in_window).is_some() {
            return Ok(false);
        }

        state.votes.push(vote::Model {
            user_id: SYSTEM_USER_ID,
            showtime_id,
            value: LOCK_SENTINEL,
        });
        Ok(true)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(&self, id: i32) -> AppResult<Option<user::Model>> {
        Ok(lock(&self.state).users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_token(&self, token: &str) -> AppResult<Option<user::Model>> {
        Ok(lock(&self.state)
            .users
            .iter()
            .find(|u| u.id != SYSTEM_USER_ID && u.token.as_deref() == Some(token))
            .cloned())
    }

    async fn users_with_preference(
        &self,
        preference: NotificationPreference,
    ) -> AppResult<Vec<user::Model>> {
        let mut users: Vec<user::Model> = lock(&self.state)
            .users
            .iter()
            .filter(|u| u.id != SYSTEM_USER_ID)
            .filter(|u| match preference {
                NotificationPreference::Weekly => u.weekly_notification,
                NotificationPreference::Lock => u.lock_notification,
                NotificationPreference::Activity => u.activity_notification,
            })
            .cloned()
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }
}

#[async_trait]
impl RsvpStore for InMemoryStore {
    async fn record_rsvp(
        &self,
        user_id: i32,
        showtime_id: i32,
        status: RsvpStatus,
        _at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = lock(&self.state);
        state
            .rsvps
            .retain(|(u, s, _)| !(*u == user_id && *s == showtime_id));
        state.rsvps.push((user_id, showtime_id, status));
        Ok(())
    }
}

/// Chat webhook that records posts.
#[derive(Default)]
pub struct RecordingWebhook {
    posts: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl RecordingWebhook {
    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    /// `(title, text)` of every successful post.
    #[must_use]
    pub fn posts(&self) -> Vec<(String, String)> {
        lock(&self.posts).clone()
    }
}

#[async_trait]
impl ChatWebhook for RecordingWebhook {
    async fn post(&self, title: &str, text: &str) -> AppResult<()> {
        if *lock(&self.failing) {
            return Err(AppError::ExternalService("webhook unreachable".to_string()));
        }
        lock(&self.posts).push((title.to_string(), text.to_string()));
        Ok(())
    }
}

/// Email sender that records deliveries.
#[derive(Default)]
pub struct RecordingEmail {
    sent: Mutex<Vec<(i32, EmailTemplate)>>,
    failing: Mutex<HashSet<i32>>,
}

impl RecordingEmail {
    /// Fail every email to this user.
    pub fn fail_for(&self, user_id: i32) {
        lock(&self.failing).insert(user_id);
    }

    /// `(recipient_id, template)` of every successful send.
    #[must_use]
    pub fn sent(&self) -> Vec<(i32, EmailTemplate)> {
        lock(&self.sent).clone()
    }

    #[must_use]
    pub fn recipients(&self) -> Vec<i32> {
        lock(&self.sent).iter().map(|(id, _)| *id).collect()
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send_template(
        &self,
        to: &user::Model,
        template: &EmailTemplate,
        _window: &WeekWindow,
    ) -> AppResult<()> {
        if lock(&self.failing).contains(&to.id) {
            return Err(AppError::ExternalService("SMTP refused".to_string()));
        }
        lock(&self.sent).push((to.id, template.clone()));
        Ok(())
    }
}

/// Event publisher that records events.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<StreamEvent>>,
}

impl RecordingPublisher {
    #[must_use]
    pub fn events(&self) -> Vec<StreamEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: StreamEvent) -> AppResult<()> {
        lock(&self.events).push(event);
        Ok(())
    }
}

/// Services wired to in-memory collaborators.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryStore>,
    pub webhook: Arc<RecordingWebhook>,
    pub email: Arc<RecordingEmail>,
    pub events: Arc<RecordingPublisher>,
    pub policy: WindowPolicy,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Secret RSVP tokens are signed with.
    pub const RSVP_SECRET: &'static str = "test-secret";

    /// Timezone of the harness calendar.
    pub const TIMEZONE: Tz = chrono_tz::America::Denver;

    #[must_use]
    pub fn new() -> Self {
        // Monday 2026-10-12 12:00 in Denver.
        let start = Utc
            .with_ymd_and_hms(2026, 10, 12, 18, 0, 0)
            .single()
            .unwrap_or_default();

        Self {
            clock: Arc::new(ManualClock::new(start)),
            store: Arc::new(InMemoryStore::new()),
            webhook: Arc::new(RecordingWebhook::default()),
            email: Arc::new(RecordingEmail::default()),
            events: Arc::new(RecordingPublisher::default()),
            policy: WindowPolicy::new(Self::TIMEZONE, Weekday::Tue),
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        movienight_common::Clock::now(self.clock.as_ref())
    }

    /// Window active at the harness clock.
    #[must_use]
    pub fn window(&self) -> WeekWindow {
        self.policy.window_at(self.now())
    }

    #[must_use]
    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(
            self.webhook.clone(),
            self.email.clone(),
            self.events.clone(),
            self.store.clone(),
            Self::TIMEZONE,
        )
    }

    /// Vote service plus the receiving end of its activity queue.
    #[must_use]
    pub fn vote_service(&self) -> (VoteService, mpsc::Receiver<ActivityEvent>) {
        let (tx, rx) = activity_channel(16);
        (self.vote_service_with(tx), rx)
    }

    #[must_use]
    pub fn vote_service_with(&self, activity: ActivitySender) -> VoteService {
        VoteService::new(self.store.clone(), activity, self.policy, self.clock.clone())
    }

    #[must_use]
    pub fn lock_service(&self) -> LockService {
        LockService::new(
            self.store.clone(),
            self.dispatcher(),
            self.policy,
            self.clock.clone(),
        )
    }

    #[must_use]
    pub fn rsvp_service(&self) -> RsvpService {
        RsvpService::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            self.dispatcher(),
            Self::RSVP_SECRET.to_string(),
            self.clock.clone(),
        )
    }

    #[must_use]
    pub fn digest_service(&self) -> WeeklyDigestService {
        WeeklyDigestService::new(
            self.store.clone(),
            self.store.clone(),
            self.email.clone(),
            self.policy,
            self.clock.clone(),
        )
    }

    /// Ranked showtimes of the current window, without a requester.
    pub async fn ranked(&self) -> Vec<ShowtimeTally> {
        self.store
            .ranked_showtimes(&self.window(), None, None)
            .await
            .unwrap_or_default()
    }
}
