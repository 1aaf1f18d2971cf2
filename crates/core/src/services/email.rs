//! Email notification service.
//!
//! Plain-text notification emails, threaded per vote window so a mail client
//! groups a week's activity, lock and digest messages together.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use movienight_common::config::SmtpConfig;
use movienight_common::{AppError, AppResult, Config, WeekWindow, parse_timezone, sign_rsvp};
use movienight_db::entities::user;
use url::Url;

use super::activity::{ActivityVote, UserSummary};
use super::ranking::ShowtimeTally;
use super::rsvp::RsvpStatus;

/// Email kinds and the data each one renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate {
    /// Someone else voted.
    Activity {
        voter: UserSummary,
        votes: Vec<ActivityVote>,
        standings: Vec<ShowtimeTally>,
    },
    /// The week's winner was locked.
    Lock { winner: ShowtimeTally },
    /// Saturday standings digest, with the recipient's own votes attached.
    Weekly { standings: Vec<ShowtimeTally> },
}

impl EmailTemplate {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Activity { .. } => "activity",
            Self::Lock { .. } => "lock",
            Self::Weekly { .. } => "weekly",
        }
    }
}

/// Sends templated emails to users.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Render `template` for `to` and send it, threaded under `window`.
    async fn send_template(
        &self,
        to: &user::Model,
        template: &EmailTemplate,
        window: &WeekWindow,
    ) -> AppResult<()>;
}

/// Email configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// From address
    pub from_address: String,
    /// From name
    pub from_name: String,
    /// Public URL links point at
    pub app_url: Url,
    /// Secret for RSVP link tokens
    pub rsvp_secret: String,
    /// Timezone showtimes are printed in
    pub timezone: Tz,
}

impl EmailConfig {
    /// Build from the application config.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let app_url = Url::parse(&config.server.url)
            .map_err(|e| AppError::Config(format!("Invalid server URL: {e}")))?;

        Ok(Self {
            from_address: config.notifications.from_address.clone(),
            from_name: config.notifications.from_name.clone(),
            app_url,
            rsvp_secret: config.notifications.rsvp_secret.clone(),
            timezone: parse_timezone(&config.schedule.timezone)?,
        })
    }
}

/// A rendered email, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
    /// Message id every email of the window replies to.
    pub thread_id: String,
}

/// Email service.
#[derive(Clone)]
pub struct EmailService {
    config: Arc<EmailConfig>,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    debug: bool,
}

impl EmailService {
    /// Create a new email service.
    ///
    /// Without SMTP settings emails are skipped; in debug mode they are logged.
    pub fn new(config: EmailConfig, smtp: Option<&SmtpConfig>, debug: bool) -> AppResult<Self> {
        let transport = match smtp {
            Some(smtp) => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
                    .map_err(|e| AppError::Config(format!("Invalid SMTP host: {e}")))?
                    .port(smtp.port);

                if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
                    builder =
                        builder.credentials(Credentials::new(username.clone(), password.clone()));
                }

                Some(builder.build())
            }
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            transport,
            debug,
        })
    }

    /// Check if emails leave the process.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.transport.is_some() && !self.debug
    }

    /// Signed link that records an RSVP without logging in.
    #[must_use]
    pub fn rsvp_link(&self, user_id: i32, showtime_id: i32, status: RsvpStatus) -> String {
        let token = sign_rsvp(&self.config.rsvp_secret, user_id, showtime_id);
        let base = self
            .config
            .app_url
            .join("api/rsvp")
            .map_or_else(|_| self.config.app_url.to_string(), |u| u.to_string());

        format!(
            "{base}?showtimeId={showtime_id}&value={}&userId={user_id}&token={}",
            status.as_str(),
            urlencoding::encode(&token)
        )
    }

    /// Render an email.
    #[must_use]
    pub fn render(
        &self,
        to: &user::Model,
        template: &EmailTemplate,
        window: &WeekWindow,
    ) -> RenderedEmail {
        let tz = self.config.timezone;
        let mut body = format!("Hi {},\n\n", to.name);

        let subject = match template {
            EmailTemplate::Activity {
                voter,
                votes,
                standings,
            } => {
                let _ = writeln!(body, "{} updated their movie night votes:", voter.name);
                for v in votes {
                    let _ = writeln!(
                        body,
                        "  {:+}  {}, {}",
                        v.vote,
                        v.showtime.movie_title,
                        format_showtime(tz, v.showtime.starts_at)
                    );
                }
                body.push('\n');
                write_standings(&mut body, tz, standings);
                "Movie Night Activity"
            }
            EmailTemplate::Lock { winner } => {
                let s = &winner.showtime;
                let _ = writeln!(
                    body,
                    "Movie night is locked in: {}, {} at {} (screen {}).\n",
                    s.movie_title,
                    format_showtime(tz, s.starts_at),
                    s.location,
                    s.screen
                );
                let _ = writeln!(body, "Will you be there?");
                let _ = writeln!(
                    body,
                    "  Yes: {}",
                    self.rsvp_link(to.id, s.id, RsvpStatus::Accepted)
                );
                let _ = writeln!(
                    body,
                    "  No:  {}",
                    self.rsvp_link(to.id, s.id, RsvpStatus::Declined)
                );
                "Movie Night Confirmation"
            }
            EmailTemplate::Weekly { standings } => {
                if !standings.iter().any(|t| t.vote.unwrap_or_default() > 0) {
                    let _ = writeln!(body, "You haven't voted yet this week.\n");
                }
                write_standings(&mut body, tz, standings);
                "Movie Night Weekly Notification"
            }
        };

        let _ = write!(body, "\nVote at {}\n", self.config.app_url);

        RenderedEmail {
            subject: subject.to_string(),
            body,
            thread_id: self.thread_id(window),
        }
    }

    fn thread_id(&self, window: &WeekWindow) -> String {
        let host = self.config.app_url.host_str().unwrap_or("localhost");
        format!("<movie-night.{}@{host}>", window.start.to_rfc3339())
    }

    fn build_message(&self, to: &user::Model, rendered: &RenderedEmail) -> AppResult<Message> {
        let from = Mailbox::new(
            Some(self.config.from_name.clone()),
            self.config
                .from_address
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid from address: {e}")))?,
        );
        let recipient = Mailbox::new(
            Some(to.name.clone()),
            to.email
                .parse()
                .map_err(|e| AppError::Validation(format!("Invalid email address: {e}")))?,
        );

        Message::builder()
            .from(from)
            .to(recipient)
            .subject(rendered.subject.clone())
            .in_reply_to(rendered.thread_id.clone())
            .references(rendered.thread_id.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(rendered.body.clone())
            .map_err(|e| AppError::Internal(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl EmailSender for EmailService {
    async fn send_template(
        &self,
        to: &user::Model,
        template: &EmailTemplate,
        window: &WeekWindow,
    ) -> AppResult<()> {
        let rendered = self.render(to, template, window);

        if self.debug {
            tracing::info!(
                to = %to.email,
                subject = %rendered.subject,
                body = %rendered.body,
                "Debug mode, email not sent"
            );
            return Ok(());
        }

        let Some(transport) = &self.transport else {
            tracing::debug!(to = %to.email, template = template.name(), "SMTP not configured, email skipped");
            return Ok(());
        };

        let message = self.build_message(to, &rendered)?;
        transport
            .send(message)
            .await
            .map_err(|e| AppError::ExternalService(format!("SMTP delivery failed: {e}")))?;

        tracing::debug!(to = %to.email, template = template.name(), "Email sent");
        Ok(())
    }
}

/// Showtime start in local time, e.g. `Fri Oct 16 7:00PM`.
#[must_use]
pub fn format_showtime(tz: Tz, starts_at: DateTime<Utc>) -> String {
    starts_at
        .with_timezone(&tz)
        .format("%a %b %-d %-I:%M%p")
        .to_string()
}

fn write_standings(body: &mut String, tz: Tz, standings: &[ShowtimeTally]) {
    if standings.is_empty() {
        body.push_str("No showtimes are up for a vote yet.\n");
        return;
    }

    body.push_str("Current standings:\n");
    for (i, t) in standings.iter().enumerate() {
        let _ = write!(
            body,
            "  {}. {}, {} ({} votes)",
            i + 1,
            t.showtime.movie_title,
            format_showtime(tz, t.showtime.starts_at),
            t.votes
        );
        if let Some(own) = t.vote.filter(|v| *v != 0) {
            let _ = write!(body, " [your vote: {own:+}]");
        }
        body.push('\n');
    }
}
