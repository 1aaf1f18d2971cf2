//! Application configuration.

use chrono::Weekday;
use serde::Deserialize;
use std::path::Path;

use crate::window::{WeeklySchedule, WindowPolicy, parse_timezone};
use crate::{AppError, AppResult};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Weekly timers and vote windows.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Outbound notification channels.
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance, used in links sent by email.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// A weekday and local time.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WeeklyTime {
    /// Day of the week, e.g. `"Tue"` or `"tuesday"`.
    pub weekday: Weekday,
    /// Hour of the day (0-23).
    pub hour: u32,
    /// Minute of the hour (0-59).
    #[serde(default)]
    pub minute: u32,
}

/// Schedule configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// IANA timezone the weekly cycle is computed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// When the week's winner is locked. The weekday is also the lock day of
    /// the vote window.
    #[serde(default = "default_lock_time")]
    pub lock: WeeklyTime,
    /// When the weekly digest email goes out.
    #[serde(default = "default_weekly_time")]
    pub weekly_email: WeeklyTime,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            lock: default_lock_time(),
            weekly_email: default_weekly_time(),
        }
    }
}

impl ScheduleConfig {
    /// Vote window policy derived from the timezone and lock day.
    pub fn window_policy(&self) -> AppResult<WindowPolicy> {
        let tz = parse_timezone(&self.timezone)?;
        Ok(WindowPolicy::new(tz, self.lock.weekday))
    }

    /// Schedule of the weekly lock.
    pub fn lock_schedule(&self) -> AppResult<WeeklySchedule> {
        let tz = parse_timezone(&self.timezone)?;
        WeeklySchedule::new(self.lock.weekday, self.lock.hour, self.lock.minute, tz)
    }

    /// Schedule of the weekly digest email.
    pub fn weekly_email_schedule(&self) -> AppResult<WeeklySchedule> {
        let tz = parse_timezone(&self.timezone)?;
        WeeklySchedule::new(
            self.weekly_email.weekday,
            self.weekly_email.hour,
            self.weekly_email.minute,
            tz,
        )
    }
}

/// SMTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// SMTP host.
    pub host: String,
    /// SMTP port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Auth user.
    #[serde(default)]
    pub username: Option<String>,
    /// Auth password.
    #[serde(default)]
    pub password: Option<String>,
}

/// Notification channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Log webhooks and emails instead of sending them.
    #[serde(default)]
    pub debug: bool,
    /// Chat webhook URL. Webhook posts are skipped when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// SMTP relay. Emails are skipped when unset.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    /// Sender address.
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Sender display name.
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Secret used to sign RSVP links.
    #[serde(default = "default_rsvp_secret")]
    pub rsvp_secret: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            debug: false,
            webhook_url: None,
            smtp: None,
            from_address: default_from_address(),
            from_name: default_from_name(),
            rsvp_secret: default_rsvp_secret(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    9000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

fn default_timezone() -> String {
    "America/Denver".to_string()
}

const fn default_lock_time() -> WeeklyTime {
    WeeklyTime {
        weekday: Weekday::Tue,
        hour: 16,
        minute: 30,
    }
}

const fn default_weekly_time() -> WeeklyTime {
    WeeklyTime {
        weekday: Weekday::Sat,
        hour: 9,
        minute: 0,
    }
}

const fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "movienight@localhost".to_string()
}

fn default_from_name() -> String {
    "Movie Night".to_string()
}

fn default_rsvp_secret() -> String {
    "change-me".to_string()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `MOVIENIGHT_ENV`)
    /// 4. Environment variables with `MOVIENIGHT__` prefix
    pub fn load() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        let env = std::env::var("MOVIENIGHT_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("MOVIENIGHT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("MOVIENIGHT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later at runtime.
    pub fn validate(&self) -> AppResult<()> {
        self.schedule.window_policy()?;
        self.schedule.lock_schedule()?;
        self.schedule.weekly_email_schedule()?;

        if let Some(webhook_url) = &self.notifications.webhook_url {
            url::Url::parse(webhook_url)
                .map_err(|e| AppError::Config(format!("Invalid webhook URL: {e}")))?;
        }
        url::Url::parse(&self.server.url)
            .map_err(|e| AppError::Config(format!("Invalid server URL: {e}")))?;

        // Anyone knowing the default secret could answer RSVPs for any user.
        if !self.notifications.debug && self.notifications.rsvp_secret == default_rsvp_secret() {
            return Err(AppError::Config(
                "notifications.rsvp_secret must be changed from its default".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> AppResult<Config> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = from_toml(
            r#"
            [server]
            url = "http://localhost:9000/"

            [database]
            url = "postgres://localhost/movienight"

            [notifications]
            rsvp_secret = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.schedule.timezone, "America/Denver");
        assert_eq!(config.schedule.lock.weekday, Weekday::Tue);
        assert_eq!(config.schedule.lock.hour, 16);
        assert_eq!(config.schedule.weekly_email.weekday, Weekday::Sat);
        assert!(!config.notifications.debug);
        assert!(config.notifications.smtp.is_none());
    }

    #[test]
    fn test_schedule_override() {
        let config = from_toml(
            r#"
            [server]
            url = "http://localhost:9000/"

            [database]
            url = "postgres://localhost/movienight"

            [notifications]
            rsvp_secret = "s3cret"

            [schedule]
            timezone = "Europe/Berlin"
            lock = { weekday = "Wed", hour = 18 }
            "#,
        )
        .unwrap();

        assert_eq!(config.schedule.lock.weekday, Weekday::Wed);
        assert_eq!(config.schedule.lock.minute, 0);
    }

    #[test]
    fn test_bad_timezone_rejected() {
        let result = from_toml(
            r#"
            [server]
            url = "http://localhost:9000/"

            [database]
            url = "postgres://localhost/movienight"

            [schedule]
            timezone = "Nowhere/Special"
            "#,
        );

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_bad_webhook_url_rejected() {
        let result = from_toml(
            r#"
            [server]
            url = "http://localhost:9000/"

            [database]
            url = "postgres://localhost/movienight"

            [notifications]
            webhook_url = "not a url"
            "#,
        );

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_default_rsvp_secret_rejected() {
        let base = r#"
            [server]
            url = "http://localhost:9000/"

            [database]
            url = "postgres://localhost/movienight"
            "#;

        let result = from_toml(base);
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("rsvp_secret")));

        // Dry-run mode sends no links, so the default is tolerated there.
        let debug = format!("{base}\n[notifications]\ndebug = true\n");
        assert!(from_toml(&debug).unwrap().notifications.debug);
    }
}
