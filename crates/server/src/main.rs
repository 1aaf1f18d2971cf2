//! Movie night server entry point.

use std::sync::Arc;

use axum::{Router, middleware};
use movienight_api::{SseBroadcaster, middleware::AppState, router as api_router};
use movienight_common::{Config, SharedClock, SystemClock, parse_timezone};
use movienight_core::{
    ACTIVITY_QUEUE_CAPACITY, ActivityCoalescer, EmailConfig, EmailService, LockService,
    NotificationDispatcher, RsvpService, SeaOrmStore, VoteService, WebhookClient,
    WeeklyDigestService, activity_channel,
};
use movienight_queue::{
    ActivityDrain, LockJob, WeeklyDigestJob, run_activity_ingest, spawn_weekly_job,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "movienight=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting movienight server...");

    // Load configuration
    let config = Config::load()?;
    let policy = config.schedule.window_policy()?;
    let timezone = parse_timezone(&config.schedule.timezone)?;

    // Connect to database
    let db = movienight_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    movienight_db::migrate(&db).await?;
    info!("Migrations completed");

    let store = Arc::new(SeaOrmStore::new(Arc::new(db)));
    let clock: SharedClock = Arc::new(SystemClock);

    // Notification channels
    let webhook = Arc::new(WebhookClient::new(
        config.notifications.webhook_url.clone(),
        config.notifications.debug,
    )?);
    let email = Arc::new(EmailService::new(
        EmailConfig::from_config(&config)?,
        config.notifications.smtp.as_ref(),
        config.notifications.debug,
    )?);
    let broadcaster = SseBroadcaster::new();

    let dispatcher = NotificationDispatcher::new(
        webhook,
        email.clone(),
        Arc::new(broadcaster.clone()),
        store.clone(),
        timezone,
    );

    // Activity coalescing
    let (activity_tx, activity_rx) = activity_channel(ACTIVITY_QUEUE_CAPACITY);
    let coalescer = Arc::new(ActivityCoalescer::new(clock.clone()));
    tokio::spawn(run_activity_ingest(activity_rx, coalescer.clone()));
    let drain = ActivityDrain::new(
        coalescer,
        store.clone(),
        dispatcher.clone(),
        policy,
        clock.clone(),
    );
    tokio::spawn(drain.run());

    // Initialize services
    let vote_service = VoteService::new(store.clone(), activity_tx, policy, clock.clone());
    let lock_service = LockService::new(store.clone(), dispatcher.clone(), policy, clock.clone());
    let rsvp_service = RsvpService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        dispatcher,
        config.notifications.rsvp_secret.clone(),
        clock.clone(),
    );
    let digest_service =
        WeeklyDigestService::new(store.clone(), store.clone(), email, policy, clock.clone());

    // Weekly timers
    spawn_weekly_job(
        Arc::new(LockJob::new(lock_service.clone())),
        config.schedule.lock_schedule()?,
        clock.clone(),
    );
    spawn_weekly_job(
        Arc::new(WeeklyDigestJob::new(digest_service)),
        config.schedule.weekly_email_schedule()?,
        clock,
    );
    info!("Background tasks started");

    // Create app state
    let state = AppState {
        vote_service,
        lock_service,
        rsvp_service,
        users: store,
        broadcaster,
    };

    // Build router
    let app = Router::new()
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            movienight_api::middleware::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
