//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but request-level
//! errors should use `identity::IdentityError`.

use axum::{
    Router, http,
    http::{Method, header},
};
use identity::application::notification::NotificationReceiver;
use identity::application::RegisterUseCase;
use identity::infra::{LogTransport, WebhookTransport};
use identity::{
    IdentityConfig, IdentityServices, MemoryEphemeralStore, NotificationSender,
    NotificationWorker, PgIdentityRepository, SessionSweeper, identity_router,
};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,identity=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing or weak JWT_SECRET stops startup
    let config = IdentityConfig::from_env()?;
    tracing::info!(environment = ?config.environment, "Configuration loaded");

    // Database connection
    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set in environment"))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    // Outbound mail goes through a background worker
    let (notifier, notifications) = NotificationSender::channel();
    spawn_notification_worker(&config, notifications)?;

    let services = IdentityServices::new(
        PgIdentityRepository::new(pool.clone()),
        MemoryEphemeralStore::new(),
        config,
        notifier,
    );

    bootstrap_admin(&services).await;

    // The sweeper's first pass runs at startup; APP_ENV=test starts nothing
    let sweeper = SessionSweeper::new(services.repo.clone(), services.config.session_sweep_interval)
        .start(&services.config);

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]))
        .allow_credentials(true);

    // Build router
    let app = Router::new()
        .nest("/api/auth", identity_router(services))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = env::var("BIND_ADDR")
        .ok()
        .and_then(|addr| addr.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 31113)));
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(sweeper) = sweeper {
        sweeper.stop().await;
    }

    Ok(())
}

fn spawn_notification_worker(
    config: &IdentityConfig,
    notifications: NotificationReceiver,
) -> anyhow::Result<()> {
    match config.notify_webhook_url.as_deref() {
        Some(url) => {
            let transport = WebhookTransport::new(url)?;
            tokio::spawn(NotificationWorker::new(notifications, transport).run());
            tracing::info!("Notifications relayed to webhook");
        }
        None => {
            tokio::spawn(NotificationWorker::new(notifications, LogTransport).run());
            tracing::info!("Notifications written to the log only");
        }
    }
    Ok(())
}

/// Create the first administrator from ADMIN_BOOTSTRAP_EMAIL / ADMIN_BOOTSTRAP_PASSWORD
async fn bootstrap_admin(services: &IdentityServices<PgIdentityRepository, MemoryEphemeralStore>) {
    let (Ok(email), Ok(password)) = (
        env::var("ADMIN_BOOTSTRAP_EMAIL"),
        env::var("ADMIN_BOOTSTRAP_PASSWORD"),
    ) else {
        return;
    };

    match RegisterUseCase::new(services.clone())
        .bootstrap_admin(&email, password)
        .await
    {
        Ok(Some(user)) => tracing::info!(user_id = %user.user_id, "Bootstrap administrator ready"),
        Ok(None) => tracing::debug!("Bootstrap administrator already present"),
        Err(e) => tracing::warn!(error = %e, "Bootstrap administrator not created"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
