//! Crewstore bot - chat storefront and workforce ledger.
//!
//! Long-polls the Telegram Bot API and serves liveness/readiness probes on
//! `BOT_HOST:BOT_PORT`.
//!
//! # Architecture
//!
//! - SQLite ledger (WAL, embedded migrations run on startup)
//! - One task per inbound update, conversation state in a concurrent cache
//! - Axum for the health endpoints only

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use sentry::integrations::tracing as sentry_tracing;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crewstore_bot::clock::SystemClock;
use crewstore_bot::config::{BotConfig, LogFormat};
use crewstore_bot::db;
use crewstore_bot::dispatch::Dispatcher;
use crewstore_bot::gateway::telegram::{BotCommand, TelegramClient};
use crewstore_bot::runtime;
use crewstore_bot::state::BotState;
use crewstore_core::UserId;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &BotConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "crewstore_bot=info,tower_http=info".into());

    let json = format == LogFormat::Json;
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: Sentry needs it before the subscriber exists
    let config = BotConfig::from_env()?;
    let _sentry_guard = init_sentry(&config);
    init_tracing(config.log_format);

    let pool = db::create_pool(&config.database).await.inspect_err(|e| {
        tracing::error!(error = %e, "Failed to open the ledger store");
    })?;
    db::run_migrations(&pool).await.inspect_err(|e| {
        tracing::error!(error = %e, "Migrations failed");
    })?;
    tracing::info!("Ledger store ready");

    let client = Arc::new(TelegramClient::new(
        config.telegram.bot_token.clone(),
        config.telegram.poll_timeout,
    )?);
    client
        .set_my_commands(vec![
            BotCommand {
                command: "start",
                description: "Register",
            },
            BotCommand {
                command: "menu",
                description: "Open the menu",
            },
        ])
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Failed to register bot commands"))?;

    let state = BotState::new(
        pool.clone(),
        Arc::clone(&client),
        Arc::new(SystemClock),
        config.ledger,
        UserId::new(config.telegram.super_user),
    );
    let dispatcher = Dispatcher::new(state);

    let app = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .layer(TraceLayer::new_for_http())
        .with_state(pool);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("health probes listening on http://{}", addr);

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    let polled = runtime::run(Arc::clone(&client), dispatcher, shutdown_signal()).await;

    // Stop the health server once polling has drained
    let _ = stop_tx.send(true);
    server.await??;
    polled?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the process is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the ledger store is not reachable.
async fn readiness(State(pool): State<SqlitePool>) -> StatusCode {
    match db::ping(&pool).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
