// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reminders Relay API Server
//!
//! Lets a watch companion app read and update iCloud Reminders on behalf
//! of registered users, without the watch ever holding the Apple ID.

use reminders_relay::{
    config::{Config, UpstreamMode},
    db::CredentialStore,
    middleware::rate_limit::RateLimiter,
    services::{
        AuthService, CredentialCipher, ICloudUpstream, InMemoryUpstream, RemindersGateway,
        RemindersUpstream,
    },
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        environment = %config.environment,
        "Starting Reminders Relay API"
    );

    // Open the credential store and apply the schema
    let store = CredentialStore::connect(&config.database_url).await?;

    let cipher = CredentialCipher::new(&config.encryption_key)?;
    let auth = AuthService::new(store, cipher, config.jwt_signing_key.clone());

    let upstream: Arc<dyn RemindersUpstream> = match config.upstream_mode {
        UpstreamMode::ICloud => {
            tracing::info!(
                auth_endpoint = %config.icloud_auth_endpoint,
                timeout_secs = config.upstream_timeout.as_secs(),
                "Using iCloud reminders upstream"
            );
            Arc::new(ICloudUpstream::new(
                &config.icloud_auth_endpoint,
                &config.icloud_setup_endpoint,
                config.upstream_timeout,
            ))
        }
        UpstreamMode::Memory => {
            tracing::warn!("Using in-memory reminders upstream; data is not persisted");
            Arc::new(InMemoryUpstream::auto_provisioning())
        }
    };
    let reminders = RemindersGateway::new(auth.clone(), upstream);

    // Build shared state
    let state = Arc::new(AppState {
        auth_limiter: RateLimiter::per_minute(config.auth_rate_limit),
        api_limiter: RateLimiter::per_minute(config.api_rate_limit),
        config: config.clone(),
        auth,
        reminders,
    });

    // Build router
    let app = reminders_relay::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reminders_relay=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
