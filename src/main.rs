// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Zotpool API Server
//!
//! Carpool matchmaking for students of a single campus.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zotpool::{config::Config, db::Database, services::Mailer, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured JSON logging
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        domain = %config.institution_domain,
        storage = ?config.storage_backend,
        "Starting Zotpool API"
    );

    let db = Database::connect(&config).await?;
    let mailer = Mailer::new(config.smtp.as_ref(), config.external_timeout)?;

    let state = Arc::new(AppState::new(config.clone(), db, mailer)?);
    let app = zotpool::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
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
            EnvFilter::from_default_env()
                .add_directive("zotpool=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
