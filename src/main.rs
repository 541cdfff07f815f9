// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Driver Onboarding API Server

use driver_onboarding::{
    build_sync_runner,
    config::{Config, StorageBackend, SyncDispatchMode},
    db::{FirestoreDb, MemoryDb, Store},
    services::{CloudTasksDispatcher, InlineDispatcher, SyncDispatcher},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        environment = ?config.environment,
        "Starting Driver Onboarding API"
    );

    let store: Arc<dyn Store> = match config.storage_backend {
        StorageBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    let sync_runner = build_sync_runner(&config, store.clone())?;

    let dispatcher: Arc<dyn SyncDispatcher> = match config.sync_dispatch {
        SyncDispatchMode::CloudTasks => {
            tracing::info!(
                project = %config.gcp_project_id,
                "Cloud Tasks dispatcher initialized"
            );
            Arc::new(CloudTasksDispatcher::new(
                &config.gcp_project_id,
                &config.gcp_region,
                &config.api_url,
            ))
        }
        SyncDispatchMode::Inline => Arc::new(InlineDispatcher::new(sync_runner.clone())),
    };

    let addr = format!("0.0.0.0:{}", config.port);

    // Build shared state
    let state = Arc::new(AppState::new(config, store, sync_runner, dispatcher)?);

    // Build router
    let app = driver_onboarding::routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("driver_onboarding=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
