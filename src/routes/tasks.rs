// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Task handler routes for Cloud Tasks callbacks.
//!
//! These endpoints are called by Cloud Tasks, not directly by users.
//! `require_tasks_auth` is applied in routes/mod.rs.

use crate::error::Result;
use crate::services::sync::{outcome_status, SyncDriverPayload, SyncJobOutcome};
use crate::services::tasks::SYNC_DRIVER_ENDPOINT;
use crate::AppState;
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Task handler routes (called by Cloud Tasks).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(SYNC_DRIVER_ENDPOINT, post(sync_driver))
        .route("/tasks/reconcile-unsynced", post(reconcile_unsynced))
}

/// Push one verified driver to the fleet platform. A failed sync answers
/// non-2xx so the queue retries it.
async fn sync_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SyncDriverPayload>,
) -> Result<Json<SyncJobOutcome>> {
    tracing::info!(
        profile_id = %payload.profile_id,
        source = %payload.source,
        "Processing fleet sync from Cloud Task"
    );

    let outcome = state.sync_runner.run(&payload).await?;
    outcome_status(&outcome)?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
struct ReconcileResponse {
    dispatched: usize,
}

/// Re-enqueue every verified driver still missing a fleet worker.
async fn reconcile_unsynced(State(state): State<Arc<AppState>>) -> Result<Json<ReconcileResponse>> {
    let dispatched = state.drivers.reconcile_unsynced().await?;
    Ok(Json(ReconcileResponse { dispatched }))
}
