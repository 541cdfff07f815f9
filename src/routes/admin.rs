// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin review routes.

use crate::error::{AppError, Result};
use crate::models::{DriverProfile, TransitionRecord};
use crate::services::oidc::AuthUser;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Admin routes. Auth and the admin check are applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/drivers", get(list_drivers))
        .route("/api/admin/drivers/{id}/history", get(driver_history))
        .route("/api/admin/drivers/{id}/approve", post(approve_driver))
        .route("/api/admin/drivers/{id}/reject", post(reject_driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DriverProfile>>> {
    Ok(Json(state.drivers.list().await?))
}

async fn driver_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TransitionRecord>>> {
    // 404 for unknown ids rather than an empty list
    state.drivers.get(&id).await?;
    Ok(Json(state.drivers.history(&id).await?))
}

async fn approve_driver(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DriverProfile>> {
    let profile = state.drivers.approve(&id, &admin.email).await?;
    tracing::info!(profile_id = %id, admin = %admin.email, "Driver approved");
    Ok(Json(profile))
}

#[derive(Debug, Default, Deserialize)]
struct RejectRequest {
    #[serde(default)]
    reason: Option<String>,
}

async fn reject_driver(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<DriverProfile>> {
    // The body is optional; an empty POST rejects without a reason.
    let request: RejectRequest = if body.is_empty() {
        RejectRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?
    };
    let reason = request
        .reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    let profile = state.drivers.reject(&id, &admin.email, reason).await?;
    tracing::info!(profile_id = %id, admin = %admin.email, "Driver rejected");
    Ok(Json(profile))
}
