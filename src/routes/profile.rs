// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Driver profile routes.

use crate::error::Result;
use crate::models::{DriverProfile, ProfilePatch, TransitionRecord};
use crate::services::oidc::AuthUser;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use std::sync::Arc;

/// Profile routes. Auth is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/profile",
            get(get_profile).post(create_profile).patch(patch_profile),
        )
        .route("/api/profile/history", get(get_history))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DriverProfile>> {
    let profile = state.drivers.get_for_account(&user.subject).await?;
    Ok(Json(profile))
}

/// Explicit create; 409 if the account already has a profile.
async fn create_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<DriverProfile>)> {
    let profile = state
        .drivers
        .create(&user.subject, Some(user.email.clone()))
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// Edit fields and optionally advance `onboardingStep`.
async fn patch_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<DriverProfile>> {
    let profile = state
        .drivers
        .patch(&user.subject, Some(user.email.clone()), &patch)
        .await?;
    Ok(Json(profile))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<TransitionRecord>>> {
    let profile = state.drivers.get_for_account(&user.subject).await?;
    Ok(Json(state.drivers.history(&profile.id).await?))
}
