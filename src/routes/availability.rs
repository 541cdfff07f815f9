// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The signed-in driver's availability calendar.

use crate::error::Result;
use crate::models::AvailabilityEntry;
use crate::services::availability::{DateRangeQuery, SetAvailabilityRequest};
use crate::services::oidc::AuthUser;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/availability",
        get(list_availability).put(set_availability),
    )
}

async fn list_availability(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<Vec<AvailabilityEntry>>> {
    let entries = state
        .availability
        .list_for_account(&user.subject, &range)
        .await?;
    Ok(Json(entries))
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SetAvailabilityRequest>,
) -> Result<Json<AvailabilityEntry>> {
    let entry = state
        .availability
        .set_availability(&user.subject, request)
        .await?;
    Ok(Json(entry))
}
