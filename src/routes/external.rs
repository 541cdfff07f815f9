// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dispatch-side availability lookups, authenticated by API key.

use crate::error::Result;
use crate::services::availability::{DateRangeQuery, DriverAvailability};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// External routes. The API key check is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/external/drivers/{worker_id}/availability",
            get(availability_by_worker),
        )
        .route("/external/availability", get(availability_by_phone))
}

async fn availability_by_worker(
    State(state): State<Arc<AppState>>,
    Path(worker_id): Path<String>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<DriverAvailability>> {
    Ok(Json(state.availability.for_worker(&worker_id, &range).await?))
}

#[derive(Debug, Deserialize)]
struct PhoneQuery {
    #[serde(default)]
    phone: String,
    start: Option<String>,
    end: Option<String>,
}

async fn availability_by_phone(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PhoneQuery>,
) -> Result<Json<DriverAvailability>> {
    let range = DateRangeQuery {
        start: query.start,
        end: query.end,
    };
    Ok(Json(state.availability.for_phone(&query.phone, &range).await?))
}
