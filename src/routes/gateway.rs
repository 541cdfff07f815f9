// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public response-token routes. The token is the only credential.

use crate::error::Result;
use crate::services::gateway::{ProxiedResponse, RespondRequest};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/public/availability-requests/{token}", get(get_request))
        .route(
            "/public/availability-requests/{token}/respond",
            post(respond),
        )
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<ProxiedResponse> {
    state.gateway.get_by_token(&token).await
}

async fn respond(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(request): Json<RespondRequest>,
) -> Result<ProxiedResponse> {
    state.gateway.respond_by_token(&token, &request).await
}
