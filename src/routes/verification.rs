// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity verification routes: session start, status polling and the
//! provider webhook.

use crate::error::{AppError, Result};
use crate::models::{ApprovalStatus, LifecycleState, VerificationStatus};
use crate::services::driver::ProfileRef;
use crate::services::oidc::AuthUser;
use crate::services::verification::{verify_signature, WebhookEvent, SIGNATURE_HEADER};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

const SESSION_EVENT_PREFIX: &str = "identity.verification_session.";

/// Driver-facing routes. Auth is applied in routes/mod.rs.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/verification/session", post(start_session))
        .route("/api/verification/status", get(get_status))
}

/// Provider push. Authenticated by signature, not by user token.
pub fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/identity-verification", post(handle_webhook))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
    url: Option<String>,
    client_secret: Option<String>,
}

/// Start a verification session for an approved driver.
async fn start_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SessionResponse>> {
    let profile = state.drivers.get_for_account(&user.subject).await?;

    // Checked before the provider call so no orphan sessions are created.
    if profile.approval_status != Some(ApprovalStatus::Approved) {
        return Err(AppError::Conflict(
            "Identity verification requires an approved profile".to_string(),
        ));
    }
    if profile.identity_verification_status == Some(VerificationStatus::Verified) {
        return Err(AppError::Conflict("Identity is already verified".to_string()));
    }

    let session = state.verification.create_session(&profile.id).await?;
    state
        .drivers
        .start_verification(&user.subject, &session.id)
        .await?;

    tracing::info!(
        profile_id = %profile.id,
        session_id = %session.id,
        "Verification session started"
    );

    Ok(Json(SessionResponse {
        session_id: session.id,
        url: session.url,
        client_secret: session.client_secret,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: Option<VerificationStatus>,
    lifecycle_state: LifecycleState,
    verified_at: Option<String>,
}

/// Poll the provider for the current session and record the result.
async fn get_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<StatusResponse>> {
    let mut profile = state.drivers.get_for_account(&user.subject).await?;

    let terminal = profile.identity_verification_status == Some(VerificationStatus::Verified);
    let session_id = profile.identity_verification_session_id.clone();
    if let (Some(session_id), false) = (session_id, terminal) {
        let session = state.verification.get_session(&session_id).await?;
        profile = state
            .drivers
            .record_verification_result(
                ProfileRef::Account(&user.subject),
                &session.status,
                "system:verification-poll",
            )
            .await?;
    }

    Ok(Json(StatusResponse {
        status: profile.identity_verification_status,
        lifecycle_state: profile.lifecycle_state,
        verified_at: profile
            .identity_verified_at
            .map(crate::time_utils::format_utc_rfc3339),
    }))
}

/// Handle a provider event.
///
/// Unknown sessions and stale transitions are acknowledged so the provider
/// stops retrying; storage failures return 500 so it retries.
async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    match &state.config.verification_webhook_secret {
        Some(secret) => {
            let signature = headers
                .get(SIGNATURE_HEADER)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default();
            let now = chrono::Utc::now().timestamp();
            if let Err(e) = verify_signature(secret, signature, &body, now) {
                tracing::warn!(error = %e, "Rejected verification webhook with bad signature");
                return StatusCode::BAD_REQUEST;
            }
        }
        None if state.config.is_production() => {
            tracing::error!("Verification webhook secret not configured; refusing unsigned event");
            return StatusCode::FORBIDDEN;
        }
        None => {
            tracing::warn!("Accepting unsigned verification webhook (no secret configured)");
        }
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable verification webhook");
            return StatusCode::BAD_REQUEST;
        }
    };

    if !event.event_type.starts_with(SESSION_EVENT_PREFIX) {
        tracing::debug!(event_type = %event.event_type, "Ignoring verification webhook event");
        return StatusCode::OK;
    }

    let session = event.data.object;
    tracing::info!(
        event_type = %event.event_type,
        session_id = %session.id,
        status = %session.status,
        profile_id = session.metadata.get("profile_id").map(String::as_str).unwrap_or("<missing>"),
        "Verification webhook received"
    );

    // The session id is authoritative; metadata is only informational.
    let profile = match state.store.find_profile_by_verification_session(&session.id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            tracing::warn!(session_id = %session.id, "Webhook for unknown verification session");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to look up verification session");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    match state
        .drivers
        .record_verification_result(
            ProfileRef::Id(&profile.id),
            &session.status,
            "system:verification-webhook",
        )
        .await
    {
        Ok(updated) => {
            tracing::info!(
                profile_id = %updated.id,
                state = ?updated.lifecycle_state,
                "Verification webhook applied"
            );
            StatusCode::OK
        }
        Err(AppError::Conflict(reason) | AppError::NotFound(reason)) => {
            tracing::warn!(
                profile_id = %profile.id,
                reason = %reason,
                "Verification webhook not applicable"
            );
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(
                profile_id = %profile.id,
                error = %e,
                "Failed to apply verification webhook"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
