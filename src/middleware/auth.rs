// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in token authentication middleware.

use crate::services::oidc::{AuthUser, OidcError};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Cookie the web app stores the ID token in.
pub const SESSION_COOKIE: &str = "driver_session";

/// Middleware that requires a valid sign-in token and inserts [`AuthUser`].
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return Err(StatusCode::UNAUTHORIZED),
        }
    };

    let user = state
        .oidc
        .verify_user_token(&token)
        .await
        .map_err(|err| match err {
            OidcError::Forbidden(reason) => {
                tracing::debug!(reason = %reason, "Rejected sign-in token");
                StatusCode::UNAUTHORIZED
            }
            OidcError::Transient(reason) => {
                tracing::error!(reason = %reason, "Sign-in token verification transient failure");
                StatusCode::SERVICE_UNAVAILABLE
            }
        })?;

    request.extensions_mut().insert::<AuthUser>(user);

    Ok(next.run(request).await)
}
