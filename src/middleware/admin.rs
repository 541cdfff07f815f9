// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin capability check.

use crate::config::Config;
use crate::services::oidc::AuthUser;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Who may act as an admin. Built from configuration; any one match grants
/// the capability.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    emails: Vec<String>,
    subjects: Vec<String>,
    group: Option<String>,
}

impl AdminPolicy {
    pub fn new(emails: Vec<String>, subjects: Vec<String>, group: Option<String>) -> Self {
        Self {
            emails: emails.into_iter().map(|e| e.to_lowercase()).collect(),
            subjects,
            group,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.admin_emails.clone(),
            config.admin_subjects.clone(),
            config.admin_group.clone(),
        )
    }

    pub fn is_admin(&self, user: &AuthUser) -> bool {
        self.emails.iter().any(|e| *e == user.email.to_lowercase())
            || self.subjects.iter().any(|s| *s == user.subject)
            || self
                .group
                .as_ref()
                .is_some_and(|g| user.groups.iter().any(|ug| ug == g))
    }
}

/// Runs after [`super::require_auth`]; rejects callers without the admin
/// capability.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(user) = request.extensions().get::<AuthUser>() else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    if !state.admin_policy.is_admin(user) {
        tracing::warn!(subject = %user.subject, "Blocked admin request from non-admin");
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
