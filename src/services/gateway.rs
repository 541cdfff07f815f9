// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Response-token gateway.
//!
//! Drivers answer availability requests through links carrying an opaque
//! token. This service forwards those calls to the remote availability
//! request service and returns its answer unchanged. Nothing is stored here;
//! token validity and single use are enforced remotely.

use anyhow::Context;
use axum::body::Bytes;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::error::AppError;
use crate::models::{AvailabilityStatus, EquipmentFlags};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_TOKEN_LEN: usize = 256;

/// Driver's answer to an availability request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    pub response: AvailabilityStatus,
    #[serde(default)]
    pub equipment: EquipmentFlags,
    #[serde(default)]
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub notes: String,
}

/// A remote response, forwarded as-is.
#[derive(Debug)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        if let Some(content_type) = self.content_type {
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

pub struct ResponseTokenGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ResponseTokenGateway {
    pub fn new(base_url: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building availability-requests HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Fetch the request a token refers to.
    pub async fn get_by_token(&self, token: &str) -> Result<ProxiedResponse, AppError> {
        check_token(token)?;
        let url = format!(
            "{}/availability-requests/{}",
            self.base_url,
            urlencoding::encode(token)
        );
        self.forward(self.http.get(url)).await
    }

    /// Submit the driver's answer for a token.
    pub async fn respond_by_token(
        &self,
        token: &str,
        request: &RespondRequest,
    ) -> Result<ProxiedResponse, AppError> {
        check_token(token)?;
        request
            .validate()
            .map_err(|e| AppError::Validation(crate::models::onboarding::field_errors(&e)))?;

        let url = format!(
            "{}/availability-requests/{}/respond",
            self.base_url,
            urlencoding::encode(token)
        );
        self.forward(self.http.post(url).json(request)).await
    }

    async fn forward(&self, request: reqwest::RequestBuilder) -> Result<ProxiedResponse, AppError> {
        let request = match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| AppError::upstream("availability-requests", e))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| AppError::upstream("availability-requests", e))?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok());
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::upstream("availability-requests", e))?;

        if !status.is_success() {
            tracing::info!(
                status = status.as_u16(),
                "Availability request service returned non-success"
            );
        }

        Ok(ProxiedResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Tokens are opaque and percent-encoded on the way out. Only empty,
/// overlong and dot-segment tokens are refused, since those cannot name a
/// single path segment on the remote.
fn check_token(token: &str) -> Result<(), AppError> {
    let valid = !token.is_empty() && token.len() <= MAX_TOKEN_LEN && token != "." && token != "..";
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid response token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_shape_is_checked() {
        assert!(check_token("abc-DEF_123.x").is_ok());
        assert!(check_token("abc~1+x=").is_ok());
        assert!(check_token("has space/and slash").is_ok());
        assert!(check_token(&"a".repeat(MAX_TOKEN_LEN)).is_ok());
        assert!(check_token("").is_err());
        assert!(check_token("..").is_err());
        assert!(check_token(&"a".repeat(MAX_TOKEN_LEN + 1)).is_err());
    }

    #[test]
    fn respond_request_limits_notes() {
        let request = RespondRequest {
            response: AvailabilityStatus::Available,
            equipment: EquipmentFlags::default(),
            notes: "x".repeat(501),
        };
        assert!(request.validate().is_err());
    }
}
