// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity verification provider client and webhook signature checks.

use anyhow::Context;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

use crate::error::AppError;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Header carrying `t=<unix>,v1=<hex>`.
pub const SIGNATURE_HEADER: &str = "verification-signature";

/// Provider-side verification session.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationSession {
    pub id: String,
    pub status: String,
    /// Hosted flow the driver is sent to.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Verification provider REST client.
#[derive(Clone)]
pub struct VerificationClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    return_url: String,
}

impl VerificationClient {
    pub fn new(base_url: &str, api_key: &str, return_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building verification HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            return_url: return_url.to_string(),
        })
    }

    /// Start a document + selfie session for a profile.
    pub async fn create_session(&self, profile_id: &str) -> Result<VerificationSession, AppError> {
        let response = self
            .http
            .post(format!("{}/identity/verification_sessions", self.base_url))
            .bearer_auth(&self.api_key)
            .form(&[
                ("type", "document"),
                ("options[document][require_matching_selfie]", "true"),
                ("metadata[profile_id]", profile_id),
                ("return_url", self.return_url.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::upstream("verification", e))?;

        check_response_json(response).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<VerificationSession, AppError> {
        let response = self
            .http
            .get(format!(
                "{}/identity/verification_sessions/{}",
                self.base_url,
                urlencoding::encode(session_id)
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::upstream("verification", e))?;

        check_response_json(response).await
    }
}

async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::upstream(
            "verification",
            format!("HTTP {}: {}", status, body),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::upstream("verification", format!("JSON parse error: {}", e)))
}

// ─── Webhooks ────────────────────────────────────────────────

/// Webhook event envelope. Only session events are acted on.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: WebhookSession,
}

#[derive(Debug, Deserialize)]
pub struct WebhookSession {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header missing or malformed")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no matching signature")]
    Mismatch,
}

/// Verify a `t=<unix>,v1=<hex>` signature over `"{t}.{body}"`.
///
/// Any `v1` entry may match, which allows secret rotation.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now_unix: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    for candidate in signatures {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return Err(SignatureError::Mismatch);
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        // verify_slice compares in constant time
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

/// Produce a signature header for `body`. Used by tests and local tooling.
pub fn sign_payload(secret: &str, body: &[u8], timestamp: i64) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Some(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}
