// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OIDC token verification.
//!
//! Two kinds of bearer tokens reach the API: sign-in tokens for drivers and
//! admins, issued by the configured identity provider, and Google-issued
//! tokens on Cloud Tasks callbacks. Both are RS256 JWTs whose keys come from
//! the issuer's discovery document. Local development and tests use a shared
//! HS256 secret instead.

use crate::config::Config;
use anyhow::Context;
use axum::http::HeaderValue;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const GOOGLE_ISSUER: &str = "https://accounts.google.com";
const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Caller identity from a verified sign-in token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Stable account subject. Owns at most one driver profile, whose id is
    /// generated separately.
    pub subject: String,
    pub email: String,
    pub groups: Vec<String>,
}

/// Verified Cloud Tasks principal.
#[derive(Debug, Clone)]
pub struct VerifiedTaskPrincipal {
    pub email: String,
    pub subject: String,
}

/// OIDC verification error categories.
#[derive(Debug, Clone)]
pub enum OidcError {
    /// The token is missing/invalid or claims do not match expectations.
    Forbidden(String),
    /// A transient infrastructure failure occurred (safe for task retry).
    Transient(String),
}

#[derive(Clone)]
struct DiscoveryCacheEntry {
    jwks_uri: String,
    expires_at: Instant,
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Discovery + JWKS cache for one issuer.
struct KeySet {
    discovery_url: String,
    fallback_jwks_url: Option<String>,
    discovery_cache: RwLock<Option<DiscoveryCacheEntry>>,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl KeySet {
    fn new(issuer: &str, fallback_jwks_url: Option<&str>) -> Self {
        Self {
            discovery_url: format!(
                "{}/.well-known/openid-configuration",
                issuer.trim_end_matches('/')
            ),
            fallback_jwks_url: fallback_jwks_url.map(str::to_string),
            discovery_cache: RwLock::new(None),
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    async fn decoding_key(
        &self,
        http: &reqwest::Client,
        kid: &str,
    ) -> Result<Arc<DecodingKey>, OidcError> {
        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        for force_refresh in [false, true] {
            self.refresh_jwks(http, force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(OidcError::Forbidden(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(
        &self,
        http: &reqwest::Client,
        force_refresh: bool,
    ) -> Result<(), OidcError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        let jwks_uri = match self.resolve_jwks_uri(http, force_refresh).await {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(
                    error = ?e,
                    discovery_url = %self.discovery_url,
                    "Failed to resolve JWKS URI"
                );
                return Err(e);
            }
        };

        tracing::debug!(jwks_uri = %jwks_uri, "Refreshing JWKS cache");

        let response = http
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|e| OidcError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OidcError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| OidcError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_rsa_keys(jwks);
        if keys_by_kid.is_empty() {
            return Err(OidcError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "JWKS cache refreshed");
        Ok(())
    }

    async fn resolve_jwks_uri(
        &self,
        http: &reqwest::Client,
        force_refresh: bool,
    ) -> Result<String, OidcError> {
        if !force_refresh {
            let cache = self.discovery_cache.read().await;
            if let Some(entry) = cache
                .as_ref()
                .filter(|entry| entry.expires_at > Instant::now())
            {
                return Ok(entry.jwks_uri.clone());
            }
        }

        let cached_jwks_uri = self
            .discovery_cache
            .read()
            .await
            .as_ref()
            .map(|entry| entry.jwks_uri.clone())
            .or_else(|| self.fallback_jwks_url.clone());

        let fallback = |reason: String| {
            cached_jwks_uri.clone().ok_or_else(|| {
                OidcError::Transient(format!("OIDC discovery failed and no fallback: {reason}"))
            })
        };

        match http.get(&self.discovery_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let ttl = cache_ttl_from_headers(resp.headers(), DEFAULT_CACHE_TTL);
                let discovery: OpenIdConfig = resp
                    .json()
                    .await
                    .map_err(|e| OidcError::Transient(format!("invalid discovery JSON: {e}")))?;

                *self.discovery_cache.write().await = Some(DiscoveryCacheEntry {
                    jwks_uri: discovery.jwks_uri.clone(),
                    expires_at: Instant::now() + ttl,
                });

                Ok(discovery.jwks_uri)
            }
            Ok(resp) => {
                tracing::warn!(
                    status = %resp.status(),
                    "OIDC discovery returned non-success status; using fallback JWKS URI"
                );
                fallback(format!("status {}", resp.status()))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "OIDC discovery request failed; using fallback JWKS URI"
                );
                fallback(e.to_string())
            }
        }
    }
}

enum VerifierMode {
    Discovery {
        users: KeySet,
        tasks: KeySet,
    },
    SharedSecret {
        decoding_key: DecodingKey,
    },
}

/// Verifier for sign-in and Cloud Tasks tokens.
pub struct OidcVerifier {
    http_client: reqwest::Client,
    user_issuer: String,
    user_audience: String,
    task_audience: String,
    expected_service_account_email: String,
    mode: VerifierMode,
}

impl OidcVerifier {
    /// Discovery-backed verifier, or a shared-secret one when
    /// `OIDC_SHARED_SECRET` is configured.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building OIDC HTTP client")?;

        let mode = match &config.oidc_shared_secret {
            Some(secret) => {
                if secret.len() < 32 {
                    anyhow::bail!("OIDC shared secret must be at least 32 bytes");
                }
                tracing::warn!("Using shared-secret token verification; not for production");
                VerifierMode::SharedSecret {
                    decoding_key: DecodingKey::from_secret(secret.as_bytes()),
                }
            }
            None => VerifierMode::Discovery {
                users: KeySet::new(&config.oidc_issuer, None),
                tasks: KeySet::new(GOOGLE_ISSUER, Some(GOOGLE_JWKS_URL)),
            },
        };

        let verifier = Self {
            http_client,
            user_issuer: config.oidc_issuer.trim_end_matches('/').to_string(),
            user_audience: config.oidc_audience.clone(),
            task_audience: canonicalize_audience(&config.api_url),
            expected_service_account_email: task_service_account(&config.gcp_project_id),
            mode,
        };

        tracing::info!(
            issuer = %verifier.user_issuer,
            audience = %verifier.user_audience,
            expected_service_account_email = %verifier.expected_service_account_email,
            "Initialized OIDC verifier"
        );

        Ok(verifier)
    }

    /// Verify a driver or admin sign-in token.
    pub async fn verify_user_token(&self, token: &str) -> Result<AuthUser, OidcError> {
        let claims: UserClaims = self
            .decode_claims(token, TokenKind::User)
            .await?;

        validate_iat(claims.iat)?;

        if claims.sub.trim().is_empty() {
            return Err(OidcError::Forbidden("empty sub claim".to_string()));
        }

        let email = claims
            .email
            .ok_or_else(|| OidcError::Forbidden("missing email claim".to_string()))?;

        Ok(AuthUser {
            subject: claims.sub,
            email: email.to_lowercase(),
            groups: claims.groups,
        })
    }

    /// Verify a Cloud Tasks OIDC bearer token from an Authorization header.
    pub async fn verify_tasks_token(
        &self,
        auth_header: Option<&HeaderValue>,
    ) -> Result<VerifiedTaskPrincipal, OidcError> {
        let token = extract_bearer_token(auth_header)?;

        let claims: TaskClaims = self.decode_claims(token, TokenKind::Task).await?;

        tracing::debug!(
            email = claims.email.as_deref().unwrap_or("<missing>"),
            subject = %claims.sub,
            "Cloud Tasks OIDC claims"
        );

        validate_iat(claims.iat)?;

        let email = claims
            .email
            .ok_or_else(|| OidcError::Forbidden("missing email claim".to_string()))?;

        if email != self.expected_service_account_email {
            return Err(OidcError::Forbidden(format!(
                "unexpected service account email: {email}"
            )));
        }

        match claims.email_verified {
            Some(true) => {}
            Some(false) => {
                return Err(OidcError::Forbidden(
                    "email_verified claim is false".to_string(),
                ));
            }
            None => {
                return Err(OidcError::Forbidden(
                    "email_verified claim is missing".to_string(),
                ));
            }
        }

        Ok(VerifiedTaskPrincipal {
            email,
            subject: claims.sub,
        })
    }

    async fn decode_claims<T>(&self, token: &str, kind: TokenKind) -> Result<T, OidcError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let header = decode_header(token)
            .map_err(|e| OidcError::Forbidden(format!("invalid JWT header: {e}")))?;

        let (algorithm, key) = match &self.mode {
            VerifierMode::SharedSecret { decoding_key } => {
                if header.alg != Algorithm::HS256 {
                    return Err(OidcError::Forbidden(format!(
                        "unexpected JWT alg: {:?}",
                        header.alg
                    )));
                }
                (Algorithm::HS256, Arc::new(decoding_key.clone()))
            }
            VerifierMode::Discovery { users, tasks } => {
                if header.alg != Algorithm::RS256 {
                    return Err(OidcError::Forbidden(format!(
                        "unexpected JWT alg: {:?}",
                        header.alg
                    )));
                }
                let kid = header
                    .kid
                    .ok_or_else(|| OidcError::Forbidden("missing JWT kid".to_string()))?;
                let keys = match kind {
                    TokenKind::User => users,
                    TokenKind::Task => tasks,
                };
                (Algorithm::RS256, keys.decoding_key(&self.http_client, &kid).await?)
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        match kind {
            TokenKind::User => {
                validation.set_issuer(&[self.user_issuer.as_str()]);
                validation.set_audience(&[self.user_audience.as_str()]);
            }
            TokenKind::Task => {
                validation.set_issuer(&[GOOGLE_ISSUER, "accounts.google.com"]);
                validation.set_audience(&[self.task_audience.as_str()]);
            }
        }
        validation.validate_nbf = true;
        validation.leeway = CLOCK_SKEW_SECS;

        decode::<T>(token, key.as_ref(), &validation)
            .map(|data| data.claims)
            .map_err(|e| OidcError::Forbidden(format!("JWT validation failed: {e}")))
    }
}

#[derive(Clone, Copy)]
enum TokenKind {
    User,
    Task,
}

/// Service account Cloud Tasks signs callback tokens as.
pub fn task_service_account(project_id: &str) -> String {
    format!("driver-onboarding-api@{project_id}.iam.gserviceaccount.com")
}

#[derive(Debug, Deserialize)]
struct OpenIdConfig {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserClaims {
    sub: String,
    iat: Option<usize>,
    email: Option<String>,
    #[serde(default)]
    groups: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TaskClaims {
    sub: String,
    iat: Option<usize>,
    email: Option<String>,
    email_verified: Option<bool>,
}

fn usable_rsa_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }
        if jwk.use_.as_deref().is_some_and(|u| u != "sig") {
            continue;
        }

        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
            }
        }
    }

    keys_by_kid
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn extract_bearer_token(auth_header: Option<&HeaderValue>) -> Result<&str, OidcError> {
    let value = auth_header
        .ok_or_else(|| OidcError::Forbidden("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| OidcError::Forbidden("invalid Authorization header".to_string()))?;

    let token = value.strip_prefix("Bearer ").ok_or_else(|| {
        OidcError::Forbidden("Authorization header must be Bearer token".to_string())
    })?;

    if token.is_empty() {
        return Err(OidcError::Forbidden("Bearer token is empty".to_string()));
    }

    Ok(token)
}

fn validate_iat(iat: Option<usize>) -> Result<(), OidcError> {
    let Some(iat) = iat else {
        return Err(OidcError::Forbidden("missing iat claim".to_string()));
    };

    if iat as u64 > now_unix_secs() + CLOCK_SKEW_SECS {
        return Err(OidcError::Forbidden(
            "iat claim is in the future".to_string(),
        ));
    }

    Ok(())
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|raw| raw.trim_matches('"').parse::<u64>().ok())
}

fn canonicalize_audience(audience: &str) -> String {
    audience.trim_end_matches('/').to_string()
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
