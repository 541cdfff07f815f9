// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use driver_onboarding::config::Config;
use driver_onboarding::db::{FirestoreDb, MemoryDb, Store};
use driver_onboarding::routes::create_router;
use driver_onboarding::services::oidc::task_service_account;
use driver_onboarding::services::{SyncDispatcher, SyncDriverPayload};
use driver_onboarding::{build_sync_runner, AppState};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Dispatcher that records jobs instead of running them.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub jobs: Mutex<Vec<SyncDriverPayload>>,
}

#[allow(dead_code)]
impl RecordingDispatcher {
    pub fn jobs(&self) -> Vec<SyncDriverPayload> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncDispatcher for RecordingDispatcher {
    async fn dispatch(&self, payload: SyncDriverPayload) -> driver_onboarding::error::Result<()> {
        self.jobs.lock().unwrap().push(payload);
        Ok(())
    }
}

#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

/// Create a test app on the in-memory store with default config.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::default())
}

/// Create a test app with a custom config.
#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> TestApp {
    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    let sync_runner = build_sync_runner(&config, store.clone()).expect("sync runner should build");
    let dispatcher = Arc::new(RecordingDispatcher::default());

    let state = Arc::new(
        AppState::new(config, store, sync_runner, dispatcher.clone())
            .expect("test state should build"),
    );

    TestApp {
        router: create_router(state.clone()),
        state,
        dispatcher,
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn sign(config: &Config, claims: &Value) -> String {
    let secret = config.oidc_shared_secret.clone().unwrap();
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

/// Sign-in token for a driver or admin.
#[allow(dead_code)]
pub fn user_token(config: &Config, subject: &str, email: &str) -> String {
    let now = now_secs();
    sign(
        config,
        &json!({
            "sub": subject,
            "email": email,
            "iss": config.oidc_issuer,
            "aud": config.oidc_audience,
            "iat": now,
            "exp": now + 3600,
        }),
    )
}

/// Sign-in token for the configured admin.
#[allow(dead_code)]
pub fn admin_token(config: &Config) -> String {
    user_token(config, "admin-subject", &config.admin_emails[0])
}

/// Cloud Tasks callback token.
#[allow(dead_code)]
pub fn tasks_token(config: &Config, email: Option<&str>) -> String {
    let now = now_secs();
    let service_account = task_service_account(&config.gcp_project_id);
    sign(
        config,
        &json!({
            "sub": "tasks",
            "email": email.unwrap_or(&service_account),
            "email_verified": true,
            "iss": "https://accounts.google.com",
            "aud": config.api_url.trim_end_matches('/'),
            "iat": now,
            "exp": now + 3600,
        }),
    )
}

/// Build a request with an optional bearer token and JSON body.
#[allow(dead_code)]
pub fn request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send a request and decode the JSON body (`Value::Null` when empty).
#[allow(dead_code)]
pub async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Step 2 personal details.
#[allow(dead_code)]
pub fn personal_step() -> Value {
    json!({
        "onboardingStep": 2,
        "firstName": "Jane",
        "lastName": "Doe",
        "email": "jane@example.ca",
        "phone": "416-555-1234",
        "paymentEmail": "pay@example.ca",
        "etransferAutoDepositConfirmed": true,
    })
}

#[allow(dead_code)]
pub fn address_step() -> Value {
    json!({
        "onboardingStep": 3,
        "addressLine1": "100 Queen St W",
        "city": "Toronto",
        "province": "ON",
        "postalCode": "M5H 2N2",
        "placeId": "ChIJ-city-hall",
    })
}

#[allow(dead_code)]
pub fn vehicle_step() -> Value {
    json!({
        "onboardingStep": 4,
        "vehicleMake": "Toyota",
        "vehicleModel": "Corolla",
        "vehicleYear": "2019",
        "vehicleColor": "Blue",
        "licensePlate": "ABCD123",
        "vehiclePhotoUrl": "https://files.example.ca/vehicle.jpg",
        "licensePhotoUrl": "https://files.example.ca/license.jpg",
    })
}

#[allow(dead_code)]
pub fn agreement_step() -> Value {
    json!({ "onboardingStep": 5, "agreementSigned": true })
}

/// Walk an account through all five steps. Returns the final profile.
#[allow(dead_code)]
pub async fn complete_onboarding(app: &TestApp, token: &str) -> Value {
    let mut last = Value::Null;
    for body in [personal_step(), address_step(), vehicle_step(), agreement_step()] {
        let (status, profile) = send(
            &app.router,
            request(Method::PATCH, "/api/profile", Some(token), Some(body)),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{profile}");
        last = profile;
    }
    last
}
