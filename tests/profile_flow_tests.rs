// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Driver onboarding flow over HTTP.

use axum::http::{Method, StatusCode};
use serde_json::json;

mod common;

use common::{
    address_step, complete_onboarding, create_test_app, personal_step, request, send, user_token,
    vehicle_step,
};

#[tokio::test]
async fn test_get_profile_before_create_is_404() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-new", "new@example.ca");

    let (status, _) = send(
        &app.router,
        request(Method::GET, "/api/profile", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_explicit_create_then_duplicate_conflicts() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-1", "d@example.ca");

    let (status, profile) =
        send(&app.router, request(Method::POST, "/api/profile", Some(&token), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(profile["onboardingStep"], 1);
    assert_eq!(profile["lifecycleState"], "step1");
    assert_eq!(profile["email"], "d@example.ca");
    // The profile has its own id; the account subject is only the owner.
    assert_ne!(profile["id"], "sub-1");
    assert!(!profile["id"].as_str().unwrap().is_empty());

    let (status, _) = send(
        &app.router,
        request(Method::POST, "/api/profile", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_first_patch_creates_and_advances_to_step_2() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-a", "jane@example.ca");

    let (status, profile) = send(
        &app.router,
        request(Method::PATCH, "/api/profile", Some(&token), Some(personal_step())),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{profile}");
    assert_eq!(profile["onboardingStep"], 2);
    assert_eq!(profile["phone"], "416-555-1234");
    assert_eq!(profile["etransferAutoDepositConfirmed"], true);
}

#[tokio::test]
async fn test_invalid_first_patch_leaves_no_profile() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-bad", "bad@example.ca");

    let mut body = personal_step();
    body["phone"] = json!("12345");
    let (status, error) = send(
        &app.router,
        request(Method::PATCH, "/api/profile", Some(&token), Some(body)),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["fields"][0]["field"], "phone");

    let (status, _) = send(
        &app.router,
        request(Method::GET, "/api/profile", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_step_fields_are_reported_per_field() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-missing", "m@example.ca");

    let (status, error) = send(
        &app.router,
        request(
            Method::PATCH,
            "/api/profile",
            Some(&token),
            Some(json!({ "onboardingStep": 3, "city": "Toronto" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = error["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"addressLine1"));
    assert!(fields.contains(&"postalCode"));
    assert!(!fields.contains(&"city"));
}

#[tokio::test]
async fn test_step_can_jump_forward_directly() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-jump", "j@example.ca");

    send(
        &app.router,
        request(Method::PATCH, "/api/profile", Some(&token), Some(personal_step())),
    )
    .await;

    // Step 4 data while at step 2 lands on step 4.
    let (status, profile) = send(
        &app.router,
        request(Method::PATCH, "/api/profile", Some(&token), Some(vehicle_step())),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{profile}");
    assert_eq!(profile["onboardingStep"], 4);
}

#[tokio::test]
async fn test_step_never_moves_backwards() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-back", "b@example.ca");

    for body in [personal_step(), address_step()] {
        send(&app.router, request(Method::PATCH, "/api/profile", Some(&token), Some(body))).await;
    }

    let (status, profile) = send(
        &app.router,
        request(Method::PATCH, "/api/profile", Some(&token), Some(personal_step())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["onboardingStep"], 3);
}

#[tokio::test]
async fn test_completion_enters_approval_queue() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-done", "done@example.ca");

    let profile = complete_onboarding(&app, &token).await;

    assert_eq!(profile["onboardingStep"], 5);
    assert_eq!(profile["onboardingCompleted"], true);
    assert_eq!(profile["approvalStatus"], "pending");
    assert_eq!(profile["lifecycleState"], "completed_pending_approval");
    assert!(profile["agreementSignedAt"].is_string());
}

#[tokio::test]
async fn test_lifecycle_fields_cannot_be_patched() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-sneaky", "s@example.ca");
    complete_onboarding(&app, &token).await;

    let (status, profile) = send(
        &app.router,
        request(
            Method::PATCH,
            "/api/profile",
            Some(&token),
            Some(json!({
                "approvalStatus": "approved",
                "identityVerificationStatus": "verified",
                "externalWorkerId": "w-1",
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["approvalStatus"], "pending");
    assert!(profile["identityVerificationStatus"].is_null());
    assert!(profile["externalWorkerId"].is_null());
}

#[tokio::test]
async fn test_history_records_each_transition() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-hist", "h@example.ca");
    complete_onboarding(&app, &token).await;

    let (status, history) = send(
        &app.router,
        request(Method::GET, "/api/profile/history", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let events: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["event"].as_str().unwrap())
        .collect();
    assert_eq!(events.first(), Some(&"created"));
    assert_eq!(events.last(), Some(&"onboarding_completed"));
    assert_eq!(events.iter().filter(|e| **e == "step_advanced").count(), 3);
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let app = create_test_app();
    let (status, _) = send(&app.router, request(Method::GET, "/api/profile", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let app = create_test_app();
    let (status, _) = send(
        &app.router,
        request(Method::GET, "/api/profile", Some("not-a-jwt"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let app = create_test_app();
    let token = user_token(&app.state.config, "sub-cookie", "c@example.ca");

    let req = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/profile")
        .header(axum::http::header::COOKIE, format!("driver_session={token}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_cors_preflight_allows_patch() {
    let app = create_test_app();

    let req = axum::http::Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/profile")
        .header(axum::http::header::ORIGIN, "http://localhost:5173")
        .header(axum::http::header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let methods = response
        .headers()
        .get(axum::http::header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(methods.contains("PATCH"));
}

#[tokio::test]
async fn test_health_is_public() {
    let app = create_test_app();
    let (status, body) = send(&app.router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
