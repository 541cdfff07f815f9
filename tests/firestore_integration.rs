// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running and
//! `FIRESTORE_EMULATOR_HOST` to point at it; otherwise they are skipped.
//!
//! Every test uses fresh ids, so runs against a shared emulator don't
//! interfere with each other.

use chrono::{NaiveDate, Utc};
use driver_onboarding::db::Store;
use driver_onboarding::error::AppError;
use driver_onboarding::models::{
    AvailabilityStatus, AvailabilityUpdate, DriverProfile, EquipmentFlags, LifecycleState,
    TransitionEvent, TransitionRecord, VerificationStatus,
};

mod common;
use common::test_db;

/// Unique account subject for test isolation.
fn unique_account() -> String {
    format!("acct-{}", uuid::Uuid::new_v4())
}

fn test_profile(account_id: &str) -> DriverProfile {
    let mut profile =
        DriverProfile::new(account_id, Some("test@example.ca".to_string()), Utc::now());
    profile.first_name = Some("Test".to_string());
    profile.last_name = Some("Driver".to_string());
    profile
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
}

fn availability(profile_id: &str, date: NaiveDate, token: Option<&str>) -> AvailabilityUpdate {
    AvailabilityUpdate {
        profile_id: profile_id.to_string(),
        date,
        status: AvailabilityStatus::Available,
        equipment: EquipmentFlags::default(),
        notes: String::new(),
        response_token: token.map(String::from),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_profile_create_and_lookup() {
    require_emulator!();

    let db = test_db().await;
    let account = unique_account();

    assert!(db.get_profile_by_account(&account).await.unwrap().is_none());

    let profile = test_profile(&account);
    db.create_profile(&profile).await.unwrap();

    let by_account = db.get_profile_by_account(&account).await.unwrap().unwrap();
    assert_eq!(by_account.id, profile.id);
    assert_eq!(by_account.lifecycle_state, LifecycleState::Step1);

    let by_id = db.get_profile(&profile.id).await.unwrap().unwrap();
    assert_eq!(by_id.account_id, account);

    // One profile per account.
    let duplicate = test_profile(&account);
    assert!(matches!(
        db.create_profile(&duplicate).await,
        Err(AppError::Conflict(_))
    ));

    println!("✓ Profile created and looked up: {}", profile.id);
}

#[tokio::test]
async fn test_profile_update_is_compare_and_swap() {
    require_emulator!();

    let db = test_db().await;
    let profile = test_profile(&unique_account());
    db.create_profile(&profile).await.unwrap();

    let mut first = profile.clone();
    first.city = Some("Toronto".to_string());
    let stored = db.update_profile(&first).await.unwrap();
    assert_eq!(stored.revision, profile.revision + 1);

    // Writing from the stale copy loses.
    let mut stale = profile.clone();
    stale.city = Some("Ottawa".to_string());
    assert!(matches!(
        db.update_profile(&stale).await,
        Err(AppError::Conflict(_))
    ));

    let current = db.get_profile(&profile.id).await.unwrap().unwrap();
    assert_eq!(current.city.as_deref(), Some("Toronto"));
}

#[tokio::test]
async fn test_profile_secondary_lookups() {
    require_emulator!();

    let db = test_db().await;
    let mut profile = test_profile(&unique_account());
    let marker = uuid::Uuid::new_v4().simple().to_string();
    profile.phone = Some(format!("555-{}", &marker[..8]));
    profile.external_worker_id = Some(format!("w-{marker}"));
    profile.identity_verification_session_id = Some(format!("vs_{marker}"));
    db.create_profile(&profile).await.unwrap();

    let by_phone = db
        .find_profile_by_phone(profile.phone.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(by_phone.map(|p| p.id), Some(profile.id.clone()));

    let by_worker = db
        .find_profile_by_external_worker_id(&format!("w-{marker}"))
        .await
        .unwrap();
    assert_eq!(by_worker.map(|p| p.id), Some(profile.id.clone()));

    let by_session = db
        .find_profile_by_verification_session(&format!("vs_{marker}"))
        .await
        .unwrap();
    assert_eq!(by_session.map(|p| p.id), Some(profile.id.clone()));

    assert!(db
        .find_profile_by_phone("000-not-a-phone")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_unsynced_verified_listing() {
    require_emulator!();

    let db = test_db().await;

    let mut pending = test_profile(&unique_account());
    pending.phone = Some("416-555-0001".to_string());
    pending.identity_verification_status = Some(VerificationStatus::Verified);
    pending.lifecycle_state = LifecycleState::Verified;
    db.create_profile(&pending).await.unwrap();

    let mut synced = pending.clone();
    synced.id = uuid::Uuid::new_v4().to_string();
    synced.account_id = unique_account();
    synced.external_worker_id = Some("w-done".to_string());
    db.create_profile(&synced).await.unwrap();

    let ids: Vec<String> = db
        .list_unsynced_verified()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert!(ids.contains(&pending.id));
    assert!(!ids.contains(&synced.id));
}

// ═══════════════════════════════════════════════════════════════════════════
// AUDIT TRAIL TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_transitions_are_listed_in_order() {
    require_emulator!();

    let db = test_db().await;
    let profile_id = uuid::Uuid::new_v4().to_string();
    let start = Utc::now();

    let created = TransitionRecord::new(
        &profile_id,
        TransitionEvent::Created,
        LifecycleState::New,
        LifecycleState::Step1,
        "acct",
        None,
        start,
    );
    let advanced = TransitionRecord::new(
        &profile_id,
        TransitionEvent::StepAdvanced,
        LifecycleState::Step1,
        LifecycleState::Step2,
        "acct",
        Some("step 2".to_string()),
        start + chrono::Duration::seconds(1),
    );

    // Inserted out of order on purpose.
    db.append_transition(&advanced).await.unwrap();
    db.append_transition(&created).await.unwrap();

    let history = db.list_transitions(&profile_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].event, TransitionEvent::Created);
    assert_eq!(history[1].event, TransitionEvent::StepAdvanced);
}

// ═══════════════════════════════════════════════════════════════════════════
// AVAILABILITY TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_availability_upsert_keeps_one_entry_per_day() {
    require_emulator!();

    let db = test_db().await;
    let profile_id = uuid::Uuid::new_v4().to_string();

    db.upsert_availability(availability(&profile_id, day(10), Some("tok-1")))
        .await
        .unwrap();

    let mut second = availability(&profile_id, day(10), None);
    second.status = AvailabilityStatus::Unavailable;
    let stored = db.upsert_availability(second).await.unwrap();

    assert_eq!(stored.status, AvailabilityStatus::Unavailable);
    assert_eq!(stored.response_token.as_deref(), Some("tok-1"));

    let entries = db.list_availability(&profile_id, None, None).await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_availability_range_is_inclusive_and_sorted() {
    require_emulator!();

    let db = test_db().await;
    let profile_id = uuid::Uuid::new_v4().to_string();

    for d in [20, 5, 12, 28] {
        db.upsert_availability(availability(&profile_id, day(d), None))
            .await
            .unwrap();
    }

    let entries = db
        .list_availability(&profile_id, Some(day(5)), Some(day(20)))
        .await
        .unwrap();
    let dates: Vec<NaiveDate> = entries.iter().map(|e| e.date).collect();
    assert_eq!(dates, vec![day(5), day(12), day(20)]);
}
