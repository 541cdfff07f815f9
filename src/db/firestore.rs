// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore [`Store`] implementation.
//!
//! Provides typed operations for:
//! - Driver profiles (CAS on `revision`)
//! - Profile transitions (append-only audit trail)
//! - Availability (one document per profile and day)

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use firestore::errors::FirestoreError;
use firestore::{FirestoreConsistencySelector, FirestoreQueryDirection, FirestoreTransaction};

use crate::db::{collections, Store};
use crate::error::AppError;
use crate::models::{AvailabilityEntry, AvailabilityUpdate, DriverProfile, TransitionRecord};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    /// A client whose reads are part of `transaction`, so the commit fails
    /// if a document read through it changed in between.
    fn in_transaction(&self, transaction: &FirestoreTransaction<'_>) -> firestore::FirestoreDb {
        self.client
            .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ))
    }

    /// First profile whose `field` equals `value`.
    async fn find_profile_by_field(
        &self,
        field: &'static str,
        value: &str,
    ) -> Result<Option<DriverProfile>, AppError> {
        let value = value.to_string();
        let profiles: Vec<DriverProfile> = self
            .client
            .fluent()
            .select()
            .from(collections::DRIVER_PROFILES)
            .filter(move |q| q.for_all([q.field(field).eq(value.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(profiles.into_iter().next())
    }
}

#[async_trait]
impl Store for FirestoreDb {
    // ─── Profile Operations ──────────────────────────────────────

    async fn get_profile_by_account(
        &self,
        account_id: &str,
    ) -> Result<Option<DriverProfile>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::DRIVER_PROFILES)
            .obj()
            .one(account_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_profile(&self, profile_id: &str) -> Result<Option<DriverProfile>, AppError> {
        self.find_profile_by_field("id", profile_id).await
    }

    async fn create_profile(&self, profile: &DriverProfile) -> Result<(), AppError> {
        let result: Result<DriverProfile, FirestoreError> = self
            .client
            .fluent()
            .insert()
            .into(collections::DRIVER_PROFILES)
            .document_id(&profile.account_id)
            .object(profile)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(FirestoreError::DataConflictError(_)) => Err(AppError::Conflict(
                "A profile already exists for this account".to_string(),
            )),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    /// The stored revision is read and the new document written inside one
    /// transaction, so a concurrent writer aborts the commit.
    async fn update_profile(&self, profile: &DriverProfile) -> Result<DriverProfile, AppError> {
        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let current: Option<DriverProfile> = self
            .in_transaction(&transaction)
            .fluent()
            .select()
            .by_id_in(collections::DRIVER_PROFILES)
            .obj()
            .one(&profile.account_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read profile in transaction: {}", e))
            })?;

        let Some(current) = current else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotFound(format!("Profile {}", profile.id)));
        };

        if current.revision != profile.revision {
            let _ = transaction.rollback().await;
            tracing::debug!(
                profile_id = %profile.id,
                expected = profile.revision,
                actual = current.revision,
                "Profile revision mismatch"
            );
            return Err(AppError::Conflict(
                "Profile was modified concurrently, retry".to_string(),
            ));
        }

        let mut next = profile.clone();
        next.revision += 1;

        self.client
            .fluent()
            .update()
            .in_col(collections::DRIVER_PROFILES)
            .document_id(&profile.account_id)
            .object(&next)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add profile to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| commit_error(e, "Profile was modified concurrently, retry"))?;

        Ok(next)
    }

    async fn list_profiles(&self) -> Result<Vec<DriverProfile>, AppError> {
        self.client
            .fluent()
            .select()
            .from(collections::DRIVER_PROFILES)
            .order_by([("createdAt", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_profile_by_external_worker_id(
        &self,
        worker_id: &str,
    ) -> Result<Option<DriverProfile>, AppError> {
        self.find_profile_by_field("externalWorkerId", worker_id).await
    }

    async fn find_profile_by_phone(&self, phone: &str) -> Result<Option<DriverProfile>, AppError> {
        self.find_profile_by_field("phone", phone).await
    }

    async fn find_profile_by_verification_session(
        &self,
        session_id: &str,
    ) -> Result<Option<DriverProfile>, AppError> {
        self.find_profile_by_field("identityVerificationSessionId", session_id)
            .await
    }

    async fn list_unsynced_verified(&self) -> Result<Vec<DriverProfile>, AppError> {
        let profiles: Vec<DriverProfile> = self
            .client
            .fluent()
            .select()
            .from(collections::DRIVER_PROFILES)
            .filter(|q| {
                q.for_all([
                    q.field("identityVerificationStatus").eq("verified"),
                    q.field("externalWorkerId").is_null(),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Phone is not indexable as "non-empty"; filter the rest here.
        Ok(profiles
            .into_iter()
            .filter(DriverProfile::needs_fleet_sync)
            .collect())
    }

    // ─── Transition Operations ───────────────────────────────────

    async fn append_transition(&self, record: &TransitionRecord) -> Result<(), AppError> {
        let _: TransitionRecord = self
            .client
            .fluent()
            .insert()
            .into(collections::PROFILE_TRANSITIONS)
            .document_id(&record.id)
            .object(record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_transitions(&self, profile_id: &str) -> Result<Vec<TransitionRecord>, AppError> {
        let profile_id = profile_id.to_string();
        self.client
            .fluent()
            .select()
            .from(collections::PROFILE_TRANSITIONS)
            .filter(move |q| q.for_all([q.field("profileId").eq(profile_id.clone())]))
            .order_by([("at", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Availability Operations ─────────────────────────────────

    async fn upsert_availability(
        &self,
        update: AvailabilityUpdate,
    ) -> Result<AvailabilityEntry, AppError> {
        let doc_id = AvailabilityEntry::document_id(&update.profile_id, update.date);

        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Read inside the transaction so the stored response token is carried
        // over even when two writes for the same day race.
        let existing: Option<AvailabilityEntry> = self
            .in_transaction(&transaction)
            .fluent()
            .select()
            .by_id_in(collections::AVAILABILITY)
            .obj()
            .one(&doc_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read availability in transaction: {}", e))
            })?;

        let entry = update.apply(existing.as_ref(), Utc::now());

        self.client
            .fluent()
            .update()
            .in_col(collections::AVAILABILITY)
            .document_id(&doc_id)
            .object(&entry)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add availability to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| commit_error(e, "Availability was modified concurrently, retry"))?;

        Ok(entry)
    }

    async fn list_availability(
        &self,
        profile_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<AvailabilityEntry>, AppError> {
        let profile_id = profile_id.to_string();
        // Dates are stored as `YYYY-MM-DD`, so string order is date order.
        let start = start.map(|d| d.format("%Y-%m-%d").to_string());
        let end = end.map(|d| d.format("%Y-%m-%d").to_string());

        self.client
            .fluent()
            .select()
            .from(collections::AVAILABILITY)
            .filter(move |q| {
                q.for_all([
                    q.field("profileId").eq(profile_id.clone()),
                    start
                        .clone()
                        .and_then(|s| q.field("date").greater_than_or_equal(s)),
                    end.clone()
                        .and_then(|e| q.field("date").less_than_or_equal(e)),
                ])
            })
            .order_by([("date", FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Contention aborts surface as `Conflict` so callers can re-read and retry.
fn commit_error(e: FirestoreError, conflict: &str) -> AppError {
    match e {
        FirestoreError::DataConflictError(_) => AppError::Conflict(conflict.to_string()),
        FirestoreError::DatabaseError(ref db) if db.retry_possible => {
            tracing::debug!(error = %e, "Retryable transaction commit failure");
            AppError::Conflict(conflict.to_string())
        }
        e => AppError::Database(format!("Transaction commit failed: {}", e)),
    }
}
