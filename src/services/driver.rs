// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Driver lifecycle orchestration.
//!
//! Every operation follows the same order: load, run the pure transition from
//! [`lifecycle`], CAS-write, append audit records, and only then fire side
//! effects. A failed side effect is logged and never rolls the write back.

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{DriverProfile, ProfilePatch, TransitionRecord};
use crate::services::lifecycle::{self, Outcome, Transition};
use crate::services::sync::{SyncDispatcher, SyncDriverPayload};

/// Attempts before a CAS conflict is surfaced to the caller.
const MAX_CAS_ATTEMPTS: usize = 3;

const MAX_CONCURRENT_DISPATCHES: usize = 16;

/// How to find the profile an operation applies to.
#[derive(Debug, Clone, Copy)]
pub enum ProfileRef<'a> {
    Account(&'a str),
    Id(&'a str),
}

impl ProfileRef<'_> {
    async fn load(&self, store: &dyn Store) -> Result<DriverProfile> {
        let profile = match self {
            ProfileRef::Account(account_id) => store.get_profile_by_account(account_id).await?,
            ProfileRef::Id(profile_id) => store.get_profile(profile_id).await?,
        };
        profile.ok_or_else(|| AppError::NotFound("Driver profile not found".to_string()))
    }
}

/// Load, transition and CAS-write a profile, retrying on lost races.
///
/// `apply` returns `Ok(None)` for a no-op, in which case nothing is written.
/// Audit records are appended after the commit.
pub(crate) async fn commit_transition<F>(
    store: &dyn Store,
    target: ProfileRef<'_>,
    actor: &str,
    apply: F,
) -> Result<(DriverProfile, Option<Outcome>)>
where
    F: Fn(&mut DriverProfile, DateTime<Utc>) -> Result<Option<Outcome>> + Send + Sync,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut profile = target.load(store).await?;
        let now = Utc::now();

        let Some(outcome) = apply(&mut profile, now)? else {
            return Ok((profile, None));
        };

        match store.update_profile(&profile).await {
            Ok(stored) => {
                append_audit(store, &stored, &outcome.transitions, actor, now).await;
                return Ok((stored, Some(outcome)));
            }
            Err(AppError::Conflict(msg)) if attempt < MAX_CAS_ATTEMPTS => {
                tracing::debug!(
                    profile_id = %profile.id,
                    attempt,
                    reason = %msg,
                    "Profile write lost CAS race, retrying"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

async fn append_audit(
    store: &dyn Store,
    profile: &DriverProfile,
    transitions: &[Transition],
    actor: &str,
    at: DateTime<Utc>,
) {
    for t in transitions {
        tracing::info!(
            profile_id = %profile.id,
            event = ?t.event,
            from = ?t.from,
            to = ?t.to,
            actor,
            "Lifecycle transition"
        );

        let record = TransitionRecord::new(
            &profile.id,
            t.event,
            t.from,
            t.to,
            actor,
            t.detail.clone(),
            at,
        );
        if let Err(e) = store.append_transition(&record).await {
            tracing::error!(
                profile_id = %profile.id,
                event = ?t.event,
                error = %e,
                "Failed to append transition record"
            );
        }
    }
}

/// Driver lifecycle operations over a [`Store`].
pub struct DriverService {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn SyncDispatcher>,
}

impl DriverService {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<dyn SyncDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Profile owned by an account.
    pub async fn get_for_account(&self, account_id: &str) -> Result<DriverProfile> {
        ProfileRef::Account(account_id).load(self.store.as_ref()).await
    }

    pub async fn get(&self, profile_id: &str) -> Result<DriverProfile> {
        ProfileRef::Id(profile_id).load(self.store.as_ref()).await
    }

    /// `NEW -> STEP_1`. `Conflict` if the account already has a profile.
    pub async fn create(&self, account_id: &str, email: Option<String>) -> Result<DriverProfile> {
        let now = Utc::now();
        let (profile, transition) = lifecycle::create(account_id, email, now);
        self.store.create_profile(&profile).await?;

        tracing::info!(profile_id = %profile.id, account_id, "Driver profile created");
        append_audit(self.store.as_ref(), &profile, &[transition], account_id, now).await;

        Ok(profile)
    }

    /// Edit fields and optionally advance onboarding, creating the profile
    /// on first use.
    pub async fn patch(
        &self,
        account_id: &str,
        email: Option<String>,
        patch: &ProfilePatch,
    ) -> Result<DriverProfile> {
        if self.store.get_profile_by_account(account_id).await?.is_none() {
            // Validate against a fresh profile first so a rejected patch
            // leaves nothing behind.
            let (mut fresh, _) = lifecycle::create(account_id, email.clone(), Utc::now());
            lifecycle::apply_patch(&mut fresh, patch, Utc::now())?;

            match self.create(account_id, email).await {
                Ok(_) | Err(AppError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let (profile, _) = commit_transition(
            self.store.as_ref(),
            ProfileRef::Account(account_id),
            account_id,
            |p, now| lifecycle::apply_patch(p, patch, now).map(Some),
        )
        .await?;

        tracing::debug!(
            profile_id = %profile.id,
            step = profile.onboarding_step,
            state = ?profile.lifecycle_state,
            "Profile updated"
        );
        Ok(profile)
    }

    pub async fn approve(&self, profile_id: &str, admin: &str) -> Result<DriverProfile> {
        let (profile, _) = commit_transition(
            self.store.as_ref(),
            ProfileRef::Id(profile_id),
            admin,
            |p, now| lifecycle::approve(p, admin, now).map(Some),
        )
        .await?;
        Ok(profile)
    }

    pub async fn reject(
        &self,
        profile_id: &str,
        admin: &str,
        reason: Option<String>,
    ) -> Result<DriverProfile> {
        let (profile, _) = commit_transition(
            self.store.as_ref(),
            ProfileRef::Id(profile_id),
            admin,
            |p, now| lifecycle::reject(p, admin, reason.clone(), now).map(Some),
        )
        .await?;
        Ok(profile)
    }

    /// Record a newly created provider session on the driver's profile.
    pub async fn start_verification(
        &self,
        account_id: &str,
        session_id: &str,
    ) -> Result<DriverProfile> {
        let (profile, _) = commit_transition(
            self.store.as_ref(),
            ProfileRef::Account(account_id),
            account_id,
            |p, now| lifecycle::start_verification(p, session_id, now).map(Some),
        )
        .await?;
        Ok(profile)
    }

    /// Apply a provider status and, on first entry to `verified`, dispatch
    /// the fleet sync job after the write commits.
    pub async fn record_verification_result(
        &self,
        target: ProfileRef<'_>,
        remote_status: &str,
        actor: &str,
    ) -> Result<DriverProfile> {
        let (profile, outcome) = commit_transition(self.store.as_ref(), target, actor, |p, now| {
            lifecycle::record_verification_result(p, remote_status, now)
        })
        .await?;

        if outcome.is_some_and(|o| o.dispatch_sync) {
            self.dispatch_sync(&profile, "verification").await;
        }
        Ok(profile)
    }

    /// Enqueue a fleet sync. Failures are logged; the reconciliation job
    /// picks the profile up later.
    pub async fn dispatch_sync(&self, profile: &DriverProfile, source: &str) {
        let payload = SyncDriverPayload {
            profile_id: profile.id.clone(),
            source: source.to_string(),
        };
        if let Err(e) = self.dispatcher.dispatch(payload).await {
            tracing::warn!(
                profile_id = %profile.id,
                error = %e,
                "Failed to dispatch fleet sync; left for reconciliation"
            );
        }
    }

    pub async fn history(&self, profile_id: &str) -> Result<Vec<TransitionRecord>> {
        self.store.list_transitions(profile_id).await
    }

    pub async fn list(&self) -> Result<Vec<DriverProfile>> {
        self.store.list_profiles().await
    }

    /// Re-enqueue every verified profile that has no fleet worker yet.
    /// Returns how many jobs were dispatched.
    pub async fn reconcile_unsynced(&self) -> Result<usize> {
        let pending = self.store.list_unsynced_verified().await?;
        let candidates = pending.len();
        let dispatched = AtomicUsize::new(0);

        stream::iter(pending)
            .for_each_concurrent(MAX_CONCURRENT_DISPATCHES, |profile| {
                let dispatched = &dispatched;
                async move {
                    let payload = SyncDriverPayload {
                        profile_id: profile.id.clone(),
                        source: "reconcile".to_string(),
                    };
                    match self.dispatcher.dispatch(payload).await {
                        Ok(()) => {
                            dispatched.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => tracing::warn!(
                            profile_id = %profile.id,
                            error = %e,
                            "Failed to re-enqueue fleet sync"
                        ),
                    }
                }
            })
            .await;

        let dispatched = dispatched.into_inner();
        tracing::info!(
            candidates,
            dispatched,
            "Reconciliation of unsynced drivers complete"
        );
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use crate::models::{ApprovalStatus, LifecycleState, TransitionEvent, VerificationStatus};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        jobs: Mutex<Vec<SyncDriverPayload>>,
        fail: bool,
    }

    #[async_trait]
    impl SyncDispatcher for RecordingDispatcher {
        async fn dispatch(&self, payload: SyncDriverPayload) -> Result<()> {
            if self.fail {
                return Err(AppError::Internal(anyhow::anyhow!("queue unavailable")));
            }
            self.jobs.lock().unwrap().push(payload);
            Ok(())
        }
    }

    fn service_with(dispatcher: Arc<RecordingDispatcher>) -> (DriverService, Arc<MemoryDb>) {
        let store = Arc::new(MemoryDb::new());
        (DriverService::new(store.clone(), dispatcher), store)
    }

    fn step_patches() -> Vec<ProfilePatch> {
        vec![
            ProfilePatch {
                onboarding_step: Some(2),
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                phone: Some("416-555-1234".to_string()),
                payment_email: Some("pay@example.ca".to_string()),
                etransfer_auto_deposit_confirmed: Some(true),
                ..Default::default()
            },
            ProfilePatch {
                onboarding_step: Some(3),
                address_line1: Some("100 Queen St W".to_string()),
                city: Some("Toronto".to_string()),
                province: Some("ON".to_string()),
                postal_code: Some("M5H 2N2".to_string()),
                place_id: Some("ChIJ-place".to_string()),
                ..Default::default()
            },
            ProfilePatch {
                onboarding_step: Some(4),
                vehicle_make: Some("Toyota".to_string()),
                vehicle_model: Some("Corolla".to_string()),
                vehicle_year: Some("2019".to_string()),
                vehicle_color: Some("Blue".to_string()),
                license_plate: Some("ABCD123".to_string()),
                vehicle_photo_url: Some("gs://bucket/v.jpg".to_string()),
                license_photo_url: Some("gs://bucket/l.jpg".to_string()),
                ..Default::default()
            },
            ProfilePatch {
                onboarding_step: Some(5),
                agreement_signed: Some(true),
                ..Default::default()
            },
        ]
    }

    async fn onboard(service: &DriverService, account: &str) -> DriverProfile {
        let mut profile = None;
        for patch in step_patches() {
            profile = Some(
                service
                    .patch(account, Some("driver@example.ca".to_string()), &patch)
                    .await
                    .unwrap(),
            );
        }
        profile.unwrap()
    }

    #[tokio::test]
    async fn patch_creates_profile_on_first_use() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (service, _) = service_with(dispatcher);

        let profile = service
            .patch("sub-1", Some("driver@example.ca".to_string()), &step_patches()[0])
            .await
            .unwrap();
        assert_eq!(profile.onboarding_step, 2);

        let history = service.history(&profile.id).await.unwrap();
        let events: Vec<_> = history.iter().map(|r| r.event).collect();
        assert_eq!(events, vec![TransitionEvent::Created, TransitionEvent::StepAdvanced]);
    }

    #[tokio::test]
    async fn invalid_first_patch_creates_nothing() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (service, store) = service_with(dispatcher);

        let mut patch = step_patches()[0].clone();
        patch.phone = Some("12".to_string());
        assert!(service.patch("sub-1", None, &patch).await.is_err());
        assert!(store.get_profile_by_account("sub-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn explicit_create_twice_conflicts() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (service, _) = service_with(dispatcher);

        service.create("sub-1", None).await.unwrap();
        assert!(matches!(
            service.create("sub-1", None).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn full_lifecycle_dispatches_sync_once() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (service, _) = service_with(dispatcher.clone());

        let profile = onboard(&service, "sub-1").await;
        assert_eq!(profile.lifecycle_state, LifecycleState::CompletedPendingApproval);

        let profile = service.approve(&profile.id, "admin@example.ca").await.unwrap();
        assert_eq!(profile.identity_verification_status, Some(VerificationStatus::Pending));
        assert!(dispatcher.jobs.lock().unwrap().is_empty());

        let profile = service
            .record_verification_result(ProfileRef::Id(&profile.id), "verified", "system:webhook")
            .await
            .unwrap();
        assert_eq!(profile.lifecycle_state, LifecycleState::Verified);

        service
            .record_verification_result(ProfileRef::Id(&profile.id), "verified", "system:webhook")
            .await
            .unwrap();

        let jobs = dispatcher.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].profile_id, profile.id);
    }

    #[tokio::test]
    async fn dispatch_failure_keeps_verification() {
        let dispatcher = Arc::new(RecordingDispatcher {
            fail: true,
            ..Default::default()
        });
        let (service, _) = service_with(dispatcher);

        let profile = onboard(&service, "sub-1").await;
        service.approve(&profile.id, "admin").await.unwrap();
        let profile = service
            .record_verification_result(ProfileRef::Account("sub-1"), "verified", "sub-1")
            .await
            .unwrap();

        assert_eq!(profile.identity_verification_status, Some(VerificationStatus::Verified));
        assert!(profile.needs_fleet_sync());
    }

    #[tokio::test]
    async fn rejected_profile_cannot_be_approved() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (service, _) = service_with(dispatcher);

        let profile = onboard(&service, "sub-1").await;
        let profile = service
            .reject(&profile.id, "admin", Some("expired licence".to_string()))
            .await
            .unwrap();
        assert_eq!(profile.approval_status, Some(ApprovalStatus::Rejected));

        assert!(matches!(
            service.approve(&profile.id, "admin").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn revision_increases_on_every_write() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (service, _) = service_with(dispatcher);

        let created = service.create("sub-1", None).await.unwrap();
        let patched = service
            .patch("sub-1", None, &ProfilePatch {
                first_name: Some("Ada".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(patched.revision, created.revision + 1);
    }

    #[tokio::test]
    async fn reconcile_enqueues_unsynced_verified() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (service, _) = service_with(dispatcher.clone());

        let a = onboard(&service, "sub-a").await;
        let b = onboard(&service, "sub-b").await;
        for p in [&a, &b] {
            service.approve(&p.id, "admin").await.unwrap();
        }
        service
            .record_verification_result(ProfileRef::Id(&a.id), "verified", "test")
            .await
            .unwrap();
        dispatcher.jobs.lock().unwrap().clear();

        assert_eq!(service.reconcile_unsynced().await.unwrap(), 1);
        let jobs = dispatcher.jobs.lock().unwrap();
        assert_eq!(jobs[0].profile_id, a.id);
        assert_eq!(jobs[0].source, "reconcile");
    }
}
