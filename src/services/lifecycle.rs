// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Driver lifecycle state machine.
//!
//! Every function here is pure: it takes the current profile, checks the
//! requested transition against it, and mutates it in place only when the
//! transition is legal. Persistence and side effects live in
//! [`DriverService`](crate::services::DriverService).
//!
//! ```text
//! NEW -> STEP_1..STEP_4 -> COMPLETED_PENDING_APPROVAL -> APPROVED_PENDING_VERIFICATION -> VERIFIED
//!                                   |                          ^          |
//!                                   v                          |          v
//!                                REJECTED                     VERIFICATION_FAILED
//! ```

use chrono::{DateTime, Utc};

use crate::error::{AppError, FieldError, Result};
use crate::models::onboarding::{validate_step, ProfilePatch};
use crate::models::{
    ApprovalStatus, DriverProfile, LifecycleState, TransitionEvent, VerificationStatus, FINAL_STEP,
};

/// A legal state change, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub event: TransitionEvent,
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub detail: Option<String>,
}

/// Result of applying a request to a profile.
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    pub transitions: Vec<Transition>,
    /// Enqueue a fleet sync once the write is committed.
    pub dispatch_sync: bool,
}

impl Outcome {
    fn single(transition: Transition) -> Self {
        Self {
            transitions: vec![transition],
            dispatch_sync: false,
        }
    }
}

fn refresh_state(
    profile: &mut DriverProfile,
    now: DateTime<Utc>,
) -> (LifecycleState, LifecycleState) {
    let from = profile.lifecycle_state;
    profile.lifecycle_state = profile.derive_state();
    profile.updated_at = now;
    (from, profile.lifecycle_state)
}

/// `NEW -> STEP_1`.
pub fn create(
    account_id: &str,
    email: Option<String>,
    now: DateTime<Utc>,
) -> (DriverProfile, Transition) {
    let profile = DriverProfile::new(account_id, email, now);
    let transition = Transition {
        event: TransitionEvent::Created,
        from: LifecycleState::New,
        to: profile.lifecycle_state,
        detail: None,
    };
    (profile, transition)
}

/// Apply a driver's PATCH: merge fields, and when `onboardingStep` is given,
/// validate the target step's schema and advance.
///
/// Nothing is mutated unless every check passes.
pub fn apply_patch(
    profile: &mut DriverProfile,
    patch: &ProfilePatch,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    patch.validate_formats().map_err(AppError::Validation)?;

    let mut candidate = profile.clone();
    patch.merge_into(&mut candidate);

    let current_step = candidate.onboarding_step;
    let target = patch.onboarding_step;
    let reached = target.map_or(current_step, |t| t.max(current_step));

    // The target schema always applies; other touched steps are re-checked
    // only if the driver has already passed them.
    let mut steps: Vec<u8> = touched_steps(patch)
        .into_iter()
        .filter(|s| *s <= current_step)
        .collect();
    if let Some(t) = target {
        steps.push(t);
    }
    steps.sort_unstable();
    steps.dedup();

    let mut errors: Vec<FieldError> = Vec::new();
    for step in steps {
        if let Err(step_errors) = validate_step(step, &candidate) {
            errors.extend(step_errors);
        }
    }
    if !errors.is_empty() {
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        errors.dedup_by(|a, b| a.field == b.field);
        return Err(AppError::Validation(errors));
    }

    let mut outcome = Outcome::default();
    candidate.onboarding_step = reached;

    if target == Some(FINAL_STEP) && !candidate.onboarding_completed {
        candidate.onboarding_completed = true;
        if candidate.agreement_signed_at.is_none() {
            candidate.agreement_signed_at = Some(now);
        }
        // Derived transition: completion always lands in the approval queue.
        if candidate.approval_status.is_none() {
            candidate.approval_status = Some(ApprovalStatus::Pending);
        }
        let (from, to) = refresh_state(&mut candidate, now);
        outcome.transitions.push(Transition {
            event: TransitionEvent::OnboardingCompleted,
            from,
            to,
            detail: None,
        });
    } else {
        let (from, to) = refresh_state(&mut candidate, now);
        if reached > current_step {
            outcome.transitions.push(Transition {
                event: TransitionEvent::StepAdvanced,
                from,
                to,
                detail: Some(format!("step {current_step} -> {reached}")),
            });
        }
    }

    *profile = candidate;
    Ok(outcome)
}

/// Onboarding steps whose fields the patch carries.
fn touched_steps(patch: &ProfilePatch) -> Vec<u8> {
    let mut steps = Vec::new();
    if patch.first_name.is_some()
        || patch.last_name.is_some()
        || patch.email.is_some()
        || patch.phone.is_some()
        || patch.payment_email.is_some()
        || patch.etransfer_auto_deposit_confirmed.is_some()
    {
        steps.push(2);
    }
    if patch.address_line1.is_some()
        || patch.city.is_some()
        || patch.province.is_some()
        || patch.postal_code.is_some()
        || patch.place_id.is_some()
    {
        steps.push(3);
    }
    if patch.vehicle_make.is_some()
        || patch.vehicle_model.is_some()
        || patch.vehicle_year.is_some()
        || patch.vehicle_color.is_some()
        || patch.license_plate.is_some()
        || patch.vehicle_photo_url.is_some()
        || patch.license_photo_url.is_some()
    {
        steps.push(4);
    }
    steps
}

fn require_pending_approval(profile: &DriverProfile, action: &str) -> Result<()> {
    match profile.approval_status {
        Some(ApprovalStatus::Pending) => Ok(()),
        Some(status) => Err(AppError::Conflict(format!(
            "Cannot {action} profile {}: approval status is already {:?}",
            profile.id, status
        ))),
        None => Err(AppError::Conflict(format!(
            "Cannot {action} profile {}: onboarding is not complete",
            profile.id
        ))),
    }
}

/// `COMPLETED_PENDING_APPROVAL -> APPROVED_PENDING_VERIFICATION`.
pub fn approve(profile: &mut DriverProfile, admin: &str, now: DateTime<Utc>) -> Result<Outcome> {
    require_pending_approval(profile, "approve")?;

    profile.approval_status = Some(ApprovalStatus::Approved);
    profile.approved_at = Some(now);
    profile.approved_by = Some(admin.to_string());
    profile.identity_verification_status = Some(VerificationStatus::Pending);

    let (from, to) = refresh_state(profile, now);
    Ok(Outcome::single(Transition {
        event: TransitionEvent::Approved,
        from,
        to,
        detail: None,
    }))
}

/// `COMPLETED_PENDING_APPROVAL -> REJECTED`.
pub fn reject(
    profile: &mut DriverProfile,
    admin: &str,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    require_pending_approval(profile, "reject")?;

    profile.approval_status = Some(ApprovalStatus::Rejected);
    profile.approved_at = Some(now);
    profile.approved_by = Some(admin.to_string());

    let (from, to) = refresh_state(profile, now);
    Ok(Outcome::single(Transition {
        event: TransitionEvent::Rejected,
        from,
        to,
        detail: reason,
    }))
}

/// Record a new provider session. Also the retry path out of
/// `VERIFICATION_FAILED` and `requires_input`.
pub fn start_verification(
    profile: &mut DriverProfile,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    if profile.approval_status != Some(ApprovalStatus::Approved) {
        return Err(AppError::Conflict(
            "Identity verification is only available after approval".to_string(),
        ));
    }
    if profile.identity_verification_status == Some(VerificationStatus::Verified) {
        return Err(AppError::Conflict("Identity is already verified".to_string()));
    }

    profile.identity_verification_session_id = Some(session_id.to_string());
    profile.identity_verification_status = Some(VerificationStatus::Pending);

    let (from, to) = refresh_state(profile, now);
    Ok(Outcome::single(Transition {
        event: TransitionEvent::VerificationStarted,
        from,
        to,
        detail: Some(session_id.to_string()),
    }))
}

/// Apply a provider status (from polling or a webhook).
///
/// Returns `Ok(None)` when nothing changes: unknown statuses, a repeat of
/// the current status, or anything arriving after `verified`.
pub fn record_verification_result(
    profile: &mut DriverProfile,
    remote_status: &str,
    now: DateTime<Utc>,
) -> Result<Option<Outcome>> {
    if profile.approval_status != Some(ApprovalStatus::Approved) {
        return Err(AppError::Conflict(format!(
            "Profile {} is not approved; verification results cannot be recorded",
            profile.id
        )));
    }

    let Some(mapped) = VerificationStatus::from_remote(remote_status) else {
        tracing::debug!(
            profile_id = %profile.id,
            remote_status,
            "Ignoring unmapped verification status"
        );
        return Ok(None);
    };

    let current = profile.identity_verification_status;
    if current == Some(mapped) {
        return Ok(None);
    }
    if current == Some(VerificationStatus::Verified) {
        tracing::warn!(
            profile_id = %profile.id,
            remote_status,
            "Ignoring verification downgrade after verified"
        );
        return Ok(None);
    }

    profile.identity_verification_status = Some(mapped);

    let mut dispatch_sync = false;
    if mapped == VerificationStatus::Verified {
        profile.identity_verified_at = Some(now);
        dispatch_sync = profile.needs_fleet_sync();
    }

    let (from, to) = refresh_state(profile, now);
    Ok(Some(Outcome {
        transitions: vec![Transition {
            event: TransitionEvent::VerificationUpdated,
            from,
            to,
            detail: Some(remote_status.to_string()),
        }],
        dispatch_sync,
    }))
}

/// Store the remote worker id after a successful fleet sync.
pub fn mark_synced(
    profile: &mut DriverProfile,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    if profile.identity_verification_status != Some(VerificationStatus::Verified) {
        return Err(AppError::Conflict(format!(
            "Profile {} is not verified; refusing to link fleet worker",
            profile.id
        )));
    }

    let relinked = profile
        .external_worker_id
        .as_deref()
        .is_some_and(|existing| existing != worker_id);

    profile.external_worker_id = Some(worker_id.to_string());
    profile.external_synced_at = Some(now);
    profile.last_sync_error = None;
    profile.last_sync_attempt_at = Some(now);

    let (from, to) = refresh_state(profile, now);
    Ok(Outcome::single(Transition {
        event: TransitionEvent::FleetSynced,
        from,
        to,
        detail: Some(if relinked {
            format!("relinked to worker {worker_id}")
        } else {
            format!("worker {worker_id}")
        }),
    }))
}

/// Flag a failed sync for the reconciliation job. Not a state change.
pub fn mark_sync_failed(profile: &mut DriverProfile, error: &str, now: DateTime<Utc>) {
    profile.last_sync_error = Some(error.to_string());
    profile.last_sync_attempt_at = Some(now);
    profile.updated_at = now;
}
