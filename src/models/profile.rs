// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Driver profile model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Final onboarding step. Reaching it completes onboarding.
pub const FINAL_STEP: u8 = 5;

/// Admin decision on a completed application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Local view of the identity verification provider's session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum VerificationStatus {
    Pending,
    RequiresInput,
    Verified,
    Failed,
}

impl VerificationStatus {
    /// Map the provider's status vocabulary onto the local enum.
    ///
    /// Returns `None` for statuses that should leave the local value unchanged.
    pub fn from_remote(remote: &str) -> Option<Self> {
        match remote.trim().to_ascii_lowercase().as_str() {
            "verified" => Some(Self::Verified),
            "requires_input" | "requires_action" => Some(Self::RequiresInput),
            "canceled" | "cancelled" => Some(Self::Failed),
            "processing" | "requires_review" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// Lifecycle position of a driver. Stored explicitly on the profile and
/// always equal to [`DriverProfile::derive_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum LifecycleState {
    /// No profile exists yet. Never persisted, used as the `from` of the
    /// creation transition.
    New,
    Step1,
    Step2,
    Step3,
    Step4,
    CompletedPendingApproval,
    Rejected,
    ApprovedPendingVerification,
    VerificationFailed,
    Verified,
}

impl LifecycleState {
    pub fn for_step(step: u8) -> Self {
        match step {
            0 | 1 => Self::Step1,
            2 => Self::Step2,
            3 => Self::Step3,
            _ => Self::Step4,
        }
    }
}

/// Driver profile stored in the `driver_profiles` collection.
///
/// Document ID is the owning account's OIDC subject, which keeps the
/// account-to-profile relation 1:1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    pub id: String,
    pub account_id: String,

    // ─── Personal ────────────────────────────────────────────────
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub payment_email: Option<String>,
    #[serde(default)]
    pub etransfer_auto_deposit_confirmed: bool,

    // ─── Address ─────────────────────────────────────────────────
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    /// Places provider identifier, used for geocoding.
    #[serde(default)]
    pub place_id: Option<String>,

    // ─── Vehicle ─────────────────────────────────────────────────
    #[serde(default)]
    pub vehicle_make: Option<String>,
    #[serde(default)]
    pub vehicle_model: Option<String>,
    #[serde(default)]
    pub vehicle_year: Option<String>,
    #[serde(default)]
    pub vehicle_color: Option<String>,
    #[serde(default)]
    pub license_plate: Option<String>,
    #[serde(default)]
    pub vehicle_photo_url: Option<String>,
    #[serde(default)]
    pub license_photo_url: Option<String>,

    // ─── Lifecycle ───────────────────────────────────────────────
    pub onboarding_step: u8,
    pub onboarding_completed: bool,
    #[serde(default)]
    pub agreement_signed: bool,
    #[serde(default)]
    pub agreement_signed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approval_status: Option<ApprovalStatus>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub identity_verification_status: Option<VerificationStatus>,
    #[serde(default)]
    pub identity_verification_session_id: Option<String>,
    #[serde(default)]
    pub identity_verified_at: Option<DateTime<Utc>>,
    pub lifecycle_state: LifecycleState,

    // ─── Fleet sync ──────────────────────────────────────────────
    #[serde(default)]
    pub external_worker_id: Option<String>,
    #[serde(default)]
    pub external_synced_at: Option<DateTime<Utc>>,
    /// Last fleet sync failure, cleared on success. Non-empty means the
    /// record is waiting for the reconciliation job.
    #[serde(default)]
    pub last_sync_error: Option<String>,
    #[serde(default)]
    pub last_sync_attempt_at: Option<DateTime<Utc>>,

    // ─── Metadata ────────────────────────────────────────────────
    /// Compare-and-swap counter, bumped on every write.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DriverProfile {
    /// A fresh profile at step 1.
    pub fn new(account_id: &str, email: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            first_name: None,
            last_name: None,
            email,
            phone: None,
            payment_email: None,
            etransfer_auto_deposit_confirmed: false,
            address_line1: None,
            address_line2: None,
            city: None,
            province: None,
            postal_code: None,
            place_id: None,
            vehicle_make: None,
            vehicle_model: None,
            vehicle_year: None,
            vehicle_color: None,
            license_plate: None,
            vehicle_photo_url: None,
            license_photo_url: None,
            onboarding_step: 1,
            onboarding_completed: false,
            agreement_signed: false,
            agreement_signed_at: None,
            approval_status: None,
            approved_at: None,
            approved_by: None,
            identity_verification_status: None,
            identity_verification_session_id: None,
            identity_verified_at: None,
            lifecycle_state: LifecycleState::Step1,
            external_worker_id: None,
            external_synced_at: None,
            last_sync_error: None,
            last_sync_attempt_at: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Compute the lifecycle state from the individual status fields.
    pub fn derive_state(&self) -> LifecycleState {
        if !self.onboarding_completed {
            return LifecycleState::for_step(self.onboarding_step);
        }

        match self.approval_status {
            None | Some(ApprovalStatus::Pending) => LifecycleState::CompletedPendingApproval,
            Some(ApprovalStatus::Rejected) => LifecycleState::Rejected,
            Some(ApprovalStatus::Approved) => match self.identity_verification_status {
                Some(VerificationStatus::Verified) => LifecycleState::Verified,
                Some(VerificationStatus::Failed) => LifecycleState::VerificationFailed,
                _ => LifecycleState::ApprovedPendingVerification,
            },
        }
    }

    /// Check the cross-field invariants that every persisted profile obeys.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.approval_status.is_some() && !self.onboarding_completed {
            return Err("approvalStatus set before onboarding completed".to_string());
        }
        if self.identity_verification_status.is_some()
            && self.approval_status != Some(ApprovalStatus::Approved)
        {
            return Err("identityVerificationStatus set without approval".to_string());
        }
        if self.external_worker_id.is_some()
            && self.identity_verification_status != Some(VerificationStatus::Verified)
        {
            return Err("externalWorkerId set before verification".to_string());
        }
        if !(1..=FINAL_STEP).contains(&self.onboarding_step) {
            return Err(format!("onboardingStep {} out of range", self.onboarding_step));
        }
        if self.lifecycle_state != self.derive_state() {
            return Err(format!(
                "lifecycleState {:?} does not match derived {:?}",
                self.lifecycle_state,
                self.derive_state()
            ));
        }
        Ok(())
    }

    /// Whether the reconciliation job should pick this profile up.
    pub fn needs_fleet_sync(&self) -> bool {
        self.identity_verification_status == Some(VerificationStatus::Verified)
            && self.external_worker_id.is_none()
            && self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    /// `{first} {last}` with whatever parts are present.
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// All address fields needed for a routable address are present.
    pub fn has_complete_address(&self) -> bool {
        [
            self.address_line1.as_deref(),
            self.city.as_deref(),
            self.province.as_deref(),
            self.postal_code.as_deref(),
        ]
        .iter()
        .all(|f| f.is_some_and(|v| !v.trim().is_empty()))
    }
}
