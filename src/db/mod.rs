//! Database layer.
//!
//! [`Store`] is the single persistence interface. [`FirestoreDb`] backs
//! deployments; [`MemoryDb`] backs local runs and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::{AvailabilityEntry, AvailabilityUpdate, DriverProfile, TransitionRecord};

/// Collection names as constants.
pub mod collections {
    /// Driver profiles (keyed by account subject)
    pub const DRIVER_PROFILES: &str = "driver_profiles";
    /// Availability entries (keyed by `{profile_id}_{date}`)
    pub const AVAILABILITY: &str = "availability";
    /// Lifecycle audit trail (keyed by record id)
    pub const PROFILE_TRANSITIONS: &str = "profile_transitions";
}

/// Backend-agnostic persistence for profiles, availability and the audit trail.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Profiles ────────────────────────────────────────────────────

    /// Get the profile owned by an account.
    async fn get_profile_by_account(
        &self,
        account_id: &str,
    ) -> Result<Option<DriverProfile>, AppError>;

    /// Get a profile by its own id.
    async fn get_profile(&self, profile_id: &str) -> Result<Option<DriverProfile>, AppError>;

    /// Insert a new profile. `Conflict` if the account already has one.
    async fn create_profile(&self, profile: &DriverProfile) -> Result<(), AppError>;

    /// Compare-and-swap write.
    ///
    /// Succeeds only if the stored revision still equals `profile.revision`;
    /// returns the stored profile with the revision bumped. A lost race is
    /// `Conflict`.
    async fn update_profile(&self, profile: &DriverProfile) -> Result<DriverProfile, AppError>;

    /// All profiles, oldest first.
    async fn list_profiles(&self) -> Result<Vec<DriverProfile>, AppError>;

    async fn find_profile_by_external_worker_id(
        &self,
        worker_id: &str,
    ) -> Result<Option<DriverProfile>, AppError>;

    /// Exact match on the stored phone string.
    async fn find_profile_by_phone(&self, phone: &str) -> Result<Option<DriverProfile>, AppError>;

    async fn find_profile_by_verification_session(
        &self,
        session_id: &str,
    ) -> Result<Option<DriverProfile>, AppError>;

    /// Verified profiles that still have no fleet worker.
    async fn list_unsynced_verified(&self) -> Result<Vec<DriverProfile>, AppError>;

    // ── Audit trail ─────────────────────────────────────────────────

    async fn append_transition(&self, record: &TransitionRecord) -> Result<(), AppError>;

    /// Transitions for one profile, oldest first.
    async fn list_transitions(&self, profile_id: &str) -> Result<Vec<TransitionRecord>, AppError>;

    // ── Availability ────────────────────────────────────────────────

    /// Insert or replace the entry for `(profile_id, date)` in one write and
    /// return it. A stored response token survives an update without one.
    async fn upsert_availability(
        &self,
        update: AvailabilityUpdate,
    ) -> Result<AvailabilityEntry, AppError>;

    /// Entries for one profile, ascending by date, bounds inclusive.
    async fn list_availability(
        &self,
        profile_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<AvailabilityEntry>, AppError>;
}
