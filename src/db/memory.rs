// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory [`Store`] for local development and tests.
//!
//! DashMap entry guards hold the shard lock for the whole read-modify-write,
//! so CAS updates and availability upserts are atomic per key.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::db::Store;
use crate::error::AppError;
use crate::models::{AvailabilityEntry, AvailabilityUpdate, DriverProfile, TransitionRecord};

#[derive(Default)]
pub struct MemoryDb {
    /// Keyed by account id.
    profiles: DashMap<String, DriverProfile>,
    /// Keyed by `{profile_id}_{date}`.
    availability: DashMap<String, AvailabilityEntry>,
    /// Keyed by profile id.
    transitions: DashMap<String, Vec<TransitionRecord>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_profile(&self, predicate: impl Fn(&DriverProfile) -> bool) -> Option<DriverProfile> {
        self.profiles
            .iter()
            .find(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl Store for MemoryDb {
    async fn get_profile_by_account(
        &self,
        account_id: &str,
    ) -> Result<Option<DriverProfile>, AppError> {
        Ok(self.profiles.get(account_id).map(|p| p.clone()))
    }

    async fn get_profile(&self, profile_id: &str) -> Result<Option<DriverProfile>, AppError> {
        Ok(self.find_profile(|p| p.id == profile_id))
    }

    async fn create_profile(&self, profile: &DriverProfile) -> Result<(), AppError> {
        match self.profiles.entry(profile.account_id.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(
                "A profile already exists for this account".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(profile.clone());
                Ok(())
            }
        }
    }

    async fn update_profile(&self, profile: &DriverProfile) -> Result<DriverProfile, AppError> {
        let mut stored = self
            .profiles
            .get_mut(&profile.account_id)
            .ok_or_else(|| AppError::NotFound(format!("Profile {}", profile.id)))?;

        if stored.revision != profile.revision {
            return Err(AppError::Conflict(
                "Profile was modified concurrently, retry".to_string(),
            ));
        }

        let mut next = profile.clone();
        next.revision += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn list_profiles(&self) -> Result<Vec<DriverProfile>, AppError> {
        let mut profiles: Vec<DriverProfile> =
            self.profiles.iter().map(|e| e.value().clone()).collect();
        profiles.sort_by_key(|p| p.created_at);
        Ok(profiles)
    }

    async fn find_profile_by_external_worker_id(
        &self,
        worker_id: &str,
    ) -> Result<Option<DriverProfile>, AppError> {
        Ok(self.find_profile(|p| p.external_worker_id.as_deref() == Some(worker_id)))
    }

    async fn find_profile_by_phone(&self, phone: &str) -> Result<Option<DriverProfile>, AppError> {
        Ok(self.find_profile(|p| p.phone.as_deref() == Some(phone)))
    }

    async fn find_profile_by_verification_session(
        &self,
        session_id: &str,
    ) -> Result<Option<DriverProfile>, AppError> {
        Ok(self.find_profile(|p| p.identity_verification_session_id.as_deref() == Some(session_id)))
    }

    async fn list_unsynced_verified(&self) -> Result<Vec<DriverProfile>, AppError> {
        Ok(self
            .list_profiles()
            .await?
            .into_iter()
            .filter(DriverProfile::needs_fleet_sync)
            .collect())
    }

    async fn append_transition(&self, record: &TransitionRecord) -> Result<(), AppError> {
        self.transitions
            .entry(record.profile_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn list_transitions(&self, profile_id: &str) -> Result<Vec<TransitionRecord>, AppError> {
        let mut records = self
            .transitions
            .get(profile_id)
            .map(|r| r.clone())
            .unwrap_or_default();
        records.sort_by_key(|r| r.at);
        Ok(records)
    }

    async fn upsert_availability(
        &self,
        update: AvailabilityUpdate,
    ) -> Result<AvailabilityEntry, AppError> {
        let now = Utc::now();
        let doc_id = AvailabilityEntry::document_id(&update.profile_id, update.date);

        let entry = match self.availability.entry(doc_id) {
            Entry::Occupied(mut slot) => {
                let entry = update.apply(Some(slot.get()), now);
                slot.insert(entry.clone());
                entry
            }
            Entry::Vacant(slot) => {
                let entry = update.apply(None, now);
                slot.insert(entry.clone());
                entry
            }
        };
        Ok(entry)
    }

    async fn list_availability(
        &self,
        profile_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<AvailabilityEntry>, AppError> {
        let mut entries: Vec<AvailabilityEntry> = self
            .availability
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| e.profile_id == profile_id)
            .filter(|e| start.is_none_or(|s| e.date >= s))
            .filter(|e| end.is_none_or(|d| e.date <= d))
            .collect();
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }
}
