// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Driver availability calendar.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::db::Store;
use crate::error::{AppError, FieldError, Result};
use crate::models::onboarding::field_errors;
use crate::models::{
    AvailabilityEntry, AvailabilityStatus, AvailabilityUpdate, DriverProfile, EquipmentFlags,
};
use crate::phone;
use crate::time_utils::parse_calendar_date;

const MAX_UPSERT_ATTEMPTS: usize = 3;

/// Body of `PUT /api/availability`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetAvailabilityRequest {
    /// `YYYY-MM-DD`
    pub date: String,
    pub status: AvailabilityStatus,
    #[serde(default)]
    pub equipment: EquipmentFlags,
    #[serde(default)]
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub notes: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 256))]
    pub response_token: Option<String>,
}

/// Optional inclusive date bounds, as received on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRangeQuery {
    /// Parse both bounds; `start > end` is rejected.
    pub fn parse(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let mut errors = Vec::new();
        let mut bound = |field: &str, raw: &Option<String>| match raw.as_deref() {
            None | Some("") => None,
            Some(raw) => {
                let parsed = parse_calendar_date(raw);
                if parsed.is_none() {
                    errors.push(FieldError::new(field, "must be a valid YYYY-MM-DD date"));
                }
                parsed
            }
        };
        let start = bound("start", &self.start);
        let end = bound("end", &self.end);

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                errors.push(FieldError::new("start", "must not be after end"));
            }
        }

        if errors.is_empty() {
            Ok((start, end))
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

/// A driver's calendar as served to the dispatch side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAvailability {
    pub profile_id: String,
    pub external_worker_id: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub availability: Vec<AvailabilityEntry>,
}

pub struct AvailabilityService {
    store: Arc<dyn Store>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Upsert the caller's entry for one date.
    pub async fn set_availability(
        &self,
        account_id: &str,
        request: SetAvailabilityRequest,
    ) -> Result<AvailabilityEntry> {
        let mut errors = match request.validate() {
            Ok(()) => Vec::new(),
            Err(e) => field_errors(&e),
        };
        let date = parse_calendar_date(&request.date);
        if date.is_none() {
            errors.push(FieldError::new("date", "must be a valid YYYY-MM-DD date"));
        }
        let Some(date) = date.filter(|_| errors.is_empty()) else {
            return Err(AppError::Validation(errors));
        };

        let profile = self
            .store
            .get_profile_by_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Driver profile not found".to_string()))?;

        if !profile.onboarding_completed {
            return Err(AppError::Conflict(
                "Onboarding must be completed before setting availability".to_string(),
            ));
        }

        let update = AvailabilityUpdate {
            profile_id: profile.id.clone(),
            date,
            status: request.status,
            equipment: request.equipment,
            notes: request.notes,
            response_token: request.response_token,
        };

        let mut attempt = 1;
        let entry = loop {
            match self.store.upsert_availability(update.clone()).await {
                Err(AppError::Conflict(msg)) if attempt < MAX_UPSERT_ATTEMPTS => {
                    tracing::debug!(
                        profile_id = %profile.id,
                        attempt,
                        error = %msg,
                        "Retrying availability upsert"
                    );
                    attempt += 1;
                }
                result => break result?,
            }
        };

        tracing::info!(
            profile_id = %profile.id,
            date = %entry.date,
            status = ?entry.status,
            "Availability updated"
        );

        Ok(entry)
    }

    /// The caller's own calendar.
    pub async fn list_for_account(
        &self,
        account_id: &str,
        range: &DateRangeQuery,
    ) -> Result<Vec<AvailabilityEntry>> {
        let (start, end) = range.parse()?;
        let profile = self
            .store
            .get_profile_by_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Driver profile not found".to_string()))?;
        self.store.list_availability(&profile.id, start, end).await
    }

    /// Calendar of the driver linked to a fleet worker.
    pub async fn for_worker(
        &self,
        worker_id: &str,
        range: &DateRangeQuery,
    ) -> Result<DriverAvailability> {
        let (start, end) = range.parse()?;
        let profile = self
            .store
            .find_profile_by_external_worker_id(worker_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No driver linked to this worker".to_string()))?;
        self.collect(profile, start, end).await
    }

    /// Calendar of the driver with this phone number, in any stored form.
    pub async fn for_phone(
        &self,
        raw_phone: &str,
        range: &DateRangeQuery,
    ) -> Result<DriverAvailability> {
        let (start, end) = range.parse()?;
        if raw_phone.trim().is_empty() {
            return Err(AppError::invalid_field("phone", "is required"));
        }

        for candidate in phone::lookup_candidates(raw_phone) {
            if let Some(profile) = self.store.find_profile_by_phone(&candidate).await? {
                tracing::debug!(
                    profile_id = %profile.id,
                    matched = %candidate,
                    "Phone lookup matched"
                );
                return self.collect(profile, start, end).await;
            }
        }

        Err(AppError::NotFound("No driver with this phone number".to_string()))
    }

    async fn collect(
        &self,
        profile: DriverProfile,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<DriverAvailability> {
        let availability = self.store.list_availability(&profile.id, start, end).await?;
        Ok(DriverAvailability {
            name: profile.full_name(),
            profile_id: profile.id,
            external_worker_id: profile.external_worker_id,
            phone: profile.phone,
            availability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use crate::models::DriverProfile;
    use chrono::Utc;

    async fn store_with(completed: bool) -> (Arc<dyn Store>, String) {
        let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
        let mut profile =
            DriverProfile::new("acct-1", Some("d@example.ca".to_string()), Utc::now());
        profile.onboarding_completed = completed;
        profile.phone = Some("416-555-1234".to_string());
        profile.external_worker_id = Some("w-9".to_string());
        store.create_profile(&profile).await.unwrap();
        (store, profile.id)
    }

    fn request(date: &str) -> SetAvailabilityRequest {
        SetAvailabilityRequest {
            date: date.to_string(),
            status: AvailabilityStatus::Available,
            equipment: EquipmentFlags::default(),
            notes: String::new(),
            response_token: None,
        }
    }

    #[tokio::test]
    async fn set_requires_completed_onboarding() {
        let service = AvailabilityService::new(store_with(false).await.0);
        assert!(matches!(
            service.set_availability("acct-1", request("2025-03-10")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn set_requires_profile() {
        let service = AvailabilityService::new(store_with(true).await.0);
        assert!(matches!(
            service.set_availability("nobody", request("2025-03-10")).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn set_rejects_impossible_dates_and_long_notes() {
        let service = AvailabilityService::new(store_with(true).await.0);
        let mut req = request("2025-02-30");
        req.notes = "x".repeat(501);

        let Err(AppError::Validation(fields)) = service.set_availability("acct-1", req).await else {
            panic!("expected validation error");
        };
        let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
        assert!(names.contains(&"date"));
        assert!(names.contains(&"notes"));
    }

    #[tokio::test]
    async fn second_write_replaces_first() {
        let service = AvailabilityService::new(store_with(true).await.0);
        service.set_availability("acct-1", request("2025-03-10")).await.unwrap();

        let mut req = request("2025-03-10");
        req.status = AvailabilityStatus::Unavailable;
        let entry = service.set_availability("acct-1", req).await.unwrap();
        assert_eq!(entry.status, AvailabilityStatus::Unavailable);

        let all = service
            .list_for_account("acct-1", &DateRangeQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let range = DateRangeQuery {
            start: Some("2025-03-10".to_string()),
            end: Some("2025-03-01".to_string()),
        };
        assert!(matches!(range.parse(), Err(AppError::Validation(_))));
    }

    #[test]
    fn single_bound_is_allowed() {
        let range = DateRangeQuery {
            start: None,
            end: Some("2025-03-01".to_string()),
        };
        assert_eq!(
            range.parse().unwrap(),
            (None, NaiveDate::from_ymd_opt(2025, 3, 1))
        );
    }

    #[tokio::test]
    async fn phone_lookup_tries_other_forms() {
        let service = AvailabilityService::new(store_with(true).await.0);
        service.set_availability("acct-1", request("2025-03-10")).await.unwrap();

        // Stored dashed, queried in international form.
        let found = service
            .for_phone("+1 416 555 1234", &DateRangeQuery::default())
            .await
            .unwrap();
        assert_eq!(found.availability.len(), 1);

        assert!(matches!(
            service.for_phone("+1 647 555 0000", &DateRangeQuery::default()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn worker_lookup_returns_calendar() {
        let (store, profile_id) = store_with(true).await;
        let service = AvailabilityService::new(store);
        let found = service
            .for_worker("w-9", &DateRangeQuery::default())
            .await
            .unwrap();
        assert_eq!(found.profile_id, profile_id);
        assert_eq!(found.external_worker_id.as_deref(), Some("w-9"));
    }
}
