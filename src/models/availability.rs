// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Availability calendar entry model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum AvailabilityStatus {
    Available,
    Unavailable,
    Pending,
}

/// Equipment the driver can bring on a given day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct EquipmentFlags {
    #[serde(default)]
    pub thermal_bag: bool,
    #[serde(default)]
    pub insulated_cooler: bool,
    #[serde(default)]
    pub hand_truck: bool,
}

/// One calendar day for one driver, stored in `availability`.
///
/// Document ID is `{profile_id}_{date}` so the store holds at most one entry
/// per (profile, date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityEntry {
    pub profile_id: String,
    /// Calendar day, serialized as `YYYY-MM-DD` (sorts lexicographically).
    pub date: NaiveDate,
    pub status: AvailabilityStatus,
    #[serde(default)]
    pub equipment: EquipmentFlags,
    #[serde(default)]
    pub notes: String,
    /// Correlates the entry with a remote availability request.
    #[serde(default)]
    pub response_token: Option<String>,
    pub responded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilityEntry {
    /// Storage key for a (profile, date) pair.
    pub fn document_id(profile_id: &str, date: NaiveDate) -> String {
        format!("{}_{}", urlencoding::encode(profile_id), date.format("%Y-%m-%d"))
    }
}

/// A write request for one date. The store turns it into an entry.
#[derive(Debug, Clone)]
pub struct AvailabilityUpdate {
    pub profile_id: String,
    pub date: NaiveDate,
    pub status: AvailabilityStatus,
    pub equipment: EquipmentFlags,
    pub notes: String,
    pub response_token: Option<String>,
}

impl AvailabilityUpdate {
    /// Apply this write on top of the existing entry, if any.
    ///
    /// Every field is replaced except `response_token`, which survives a
    /// write that does not carry one.
    pub fn apply(
        self,
        existing: Option<&AvailabilityEntry>,
        now: DateTime<Utc>,
    ) -> AvailabilityEntry {
        let response_token = self
            .response_token
            .or_else(|| existing.and_then(|e| e.response_token.clone()));

        AvailabilityEntry {
            profile_id: self.profile_id,
            date: self.date,
            status: self.status,
            equipment: self.equipment,
            notes: self.notes,
            response_token,
            responded_at: now,
            updated_at: now,
        }
    }
}
