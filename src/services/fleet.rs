// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fleet platform client and the driver sync adapter.
//!
//! Handles:
//! - Worker lookup by E.164 phone number
//! - Worker creation with team, vehicle and routing address
//! - Worker updates, by stored id or after a phone match

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::DriverProfile;
use crate::phone;
use crate::services::places::{Coordinates, PlacesClient};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("worker not found")]
    NotFound,
    #[error("fleet request failed: {0}")]
    Transport(String),
    #[error("fleet returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("fleet response invalid: {0}")]
    Decode(String),
}

/// Worker as returned by the fleet platform.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetWorker {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

/// Create/update body. Fields left `None` are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerPayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teams: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<WorkerVehicle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<WorkerAddresses>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerVehicle {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerAddresses {
    pub routing: RoutingAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingAddress {
    pub address: UnparsedAddress,
    /// `[longitude, latitude]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnparsedAddress {
    pub unparsed: String,
}

/// Fleet platform REST client. The API key is sent as the basic-auth user.
#[derive(Clone)]
pub struct FleetClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FleetClient {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building fleet HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// First worker registered under `phone_e164`, if any.
    pub async fn find_worker_by_phone(
        &self,
        phone_e164: &str,
    ) -> Result<Option<FleetWorker>, FleetError> {
        let response = self
            .http
            .get(format!("{}/workers", self.base_url))
            .basic_auth(&self.api_key, None::<&str>)
            .query(&[("phones", phone_e164)])
            .send()
            .await
            .map_err(|e| FleetError::Transport(e.to_string()))?;

        let workers: Vec<FleetWorker> = check_response_json(response).await?;
        Ok(workers.into_iter().next())
    }

    pub async fn create_worker(&self, payload: &WorkerPayload) -> Result<FleetWorker, FleetError> {
        let response = self
            .http
            .post(format!("{}/workers", self.base_url))
            .basic_auth(&self.api_key, None::<&str>)
            .json(payload)
            .send()
            .await
            .map_err(|e| FleetError::Transport(e.to_string()))?;

        check_response_json(response).await
    }

    pub async fn update_worker(
        &self,
        worker_id: &str,
        payload: &WorkerPayload,
    ) -> Result<FleetWorker, FleetError> {
        let response = self
            .http
            .put(format!(
                "{}/workers/{}",
                self.base_url,
                urlencoding::encode(worker_id)
            ))
            .basic_auth(&self.api_key, None::<&str>)
            .json(payload)
            .send()
            .await
            .map_err(|e| FleetError::Transport(e.to_string()))?;

        check_response_json(response).await
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, FleetError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(FleetError::NotFound);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FleetError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| FleetError::Decode(e.to_string()))
}

/// Result of syncing one driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub external_id: Option<String>,
    /// The worker already existed on the platform and was updated.
    pub is_existing: bool,
    pub error: Option<String>,
}

impl SyncResult {
    fn synced(worker_id: String, is_existing: bool) -> Self {
        Self {
            success: true,
            external_id: Some(worker_id),
            is_existing,
            error: None,
        }
    }

    fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// Find-or-create adapter from a driver profile to a fleet worker.
pub struct FleetSyncService {
    client: FleetClient,
    places: PlacesClient,
    team_id: Option<String>,
    name_suffix: String,
}

impl FleetSyncService {
    pub fn new(
        client: FleetClient,
        places: PlacesClient,
        team_id: Option<String>,
        name_suffix: &str,
    ) -> Self {
        Self {
            client,
            places,
            team_id,
            name_suffix: name_suffix.trim().to_string(),
        }
    }

    /// Create or update the worker for `profile`. Never panics or errors;
    /// failures come back as `success = false`.
    pub async fn sync_driver(&self, profile: &DriverProfile) -> SyncResult {
        let Some(raw_phone) = profile.phone.as_deref().filter(|p| !p.trim().is_empty()) else {
            return SyncResult::failed("Driver has no phone number");
        };
        let Some(phone_e164) = phone::to_e164(raw_phone) else {
            return SyncResult::failed("Driver phone number cannot be normalized");
        };

        let location = self.geocode(profile).await;
        let update = self.update_payload(profile, location);

        if let Some(worker_id) = profile.external_worker_id.as_deref() {
            match self.client.update_worker(worker_id, &update).await {
                Ok(worker) => return SyncResult::synced(worker.id, true),
                Err(FleetError::NotFound) => {
                    tracing::warn!(
                        profile_id = %profile.id,
                        worker_id,
                        "Linked fleet worker no longer exists, falling back to phone lookup"
                    );
                }
                Err(e) => return SyncResult::failed(e),
            }
        }

        let existing = match self.client.find_worker_by_phone(&phone_e164).await {
            Ok(existing) => existing,
            Err(e) => return SyncResult::failed(e),
        };

        match existing {
            Some(worker) => {
                tracing::debug!(
                    profile_id = %profile.id,
                    worker_id = %worker.id,
                    "Matched fleet worker by phone"
                );
                match self.client.update_worker(&worker.id, &update).await {
                    Ok(updated) => SyncResult::synced(updated.id, true),
                    Err(e) => SyncResult::failed(e),
                }
            }
            None => {
                let create = WorkerPayload {
                    phone: Some(phone_e164),
                    teams: self.team_id.clone().map(|t| vec![t]),
                    ..update
                };
                match self.client.create_worker(&create).await {
                    Ok(created) => SyncResult::synced(created.id, false),
                    Err(e) => SyncResult::failed(e),
                }
            }
        }
    }

    /// Geocode failures are soft: the worker is still synced without
    /// coordinates.
    async fn geocode(&self, profile: &DriverProfile) -> Option<Coordinates> {
        let place_id = profile.place_id.as_deref()?;
        if !self.places.is_enabled() || !profile.has_complete_address() {
            return None;
        }

        match self.places.geocode(place_id).await {
            Ok(coords) => Some(coords),
            Err(e) => {
                tracing::warn!(
                    profile_id = %profile.id,
                    error = %e,
                    "Geocoding failed, syncing without coordinates"
                );
                None
            }
        }
    }

    /// `{first} {last} {suffix}`
    pub fn display_name(&self, profile: &DriverProfile) -> String {
        let name = profile.full_name();
        if self.name_suffix.is_empty() {
            name
        } else {
            format!("{} {}", name, self.name_suffix).trim().to_string()
        }
    }

    fn update_payload(
        &self,
        profile: &DriverProfile,
        location: Option<Coordinates>,
    ) -> WorkerPayload {
        WorkerPayload {
            name: self.display_name(profile),
            vehicle: vehicle(profile),
            addresses: routing_address(profile, location),
            ..Default::default()
        }
    }
}

fn vehicle(profile: &DriverProfile) -> Option<WorkerVehicle> {
    let description = [
        profile.vehicle_year.as_deref(),
        profile.vehicle_make.as_deref(),
        profile.vehicle_model.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    if description.is_empty() && profile.license_plate.is_none() {
        return None;
    }

    Some(WorkerVehicle {
        kind: "CAR".to_string(),
        description: (!description.is_empty()).then_some(description),
        license_plate: profile.license_plate.clone(),
        color: profile.vehicle_color.clone(),
    })
}

/// Only complete addresses are sent for routing.
fn routing_address(
    profile: &DriverProfile,
    location: Option<Coordinates>,
) -> Option<WorkerAddresses> {
    if !profile.has_complete_address() {
        return None;
    }

    let line1 = profile.address_line1.as_deref().unwrap_or_default();
    let street = match profile.address_line2.as_deref() {
        Some(line2) => format!("{line1}, {line2}"),
        None => line1.to_string(),
    };
    let unparsed = format!(
        "{}, {}, {} {}, Canada",
        street,
        profile.city.as_deref().unwrap_or_default(),
        profile.province.as_deref().unwrap_or_default(),
        profile.postal_code.as_deref().unwrap_or_default(),
    );

    Some(WorkerAddresses {
        routing: RoutingAddress {
            address: UnparsedAddress { unparsed },
            location: location.map(|c| [c.lng, c.lat]),
        },
    })
}
