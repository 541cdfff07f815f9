// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Driver onboarding backend.
//!
//! Drivers sign up, move through a five-step onboarding flow, are reviewed by
//! an admin, verify their identity with an external provider and are then
//! pushed to the fleet platform. Verified drivers keep a per-day availability
//! calendar that dispatch reads through an API-key protected endpoint.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod phone;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use middleware::AdminPolicy;
use services::{
    AvailabilityService, DriverService, FleetClient, FleetSyncService, OidcVerifier,
    PlacesClient, ResponseTokenGateway, SyncDispatcher, SyncRunner, VerificationClient,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub drivers: DriverService,
    pub availability: AvailabilityService,
    pub verification: VerificationClient,
    pub gateway: ResponseTokenGateway,
    pub oidc: OidcVerifier,
    pub admin_policy: AdminPolicy,
    pub sync_runner: Arc<SyncRunner>,
}

impl AppState {
    /// Wire services around a store and a sync dispatcher.
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        sync_runner: Arc<SyncRunner>,
        dispatcher: Arc<dyn SyncDispatcher>,
    ) -> anyhow::Result<Self> {
        let oidc = OidcVerifier::new(&config)?;
        let admin_policy = AdminPolicy::from_config(&config);

        Ok(Self {
            drivers: DriverService::new(store.clone(), dispatcher),
            availability: AvailabilityService::new(store.clone()),
            verification: VerificationClient::new(
                &config.verification_api_url,
                &config.verification_api_key,
                &config.verification_return_url,
            )?,
            gateway: ResponseTokenGateway::new(
                &config.availability_requests_url,
                config.availability_requests_api_key.clone(),
            )?,
            oidc,
            admin_policy,
            sync_runner,
            store,
            config,
        })
    }
}

/// Build the fleet sync job runner from configuration.
pub fn build_sync_runner(
    config: &Config,
    store: Arc<dyn Store>,
) -> anyhow::Result<Arc<SyncRunner>> {
    let fleet = FleetSyncService::new(
        FleetClient::new(&config.fleet_api_url, &config.fleet_api_key)?,
        PlacesClient::new(&config.places_api_url, config.places_api_key.clone())?,
        config.fleet_team_id.clone(),
        &config.fleet_name_suffix,
    );
    Ok(Arc::new(SyncRunner::new(store, fleet)))
}
