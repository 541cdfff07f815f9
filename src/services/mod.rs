// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod availability;
pub mod driver;
pub mod fleet;
pub mod gateway;
pub mod lifecycle;
pub mod oidc;
pub mod places;
pub mod sync;
pub mod tasks;
pub mod verification;

pub use availability::AvailabilityService;
pub use driver::{DriverService, ProfileRef};
pub use fleet::{FleetClient, FleetSyncService, SyncResult};
pub use gateway::ResponseTokenGateway;
pub use oidc::{AuthUser, OidcError, OidcVerifier, VerifiedTaskPrincipal};
pub use places::PlacesClient;
pub use sync::{InlineDispatcher, SyncDispatcher, SyncDriverPayload, SyncRunner};
pub use tasks::CloudTasksDispatcher;
pub use verification::VerificationClient;
