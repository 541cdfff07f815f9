// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fleet sync outbox.
//!
//! Qualifying lifecycle transitions hand a [`SyncDriverPayload`] to a
//! [`SyncDispatcher`]. In production that is a Cloud Tasks queue whose
//! callback runs [`SyncRunner::run`]; locally the job is spawned in-process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::services::driver::{commit_transition, ProfileRef};
use crate::services::fleet::FleetSyncService;
use crate::services::lifecycle;

/// Body of a `sync-driver` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDriverPayload {
    pub profile_id: String,
    pub source: String, // "verification" or "reconcile"
}

/// Enqueues fleet sync jobs.
#[async_trait]
pub trait SyncDispatcher: Send + Sync {
    async fn dispatch(&self, payload: SyncDriverPayload) -> Result<()>;
}

/// What a sync job did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum SyncJobOutcome {
    Synced { worker_id: String, is_existing: bool },
    Skipped { reason: String },
    Failed { error: String },
}

/// Runs one sync job against the fleet platform and records the result.
pub struct SyncRunner {
    store: Arc<dyn Store>,
    fleet: FleetSyncService,
}

impl SyncRunner {
    pub fn new(store: Arc<dyn Store>, fleet: FleetSyncService) -> Self {
        Self { store, fleet }
    }

    pub async fn run(&self, payload: &SyncDriverPayload) -> Result<SyncJobOutcome> {
        let profile_id = payload.profile_id.as_str();

        let Some(profile) = self.store.get_profile(profile_id).await? else {
            tracing::warn!(profile_id, "Sync job for unknown profile, dropping");
            return Ok(skipped("profile not found"));
        };

        // Eligibility is re-checked here; the job may be stale.
        if profile.external_worker_id.is_some() {
            return Ok(skipped("already synced"));
        }
        if !profile.needs_fleet_sync() {
            return Ok(skipped("not eligible"));
        }

        let result = self.fleet.sync_driver(&profile).await;

        match (result.success, result.external_id) {
            (true, Some(worker_id)) => {
                let (stored, _) = commit_transition(
                    self.store.as_ref(),
                    ProfileRef::Id(profile_id),
                    "system:fleet-sync",
                    |p, now| {
                        if p.external_worker_id.as_deref() == Some(worker_id.as_str()) {
                            return Ok(None);
                        }
                        lifecycle::mark_synced(p, &worker_id, now).map(Some)
                    },
                )
                .await?;

                tracing::info!(
                    profile_id,
                    worker_id = stored.external_worker_id.as_deref().unwrap_or_default(),
                    is_existing = result.is_existing,
                    source = %payload.source,
                    "Driver synced to fleet platform"
                );

                Ok(SyncJobOutcome::Synced {
                    worker_id,
                    is_existing: result.is_existing,
                })
            }
            _ => {
                let error = result
                    .error
                    .unwrap_or_else(|| "fleet sync returned no worker id".to_string());

                tracing::warn!(profile_id, error = %error, "Fleet sync failed");

                let recorded = commit_transition(
                    self.store.as_ref(),
                    ProfileRef::Id(profile_id),
                    "system:fleet-sync",
                    |p, now| {
                        lifecycle::mark_sync_failed(p, &error, now);
                        Ok(Some(lifecycle::Outcome::default()))
                    },
                )
                .await;
                if let Err(e) = recorded {
                    tracing::error!(profile_id, error = %e, "Failed to record sync failure");
                }

                Ok(SyncJobOutcome::Failed { error })
            }
        }
    }
}

fn skipped(reason: &str) -> SyncJobOutcome {
    SyncJobOutcome::Skipped {
        reason: reason.to_string(),
    }
}

/// Runs jobs on the local runtime without a queue. Failed jobs are left for
/// the reconciliation job.
pub struct InlineDispatcher {
    runner: Arc<SyncRunner>,
}

impl InlineDispatcher {
    pub fn new(runner: Arc<SyncRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl SyncDispatcher for InlineDispatcher {
    async fn dispatch(&self, payload: SyncDriverPayload) -> Result<()> {
        let runner = self.runner.clone();
        tokio::spawn(async move {
            match runner.run(&payload).await {
                Ok(SyncJobOutcome::Failed { error }) => {
                    tracing::warn!(
                        profile_id = %payload.profile_id,
                        error = %error,
                        "Inline sync failed"
                    );
                }
                Ok(outcome) => {
                    tracing::debug!(
                        profile_id = %payload.profile_id,
                        ?outcome,
                        "Inline sync finished"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        profile_id = %payload.profile_id,
                        error = %e,
                        "Inline sync errored"
                    );
                }
            }
        });
        Ok(())
    }
}

/// Map a job outcome onto the task response. Failures must be non-2xx so the
/// queue retries them.
pub fn outcome_status(outcome: &SyncJobOutcome) -> std::result::Result<(), AppError> {
    match outcome {
        SyncJobOutcome::Failed { error } => Err(AppError::upstream("fleet", error)),
        _ => Ok(()),
    }
}
