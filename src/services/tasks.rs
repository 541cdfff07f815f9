// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud Tasks dispatcher for fleet sync jobs.
//!
//! Each job becomes an HTTP task against `/tasks/sync-driver`, signed with an
//! OIDC token for the API's service account. The queue owns retries and rate
//! limiting.
//!
//! Uses the official google-cloud-tasks-v2 SDK.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::SYNC_QUEUE_NAME;
use crate::error::AppError;
use crate::error::Result;
use crate::services::oidc::task_service_account;
use crate::services::sync::{SyncDispatcher, SyncDriverPayload};

/// Path of the sync job callback.
pub const SYNC_DRIVER_ENDPOINT: &str = "/tasks/sync-driver";

/// Cloud Tasks client wrapper.
pub struct CloudTasksDispatcher {
    project_id: String,
    location: String,
    queue_name: String,
    service_url: String,
}

impl CloudTasksDispatcher {
    pub fn new(project_id: &str, region: &str, service_url: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            location: region.to_string(),
            queue_name: SYNC_QUEUE_NAME.to_string(),
            service_url: service_url.trim_end_matches('/').to_string(),
        }
    }

    fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        )
    }

    /// Generic task queuing helper.
    async fn queue_task<T: Serialize>(&self, endpoint: &str, payload: &T) -> Result<()> {
        use google_cloud_tasks_v2::client::CloudTasks;
        use google_cloud_tasks_v2::model::{HttpRequest, OidcToken, Task};

        let client = CloudTasks::builder()
            .build()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks client error: {}", e)))?;

        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let http_request = HttpRequest::default()
            .set_url(format!("{}{}", self.service_url, endpoint))
            .set_http_method("POST")
            .set_body(axum::body::Bytes::from(body))
            .set_headers(std::collections::HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]))
            .set_oidc_token(
                OidcToken::default()
                    .set_service_account_email(task_service_account(&self.project_id))
                    .set_audience(self.service_url.clone()),
            );

        let task = Task::default().set_http_request(http_request);

        client
            .create_task()
            .set_parent(self.queue_path())
            .set_task(task)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Cloud Tasks create error: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl SyncDispatcher for CloudTasksDispatcher {
    async fn dispatch(&self, payload: SyncDriverPayload) -> Result<()> {
        tracing::info!(
            profile_id = %payload.profile_id,
            source = %payload.source,
            "Queuing fleet sync task"
        );
        self.queue_task(SYNC_DRIVER_ENDPOINT, &payload).await
    }
}
