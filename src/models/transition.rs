//! Lifecycle audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::LifecycleState;

/// What caused a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEvent {
    Created,
    StepAdvanced,
    OnboardingCompleted,
    Approved,
    Rejected,
    VerificationStarted,
    VerificationUpdated,
    FleetSynced,
}

/// One committed transition, stored in `profile_transitions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub id: String,
    pub profile_id: String,
    pub event: TransitionEvent,
    pub from: LifecycleState,
    pub to: LifecycleState,
    /// Account subject, admin identity, or `system:<source>`.
    pub actor: String,
    #[serde(default)]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl TransitionRecord {
    pub fn new(
        profile_id: &str,
        event: TransitionEvent,
        from: LifecycleState,
        to: LifecycleState,
        actor: &str,
        detail: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            profile_id: profile_id.to_string(),
            event,
            from,
            to,
            actor: actor.to_string(),
            detail,
            at,
        }
    }
}
