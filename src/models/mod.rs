// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod availability;
pub mod onboarding;
pub mod profile;
pub mod transition;

pub use availability::{AvailabilityEntry, AvailabilityStatus, AvailabilityUpdate, EquipmentFlags};
pub use onboarding::ProfilePatch;
pub use profile::{ApprovalStatus, DriverProfile, LifecycleState, VerificationStatus, FINAL_STEP};
pub use transition::{TransitionEvent, TransitionRecord};
