//! Effect lifecycle management
//!
//! This module provides:
//! - **Systems**: the parallel effect categories and their config lookup
//! - **Policy**: pure activate/maintain/deactivate/skip decisions
//! - **Tracker**: the active-effect registry, retries, expiry
//! - **Action log + cleanup**: crash-tolerant recovery of effects the
//!   registry no longer knows about
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │          Scene view (roster, animation tags, climax)          │
//! └───────────────────────────────────────────────────────────────┘
//!                              │
//!                       PolicyEvaluator
//!                              │  Decision::Activate / Deactivate
//!                              ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │      EffectTracker: at most one ActiveEffect per EffectKey     │
//! └───────────────────────────────────────────────────────────────┘
//!                              │  HostTask::ApplyEffect
//!                              ▼
//!                  host thread ──► ActionLog line
//!                                       │
//!                     replay_action_log ◄┘  (scene end, shutdown)
//! ```

pub mod action_log;
mod active;
pub mod cleanup;
pub mod policy;
pub mod retry;
mod system;
pub mod tracker;

#[cfg(test)]
mod tracker_tests;

pub use action_log::{ActionLog, ActionLogError, ActionRecord, EffectState};
pub use active::{ActiveEffect, Binding, EffectKey};
pub use cleanup::{CleanupReport, replay_action_log, scan_group_membership};
pub use policy::{Decision, PolicyEvaluator, gender_allowed, tags_match};
pub use retry::{PendingRetry, RetryQueue};
pub use system::EffectSystem;
pub use tracker::{EffectTracker, GrantOutcome, GrantRequest, RetryReport};
