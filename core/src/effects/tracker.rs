//! Effect lifecycle tracking
//!
//! Holds the registry of active effects and the retry queue. Every grant
//! goes through the same sequence:
//!
//! ```text
//! guard (already active / pending?) ──► resolve form ──► actor ready?
//!                                         │ no              │ no        │ yes
//!                                         ▼                 ▼           ▼
//!                                     log, abort       PendingRetry   ApplyEffect + register
//! ```
//!
//! Host mutation is never performed here; activations and deactivations are
//! queued as [`HostTask`]s.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ember_types::RetryConfig;

use super::active::{ActiveEffect, Binding, EffectKey};
use super::retry::RetryQueue;
use crate::context::IdentifierCache;
use crate::host::{ActorId, EffectRecord, FormHandle, HostTask, HostTaskQueue, WorldQuery};
use crate::tags::TagSet;

#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub key: EffectKey,
    pub actor_name: String,
    pub binding: Binding,
    pub animation: Option<String>,
    pub tags: TagSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Applied,
    /// Rejected by the at-most-one guard
    AlreadyActive,
    /// Actor not ready; queued for retry (or already queued)
    RetryPending,
    Unresolved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub applied: usize,
    pub rescheduled: usize,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct EffectTracker {
    active: HashMap<EffectKey, ActiveEffect>,
    retries: RetryQueue,
    /// Last admitted occurrence per actor, for duplicate suppression
    last_occurrence: HashMap<ActorId, Instant>,
    occurrence_window: Duration,
}

impl EffectTracker {
    pub fn new(retry: &RetryConfig, occurrence_window: Duration) -> Self {
        Self {
            active: HashMap::new(),
            retries: RetryQueue::new(retry.max_attempts, Duration::from_millis(retry.backoff_ms)),
            last_occurrence: HashMap::new(),
            occurrence_window,
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn is_active(&self, key: &EffectKey) -> bool {
        self.active.contains_key(key)
    }

    pub fn get(&self, key: &EffectKey) -> Option<&ActiveEffect> {
        self.active.get(key)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    pub fn is_retry_pending(&self, key: &EffectKey) -> bool {
        self.retries.contains(key)
    }

    /// Registered keys in a stable order.
    pub fn active_keys(&self) -> Vec<EffectKey> {
        let mut keys: Vec<EffectKey> = self.active.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn tag_bound_keys(&self) -> Vec<EffectKey> {
        let mut keys: Vec<EffectKey> = self
            .active
            .values()
            .filter(|e| e.tag_bound)
            .map(|e| e.key)
            .collect();
        keys.sort();
        keys
    }

    /// Keys waiting on a tag-bound retry.
    pub fn pending_tag_bound_keys(&self) -> Vec<EffectKey> {
        self.retries.tag_bound_keys()
    }

    pub fn snapshot(&self) -> Vec<ActiveEffect> {
        let mut effects: Vec<ActiveEffect> = self.active.values().cloned().collect();
        effects.sort_by_key(|e| e.key);
        effects
    }

    // ─── Grants ──────────────────────────────────────────────────────────────

    pub fn grant(
        &mut self,
        request: GrantRequest,
        ids: &mut IdentifierCache,
        world: &dyn WorldQuery,
        queue: &HostTaskQueue,
        now: Instant,
    ) -> GrantOutcome {
        let key = request.key;
        if self.active.contains_key(&key) {
            tracing::debug!(key = %key, "Grant rejected, effect already active");
            return GrantOutcome::AlreadyActive;
        }
        if self.retries.contains(&key) {
            return GrantOutcome::RetryPending;
        }

        ids.ensure_resolved(world);
        let Some(effect) = ids.effect(key.system, key.direction) else {
            tracing::debug!(key = %key, "Grant skipped, effect form unresolved");
            return GrantOutcome::Unresolved;
        };

        let readiness = world.readiness(key.actor);
        if !readiness.is_ready() {
            tracing::debug!(
                key = %key,
                loaded = readiness.loaded,
                enabled = readiness.enabled,
                has_target = readiness.has_target,
                "Actor not ready, queueing retry"
            );
            self.retries.enqueue(
                key,
                &request.actor_name,
                effect,
                request.binding,
                request.animation,
                request.tags,
                now,
            );
            return GrantOutcome::RetryPending;
        }

        self.register(
            ActiveEffect::new(
                key,
                request.actor_name,
                effect,
                request.binding,
                request.animation,
                request.tags,
                now,
            ),
            queue,
        );
        GrantOutcome::Applied
    }

    fn register(&mut self, effect: ActiveEffect, queue: &HostTaskQueue) {
        queue.push(apply_task(effect.key, &effect.actor_name, effect.effect, true));
        tracing::info!(
            key = %effect.key,
            actor = %effect.actor_name,
            tag_bound = effect.tag_bound,
            duration_secs = effect.duration.as_secs_f32(),
            "Effect activated"
        );
        self.active.insert(effect.key, effect);
    }

    // ─── Deactivation ────────────────────────────────────────────────────────

    /// Deactivate one key. A key with no registration is a no-op.
    pub fn deactivate(&mut self, key: &EffectKey, queue: &HostTaskQueue) -> Option<ActiveEffect> {
        self.retries.remove(key);
        let effect = self.active.remove(key)?;
        queue.push(apply_task(effect.key, &effect.actor_name, effect.effect, false));
        tracing::info!(key = %effect.key, actor = %effect.actor_name, "Effect deactivated");
        Some(effect)
    }

    /// Drop a queued retry without touching the host. Returns whether one
    /// was pending.
    pub fn cancel_retry(&mut self, key: &EffectKey) -> bool {
        let cancelled = self.retries.remove(key).is_some();
        if cancelled {
            tracing::debug!(key = %key, "Pending grant cancelled");
        }
        cancelled
    }

    pub fn clear_effect(&mut self, key: &EffectKey, queue: &HostTaskQueue) -> bool {
        if let Some(effect) = self.active.get_mut(key) {
            effect.manually_cleared = true;
        }
        self.deactivate(key, queue).is_some()
    }

    /// Deactivate every key belonging to `actor`. Returns how many were live.
    pub fn clear_actor(&mut self, actor: ActorId, queue: &HostTaskQueue) -> usize {
        self.retries.remove_actor(actor);
        let keys: Vec<EffectKey> = self
            .active_keys()
            .into_iter()
            .filter(|k| k.actor == actor)
            .collect();
        keys.iter()
            .filter(|key| self.clear_effect(key, queue))
            .count()
    }

    pub fn deactivate_all(&mut self, queue: &HostTaskQueue) -> Vec<ActiveEffect> {
        self.retries.clear();
        self.active_keys()
            .iter()
            .filter_map(|key| self.deactivate(key, queue))
            .collect()
    }

    // ─── Periodic work ───────────────────────────────────────────────────────

    pub fn process_retries(
        &mut self,
        world: &dyn WorldQuery,
        queue: &HostTaskQueue,
        now: Instant,
    ) -> RetryReport {
        let mut report = RetryReport::default();
        for retry in self.retries.take_due(now) {
            if self.active.contains_key(&retry.key) {
                continue;
            }
            if world.readiness(retry.key.actor).is_ready() {
                self.register(
                    ActiveEffect::new(
                        retry.key,
                        retry.actor_name,
                        retry.effect,
                        retry.binding,
                        retry.animation,
                        retry.tags,
                        now,
                    ),
                    queue,
                );
                report.applied += 1;
                continue;
            }

            let key = retry.key;
            if self.retries.reschedule(retry, now) {
                report.rescheduled += 1;
            } else {
                tracing::warn!(key = %key, "Actor never became ready, grant dropped");
                report.dropped += 1;
            }
        }
        report
    }

    /// Deactivate timed effects whose duration has elapsed.
    pub fn process_expiry(&mut self, queue: &HostTaskQueue, now: Instant) -> Vec<EffectKey> {
        let mut expired: Vec<EffectKey> = self
            .active
            .values_mut()
            .filter(|e| e.is_expired(now))
            .map(|e| {
                e.expired = true;
                e.key
            })
            .collect();
        expired.sort();
        for key in &expired {
            self.deactivate(key, queue);
        }
        expired
    }

    /// Duplicate-suppression window. Returns false if `actor` already had an
    /// occurrence admitted within the window.
    pub fn admit_occurrence(&mut self, actor: ActorId, now: Instant) -> bool {
        if let Some(last) = self.last_occurrence.get(&actor)
            && now.saturating_duration_since(*last) < self.occurrence_window
        {
            tracing::debug!(actor = %actor, "Duplicate occurrence suppressed");
            return false;
        }
        self.last_occurrence.insert(actor, now);
        true
    }

    // ─── Session ─────────────────────────────────────────────────────────────

    /// Drop retries and duplicate windows. Registered effects are left for the
    /// delayed cleanup.
    pub fn clear_session(&mut self) {
        self.retries.clear();
        self.last_occurrence.clear();
    }

    /// Forget everything without touching the host.
    pub fn reset(&mut self) {
        self.active.clear();
        self.clear_session();
    }
}

pub(crate) fn apply_task(
    key: EffectKey,
    actor_name: &str,
    effect: FormHandle,
    active: bool,
) -> HostTask {
    HostTask::ApplyEffect {
        target: key.actor,
        effect,
        active,
        record: Some(EffectRecord {
            system: key.system.as_str().to_string(),
            actor_name: actor_name.to_string(),
            actor: key.actor,
            direction: key.direction,
        }),
    }
}
