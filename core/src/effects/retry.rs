//! Bounded retries for actors that were not ready at grant time.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::active::{Binding, EffectKey};
use crate::host::{ActorId, FormHandle};
use crate::tags::TagSet;

#[derive(Debug, Clone)]
pub struct PendingRetry {
    pub key: EffectKey,
    pub actor_name: String,
    pub effect: FormHandle,
    pub binding: Binding,
    pub animation: Option<String>,
    pub tags: TagSet,
    /// Readiness checks left before the request is dropped
    pub remaining: u32,
    pub next_at: Instant,
}

#[derive(Debug)]
pub struct RetryQueue {
    pending: HashMap<EffectKey, PendingRetry>,
    budget: u32,
    backoff: Duration,
}

impl RetryQueue {
    pub fn new(budget: u32, backoff: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            budget,
            backoff,
        }
    }

    /// Queue a request with a fresh budget. Returns false if the key is
    /// already pending.
    pub fn enqueue(
        &mut self,
        key: EffectKey,
        actor_name: &str,
        effect: FormHandle,
        binding: Binding,
        animation: Option<String>,
        tags: TagSet,
        now: Instant,
    ) -> bool {
        if self.pending.contains_key(&key) || self.budget == 0 {
            return false;
        }
        self.pending.insert(
            key,
            PendingRetry {
                key,
                actor_name: actor_name.to_string(),
                effect,
                binding,
                animation,
                tags,
                remaining: self.budget,
                next_at: now + self.backoff,
            },
        );
        true
    }

    pub fn contains(&self, key: &EffectKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Pending keys queued for a tag-bound grant, sorted.
    pub fn tag_bound_keys(&self) -> Vec<EffectKey> {
        let mut keys: Vec<EffectKey> = self
            .pending
            .values()
            .filter(|r| r.binding == Binding::TagBound)
            .map(|r| r.key)
            .collect();
        keys.sort();
        keys
    }

    /// Remove and return every retry whose time has come.
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingRetry> {
        let due: Vec<EffectKey> = self
            .pending
            .values()
            .filter(|r| r.next_at <= now)
            .map(|r| r.key)
            .collect();
        let mut taken: Vec<PendingRetry> = due
            .iter()
            .filter_map(|key| self.pending.remove(key))
            .collect();
        taken.sort_by_key(|r| (r.next_at, r.key));
        taken
    }

    /// Record one failed check. Returns false when the budget is spent and the
    /// request has been dropped.
    pub fn reschedule(&mut self, mut retry: PendingRetry, now: Instant) -> bool {
        retry.remaining = retry.remaining.saturating_sub(1);
        if retry.remaining == 0 {
            return false;
        }
        retry.next_at = now + self.backoff;
        self.pending.insert(retry.key, retry);
        true
    }

    pub fn remove(&mut self, key: &EffectKey) -> Option<PendingRetry> {
        self.pending.remove(key)
    }

    pub fn remove_actor(&mut self, actor: ActorId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|key, _| key.actor != actor);
        before - self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
