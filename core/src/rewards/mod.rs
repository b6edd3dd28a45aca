//! Periodic in-scene rewards
//!
//! Each configured reward fires every `interval_secs` while a scene runs,
//! counted from scene start. Payloads become host tasks; the engine never
//! grants items or attributes itself.

use std::time::{Duration, Instant};

use ember_types::{RewardConfig, RewardKind, RewardTarget};

use crate::context::IdentifierCache;
use crate::host::HostTask;
use crate::state::ActorSnapshot;

#[derive(Debug, Clone)]
struct RewardSlot {
    config: RewardConfig,
    interval: Duration,
    active: bool,
    last_fired: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
pub struct RewardScheduler {
    slots: Vec<RewardSlot>,
}

impl RewardScheduler {
    pub fn new(rewards: &[RewardConfig]) -> Self {
        let slots = rewards
            .iter()
            .filter(|r| r.enabled && r.interval_secs > 0)
            .map(|r| RewardSlot {
                config: r.clone(),
                interval: Duration::from_secs(r.interval_secs),
                active: false,
                last_fired: None,
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }

    pub fn activate_all(&mut self, now: Instant) {
        for slot in &mut self.slots {
            slot.active = true;
            slot.last_fired = Some(now);
        }
    }

    pub fn deactivate_all(&mut self) {
        for slot in &mut self.slots {
            slot.active = false;
            slot.last_fired = None;
        }
    }

    /// Host tasks for every active reward whose interval has elapsed.
    pub fn due(
        &mut self,
        now: Instant,
        roster: &[ActorSnapshot],
        ids: &IdentifierCache,
    ) -> Vec<HostTask> {
        let mut tasks = Vec::new();
        for slot in &mut self.slots {
            if !slot.active {
                continue;
            }
            let elapsed = slot
                .last_fired
                .map_or(Duration::MAX, |last| now.saturating_duration_since(last));
            if elapsed < slot.interval {
                continue;
            }
            slot.last_fired = Some(now);

            let targets: Vec<&ActorSnapshot> = match slot.config.target {
                RewardTarget::Player => roster.iter().filter(|a| a.is_player).collect(),
                RewardTarget::Scene => roster.iter().collect(),
            };
            let before = tasks.len();
            match &slot.config.kind {
                RewardKind::Item { count, .. } => {
                    let Some(item) = ids.reward_item(&slot.config.name) else {
                        tracing::debug!(reward = %slot.config.name, "Reward item unresolved, skipped");
                        continue;
                    };
                    tasks.extend(targets.iter().map(|a| HostTask::AddItem {
                        target: a.id,
                        item,
                        count: *count,
                    }));
                }
                RewardKind::Attribute { attribute, amount } => {
                    tasks.extend(targets.iter().map(|a| HostTask::RestoreAttribute {
                        target: a.id,
                        attribute: attribute.clone(),
                        amount: *amount,
                    }));
                }
            }
            tracing::debug!(
                reward = %slot.config.name,
                targets = tasks.len() - before,
                "Reward fired"
            );
        }
        tasks
    }
}
