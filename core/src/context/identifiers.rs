//! Session-scoped form resolution
//!
//! Configuration names forms symbolically (plugin + local id, or plugin +
//! editor name). Resolution happens once per session, lazily, and is thrown
//! away on every lifecycle event. A system whose forms fail to resolve is
//! disabled for the rest of the session.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ember_types::{EffectDirection, EngineConfig, FormRef, RewardKind};

use crate::effects::EffectSystem;
use crate::host::{FormHandle, WorldQuery};

/// System name the counter effect is recorded under.
pub const COUNTER_SYSTEM: &str = "counter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SystemHandles {
    outgoing: FormHandle,
    incoming: FormHandle,
    group: Option<FormHandle>,
}

#[derive(Debug, Clone)]
pub struct IdentifierCache {
    config: Arc<EngineConfig>,
    resolved: bool,
    systems: HashMap<EffectSystem, SystemHandles>,
    disabled: HashSet<EffectSystem>,
    counter_effect: Option<FormHandle>,
    reward_items: HashMap<String, FormHandle>,
}

impl IdentifierCache {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            resolved: false,
            systems: HashMap::new(),
            disabled: HashSet::new(),
            counter_effect: None,
            reward_items: HashMap::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Resolve every configured form unless already done this session.
    pub fn ensure_resolved(&mut self, world: &dyn WorldQuery) {
        if self.resolved {
            return;
        }
        self.systems.clear();
        self.disabled.clear();
        self.reward_items.clear();

        let config = Arc::clone(&self.config);
        for system in EffectSystem::ALL {
            let sys = system.config(&config.systems);
            if !sys.enabled {
                self.disabled.insert(system);
                continue;
            }
            let outgoing = resolve(world, &sys.outgoing_effect);
            let incoming = resolve(world, &sys.incoming_effect);
            let (Some(outgoing), Some(incoming)) = (outgoing, incoming) else {
                tracing::warn!(
                    system = %system,
                    outgoing = ?sys.outgoing_effect,
                    incoming = ?sys.incoming_effect,
                    "Effect forms did not resolve, system disabled for this session"
                );
                self.disabled.insert(system);
                continue;
            };
            let group = world.resolve_named(&sys.group.plugin, &sys.group.name);
            if group.is_none() {
                tracing::debug!(system = %system, group = %sys.group.name, "Group did not resolve");
            }
            self.systems.insert(
                system,
                SystemHandles {
                    outgoing,
                    incoming,
                    group,
                },
            );
        }

        self.counter_effect = if config.counter.enabled {
            let handle = resolve(world, &config.counter.effect);
            if handle.is_none() {
                tracing::warn!(effect = ?config.counter.effect, "Counter effect did not resolve");
            }
            handle
        } else {
            None
        };

        for reward in &config.rewards {
            if let RewardKind::Item { item, .. } = &reward.kind {
                match resolve(world, item) {
                    Some(handle) => {
                        self.reward_items.insert(reward.name.clone(), handle);
                    }
                    None => tracing::warn!(reward = %reward.name, item = ?item, "Reward item did not resolve"),
                }
            }
        }

        self.resolved = true;
        tracing::info!(
            systems = self.systems.len(),
            disabled = self.disabled.len(),
            counter = self.counter_effect.is_some(),
            rewards = self.reward_items.len(),
            "Identifiers resolved"
        );
    }

    pub fn effect(&self, system: EffectSystem, direction: EffectDirection) -> Option<FormHandle> {
        self.systems.get(&system).map(|h| match direction {
            EffectDirection::Outgoing => h.outgoing,
            EffectDirection::Incoming => h.incoming,
        })
    }

    /// Resolve a system by its recorded name, `counter` included.
    pub fn effect_by_name(
        &mut self,
        name: &str,
        direction: EffectDirection,
        world: &dyn WorldQuery,
    ) -> Option<FormHandle> {
        self.ensure_resolved(world);
        if name.eq_ignore_ascii_case(COUNTER_SYSTEM) {
            return self.counter_effect;
        }
        EffectSystem::parse(name).and_then(|system| self.effect(system, direction))
    }

    pub fn group(&self, system: EffectSystem) -> Option<FormHandle> {
        self.systems.get(&system).and_then(|h| h.group)
    }

    pub fn counter_effect(&self) -> Option<FormHandle> {
        self.counter_effect
    }

    pub fn reward_item(&self, reward: &str) -> Option<FormHandle> {
        self.reward_items.get(reward).copied()
    }

    pub fn is_disabled(&self, system: EffectSystem) -> bool {
        self.disabled.contains(&system)
    }

    pub fn invalidate(&mut self) {
        self.resolved = false;
        self.systems.clear();
        self.disabled.clear();
        self.counter_effect = None;
        self.reward_items.clear();
    }
}

fn resolve(world: &dyn WorldQuery, form: &FormRef) -> Option<FormHandle> {
    world.resolve_form(&form.plugin, form.local_id)
}
