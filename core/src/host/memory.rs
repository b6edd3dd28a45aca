//! In-memory host world.
//!
//! Backs the CLI's dry-run mode and the engine tests. Clones share state, so
//! one handle can serve as the `WorldQuery` given to the engine while another
//! drains host tasks as the `HostWorld`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ActorId, ActorInfo, FormHandle, HostWorld, Readiness, WorldQuery};

/// A host mutation as observed by the in-memory world.
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedCall {
    Effect {
        target: ActorId,
        effect: FormHandle,
        active: bool,
    },
    Item {
        target: ActorId,
        item: FormHandle,
        count: u32,
    },
    Attribute {
        target: ActorId,
        attribute: String,
        amount: f32,
    },
    Notify(String),
}

#[derive(Debug, Clone)]
pub struct MemoryActor {
    pub info: ActorInfo,
    pub readiness: Readiness,
    /// Distance from the player
    pub distance: f32,
}

#[derive(Debug, Default)]
struct WorldState {
    player: Option<ActorId>,
    actors: BTreeMap<ActorId, MemoryActor>,
    forms: HashMap<(String, u32), FormHandle>,
    named: HashMap<(String, String), FormHandle>,
    plugins: HashSet<String>,
    group_ranks: HashMap<(ActorId, FormHandle), i32>,
    /// Effect -> group whose membership mirrors it
    effect_groups: HashMap<FormHandle, FormHandle>,
    carried: HashSet<(ActorId, FormHandle)>,
    applied: Vec<AppliedCall>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWorld {
    state: Arc<RwLock<WorldState>>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Setup ───────────────────────────────────────────────────────────────

    pub fn add_actor(&self, info: ActorInfo, readiness: Readiness, distance: f32) {
        let mut state = self.state.write();
        if info.is_player {
            state.player = Some(info.id);
        }
        state.actors.insert(
            info.id,
            MemoryActor {
                info,
                readiness,
                distance,
            },
        );
    }

    pub fn set_readiness(&self, id: ActorId, readiness: Readiness) {
        if let Some(actor) = self.state.write().actors.get_mut(&id) {
            actor.readiness = readiness;
        }
    }

    pub fn add_form(&self, plugin: &str, local_id: u32, handle: FormHandle) {
        self.state
            .write()
            .forms
            .insert((plugin.to_ascii_lowercase(), local_id), handle);
    }

    pub fn add_named(&self, plugin: &str, name: &str, handle: FormHandle) {
        self.state.write().named.insert(
            (plugin.to_ascii_lowercase(), name.to_ascii_lowercase()),
            handle,
        );
    }

    pub fn add_plugin(&self, plugin: &str) {
        self.state.write().plugins.insert(plugin.to_ascii_lowercase());
    }

    /// Applying `effect` will also put the target into `group` at rank 0.
    pub fn link_effect_group(&self, effect: FormHandle, group: FormHandle) {
        self.state.write().effect_groups.insert(effect, group);
    }

    pub fn set_group_rank(&self, id: ActorId, group: FormHandle, rank: Option<i32>) {
        let mut state = self.state.write();
        match rank {
            Some(rank) => state.group_ranks.insert((id, group), rank),
            None => state.group_ranks.remove(&(id, group)),
        };
    }

    // ─── Inspection ──────────────────────────────────────────────────────────

    pub fn applied(&self) -> Vec<AppliedCall> {
        self.state.read().applied.clone()
    }

    pub fn clear_applied(&self) {
        self.state.write().applied.clear();
    }

    pub fn carries(&self, id: ActorId, effect: FormHandle) -> bool {
        self.state.read().carried.contains(&(id, effect))
    }

    pub fn carried_count(&self) -> usize {
        self.state.read().carried.len()
    }
}

impl WorldQuery for MemoryWorld {
    fn player(&self) -> Option<ActorInfo> {
        let state = self.state.read();
        state
            .player
            .and_then(|id| state.actors.get(&id))
            .map(|a| a.info.clone())
    }

    fn actor(&self, id: ActorId) -> Option<ActorInfo> {
        self.state.read().actors.get(&id).map(|a| a.info.clone())
    }

    fn actors_near_player(&self, radius: f32) -> Vec<ActorInfo> {
        self.state
            .read()
            .actors
            .values()
            .filter(|a| !a.info.is_player && a.distance <= radius)
            .map(|a| a.info.clone())
            .collect()
    }

    fn readiness(&self, id: ActorId) -> Readiness {
        self.state
            .read()
            .actors
            .get(&id)
            .map(|a| a.readiness)
            .unwrap_or_default()
    }

    fn group_rank(&self, id: ActorId, group: FormHandle) -> Option<i32> {
        self.state.read().group_ranks.get(&(id, group)).copied()
    }

    fn resolve_form(&self, plugin: &str, local_id: u32) -> Option<FormHandle> {
        self.state
            .read()
            .forms
            .get(&(plugin.to_ascii_lowercase(), local_id))
            .copied()
    }

    fn resolve_named(&self, plugin: &str, name: &str) -> Option<FormHandle> {
        self.state
            .read()
            .named
            .get(&(plugin.to_ascii_lowercase(), name.to_ascii_lowercase()))
            .copied()
    }

    fn has_plugin(&self, plugin: &str) -> bool {
        self.state
            .read()
            .plugins
            .contains(&plugin.to_ascii_lowercase())
    }
}

impl HostWorld for MemoryWorld {
    fn apply_effect(&mut self, target: ActorId, effect: FormHandle, active: bool) {
        let mut state = self.state.write();
        let group = state.effect_groups.get(&effect).copied();
        if active {
            state.carried.insert((target, effect));
            if let Some(group) = group {
                state.group_ranks.insert((target, group), 0);
            }
        } else {
            state.carried.remove(&(target, effect));
            if let Some(group) = group {
                state.group_ranks.remove(&(target, group));
            }
        }
        state.applied.push(AppliedCall::Effect {
            target,
            effect,
            active,
        });
    }

    fn add_item(&mut self, target: ActorId, item: FormHandle, count: u32) {
        self.state.write().applied.push(AppliedCall::Item {
            target,
            item,
            count,
        });
    }

    fn restore_attribute(&mut self, target: ActorId, attribute: &str, amount: f32) {
        self.state.write().applied.push(AppliedCall::Attribute {
            target,
            attribute: attribute.to_string(),
            amount,
        });
    }

    fn notify(&mut self, message: &str) {
        self.state
            .write()
            .applied
            .push(AppliedCall::Notify(message.to_string()));
    }
}
