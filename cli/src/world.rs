//! Dry-run host world
//!
//! The CLI has no game to talk to, so it stands in an in-memory world built
//! from a small TOML description. Every form the configuration references is
//! registered so identifier resolution succeeds; effects "applied" to actors
//! are only recorded.
//!
//! ```toml
//! plugins = ["Dawnguard.esm"]
//!
//! [[actors]]
//! id = "0x00000014"
//! name = "Dovahkiin"
//! gender = "male"
//! player = true
//!
//! [[actors]]
//! id = "0x000A2C94"
//! name = "Lydia"
//! gender = "female"
//! distance = 120.0
//! ```

use std::collections::HashMap;
use std::path::Path;

use ember_core::{ActorId, ActorInfo, FormHandle, Gender, MemoryWorld, Readiness};
use ember_types::{EngineConfig, FormRef, RewardKind};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorldFile {
    pub plugins: Vec<String>,
    pub actors: Vec<WorldActor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldActor {
    pub id: String,
    pub name: String,
    pub gender: String,
    pub player: bool,
    pub distance: f32,
    pub vampiric: bool,
    pub werebeast: bool,
    pub captured: bool,
    pub ready: bool,
}

impl Default for WorldActor {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            gender: "other".to_string(),
            player: false,
            distance: 0.0,
            vampiric: false,
            werebeast: false,
            captured: true,
            ready: true,
        }
    }
}

pub fn load_world_file(path: &Path) -> Result<WorldFile, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read world file {}: {e}", path.display()))?;
    toml::from_str(&text).map_err(|e| format!("invalid world file {}: {e}", path.display()))
}

/// Build the dry-run world for `config`. With no description only the
/// configured forms exist and no scene can start.
pub fn build_world(config: &EngineConfig, file: &WorldFile) -> Result<MemoryWorld, String> {
    let world = MemoryWorld::new();
    let mut handles = FormAllocator::default();

    for plugin in &file.plugins {
        world.add_plugin(plugin);
    }

    for sys in [
        &config.systems.standard,
        &config.systems.vampiric,
        &config.systems.werebeast,
    ] {
        let outgoing = handles.register(&world, &sys.outgoing_effect);
        let incoming = handles.register(&world, &sys.incoming_effect);
        if sys.group.name.is_empty() {
            continue;
        }
        let group = handles.next();
        world.add_named(&sys.group.plugin, &sys.group.name, group);
        world.link_effect_group(outgoing, group);
        world.link_effect_group(incoming, group);
    }
    handles.register(&world, &config.counter.effect);
    for reward in &config.rewards {
        if let RewardKind::Item { item, .. } = &reward.kind {
            handles.register(&world, item);
        }
    }

    for actor in &file.actors {
        let id = ActorId::parse_hex(&actor.id)
            .ok_or_else(|| format!("actor {:?} has an invalid id {:?}", actor.name, actor.id))?;
        let gender = Gender::parse(&actor.gender)
            .ok_or_else(|| format!("actor {:?} has an unknown gender {:?}", actor.name, actor.gender))?;
        let readiness = if actor.ready {
            Readiness::READY
        } else {
            Readiness::default()
        };
        world.add_actor(
            ActorInfo {
                id,
                base_id: id.0,
                name: actor.name.clone(),
                gender,
                vampiric: actor.vampiric,
                werebeast: actor.werebeast,
                captured: actor.captured,
                is_player: actor.player,
            },
            readiness,
            actor.distance,
        );
    }

    tracing::info!(
        actors = file.actors.len(),
        plugins = file.plugins.len(),
        forms = handles.assigned.len(),
        "Dry-run world ready"
    );
    Ok(world)
}

/// Hands out stable fake handles, one per distinct form reference.
#[derive(Default)]
struct FormAllocator {
    assigned: HashMap<(String, u32), FormHandle>,
    issued: u32,
}

impl FormAllocator {
    fn next(&mut self) -> FormHandle {
        self.issued += 1;
        FormHandle(0xFE00_0000 | self.issued)
    }

    fn register(&mut self, world: &MemoryWorld, form: &FormRef) -> FormHandle {
        let key = (form.plugin.to_lowercase(), form.local_id);
        if let Some(handle) = self.assigned.get(&key) {
            return *handle;
        }
        let handle = self.next();
        world.add_form(&form.plugin, form.local_id, handle);
        world.add_plugin(&form.plugin);
        self.assigned.insert(key, handle);
        handle
    }
}
