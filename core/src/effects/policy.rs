//! Grant policy
//!
//! Pure decisions over configuration and the current scene view. The
//! evaluator never touches the tracker; callers pass in whether the key is
//! currently active and act on the returned [`Decision`].

use ember_types::{EffectDirection, SystemsConfig};

use super::system::EffectSystem;
use crate::host::Gender;
use crate::state::ActorSnapshot;
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Activate,
    /// Already active and still qualifies
    Maintain,
    Deactivate,
    Skip,
}

#[derive(Debug, Clone)]
pub struct PolicyEvaluator<'a> {
    systems: &'a SystemsConfig,
    /// Required host plugin present, indexed like `EffectSystem::ALL`
    plugin_present: [bool; 3],
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(systems: &'a SystemsConfig, has_plugin: impl Fn(&str) -> bool) -> Self {
        let plugin_present = EffectSystem::ALL.map(|system| {
            let required = &system.config(systems).requires_plugin;
            required.trim().is_empty() || has_plugin(required)
        });
        Self {
            systems,
            plugin_present,
        }
    }

    fn plugin_ok(&self, system: EffectSystem) -> bool {
        let index = EffectSystem::ALL
            .iter()
            .position(|s| *s == system)
            .unwrap_or_default();
        self.plugin_present[index]
    }

    /// Systems that govern `actor`. A qualifying condition-specific system
    /// displaces the generic one.
    pub fn systems_for(&self, actor: &ActorSnapshot) -> Vec<EffectSystem> {
        let qualifying: Vec<EffectSystem> = EffectSystem::ALL
            .into_iter()
            .filter(|system| {
                system.config(self.systems).enabled
                    && system.applies_to(actor)
                    && self.plugin_ok(*system)
            })
            .collect();

        if qualifying.iter().any(EffectSystem::is_condition_specific) {
            qualifying
                .into_iter()
                .filter(EffectSystem::is_condition_specific)
                .collect()
        } else {
            qualifying
        }
    }

    /// Event-bound (timed) grant. `gender` is the climaxing actor's.
    pub fn evaluate_occurrence(
        &self,
        system: EffectSystem,
        direction: EffectDirection,
        gender: Gender,
        active: bool,
    ) -> Decision {
        let config = system.config(self.systems);
        let policy = config.direction(direction);
        if !config.enabled || !policy.enabled || !gender_allowed(&policy.genders, gender) {
            return Decision::Skip;
        }
        if active {
            Decision::Maintain
        } else {
            Decision::Activate
        }
    }

    /// Tag-bound grant for `actor` against the current animation.
    pub fn evaluate_tags(
        &self,
        actor: &ActorSnapshot,
        system: EffectSystem,
        animation: &str,
        tags: &TagSet,
        active: bool,
    ) -> Decision {
        let config = system.config(self.systems);
        let policy = &config.tag_bound;
        let qualifies = config.enabled
            && policy.enabled
            && gender_allowed(&policy.genders, actor.gender)
            && tags_match(&policy.tags, animation, tags);

        match (qualifies, active) {
            (true, true) => Decision::Maintain,
            (true, false) => Decision::Activate,
            (false, true) => Decision::Deactivate,
            (false, false) => Decision::Skip,
        }
    }

    pub fn tag_bound_direction(&self, system: EffectSystem) -> EffectDirection {
        system.config(self.systems).tag_bound.direction
    }
}

fn list_entries(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(|entry| entry.trim().to_lowercase())
        .filter(|entry| !entry.is_empty())
}

/// Comma-separated allow-list, case-insensitive. Empty allows everything.
pub fn gender_allowed(list: &str, gender: Gender) -> bool {
    let mut entries = list_entries(list).peekable();
    if entries.peek().is_none() {
        return true;
    }
    entries.any(|entry| Gender::parse(&entry) == Some(gender))
}

/// Comma-separated tag list. An entry matches as a substring of the
/// animation identifier or exactly against an extracted tag name. An empty
/// list never matches.
pub fn tags_match(list: &str, animation: &str, tags: &TagSet) -> bool {
    let animation = animation.to_lowercase();
    list_entries(list)
        .any(|entry| animation.contains(&entry) || tags.iter().any(|tag| tag.name() == entry))
}
