//! Scene lifecycle state machine.
//!
//! - Idle: no scene running, roster empty
//! - Active: a scene is running, roster holds every attributed actor
//!
//! The machine only owns scene bookkeeping. Effect, counter and reward side
//! effects of each transition are driven by the engine from the returned
//! [`SceneTransition`].

use chrono::{DateTime, Local};

use crate::host::WorldQuery;
use crate::state::{ActorSnapshot, SceneState, normalize_name};
use crate::tags::{self, TagSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneTransition {
    /// Idle -> Active
    Started,
    /// A distinct animation while Active
    AnimationChanged,
    /// Same identifier as the previous line
    Unchanged,
    /// The scene could not start
    Ignored,
}

#[derive(Debug, Default)]
pub struct SceneStateMachine {
    state: SceneState,
    last_animation: Option<String>,
    /// Proximity scan taken at scene start, refreshed on attribution misses
    nearby: Vec<ActorSnapshot>,
}

impl SceneStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SceneState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.in_scene
    }

    pub fn roster(&self) -> &[ActorSnapshot] {
        &self.state.roster
    }

    pub fn nearby(&self) -> &[ActorSnapshot] {
        &self.nearby
    }

    /// Advance on an animation line.
    pub fn handle_animation(
        &mut self,
        animation: &str,
        world: &dyn WorldQuery,
        radius: f32,
        now: DateTime<Local>,
    ) -> SceneTransition {
        if self.last_animation.as_deref() == Some(animation) {
            return SceneTransition::Unchanged;
        }

        if self.state.in_scene {
            self.last_animation = Some(animation.to_string());
            self.state.animation = Some(animation.to_string());
            self.state.tags = tags::classify(animation);
            tracing::debug!(
                animation,
                tags = %tags::describe(&self.state.tags),
                "Scene animation changed"
            );
            return SceneTransition::AnimationChanged;
        }

        self.start(animation, world, radius, now)
    }

    fn start(
        &mut self,
        animation: &str,
        world: &dyn WorldQuery,
        radius: f32,
        now: DateTime<Local>,
    ) -> SceneTransition {
        let Some(player) = world.player() else {
            // Leave last_animation unset so the next animation line retries
            tracing::warn!(animation, "Scene start ignored, player unavailable");
            return SceneTransition::Ignored;
        };

        self.nearby = world
            .actors_near_player(radius)
            .into_iter()
            .map(ActorSnapshot::from)
            .collect();

        let mut roster = vec![ActorSnapshot::from(player)];
        roster.extend(self.nearby.iter().filter(|a| a.captured).cloned());

        self.state = SceneState {
            in_scene: true,
            started_at: Some(now),
            ended_at: None,
            animation: Some(animation.to_string()),
            tags: tags::classify(animation),
            intensity: None,
            roster,
        };
        self.last_animation = Some(animation.to_string());

        tracing::info!(
            animation,
            roster = self.state.roster.len(),
            nearby = self.nearby.len(),
            "Scene started"
        );
        SceneTransition::Started
    }

    /// Record a speed level. Returns false while Idle.
    pub fn handle_speed(&mut self, level: i32) -> bool {
        if !self.state.in_scene {
            return false;
        }
        self.state.intensity = Some(tags::speed_tag(level));
        true
    }

    /// Current animation tags merged with the tags a climax line carries.
    pub fn climax_tags(&self, animation: Option<&str>) -> TagSet {
        let mut tags = tags::climax_tags(animation);
        tags.extend(self.state.effective_tags());
        tags
    }

    /// Attribute a named actor to the running scene: roster first, then the
    /// nearby cache, then a fresh proximity scan.
    pub fn attribute_actor(
        &mut self,
        name: &str,
        world: &dyn WorldQuery,
        radius: f32,
    ) -> Option<ActorSnapshot> {
        if !self.state.in_scene {
            return None;
        }
        let key = normalize_name(name);
        if let Some(actor) = self.state.find_by_name(&key) {
            return Some(actor.clone());
        }

        let cached = self.nearby.iter().find(|a| a.normalized_name == key).cloned();
        let found = match cached {
            Some(actor) => Some(actor),
            None => {
                self.nearby = world
                    .actors_near_player(radius)
                    .into_iter()
                    .map(ActorSnapshot::from)
                    .collect();
                self.nearby.iter().find(|a| a.normalized_name == key).cloned()
            }
        };

        match found {
            Some(actor) => {
                tracing::info!(actor = %actor.name, id = %actor.id, "Actor joined scene");
                self.state.roster.push(actor.clone());
                Some(actor)
            }
            None => {
                tracing::info!(actor = name, "Climax for unknown actor ignored");
                None
            }
        }
    }

    /// Active -> Idle. Returns the roster the scene ended with.
    pub fn end(&mut self, now: DateTime<Local>) -> Option<Vec<ActorSnapshot>> {
        if !self.state.in_scene {
            return None;
        }
        let roster = std::mem::take(&mut self.state.roster);
        let started_at = self.state.started_at;
        self.state = SceneState {
            started_at,
            ended_at: Some(now),
            ..SceneState::default()
        };
        self.last_animation = None;
        self.nearby.clear();

        tracing::info!(roster = roster.len(), "Scene ended");
        Some(roster)
    }

    /// The log was rotated; the next animation is processed even if it
    /// repeats the last one.
    pub fn reset_last_animation(&mut self) {
        self.last_animation = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
