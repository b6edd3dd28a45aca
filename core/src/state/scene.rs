use chrono::{DateTime, Local};

use super::actor::ActorSnapshot;
use crate::host::ActorId;
use crate::tags::{Tag, TagSet};

/// What is known about the running scene. The roster is empty whenever
/// `in_scene` is false.
#[derive(Debug, Clone, Default)]
pub struct SceneState {
    pub in_scene: bool,
    pub started_at: Option<DateTime<Local>>,
    pub ended_at: Option<DateTime<Local>>,
    pub animation: Option<String>,
    pub tags: TagSet,
    /// Latest speed tag
    pub intensity: Option<Tag>,
    pub roster: Vec<ActorSnapshot>,
}

impl SceneState {
    pub fn find_by_name(&self, normalized: &str) -> Option<&ActorSnapshot> {
        self.roster.iter().find(|a| a.normalized_name == normalized)
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.roster.iter().any(|a| a.id == id)
    }

    pub fn player(&self) -> Option<&ActorSnapshot> {
        self.roster.iter().find(|a| a.is_player)
    }

    /// Animation tags plus the current speed tag.
    pub fn effective_tags(&self) -> TagSet {
        let mut tags = self.tags.clone();
        if let Some(intensity) = self.intensity {
            tags.insert(intensity);
        }
        tags
    }
}
