use crate::host::{ActorId, ActorInfo, Gender};

/// An actor as captured for the duration of one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub base_id: u32,
    pub name: String,
    /// Join key between log lines and actors
    pub normalized_name: String,
    pub gender: Gender,
    pub vampiric: bool,
    pub werebeast: bool,
    pub captured: bool,
    pub is_player: bool,
}

impl From<ActorInfo> for ActorSnapshot {
    fn from(info: ActorInfo) -> Self {
        Self {
            normalized_name: normalize_name(&info.name),
            id: info.id,
            base_id: info.base_id,
            name: info.name,
            gender: info.gender,
            vampiric: info.vampiric,
            werebeast: info.werebeast,
            captured: info.captured,
            is_player: info.is_player,
        }
    }
}

/// Lower-case and collapse runs of whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
