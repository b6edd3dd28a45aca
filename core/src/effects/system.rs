use std::fmt;

use ember_types::{EffectSystemConfig, SystemsConfig};

use crate::state::ActorSnapshot;

/// The parallel effect categories. All share one lifecycle algorithm and
/// differ only in identifiers and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectSystem {
    Standard,
    Vampiric,
    Werebeast,
}

impl EffectSystem {
    pub const ALL: [EffectSystem; 3] = [
        EffectSystem::Standard,
        EffectSystem::Vampiric,
        EffectSystem::Werebeast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Vampiric => "vampiric",
            Self::Werebeast => "werebeast",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|system| system.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn config<'a>(&self, systems: &'a SystemsConfig) -> &'a EffectSystemConfig {
        match self {
            Self::Standard => &systems.standard,
            Self::Vampiric => &systems.vampiric,
            Self::Werebeast => &systems.werebeast,
        }
    }

    /// Tied to an actor condition, and so preferred over the generic system.
    pub fn is_condition_specific(&self) -> bool {
        !matches!(self, Self::Standard)
    }

    pub fn applies_to(&self, actor: &ActorSnapshot) -> bool {
        match self {
            Self::Standard => true,
            Self::Vampiric => actor.vampiric,
            Self::Werebeast => actor.werebeast,
        }
    }
}

impl fmt::Display for EffectSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
