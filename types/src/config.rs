//! Engine configuration schema
//!
//! Loaded from a sectioned TOML file. Every section has defaults so a missing
//! key never fails a load; a missing file is replaced by a freshly written
//! default config (see `ember_core::context::load_config`).

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// Shared references
// ═══════════════════════════════════════════════════════════════════════════

/// A host form addressed by (plugin file, local id within that plugin).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FormRef {
    pub plugin: String,
    pub local_id: u32,
}

impl FormRef {
    pub fn new(plugin: impl Into<String>, local_id: u32) -> Self {
        Self {
            plugin: plugin.into(),
            local_id,
        }
    }
}

/// A host form addressed by (plugin file, symbolic editor name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NamedRef {
    pub plugin: String,
    pub name: String,
}

impl NamedRef {
    pub fn new(plugin: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            name: name.into(),
        }
    }
}

/// Which side of an occurrence an effect belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectDirection {
    /// The acting actor's own effect
    #[default]
    Outgoing,
    /// The effect granted to the acting actor's scene partners
    Incoming,
}

impl EffectDirection {
    pub const ALL: [EffectDirection; 2] = [EffectDirection::Outgoing, EffectDirection::Incoming];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outgoing => "outgoing",
            Self::Incoming => "incoming",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outgoing" => Some(Self::Outgoing),
            "incoming" => Some(Self::Incoming),
            _ => None,
        }
    }
}

const DEFAULT_PLUGIN: &str = "Ember.esp";

// ═══════════════════════════════════════════════════════════════════════════
// Top level
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub monitor: MonitorConfig,
    pub scene: SceneConfig,
    pub retry: RetryConfig,
    pub systems: SystemsConfig,
    pub counter: CounterConfig,
    pub action_log: ActionLogConfig,
    #[serde(rename = "reward", skip_serializing_if = "Vec::is_empty")]
    pub rewards: Vec<RewardConfig>,
}

/// Log tailing and tick cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Candidate scene log paths, highest priority first
    pub log_paths: Vec<String>,
    pub poll_interval_ms: u64,
    /// Polling is suppressed for this long after monitoring starts
    pub startup_grace_secs: u64,
    /// Seen-line hashes kept before the set is cleared wholesale
    pub dedup_capacity: usize,
    /// Trigger extra polls from file-change notifications
    pub watch_files: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_paths: Vec::new(),
            poll_interval_ms: 1000,
            startup_grace_secs: 5,
            dedup_capacity: 10_000,
            watch_files: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Radius of the nearby-actor scan done on scene start
    pub proximity_radius: f32,
    /// Debounce between a scene end and its cleanup pass
    pub cleanup_delay_ms: u64,
    /// Repeated climaxes for one actor inside this window are dropped
    pub climax_window_ms: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            proximity_radius: 2048.0,
            cleanup_delay_ms: 1000,
            climax_window_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_ms: 500,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Effect systems
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemsConfig {
    pub standard: EffectSystemConfig,
    pub vampiric: EffectSystemConfig,
    pub werebeast: EffectSystemConfig,
}

impl Default for SystemsConfig {
    fn default() -> Self {
        Self {
            standard: EffectSystemConfig::with_ids(0x801, 0x802, "EmberStandardFaction", ""),
            vampiric: EffectSystemConfig::with_ids(
                0x811,
                0x812,
                "EmberVampiricFaction",
                "Dawnguard.esm",
            ),
            werebeast: EffectSystemConfig::with_ids(
                0x821,
                0x822,
                "EmberWerebeastFaction",
                "Dawnguard.esm",
            ),
        }
    }
}

/// One parallel effect category: identifiers plus policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSystemConfig {
    pub enabled: bool,
    /// Host plugin that must be present for this system to take priority
    /// (empty = no requirement)
    pub requires_plugin: String,
    pub outgoing_effect: FormRef,
    pub incoming_effect: FormRef,
    /// Group whose membership marks an actor as carrying this system's effect
    pub group: NamedRef,
    pub min_group_rank: i32,
    pub outgoing: DirectionPolicy,
    pub incoming: DirectionPolicy,
    pub tag_bound: TagBoundPolicy,
}

impl EffectSystemConfig {
    fn with_ids(outgoing: u32, incoming: u32, group: &str, requires_plugin: &str) -> Self {
        Self {
            enabled: true,
            requires_plugin: requires_plugin.to_string(),
            outgoing_effect: FormRef::new(DEFAULT_PLUGIN, outgoing),
            incoming_effect: FormRef::new(DEFAULT_PLUGIN, incoming),
            group: NamedRef::new(DEFAULT_PLUGIN, group),
            min_group_rank: 0,
            outgoing: DirectionPolicy::default(),
            incoming: DirectionPolicy::default(),
            tag_bound: TagBoundPolicy::default(),
        }
    }

    pub fn effect(&self, direction: EffectDirection) -> &FormRef {
        match direction {
            EffectDirection::Outgoing => &self.outgoing_effect,
            EffectDirection::Incoming => &self.incoming_effect,
        }
    }

    pub fn direction(&self, direction: EffectDirection) -> &DirectionPolicy {
        match direction {
            EffectDirection::Outgoing => &self.outgoing,
            EffectDirection::Incoming => &self.incoming,
        }
    }
}

impl Default for EffectSystemConfig {
    fn default() -> Self {
        Self::with_ids(0, 0, "", "")
    }
}

/// Event-bound (timed) grant policy for one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionPolicy {
    pub enabled: bool,
    /// Comma-separated gender allow-list; empty allows all
    pub genders: String,
    pub duration_secs: f32,
}

impl Default for DirectionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            genders: String::new(),
            duration_secs: 30.0,
        }
    }
}

/// Tag-bound grant policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TagBoundPolicy {
    pub enabled: bool,
    pub genders: String,
    /// Comma-separated tag allow-list; empty never matches
    pub tags: String,
    pub direction: EffectDirection,
}

// ═══════════════════════════════════════════════════════════════════════════
// Counter effect
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub enabled: bool,
    /// Every multiple of this count activates the counter effect
    pub threshold: u32,
    /// How long the counter effect stays active
    pub window_secs: u64,
    pub effect: FormRef,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 5,
            window_secs: 60,
            effect: FormRef::new(DEFAULT_PLUGIN, 0x830),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Action log
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLogConfig {
    /// Empty = resolved by the embedding host
    pub path: String,
    /// The log is compacted to one record per key past this size
    pub compact_over_bytes: u64,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            compact_over_bytes: 1024 * 1024,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Periodic rewards
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardTarget {
    #[default]
    Player,
    /// Every actor on the scene roster, player included
    Scene,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardKind {
    Item { item: FormRef, count: u32 },
    Attribute { attribute: String, amount: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub interval_secs: u64,
    #[serde(default)]
    pub target: RewardTarget,
    pub kind: RewardKind,
}

fn default_true() -> bool {
    true
}
