//! Host capability interface
//!
//! The engine never touches the game world directly. It reads through
//! [`WorldQuery`] (safe to call from background tasks) and mutates only by
//! queueing [`HostTask`]s that the host drains on its own thread through
//! [`HostWorld`].
//!
//! ```text
//!  monitor / watch tasks ──► WorldQuery (read-only, Send + Sync)
//!           │
//!           └──► HostTaskQueue ──channel──► HostTaskReceiver::drain(&mut HostWorld)
//!                                                   (host thread only)
//! ```

pub mod memory;
pub mod task_queue;

use std::fmt;

pub use memory::{AppliedCall, MemoryActor, MemoryWorld};
pub use task_queue::{EffectRecord, HostTask, HostTaskQueue, HostTaskReceiver, host_task_channel};

/// Stable reference to an actor in the host world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u32);

impl ActorId {
    /// Parse `0x0001A2B3`, `0001A2B3` or `1a2b3`.
    pub fn parse_hex(s: &str) -> Option<Self> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u32::from_str_radix(digits, 16).ok().map(Self)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// A resolved host form (effect, item, or group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormHandle(pub u32);

impl fmt::Display for FormHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Gender {
    Male,
    Female,
    #[default]
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }

    /// Accepts the long names and the one-letter forms producers tend to log.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Self::Male),
            "female" | "f" => Some(Self::Female),
            "other" | "creature" | "o" => Some(Self::Other),
            _ => None,
        }
    }
}

/// What the host reports about an actor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorInfo {
    pub id: ActorId,
    /// Base template the actor was spawned from
    pub base_id: u32,
    pub name: String,
    pub gender: Gender,
    pub vampiric: bool,
    pub werebeast: bool,
    /// Host reports the actor as taking part in the running scene
    pub captured: bool,
    pub is_player: bool,
}

/// Whether an actor can receive an effect right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// Loaded into the live world (3D present)
    pub loaded: bool,
    /// Not disabled or deleted
    pub enabled: bool,
    /// Has a valid interaction target for effect delivery
    pub has_target: bool,
}

impl Readiness {
    pub const READY: Readiness = Readiness {
        loaded: true,
        enabled: true,
        has_target: true,
    };

    pub fn is_ready(&self) -> bool {
        self.loaded && self.enabled && self.has_target
    }
}

/// Host-side session lifecycle notifications. Each one resets all session
/// caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    NewGame,
    PostLoad,
    DataLoaded,
    SessionEnding,
}

/// Read-only world queries. Implementations must be callable from any thread.
pub trait WorldQuery: Send + Sync {
    fn player(&self) -> Option<ActorInfo>;

    fn actor(&self, id: ActorId) -> Option<ActorInfo>;

    /// Actors within `radius` units of the player, player excluded.
    fn actors_near_player(&self, radius: f32) -> Vec<ActorInfo>;

    fn readiness(&self, id: ActorId) -> Readiness;

    /// Rank of `id` in `group`, `None` when not a member.
    fn group_rank(&self, id: ActorId, group: FormHandle) -> Option<i32>;

    fn resolve_form(&self, plugin: &str, local_id: u32) -> Option<FormHandle>;

    fn resolve_named(&self, plugin: &str, name: &str) -> Option<FormHandle>;

    fn has_plugin(&self, plugin: &str) -> bool;
}

/// World mutations. Only ever invoked from [`HostTaskReceiver::drain`].
pub trait HostWorld {
    /// Apply (`active = true`) or lift (`active = false`) an effect. Lifting an
    /// effect the actor does not carry must be a no-op.
    fn apply_effect(&mut self, target: ActorId, effect: FormHandle, active: bool);

    fn add_item(&mut self, target: ActorId, item: FormHandle, count: u32);

    fn restore_attribute(&mut self, target: ActorId, attribute: &str, amount: f32);

    /// Fire-and-forget user notification.
    fn notify(&mut self, message: &str);
}
