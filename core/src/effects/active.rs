//! Active effect instances

use std::fmt;
use std::time::{Duration, Instant};

use ember_types::EffectDirection;

use super::system::EffectSystem;
use crate::host::{ActorId, FormHandle};
use crate::tags::TagSet;

/// Identity of a tracked effect. At most one [`ActiveEffect`] exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectKey {
    pub actor: ActorId,
    pub direction: EffectDirection,
    pub system: EffectSystem,
}

impl EffectKey {
    pub fn new(actor: ActorId, direction: EffectDirection, system: EffectSystem) -> Self {
        Self {
            actor,
            direction,
            system,
        }
    }
}

impl fmt::Display for EffectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.actor, self.direction.as_str(), self.system)
    }
}

/// How long a granted effect lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binding {
    /// Expires after the nominal duration
    Timed(Duration),
    /// Lives until a later animation stops matching
    TagBound,
}

/// A registered effect
#[derive(Debug, Clone)]
pub struct ActiveEffect {
    pub key: EffectKey,
    pub actor_name: String,
    /// Resolved form, reused for the deactivation apply
    pub effect: FormHandle,

    // ─── Timing ──────────────────────────────────────────────────────────────
    pub activated_at: Instant,
    /// Zero for tag-bound effects
    pub duration: Duration,
    pub tag_bound: bool,

    // ─── Snapshot at registration ────────────────────────────────────────────
    pub animation: Option<String>,
    pub tags: TagSet,

    // ─── Deactivation flags ──────────────────────────────────────────────────
    pub manually_cleared: bool,
    pub expired: bool,
}

impl ActiveEffect {
    pub fn new(
        key: EffectKey,
        actor_name: impl Into<String>,
        effect: FormHandle,
        binding: Binding,
        animation: Option<String>,
        tags: TagSet,
        now: Instant,
    ) -> Self {
        let (duration, tag_bound) = match binding {
            Binding::Timed(duration) => (duration, false),
            Binding::TagBound => (Duration::ZERO, true),
        };
        Self {
            key,
            actor_name: actor_name.into(),
            effect,
            activated_at: now,
            duration,
            tag_bound,
            animation,
            tags,
            manually_cleared: false,
            expired: false,
        }
    }

    /// Tag-bound effects never expire by time.
    pub fn is_expired(&self, now: Instant) -> bool {
        !self.tag_bound && now.saturating_duration_since(self.activated_at) >= self.duration
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.tag_bound {
            return None;
        }
        Some(
            self.duration
                .saturating_sub(now.saturating_duration_since(self.activated_at)),
        )
    }
}
