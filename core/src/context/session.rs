//! Per-session engine state
//!
//! One mutex per logical collection. When more than one is needed, locks are
//! taken in field order (scene, effects, counters, identifiers, rewards,
//! pending_cleanup) and never held across a host apply. The engine's log
//! intake lock, when held, is always taken before any of these.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ember_types::EngineConfig;
use parking_lot::Mutex;

use super::identifiers::IdentifierCache;
use crate::effects::{EffectKey, EffectTracker};
use crate::rewards::RewardScheduler;
use crate::signal_processor::{CounterEngine, SceneStateMachine};
use crate::state::ActorSnapshot;

/// End-of-scene cleanup waiting out its debounce.
#[derive(Debug, Clone)]
pub struct PendingCleanup {
    pub due: Instant,
    pub roster: Vec<ActorSnapshot>,
    pub effects: Vec<EffectKey>,
}

#[derive(Debug)]
pub struct SessionContext {
    config: Arc<EngineConfig>,
    pub scene: Mutex<SceneStateMachine>,
    pub effects: Mutex<EffectTracker>,
    pub counters: Mutex<CounterEngine>,
    pub identifiers: Mutex<IdentifierCache>,
    pub rewards: Mutex<RewardScheduler>,
    pub pending_cleanup: Mutex<Option<PendingCleanup>>,
}

impl SessionContext {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            scene: Mutex::new(SceneStateMachine::new()),
            effects: Mutex::new(new_tracker(&config)),
            counters: Mutex::new(new_counters(&config)),
            identifiers: Mutex::new(IdentifierCache::new(Arc::clone(&config))),
            rewards: Mutex::new(RewardScheduler::new(&config.rewards)),
            pending_cleanup: Mutex::new(None),
            config,
        }
    }

    /// Forget all session state. Nothing is sent to the host.
    pub fn reset(&self) {
        self.scene.lock().reset();
        self.effects.lock().reset();
        *self.counters.lock() = new_counters(&self.config);
        self.identifiers.lock().invalidate();
        *self.rewards.lock() = RewardScheduler::new(&self.config.rewards);
        *self.pending_cleanup.lock() = None;
        tracing::info!("Session state reset");
    }
}

fn new_tracker(config: &EngineConfig) -> EffectTracker {
    EffectTracker::new(
        &config.retry,
        Duration::from_millis(config.scene.climax_window_ms),
    )
}

fn new_counters(config: &EngineConfig) -> CounterEngine {
    CounterEngine::new(
        config.counter.threshold,
        Duration::from_secs(config.counter.window_secs),
    )
}
