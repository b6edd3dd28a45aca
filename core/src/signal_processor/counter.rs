//! Per-actor occurrence counters.
//!
//! Each admitted climax increments its actor's counter. Reaching a multiple
//! of the threshold while the counter effect is inactive activates it; the
//! effect lapses once it has been active for the configured window. Counts
//! keep accumulating across activations and only reset at scene end.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::host::ActorId;

#[derive(Debug, Clone)]
struct Counter {
    actor_name: String,
    count: u32,
    effect_active: bool,
    activated_at: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterTransition {
    Activated {
        actor: ActorId,
        actor_name: String,
        count: u32,
    },
    Deactivated {
        actor: ActorId,
        actor_name: String,
    },
}

#[derive(Debug)]
pub struct CounterEngine {
    threshold: u32,
    window: Duration,
    counters: HashMap<ActorId, Counter>,
}

impl CounterEngine {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold,
            window,
            counters: HashMap::new(),
        }
    }

    pub fn increment(
        &mut self,
        actor: ActorId,
        actor_name: &str,
        now: Instant,
    ) -> Option<CounterTransition> {
        let counter = self.counters.entry(actor).or_insert_with(|| Counter {
            actor_name: actor_name.to_string(),
            count: 0,
            effect_active: false,
            activated_at: None,
        });
        counter.count = counter.count.saturating_add(1);

        if self.threshold == 0 || counter.effect_active || counter.count % self.threshold != 0 {
            return None;
        }
        counter.effect_active = true;
        counter.activated_at = Some(now);
        tracing::info!(actor = %actor, count = counter.count, "Counter threshold reached");
        Some(CounterTransition::Activated {
            actor,
            actor_name: counter.actor_name.clone(),
            count: counter.count,
        })
    }

    /// Lapse counter effects whose window has elapsed.
    pub fn check_windows(&mut self, now: Instant) -> Vec<CounterTransition> {
        let mut lapsed = Vec::new();
        for (actor, counter) in &mut self.counters {
            let Some(activated_at) = counter.activated_at else {
                continue;
            };
            if counter.effect_active && now.saturating_duration_since(activated_at) >= self.window {
                counter.effect_active = false;
                counter.activated_at = None;
                lapsed.push(CounterTransition::Deactivated {
                    actor: *actor,
                    actor_name: counter.actor_name.clone(),
                });
            }
        }
        lapsed
    }

    pub fn count(&self, actor: ActorId) -> u32 {
        self.counters.get(&actor).map_or(0, |c| c.count)
    }

    pub fn is_effect_active(&self, actor: ActorId) -> bool {
        self.counters.get(&actor).is_some_and(|c| c.effect_active)
    }

    /// Drop every counter. Returns deactivations for effects still active.
    pub fn clear(&mut self) -> Vec<CounterTransition> {
        self.counters
            .drain()
            .filter(|(_, c)| c.effect_active)
            .map(|(actor, c)| CounterTransition::Deactivated {
                actor,
                actor_name: c.actor_name,
            })
            .collect()
    }
}
