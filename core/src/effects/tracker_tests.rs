//! Tests for the effect tracker
//!
//! Drives grants through a real task channel into an in-memory host so the
//! assertions cover what the host ends up carrying, not just the registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ember_types::{EffectDirection, EngineConfig, RetryConfig};
use proptest::prelude::*;

use super::action_log::ActionLog;
use super::active::{Binding, EffectKey};
use super::cleanup::{replay_action_log, scan_group_membership};
use super::system::EffectSystem;
use super::tracker::{EffectTracker, GrantOutcome, GrantRequest};
use crate::context::IdentifierCache;
use crate::host::{
    ActorId, ActorInfo, FormHandle, Gender, HostTaskQueue, HostTaskReceiver, MemoryWorld,
    Readiness, WorldQuery, host_task_channel,
};
use crate::state::ActorSnapshot;
use crate::tags::TagSet;

const OUT: FormHandle = FormHandle(0x0500_0801);
const IN: FormHandle = FormHandle(0x0500_0802);
const GROUP: FormHandle = FormHandle(0x0500_0900);
const LYDIA: ActorId = ActorId(0x20);
const JORDIS: ActorId = ActorId(0x21);

struct Harness {
    world: MemoryWorld,
    ids: IdentifierCache,
    tracker: EffectTracker,
    queue: HostTaskQueue,
    receiver: HostTaskReceiver,
}

impl Harness {
    fn drain(&mut self) -> usize {
        let mut host = self.world.clone();
        self.receiver.drain(&mut host)
    }

    fn grant(&mut self, key: EffectKey, binding: Binding, now: Instant) -> GrantOutcome {
        self.tracker
            .grant(request(key, binding), &mut self.ids, &self.world, &self.queue, now)
    }
}

fn info(id: ActorId, name: &str) -> ActorInfo {
    ActorInfo {
        id,
        base_id: id.0,
        name: name.to_string(),
        gender: Gender::Female,
        vampiric: false,
        werebeast: false,
        captured: true,
        is_player: false,
    }
}

fn make_world() -> MemoryWorld {
    let world = MemoryWorld::new();
    world.add_form("Ember.esp", 0x801, OUT);
    world.add_form("Ember.esp", 0x802, IN);
    world.add_named("Ember.esp", "EmberStandardFaction", GROUP);
    world.link_effect_group(OUT, GROUP);
    world.link_effect_group(IN, GROUP);
    world.add_actor(info(LYDIA, "Lydia"), Readiness::READY, 10.0);
    world.add_actor(info(JORDIS, "Jordis"), Readiness::READY, 20.0);
    world
}

fn make_harness_with(retry: RetryConfig, log: Arc<ActionLog>) -> Harness {
    let (queue, receiver) = host_task_channel(log);
    Harness {
        world: make_world(),
        ids: IdentifierCache::new(Arc::new(EngineConfig::default())),
        tracker: EffectTracker::new(&retry, Duration::from_secs(2)),
        queue,
        receiver,
    }
}

fn make_harness() -> Harness {
    make_harness_with(RetryConfig::default(), Arc::new(ActionLog::disabled()))
}

fn key(actor: ActorId, direction: EffectDirection) -> EffectKey {
    EffectKey::new(actor, direction, EffectSystem::Standard)
}

fn request(key: EffectKey, binding: Binding) -> GrantRequest {
    GrantRequest {
        key,
        actor_name: "Lydia".to_string(),
        binding,
        animation: Some("Ember_Doggy".to_string()),
        tags: TagSet::new(),
    }
}

fn thirty_secs() -> Binding {
    Binding::Timed(Duration::from_secs(30))
}

// ─────────────────────────────────────────────────────────────────────────────
// Guard
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_double_grant_second_rejected() {
    let mut h = make_harness();
    let now = Instant::now();
    let k = key(LYDIA, EffectDirection::Outgoing);

    assert_eq!(h.grant(k, thirty_secs(), now), GrantOutcome::Applied);
    assert_eq!(h.grant(k, thirty_secs(), now), GrantOutcome::AlreadyActive);
    assert_eq!(h.drain(), 1);
    assert!(h.world.carries(LYDIA, OUT));
    assert_eq!(h.tracker.len(), 1);
}

#[test]
fn test_directions_are_independent_keys() {
    let mut h = make_harness();
    let now = Instant::now();
    assert_eq!(h.grant(key(LYDIA, EffectDirection::Outgoing), thirty_secs(), now), GrantOutcome::Applied);
    assert_eq!(h.grant(key(LYDIA, EffectDirection::Incoming), thirty_secs(), now), GrantOutcome::Applied);
    h.drain();
    assert!(h.world.carries(LYDIA, OUT));
    assert!(h.world.carries(LYDIA, IN));
}

#[test]
fn test_unresolved_form_aborts_without_retry() {
    let mut h = make_harness();
    let k = EffectKey::new(LYDIA, EffectDirection::Outgoing, EffectSystem::Vampiric);
    assert_eq!(h.grant(k, thirty_secs(), Instant::now()), GrantOutcome::Unresolved);
    assert_eq!(h.tracker.pending_retries(), 0);
    assert_eq!(h.drain(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Deactivation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_deactivate_unknown_key_is_noop() {
    let mut h = make_harness();
    assert!(h.tracker.deactivate(&key(LYDIA, EffectDirection::Outgoing), &h.queue).is_none());
    assert_eq!(h.drain(), 0);
}

#[test]
fn test_deactivate_twice_lifts_once() {
    let mut h = make_harness();
    let k = key(LYDIA, EffectDirection::Outgoing);
    h.grant(k, thirty_secs(), Instant::now());
    assert!(h.tracker.deactivate(&k, &h.queue).is_some());
    assert!(h.tracker.deactivate(&k, &h.queue).is_none());
    assert_eq!(h.drain(), 2);
    assert!(!h.world.carries(LYDIA, OUT));
}

#[test]
fn test_clear_actor_only_touches_that_actor() {
    let mut h = make_harness();
    let now = Instant::now();
    h.grant(key(LYDIA, EffectDirection::Outgoing), thirty_secs(), now);
    h.grant(key(LYDIA, EffectDirection::Incoming), Binding::TagBound, now);
    h.grant(key(JORDIS, EffectDirection::Incoming), thirty_secs(), now);

    assert_eq!(h.tracker.clear_actor(LYDIA, &h.queue), 2);
    assert_eq!(h.tracker.active_keys(), vec![key(JORDIS, EffectDirection::Incoming)]);
    h.drain();
    assert!(!h.world.carries(LYDIA, OUT));
    assert!(!h.world.carries(LYDIA, IN));
    assert!(h.world.carries(JORDIS, IN));
}

// ─────────────────────────────────────────────────────────────────────────────
// Expiry
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_timed_effect_expires_and_tag_bound_does_not() {
    let mut h = make_harness();
    let now = Instant::now();
    let timed = key(LYDIA, EffectDirection::Outgoing);
    let bound = key(JORDIS, EffectDirection::Incoming);
    h.grant(timed, thirty_secs(), now);
    h.grant(bound, Binding::TagBound, now);

    assert!(h.tracker.process_expiry(&h.queue, now + Duration::from_secs(29)).is_empty());
    let expired = h.tracker.process_expiry(&h.queue, now + Duration::from_secs(30));
    assert_eq!(expired, vec![timed]);
    assert!(h.tracker.process_expiry(&h.queue, now + Duration::from_secs(3600)).is_empty());
    assert_eq!(h.tracker.tag_bound_keys(), vec![bound]);

    h.drain();
    assert!(!h.world.carries(LYDIA, OUT));
    assert!(h.world.carries(JORDIS, IN));
}

// ─────────────────────────────────────────────────────────────────────────────
// Retries
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unready_actor_retries_then_applies() {
    let mut h = make_harness();
    let now = Instant::now();
    let k = key(LYDIA, EffectDirection::Outgoing);
    h.world.set_readiness(
        LYDIA,
        Readiness {
            loaded: false,
            ..Readiness::READY
        },
    );

    assert_eq!(h.grant(k, thirty_secs(), now), GrantOutcome::RetryPending);
    assert_eq!(h.grant(k, thirty_secs(), now), GrantOutcome::RetryPending);
    assert_eq!(h.tracker.pending_retries(), 1);
    assert!(!h.tracker.is_active(&k));

    let first = now + Duration::from_millis(500);
    let report = h.tracker.process_retries(&h.world, &h.queue, first);
    assert_eq!(report.rescheduled, 1);

    h.world.set_readiness(LYDIA, Readiness::READY);
    let report = h.tracker.process_retries(&h.world, &h.queue, first + Duration::from_millis(500));
    assert_eq!(report.applied, 1);
    assert!(h.tracker.is_active(&k));
    assert_eq!(h.tracker.pending_retries(), 0);
    h.drain();
    assert!(h.world.carries(LYDIA, OUT));
}

#[test]
fn test_retry_exhaustion_after_exactly_budget_checks() {
    let retry = RetryConfig {
        max_attempts: 3,
        backoff_ms: 500,
    };
    let mut h = make_harness_with(retry, Arc::new(ActionLog::disabled()));
    h.world.set_readiness(LYDIA, Readiness::default());
    let mut now = Instant::now();
    h.grant(key(LYDIA, EffectDirection::Outgoing), thirty_secs(), now);

    let mut checks = 0;
    while h.tracker.pending_retries() > 0 {
        now += Duration::from_millis(500);
        let report = h.tracker.process_retries(&h.world, &h.queue, now);
        checks += report.rescheduled + report.dropped;
    }
    assert_eq!(checks, 3);
    assert!(h.tracker.is_empty());
    assert_eq!(h.drain(), 0);
}

#[test]
fn test_queued_binding_wins_until_retry_resolves() {
    let mut h = make_harness();
    let now = Instant::now();
    let k = key(LYDIA, EffectDirection::Incoming);
    h.world.set_readiness(LYDIA, Readiness::default());

    assert_eq!(h.grant(k, Binding::TagBound, now), GrantOutcome::RetryPending);
    assert_eq!(h.tracker.pending_tag_bound_keys(), vec![k]);
    // A timed request for the same key joins the queued tag-bound one
    assert_eq!(h.grant(k, thirty_secs(), now), GrantOutcome::RetryPending);

    h.world.set_readiness(LYDIA, Readiness::READY);
    h.tracker
        .process_retries(&h.world, &h.queue, now + Duration::from_millis(500));
    assert!(h.tracker.get(&k).unwrap().tag_bound);
}

#[test]
fn test_cancelled_retry_never_applies() {
    let mut h = make_harness();
    let now = Instant::now();
    let k = key(LYDIA, EffectDirection::Incoming);
    h.world.set_readiness(LYDIA, Readiness::default());
    h.grant(k, Binding::TagBound, now);

    assert!(h.tracker.cancel_retry(&k));
    assert!(!h.tracker.cancel_retry(&k));
    h.world.set_readiness(LYDIA, Readiness::READY);
    let report = h
        .tracker
        .process_retries(&h.world, &h.queue, now + Duration::from_secs(1));
    assert_eq!(report.applied, 0);
    assert_eq!(h.drain(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Duplicate window
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_duplicate_occurrence_window() {
    let mut h = make_harness();
    let now = Instant::now();
    assert!(h.tracker.admit_occurrence(LYDIA, now));
    assert!(!h.tracker.admit_occurrence(LYDIA, now + Duration::from_millis(1999)));
    assert!(h.tracker.admit_occurrence(JORDIS, now + Duration::from_millis(100)));
    assert!(h.tracker.admit_occurrence(LYDIA, now + Duration::from_secs(2)));

    h.tracker.clear_session();
    assert!(h.tracker.admit_occurrence(LYDIA, now + Duration::from_millis(2100)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Cleanup fallbacks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_log_replay_lifts_effects_lost_by_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(ActionLog::open(dir.path().join("actions.log")).unwrap());
    let mut h = make_harness_with(RetryConfig::default(), Arc::clone(&log));
    let now = Instant::now();
    h.grant(key(LYDIA, EffectDirection::Outgoing), thirty_secs(), now);
    h.grant(key(JORDIS, EffectDirection::Incoming), thirty_secs(), now);
    h.drain();

    // Simulate a crash: tracking is gone, the host still carries both
    h.tracker.reset();
    h.world.set_readiness(JORDIS, Readiness::default());

    let report = replay_action_log(&log, u64::MAX, &mut h.ids, &h.world, &h.queue);
    assert_eq!(report.examined, 2);
    assert_eq!(report.deactivated, 1);
    assert_eq!(report.not_ready, 1);
    h.drain();
    assert!(!h.world.carries(LYDIA, OUT));
    assert!(h.world.carries(JORDIS, IN));

    // The lift was recorded, so a second replay only retries the unready one
    h.world.set_readiness(JORDIS, Readiness::READY);
    let report = replay_action_log(&log, u64::MAX, &mut h.ids, &h.world, &h.queue);
    assert_eq!(report.examined, 1);
    assert_eq!(report.deactivated, 1);
    h.drain();
    assert_eq!(h.world.carried_count(), 0);

    let report = replay_action_log(&log, u64::MAX, &mut h.ids, &h.world, &h.queue);
    assert_eq!(report.examined, 0);
}

#[test]
fn test_group_scan_lifts_both_directions_of_members() {
    let mut h = make_harness();
    h.grant(key(LYDIA, EffectDirection::Outgoing), thirty_secs(), Instant::now());
    h.drain();
    h.tracker.reset();
    assert_eq!(h.world.group_rank(LYDIA, GROUP), Some(0));

    let roster: Vec<ActorSnapshot> = [info(LYDIA, "Lydia"), info(JORDIS, "Jordis")]
        .into_iter()
        .map(ActorSnapshot::from)
        .collect();
    let systems = EngineConfig::default().systems;
    let report = scan_group_membership(&roster, &systems, &mut h.ids, &h.world, &h.queue);
    assert_eq!(report.examined, 1);
    assert_eq!(report.deactivated, 2);
    h.drain();
    assert_eq!(h.world.carried_count(), 0);
    assert_eq!(h.world.group_rank(LYDIA, GROUP), None);

    // Rank below the configured minimum is left alone
    h.world.set_group_rank(JORDIS, GROUP, Some(-1));
    let report = scan_group_membership(&roster, &systems, &mut h.ids, &h.world, &h.queue);
    assert_eq!(report.examined, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Property: registry and host agree, at most one effect per key
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Grant(usize, bool),
    Deactivate(usize),
    Advance(u64),
    ClearActor(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..4usize, any::<bool>()).prop_map(|(k, tag_bound)| Op::Grant(k, tag_bound)),
        (0..4usize).prop_map(Op::Deactivate),
        (0..40u64).prop_map(Op::Advance),
        (0..2usize).prop_map(Op::ClearActor),
    ]
}

const KEYS: [(ActorId, EffectDirection); 4] = [
    (LYDIA, EffectDirection::Outgoing),
    (LYDIA, EffectDirection::Incoming),
    (JORDIS, EffectDirection::Outgoing),
    (JORDIS, EffectDirection::Incoming),
];

proptest! {
    #[test]
    fn prop_at_most_one_active_per_key(ops in prop::collection::vec(arb_op(), 1..60)) {
        let mut h = make_harness();
        let mut now = Instant::now();

        for op in ops {
            match op {
                Op::Grant(i, tag_bound) => {
                    let (actor, direction) = KEYS[i];
                    let binding = if tag_bound { Binding::TagBound } else { Binding::Timed(Duration::from_secs(10)) };
                    let was_active = h.tracker.is_active(&key(actor, direction));
                    let outcome = h.grant(key(actor, direction), binding, now);
                    prop_assert_eq!(outcome == GrantOutcome::AlreadyActive, was_active);
                }
                Op::Deactivate(i) => {
                    let (actor, direction) = KEYS[i];
                    h.tracker.deactivate(&key(actor, direction), &h.queue);
                }
                Op::Advance(secs) => {
                    now += Duration::from_secs(secs);
                    h.tracker.process_expiry(&h.queue, now);
                }
                Op::ClearActor(i) => {
                    h.tracker.clear_actor(KEYS[i * 2].0, &h.queue);
                }
            }
            h.drain();

            for (actor, direction) in KEYS {
                let effect = if direction == EffectDirection::Outgoing { OUT } else { IN };
                prop_assert_eq!(h.world.carries(actor, effect), h.tracker.is_active(&key(actor, direction)));
            }
        }
    }
}
