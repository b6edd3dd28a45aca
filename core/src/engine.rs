//! Scene engine
//!
//! Wires the tailer, classifier, scene machine, effect tracker, counters and
//! rewards together. All methods take `&self`; state lives in the
//! [`SessionContext`] mutexes so the monitor task and the file-watch task can
//! share one `Arc<SceneEngine>`.
//!
//! ```text
//! poll_log ──► classify_line ──► handle(SceneLine)
//!                                   ├─ AnimationChanged ─► start / tag-bound pass
//!                                   ├─ SpeedChanged ─────► intensity tag
//!                                   ├─ Climax ───────────► timed grants + counter
//!                                   └─ SceneEnded ───────► delayed cleanup
//! tick ──► retries ─► expiry ─► counter windows ─► due cleanup ─► rewards
//! ```

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use ember_types::{EffectDirection, EngineConfig};
use parking_lot::Mutex;

use crate::context::{COUNTER_SYSTEM, IdentifierCache, PendingCleanup, SessionContext};
use crate::effects::{
    ActionLog, ActiveEffect, Binding, CleanupReport, Decision, EffectKey, GrantOutcome,
    GrantRequest, PolicyEvaluator, RetryReport, replay_action_log, scan_group_membership,
};
use crate::host::{
    ActorId, EffectRecord, Gender, HostTask, HostTaskQueue, LifecycleEvent, WorldQuery,
};
use crate::log_tail::LogTailer;
use crate::scene_log::{SceneLine, classify_line};
use crate::signal_processor::{CounterTransition, SceneTransition};
use crate::state::{ActorSnapshot, SceneState};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub lines: usize,
    pub retries: RetryReport,
    pub expired: usize,
    pub counters_lapsed: usize,
    pub cleanup_ran: bool,
    pub reward_tasks: usize,
}

pub struct SceneEngine {
    config: Arc<EngineConfig>,
    world: Arc<dyn WorldQuery>,
    queue: HostTaskQueue,
    action_log: Arc<ActionLog>,
    session: SessionContext,
    tailer: Mutex<LogTailer>,
}

impl SceneEngine {
    pub fn new(
        config: EngineConfig,
        world: Arc<dyn WorldQuery>,
        queue: HostTaskQueue,
        action_log: Arc<ActionLog>,
    ) -> Self {
        let config = Arc::new(config);
        let tailer = LogTailer::new(
            log_paths(&config),
            config.monitor.dedup_capacity,
            Duration::from_secs(config.monitor.startup_grace_secs),
        );
        Self {
            session: SessionContext::new(Arc::clone(&config)),
            tailer: Mutex::new(tailer),
            config,
            world,
            queue,
            action_log,
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn log_paths(&self) -> Vec<PathBuf> {
        log_paths(&self.config)
    }

    pub fn scene(&self) -> SceneState {
        self.session.scene.lock().state().clone()
    }

    pub fn active_effects(&self) -> Vec<ActiveEffect> {
        self.session.effects.lock().snapshot()
    }

    pub fn has_pending_cleanup(&self) -> bool {
        self.session.pending_cleanup.lock().is_some()
    }

    fn radius(&self) -> f32 {
        self.config.scene.proximity_radius
    }

    // ─── Log intake ──────────────────────────────────────────────────────────

    /// Read new scene log lines and process them. Returns how many lines
    /// were read.
    ///
    /// The tailer stays locked until the batch is processed, so concurrent
    /// callers handle their batches in file order. It is taken before any
    /// session lock.
    pub fn poll_log(&self, now: Instant) -> usize {
        let mut tailer = self.tailer.lock();
        let result = tailer.poll(now);
        if result.rotated {
            self.session.scene.lock().reset_last_animation();
        }
        self.process_lines(&result.lines, now);
        result.lines.len()
    }

    /// Returns how many lines were recognized.
    pub fn process_lines(&self, lines: &[String], now: Instant) -> usize {
        lines
            .iter()
            .filter(|line| self.process_line(line, now))
            .count()
    }

    pub fn process_line(&self, line: &str, now: Instant) -> bool {
        match classify_line(line) {
            Some(event) => {
                self.handle(event, now);
                true
            }
            None => false,
        }
    }

    pub fn handle(&self, event: SceneLine, now: Instant) {
        match event {
            SceneLine::AnimationChanged(animation) => self.on_animation(&animation, now),
            SceneLine::SpeedChanged(level) => {
                self.session.scene.lock().handle_speed(level);
            }
            SceneLine::Climax {
                actor,
                gender,
                animation,
            } => self.on_climax(&actor, gender, animation.as_deref(), now),
            SceneLine::SceneEnded | SceneLine::ThreadEnded => self.on_scene_end(now),
        }
    }

    // ─── Scene transitions ───────────────────────────────────────────────────

    fn on_animation(&self, animation: &str, now: Instant) {
        if !self.session.scene.lock().is_active() {
            self.run_pending_cleanup(true, now);
        }
        let transition = self.session.scene.lock().handle_animation(
            animation,
            self.world.as_ref(),
            self.radius(),
            Local::now(),
        );
        match transition {
            SceneTransition::Started => self.on_scene_start(now),
            SceneTransition::AnimationChanged => self.evaluate_tag_bound(now),
            SceneTransition::Unchanged | SceneTransition::Ignored => {}
        }
    }

    fn on_scene_start(&self, now: Instant) {
        let sweep: Vec<ActorSnapshot> = {
            let scene = self.session.scene.lock();
            let mut actors = scene.roster().to_vec();
            for actor in scene.nearby() {
                if !actors.iter().any(|a| a.id == actor.id) {
                    actors.push(actor.clone());
                }
            }
            actors
        };

        {
            let mut effects = self.session.effects.lock();
            effects.clear_session();
        }
        let leftover = self.session.counters.lock().clear();
        {
            let mut ids = self.session.identifiers.lock();
            ids.ensure_resolved(self.world.as_ref());
            self.push_counter_transitions(leftover, &ids);
            let mut report = replay_action_log(
                &self.action_log,
                self.config.action_log.compact_over_bytes,
                &mut ids,
                self.world.as_ref(),
                &self.queue,
            );
            report.merge(scan_group_membership(
                &sweep,
                &self.config.systems,
                &mut ids,
                self.world.as_ref(),
                &self.queue,
            ));
            if report.deactivated > 0 {
                tracing::info!(
                    deactivated = report.deactivated,
                    "Cleared effects left over from a previous session"
                );
            }
        }
        self.session.rewards.lock().activate_all(now);
        self.evaluate_tag_bound(now);
    }

    /// Drop tag-bound effects that no longer match, keep matching ones and
    /// activate newly matching ones.
    fn evaluate_tag_bound(&self, now: Instant) {
        let (roster, animation, tags) = {
            let scene = self.session.scene.lock();
            let state = scene.state();
            (
                state.roster.clone(),
                state.animation.clone(),
                state.effective_tags(),
            )
        };
        let Some(animation) = animation else {
            return;
        };
        let policy = PolicyEvaluator::new(&self.config.systems, |p| self.world.has_plugin(p));

        let mut effects = self.session.effects.lock();
        let mut ids = self.session.identifiers.lock();
        let mut keep = HashSet::new();
        for actor in &roster {
            for system in policy.systems_for(actor) {
                let key = EffectKey::new(actor.id, policy.tag_bound_direction(system), system);
                let active = match effects.get(&key).map(|e| e.tag_bound) {
                    // A timed effect holds this key; the guard owns it
                    Some(false) => continue,
                    Some(true) => true,
                    None => false,
                };
                match policy.evaluate_tags(actor, system, &animation, &tags, active) {
                    Decision::Activate => {
                        keep.insert(key);
                        effects.grant(
                            GrantRequest {
                                key,
                                actor_name: actor.name.clone(),
                                binding: Binding::TagBound,
                                animation: Some(animation.clone()),
                                tags: tags.clone(),
                            },
                            &mut ids,
                            self.world.as_ref(),
                            &self.queue,
                            now,
                        );
                    }
                    Decision::Maintain => {
                        keep.insert(key);
                    }
                    Decision::Deactivate | Decision::Skip => {}
                }
            }
        }

        for key in effects.tag_bound_keys() {
            if !keep.contains(&key) {
                effects.deactivate(&key, &self.queue);
            }
        }
        // A grant still waiting on readiness is stale once its tags stop matching
        for key in effects.pending_tag_bound_keys() {
            if !keep.contains(&key) {
                effects.cancel_retry(&key);
            }
        }
    }

    fn on_climax(&self, name: &str, gender: Option<Gender>, animation: Option<&str>, now: Instant) {
        let (actor, roster, scene_animation, tags) = {
            let mut scene = self.session.scene.lock();
            if !scene.is_active() {
                tracing::debug!(actor = name, "Climax outside a scene ignored");
                return;
            }
            let Some(actor) = scene.attribute_actor(name, self.world.as_ref(), self.radius())
            else {
                return;
            };
            (
                actor,
                scene.roster().to_vec(),
                scene.state().animation.clone(),
                scene.climax_tags(animation),
            )
        };
        let gender = gender.unwrap_or(actor.gender);

        let mut effects = self.session.effects.lock();
        if !effects.admit_occurrence(actor.id, now) {
            return;
        }
        let counter = self.session.counters.lock().increment(actor.id, &actor.name, now);

        let policy = PolicyEvaluator::new(&self.config.systems, |p| self.world.has_plugin(p));
        let mut ids = self.session.identifiers.lock();
        let animation = animation.map(str::to_string).or(scene_animation);

        let mut recipients = vec![(&actor, EffectDirection::Outgoing)];
        recipients.extend(
            roster
                .iter()
                .filter(|partner| partner.id != actor.id)
                .map(|partner| (partner, EffectDirection::Incoming)),
        );

        let mut granted = 0;
        for (recipient, direction) in recipients {
            for system in policy.systems_for(recipient) {
                let key = EffectKey::new(recipient.id, direction, system);
                let decision =
                    policy.evaluate_occurrence(system, direction, gender, effects.is_active(&key));
                if decision != Decision::Activate {
                    continue;
                }
                let secs = system.config(&self.config.systems).direction(direction).duration_secs;
                let outcome = effects.grant(
                    GrantRequest {
                        key,
                        actor_name: recipient.name.clone(),
                        binding: Binding::Timed(seconds(secs)),
                        animation: animation.clone(),
                        tags: tags.clone(),
                    },
                    &mut ids,
                    self.world.as_ref(),
                    &self.queue,
                    now,
                );
                if outcome == GrantOutcome::Applied {
                    granted += 1;
                }
            }
        }

        if let Some(transition) = counter {
            ids.ensure_resolved(self.world.as_ref());
            self.push_counter_transitions(vec![transition], &ids);
        }
        tracing::info!(
            actor = %actor.name,
            gender = gender.as_str(),
            roster = roster.len(),
            granted,
            "Climax processed"
        );
    }

    fn on_scene_end(&self, now: Instant) {
        let Some(roster) = self.session.scene.lock().end(Local::now()) else {
            tracing::debug!("Scene end outside a scene ignored");
            return;
        };
        let effects = {
            let mut tracker = self.session.effects.lock();
            tracker.clear_session();
            tracker.active_keys()
        };
        let lapsed = self.session.counters.lock().clear();
        {
            let ids = self.session.identifiers.lock();
            self.push_counter_transitions(lapsed, &ids);
        }
        self.session.rewards.lock().deactivate_all();

        let delay = Duration::from_millis(self.config.scene.cleanup_delay_ms);
        tracing::debug!(effects = effects.len(), delay_ms = delay.as_millis() as u64, "Cleanup scheduled");
        *self.session.pending_cleanup.lock() = Some(PendingCleanup {
            due: now + delay,
            roster,
            effects,
        });
    }

    /// Run the end-of-scene cleanup if it is due (or unconditionally with
    /// `force`). Returns whether one ran.
    pub fn run_pending_cleanup(&self, force: bool, now: Instant) -> bool {
        let pending = {
            let mut slot = self.session.pending_cleanup.lock();
            match slot.as_ref() {
                Some(cleanup) if force || cleanup.due <= now => slot.take(),
                _ => None,
            }
        };
        let Some(cleanup) = pending else {
            return false;
        };

        let deactivated = {
            let mut effects = self.session.effects.lock();
            let mut count = cleanup
                .effects
                .iter()
                .filter(|key| effects.deactivate(key, &self.queue).is_some())
                .count();
            count += effects.deactivate_all(&self.queue).len();
            count
        };
        if deactivated > 0 {
            self.queue
                .push(HostTask::Notify(format!("Scene over, {deactivated} effects lifted")));
        }

        let mut ids = self.session.identifiers.lock();
        let mut report = replay_action_log(
            &self.action_log,
            self.config.action_log.compact_over_bytes,
            &mut ids,
            self.world.as_ref(),
            &self.queue,
        );
        report.merge(scan_group_membership(
            &cleanup.roster,
            &self.config.systems,
            &mut ids,
            self.world.as_ref(),
            &self.queue,
        ));
        tracing::info!(
            deactivated,
            replayed = report.deactivated,
            forced = force,
            "Scene cleanup finished"
        );
        true
    }

    // ─── Periodic work ───────────────────────────────────────────────────────

    /// One monitor iteration. Each step is isolated; a panicking step is
    /// logged and the rest still run.
    pub fn tick(&self, now: Instant) -> TickReport {
        TickReport {
            lines: isolated("poll", || self.poll_log(now)),
            retries: isolated("retries", || {
                self.session
                    .effects
                    .lock()
                    .process_retries(self.world.as_ref(), &self.queue, now)
            }),
            expired: isolated("expiry", || {
                self.session
                    .effects
                    .lock()
                    .process_expiry(&self.queue, now)
                    .len()
            }),
            counters_lapsed: isolated("counters", || self.check_counters(now)),
            cleanup_ran: isolated("cleanup", || self.run_pending_cleanup(false, now)),
            reward_tasks: isolated("rewards", || self.fire_rewards(now)),
        }
    }

    fn check_counters(&self, now: Instant) -> usize {
        let lapsed = self.session.counters.lock().check_windows(now);
        let count = lapsed.len();
        if count > 0 {
            let ids = self.session.identifiers.lock();
            self.push_counter_transitions(lapsed, &ids);
        }
        count
    }

    fn fire_rewards(&self, now: Instant) -> usize {
        let roster = self.session.scene.lock().roster().to_vec();
        let ids = self.session.identifiers.lock();
        let tasks = self.session.rewards.lock().due(now, &roster, &ids);
        let count = tasks.len();
        for task in tasks {
            self.queue.push(task);
        }
        count
    }

    fn push_counter_transitions(&self, transitions: Vec<CounterTransition>, ids: &IdentifierCache) {
        if transitions.is_empty() {
            return;
        }
        let Some(effect) = ids.counter_effect() else {
            tracing::debug!("Counter effect unresolved, transition not applied");
            return;
        };
        for transition in transitions {
            let (actor, actor_name, active) = match transition {
                CounterTransition::Activated {
                    actor,
                    actor_name,
                    count,
                } => {
                    self.queue
                        .push(HostTask::Notify(format!("{actor_name} reached {count} climaxes")));
                    (actor, actor_name, true)
                }
                CounterTransition::Deactivated { actor, actor_name } => (actor, actor_name, false),
            };
            self.queue.push(HostTask::ApplyEffect {
                target: actor,
                effect,
                active,
                record: Some(EffectRecord {
                    system: COUNTER_SYSTEM.to_string(),
                    actor_name,
                    actor,
                    direction: EffectDirection::Outgoing,
                }),
            });
        }
    }

    // ─── Manual control ──────────────────────────────────────────────────────

    pub fn clear_effect(&self, key: &EffectKey) -> bool {
        self.session.effects.lock().clear_effect(key, &self.queue)
    }

    pub fn clear_actor(&self, actor: ActorId) -> usize {
        self.session.effects.lock().clear_actor(actor, &self.queue)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    pub fn on_lifecycle(&self, event: LifecycleEvent) {
        tracing::info!(event = ?event, "Host lifecycle event");
        self.session.reset();
    }

    /// Deactivate everything still registered, then lift whatever the action
    /// log says may still be live.
    pub fn shutdown_cleanup(&self) -> CleanupReport {
        let deactivated = self.session.effects.lock().deactivate_all(&self.queue).len();
        let lapsed = self.session.counters.lock().clear();
        let mut ids = self.session.identifiers.lock();
        self.push_counter_transitions(lapsed, &ids);
        let mut report = replay_action_log(
            &self.action_log,
            self.config.action_log.compact_over_bytes,
            &mut ids,
            self.world.as_ref(),
            &self.queue,
        );
        report.deactivated += deactivated;
        tracing::info!(deactivated = report.deactivated, "Shutdown cleanup finished");
        report
    }
}

fn log_paths(config: &EngineConfig) -> Vec<PathBuf> {
    config.monitor.log_paths.iter().map(PathBuf::from).collect()
}

fn seconds(secs: f32) -> Duration {
    Duration::try_from_secs_f32(secs).unwrap_or(Duration::ZERO)
}

fn isolated<T: Default>(step: &'static str, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!(step, "Tick step panicked, continuing");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::EffectSystem;
    use crate::host::{
        ActorInfo, AppliedCall, FormHandle, HostTaskReceiver, MemoryWorld, Readiness,
        host_task_channel,
    };
    use crate::tags::Tag;
    use std::io::Write;
    use std::sync::mpsc;

    const PLAYER: ActorId = ActorId(0x14);
    const LYDIA: ActorId = ActorId(0x20);
    const STD_OUT: FormHandle = FormHandle(0x0500_0801);
    const STD_IN: FormHandle = FormHandle(0x0500_0802);
    const COUNTER: FormHandle = FormHandle(0x0500_0830);

    struct Fixture {
        engine: SceneEngine,
        world: MemoryWorld,
        receiver: HostTaskReceiver,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn drain(&mut self) -> usize {
            let mut host = self.world.clone();
            self.receiver.drain(&mut host)
        }

        fn line(&self, line: &str, now: Instant) {
            assert!(self.engine.process_line(line, now), "unrecognized: {line}");
        }
    }

    fn info(id: ActorId, name: &str, gender: Gender, is_player: bool) -> ActorInfo {
        ActorInfo {
            id,
            base_id: id.0,
            name: name.to_string(),
            gender,
            vampiric: false,
            werebeast: false,
            captured: true,
            is_player,
        }
    }

    fn make_world() -> MemoryWorld {
        let world = MemoryWorld::new();
        world.add_actor(info(PLAYER, "Dovahkiin", Gender::Male, true), Readiness::READY, 0.0);
        world.add_actor(info(LYDIA, "Lydia", Gender::Female, false), Readiness::READY, 40.0);
        world.add_form("Ember.esp", 0x801, STD_OUT);
        world.add_form("Ember.esp", 0x802, STD_IN);
        world.add_form("Ember.esp", 0x830, COUNTER);
        world
    }

    fn test_config(mut config: EngineConfig, dir: &std::path::Path) -> EngineConfig {
        config.monitor.startup_grace_secs = 0;
        config.monitor.log_paths = vec![dir.join("scene.log").display().to_string()];
        config
    }

    fn fixture_with(config: EngineConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(config, dir.path());
        let log = Arc::new(ActionLog::open(dir.path().join("actions.log")).unwrap());
        let world = make_world();

        let (queue, receiver) = host_task_channel(Arc::clone(&log));
        let engine = SceneEngine::new(config, Arc::new(world.clone()), queue, log);
        Fixture {
            engine,
            world,
            receiver,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(EngineConfig::default())
    }

    #[test]
    fn test_climax_grants_outgoing_to_actor_and_incoming_to_partners() {
        let mut f = fixture();
        let now = Instant::now();
        f.line("Animation changed: Ember_Missionary_S1", now);
        assert!(f.engine.scene().in_scene);
        assert_eq!(f.engine.scene().roster.len(), 2);

        f.line("Climax: Lydia | female", now);
        f.drain();
        assert!(f.world.carries(LYDIA, STD_OUT));
        assert!(f.world.carries(PLAYER, STD_IN));
        assert!(!f.world.carries(PLAYER, STD_OUT));
        assert_eq!(f.engine.active_effects().len(), 2);
    }

    #[test]
    fn test_duplicate_climax_within_window_is_suppressed() {
        let mut f = fixture();
        let now = Instant::now();
        f.line("Animation changed: a", now);
        f.line("Climax: Lydia | female", now);
        let first = f.drain();

        f.line("Climax: Lydia | female | b", now + Duration::from_millis(500));
        assert_eq!(f.drain(), 0);
        assert_eq!(first, 2);
        assert_eq!(f.engine.session().counters.lock().count(LYDIA), 1);
    }

    #[test]
    fn test_gender_filter_uses_climaxing_actor() {
        let mut config = EngineConfig::default();
        config.systems.standard.incoming.genders = "male".to_string();
        let mut f = fixture_with(config);
        let now = Instant::now();
        f.line("Animation changed: a", now);
        f.line("Climax: Lydia | female", now);
        f.drain();
        assert!(f.world.carries(LYDIA, STD_OUT));
        assert!(!f.world.carries(PLAYER, STD_IN));
    }

    #[test]
    fn test_scene_end_schedules_delayed_cleanup() {
        let mut f = fixture();
        let now = Instant::now();
        f.line("Animation changed: a", now);
        f.line("Climax: Lydia | female", now);
        f.drain();

        f.line("Scene ended", now);
        let scene = f.engine.scene();
        assert!(!scene.in_scene);
        assert!(scene.roster.is_empty());
        assert!(f.engine.has_pending_cleanup());
        // Still registered until the debounce passes
        assert_eq!(f.engine.active_effects().len(), 2);

        assert!(!f.engine.run_pending_cleanup(false, now + Duration::from_millis(999)));
        let report = f.engine.tick(now + Duration::from_secs(1));
        assert!(report.cleanup_ran);
        assert!(f.engine.active_effects().is_empty());
        f.drain();
        assert_eq!(f.world.carried_count(), 0);
        assert!(f
            .world
            .applied()
            .contains(&AppliedCall::Notify("Scene over, 2 effects lifted".to_string())));
    }

    #[test]
    fn test_new_scene_runs_pending_cleanup_first() {
        let mut f = fixture();
        let now = Instant::now();
        f.line("Animation changed: a", now);
        f.line("Climax: Lydia | female", now);
        f.line("Thread ended", now);
        assert!(f.engine.has_pending_cleanup());

        f.line("Animation changed: a", now + Duration::from_millis(100));
        assert!(!f.engine.has_pending_cleanup());
        assert!(f.engine.scene().in_scene);
        assert!(f.engine.active_effects().is_empty());
        f.drain();
        assert_eq!(f.world.carried_count(), 0);
    }

    #[test]
    fn test_timed_effects_expire_on_tick() {
        let mut config = EngineConfig::default();
        config.systems.standard.outgoing.duration_secs = 5.0;
        let mut f = fixture_with(config);
        let now = Instant::now();
        f.line("Animation changed: a", now);
        f.line("Climax: Lydia | female", now);

        let report = f.engine.tick(now + Duration::from_secs(5));
        assert_eq!(report.expired, 1);
        f.drain();
        assert!(!f.world.carries(LYDIA, STD_OUT));
        assert!(f.world.carries(PLAYER, STD_IN));
    }

    #[test]
    fn test_tag_bound_follows_animation() {
        let mut config = EngineConfig::default();
        config.systems.standard.tag_bound.enabled = true;
        config.systems.standard.tag_bound.tags = "rough, high_intensity".to_string();
        config.systems.standard.tag_bound.direction = EffectDirection::Incoming;
        let mut f = fixture_with(config);
        let now = Instant::now();

        f.line("Animation changed: Ember_Rough_S1", now);
        f.drain();
        assert!(f.world.carries(LYDIA, STD_IN));
        assert!(f.world.carries(PLAYER, STD_IN));

        f.line("Animation changed: Ember_Gentle_S1", now);
        f.drain();
        assert_eq!(f.world.carried_count(), 0);

        // The speed tag counts at the next evaluation
        f.line("Speed changed: 3", now);
        assert_eq!(f.engine.scene().intensity, Some(Tag::HighIntensity));
        f.line("Animation changed: Ember_Gentle_S2", now);
        f.drain();
        assert!(f.world.carries(LYDIA, STD_IN));
    }

    #[test]
    fn test_unready_tag_bound_grant_dropped_when_tags_stop_matching() {
        let mut config = EngineConfig::default();
        config.systems.standard.tag_bound.enabled = true;
        config.systems.standard.tag_bound.tags = "rough".to_string();
        config.systems.standard.tag_bound.direction = EffectDirection::Incoming;
        let mut f = fixture_with(config);
        f.world.set_readiness(LYDIA, Readiness::default());
        let now = Instant::now();

        f.line("Animation changed: Ember_Rough_S1", now);
        assert_eq!(f.engine.session().effects.lock().pending_retries(), 1);

        f.line("Animation changed: Ember_Gentle_S1", now);
        assert_eq!(f.engine.session().effects.lock().pending_retries(), 0);

        f.world.set_readiness(LYDIA, Readiness::READY);
        let report = f.engine.tick(now + Duration::from_secs(1));
        assert_eq!(report.retries.applied, 0);
        f.drain();
        assert!(!f.world.carries(LYDIA, STD_IN));
        assert!(f.engine.active_effects().is_empty());
    }

    #[test]
    fn test_counter_effect_at_threshold() {
        let mut f = fixture();
        let start = Instant::now();
        f.line("Animation changed: a", start);
        for i in 0..5 {
            f.line("Climax: Lydia | female", start + Duration::from_secs(3 * i));
        }
        f.drain();
        assert!(f.world.carries(LYDIA, COUNTER));
        assert!(f
            .world
            .applied()
            .contains(&AppliedCall::Notify("Lydia reached 5 climaxes".to_string())));

        f.engine.tick(start + Duration::from_secs(12 + 60));
        f.drain();
        assert!(!f.world.carries(LYDIA, COUNTER));
        assert_eq!(f.engine.session().counters.lock().count(LYDIA), 5);
    }

    #[test]
    fn test_unknown_actor_and_out_of_scene_climax_ignored() {
        let mut f = fixture();
        let now = Instant::now();
        f.line("Climax: Lydia | female", now);
        f.line("Animation changed: a", now);
        f.line("Climax: Nobody | male", now);
        assert_eq!(f.drain(), 0);
    }

    #[test]
    fn test_poll_log_reads_scene_file() {
        let mut f = fixture();
        let path = f.engine.log_paths()[0].clone();
        std::fs::write(
            &path,
            "[1] Animation changed: Ember_Doggy\n[2] Climax: Lydia | female\nnoise\n",
        )
        .unwrap();
        assert_eq!(f.engine.poll_log(Instant::now()), 3);
        f.drain();
        assert!(f.world.carries(LYDIA, STD_OUT));
    }

    #[test]
    fn test_manual_clear_and_lifecycle_reset() {
        let mut f = fixture();
        let now = Instant::now();
        f.line("Animation changed: a", now);
        f.line("Climax: Lydia | female", now);
        f.drain();

        let key = EffectKey::new(LYDIA, EffectDirection::Outgoing, EffectSystem::Standard);
        assert!(f.engine.clear_effect(&key));
        assert!(!f.engine.clear_effect(&key));
        assert_eq!(f.engine.clear_actor(PLAYER), 1);
        f.drain();
        assert_eq!(f.world.carried_count(), 0);

        f.engine.on_lifecycle(LifecycleEvent::PostLoad);
        assert!(!f.engine.scene().in_scene);
        assert!(!f.engine.session().identifiers.lock().is_resolved());
    }

    #[test]
    fn test_shutdown_cleanup_lifts_everything() {
        let mut f = fixture();
        let now = Instant::now();
        f.line("Animation changed: a", now);
        f.line("Climax: Lydia | female", now);
        f.drain();
        f.world.clear_applied();

        let report = f.engine.shutdown_cleanup();
        assert!(report.deactivated >= 2);
        f.drain();
        assert_eq!(f.world.carried_count(), 0);
        assert!(f
            .world
            .applied()
            .iter()
            .all(|c| matches!(c, AppliedCall::Effect { active: false, .. })));
    }

    /// Holds the first `player()` call until released, so a test can act
    /// while a poll is mid-batch.
    struct GatedWorld {
        inner: MemoryWorld,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl WorldQuery for GatedWorld {
        fn player(&self) -> Option<ActorInfo> {
            let release = self.release.lock().take();
            if let Some(release) = release {
                if let Some(entered) = self.entered.lock().take() {
                    let _ = entered.send(());
                }
                let _ = release.recv();
            }
            self.inner.player()
        }

        fn actor(&self, id: ActorId) -> Option<ActorInfo> {
            self.inner.actor(id)
        }

        fn actors_near_player(&self, radius: f32) -> Vec<ActorInfo> {
            self.inner.actors_near_player(radius)
        }

        fn readiness(&self, id: ActorId) -> Readiness {
            self.inner.readiness(id)
        }

        fn group_rank(&self, id: ActorId, group: FormHandle) -> Option<i32> {
            self.inner.group_rank(id, group)
        }

        fn resolve_form(&self, plugin: &str, local_id: u32) -> Option<FormHandle> {
            self.inner.resolve_form(plugin, local_id)
        }

        fn resolve_named(&self, plugin: &str, name: &str) -> Option<FormHandle> {
            self.inner.resolve_named(plugin, name)
        }

        fn has_plugin(&self, plugin: &str) -> bool {
            self.inner.has_plugin(plugin)
        }
    }

    #[test]
    fn test_overlapping_polls_process_batches_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(EngineConfig::default(), dir.path());
        let log = Arc::new(ActionLog::open(dir.path().join("actions.log")).unwrap());
        let world = make_world();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gated = GatedWorld {
            inner: world.clone(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        };
        let (queue, mut receiver) = host_task_channel(Arc::clone(&log));
        let engine = SceneEngine::new(config, Arc::new(gated), queue, log);

        let path = engine.log_paths()[0].clone();
        std::fs::write(&path, "Animation changed: a\nClimax: Lydia | female\n").unwrap();

        std::thread::scope(|s| {
            let first = s.spawn(|| engine.poll_log(Instant::now()));
            entered_rx.recv().unwrap();

            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "Scene ended").unwrap();
            let second = s.spawn(|| engine.poll_log(Instant::now()));
            std::thread::sleep(Duration::from_millis(50));

            release_tx.send(()).unwrap();
            assert_eq!(first.join().unwrap(), 2);
            assert_eq!(second.join().unwrap(), 1);
        });

        let mut host = world.clone();
        receiver.drain(&mut host);
        assert!(!engine.scene().in_scene);
        assert!(engine.has_pending_cleanup());
        assert!(world.carries(LYDIA, STD_OUT));
        assert!(world.carries(PLAYER, STD_IN));
    }
}
