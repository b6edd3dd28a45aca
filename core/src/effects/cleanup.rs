//! Cleanup fallbacks
//!
//! In-memory tracking dies with the process; the host world does not. These
//! two passes find effects that may still be applied and lift them. Both are
//! idempotent: lifting an effect an actor does not carry is a host no-op, and
//! every lift is itself recorded so a second replay finds nothing left.

use ember_types::{EffectDirection, SystemsConfig};

use super::action_log::{ActionLog, EffectState};
use super::system::EffectSystem;
use crate::context::IdentifierCache;
use crate::host::{EffectRecord, HostTask, HostTaskQueue, WorldQuery};
use crate::state::ActorSnapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Keys (replay) or memberships (scan) that looked live
    pub examined: usize,
    pub deactivated: usize,
    pub not_ready: usize,
    pub unresolved: usize,
}

impl CleanupReport {
    pub fn merge(&mut self, other: CleanupReport) {
        self.examined += other.examined;
        self.deactivated += other.deactivated;
        self.not_ready += other.not_ready;
        self.unresolved += other.unresolved;
    }
}

/// Lift every key whose latest recorded state is ACTIVE. Compacts the log
/// first when it has outgrown `compact_over_bytes`.
pub fn replay_action_log(
    log: &ActionLog,
    compact_over_bytes: u64,
    ids: &mut IdentifierCache,
    world: &dyn WorldQuery,
    queue: &HostTaskQueue,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    if let Err(e) = log.compact_if_over(compact_over_bytes) {
        tracing::warn!(error = %e, "Action log compaction failed");
    }
    let latest = match log.read_latest() {
        Ok(latest) => latest,
        Err(e) => {
            tracing::warn!(error = %e, "Action log replay skipped");
            return report;
        }
    };

    let mut live: Vec<_> = latest
        .into_values()
        .filter(|r| r.state == EffectState::Active)
        .collect();
    live.sort_by(|a, b| a.key().cmp(&b.key()));

    for record in live {
        report.examined += 1;
        let Some(effect) = ids.effect_by_name(&record.system, record.direction, world) else {
            tracing::debug!(system = %record.system, actor = %record.actor, "Replay skipped, form unresolved");
            report.unresolved += 1;
            continue;
        };
        if !world.readiness(record.actor).is_ready() {
            report.not_ready += 1;
            continue;
        }
        queue.push(HostTask::ApplyEffect {
            target: record.actor,
            effect,
            active: false,
            record: Some(EffectRecord {
                system: record.system,
                actor_name: record.actor_name,
                actor: record.actor,
                direction: record.direction,
            }),
        });
        report.deactivated += 1;
    }

    if report.examined > 0 {
        tracing::info!(
            examined = report.examined,
            deactivated = report.deactivated,
            not_ready = report.not_ready,
            unresolved = report.unresolved,
            "Action log replay finished"
        );
    }
    report
}

/// Lift both directions of a system from every actor whose membership rank
/// in that system's group is at least the configured minimum.
pub fn scan_group_membership(
    actors: &[ActorSnapshot],
    systems: &SystemsConfig,
    ids: &mut IdentifierCache,
    world: &dyn WorldQuery,
    queue: &HostTaskQueue,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    ids.ensure_resolved(world);

    for system in EffectSystem::ALL {
        let Some(group) = ids.group(system) else {
            continue;
        };
        let min_rank = system.config(systems).min_group_rank;
        for actor in actors {
            let Some(rank) = world.group_rank(actor.id, group) else {
                continue;
            };
            if rank < min_rank {
                continue;
            }
            report.examined += 1;
            for direction in EffectDirection::ALL {
                let Some(effect) = ids.effect(system, direction) else {
                    report.unresolved += 1;
                    continue;
                };
                queue.push(HostTask::ApplyEffect {
                    target: actor.id,
                    effect,
                    active: false,
                    record: Some(EffectRecord {
                        system: system.as_str().to_string(),
                        actor_name: actor.name.clone(),
                        actor: actor.id,
                        direction,
                    }),
                });
                report.deactivated += 1;
            }
            tracing::debug!(system = %system, actor = %actor.name, rank, "Group member lifted");
        }
    }

    if report.examined > 0 {
        tracing::info!(
            members = report.examined,
            deactivated = report.deactivated,
            "Group membership scan finished"
        );
    }
    report
}
