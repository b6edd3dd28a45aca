//! Hand-off from background workers to the host thread.
//!
//! Background tasks push [`HostTask`]s; the host calls
//! [`HostTaskReceiver::drain`] from its own update loop. World mutation never
//! happens anywhere else.

use std::sync::Arc;

use chrono::Local;
use ember_types::EffectDirection;
use tokio::sync::mpsc;

use super::{ActorId, FormHandle, HostWorld};
use crate::effects::action_log::{ActionLog, ActionRecord, EffectState};

/// Identifies an effect state change for the action log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectRecord {
    pub system: String,
    pub actor_name: String,
    pub actor: ActorId,
    pub direction: EffectDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostTask {
    ApplyEffect {
        target: ActorId,
        effect: FormHandle,
        active: bool,
        /// Written to the action log once the host has applied the change
        record: Option<EffectRecord>,
    },
    AddItem {
        target: ActorId,
        item: FormHandle,
        count: u32,
    },
    RestoreAttribute {
        target: ActorId,
        attribute: String,
        amount: f32,
    },
    Notify(String),
}

/// Sending half. Cheap to clone; never blocks.
#[derive(Debug, Clone)]
pub struct HostTaskQueue {
    tx: mpsc::UnboundedSender<HostTask>,
}

impl HostTaskQueue {
    pub fn push(&self, task: HostTask) {
        if self.tx.send(task).is_err() {
            tracing::debug!("Host task receiver dropped, task discarded");
        }
    }
}

/// Receiving half, owned by the host thread.
#[derive(Debug)]
pub struct HostTaskReceiver {
    rx: mpsc::UnboundedReceiver<HostTask>,
    action_log: Arc<ActionLog>,
}

pub fn host_task_channel(action_log: Arc<ActionLog>) -> (HostTaskQueue, HostTaskReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HostTaskQueue { tx }, HostTaskReceiver { rx, action_log })
}

impl HostTaskReceiver {
    /// Apply every queued task in order. Returns how many ran.
    pub fn drain(&mut self, world: &mut dyn HostWorld) -> usize {
        let mut applied = 0;
        while let Ok(task) = self.rx.try_recv() {
            self.apply(task, world);
            applied += 1;
        }
        applied
    }

    fn apply(&self, task: HostTask, world: &mut dyn HostWorld) {
        match task {
            HostTask::ApplyEffect {
                target,
                effect,
                active,
                record,
            } => {
                world.apply_effect(target, effect, active);
                if let Some(record) = record {
                    let state = if active {
                        EffectState::Active
                    } else {
                        EffectState::Inactive
                    };
                    let entry = ActionRecord {
                        system: record.system,
                        actor_name: record.actor_name,
                        actor: record.actor,
                        direction: record.direction,
                        state,
                        timestamp: Local::now().fixed_offset(),
                    };
                    if let Err(e) = self.action_log.append(&entry) {
                        tracing::warn!(error = %e, "Failed to append action log record");
                    }
                }
            }
            HostTask::AddItem {
                target,
                item,
                count,
            } => world.add_item(target, item, count),
            HostTask::RestoreAttribute {
                target,
                attribute,
                amount,
            } => world.restore_attribute(target, &attribute, amount),
            HostTask::Notify(message) => world.notify(&message),
        }
    }
}
