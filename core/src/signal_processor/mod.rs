//! Scene signal processing: lifecycle state machine and occurrence counters.

pub mod counter;
pub mod scene_state;

pub use counter::{CounterEngine, CounterTransition};
pub use scene_state::{SceneStateMachine, SceneTransition};
