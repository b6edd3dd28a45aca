pub mod context;
pub mod effects;
pub mod engine;
pub mod host;
pub mod log_tail;
pub mod monitor;
pub mod rewards;
pub mod scene_log;
pub mod signal_processor;
pub mod state;
pub mod tags;

// Re-exports for convenience
pub use context::{ConfigError, LoadedConfig, SessionContext, load_config, store_config};
pub use effects::{ActionLog, ActiveEffect, CleanupReport, EffectKey, EffectSystem};
pub use engine::{SceneEngine, TickReport};
pub use host::{
    ActorId, ActorInfo, FormHandle, Gender, HostTask, HostTaskQueue, HostTaskReceiver, HostWorld,
    LifecycleEvent, MemoryWorld, Readiness, WorldQuery, host_task_channel,
};
pub use monitor::MonitorLoop;
pub use scene_log::{SceneLine, classify_line};
pub use tags::{Tag, TagSet};
