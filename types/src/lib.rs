//! Shared configuration types for the Ember scene engine.
//!
//! Everything here is plain serde data. The engine (`ember-core`) owns the
//! behavior; this crate only describes what a config file may contain so the
//! CLI and any embedding host agree on one schema.

pub mod config;

pub use config::{
    ActionLogConfig, CounterConfig, DirectionPolicy, EffectDirection, EffectSystemConfig,
    EngineConfig, FormRef, MonitorConfig, NamedRef, RetryConfig, RewardConfig, RewardKind,
    RewardTarget, SceneConfig, SystemsConfig, TagBoundPolicy,
};
