use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ember_core::context::IdentifierCache;
use ember_core::effects::replay_action_log;
use ember_core::tags::{classify as classify_tags, climax_tags, describe, speed_tag};
use ember_core::{
    ActionLog, HostTaskReceiver, LoadedConfig, MemoryWorld, MonitorLoop, SceneEngine, SceneLine,
    classify_line, host_task_channel, load_config,
};
use ember_types::EngineConfig;

use crate::world::{WorldFile, build_world, load_world_file};

/// How often the stand-in host thread drains queued world changes.
const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

// ─── Configuration ───────────────────────────────────────────────────────────

fn config_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("ember").join("config.toml"));
    }
    paths.push(PathBuf::from("ember.toml"));
    paths
}

fn load(explicit: Option<&Path>) -> Result<LoadedConfig, String> {
    let loaded = load_config(&config_paths(explicit)).map_err(|e| e.to_string())?;
    if loaded.generated {
        tracing::info!(path = %loaded.path.display(), "Wrote default configuration");
    } else {
        tracing::info!(path = %loaded.path.display(), "Loaded configuration");
    }
    Ok(loaded)
}

/// An empty configured path falls back to the platform data directory.
fn open_action_log(config: &EngineConfig) -> Result<ActionLog, String> {
    if config.action_log.path.trim().is_empty()
        && let Some(dir) = dirs::data_local_dir()
    {
        return ActionLog::open(dir.join("ember").join("actions.log")).map_err(|e| e.to_string());
    }
    ActionLog::from_config(&config.action_log).map_err(|e| e.to_string())
}

fn dry_run_world(config: &EngineConfig, path: Option<&Path>) -> Result<MemoryWorld, String> {
    let file = match path {
        Some(path) => load_world_file(path)?,
        None => {
            tracing::warn!("No world file given, scenes cannot start without a player");
            WorldFile::default()
        }
    };
    build_world(config, &file)
}

fn drain(receiver: &mut HostTaskReceiver, world: &MemoryWorld) -> usize {
    let mut host = world.clone();
    let applied = receiver.drain(&mut host);
    if applied > 0 {
        tracing::debug!(applied, carried = world.carried_count(), "Host tasks applied");
    }
    applied
}

// ─── Commands ────────────────────────────────────────────────────────────────

pub async fn watch(config: Option<&Path>, world: Option<&Path>) -> Result<(), String> {
    let loaded = load(config)?;
    let world = dry_run_world(&loaded.config, world)?;
    let action_log = Arc::new(open_action_log(&loaded.config)?);
    let (queue, mut receiver) = host_task_channel(Arc::clone(&action_log));

    let engine = Arc::new(SceneEngine::new(
        loaded.config,
        Arc::new(world.clone()),
        queue,
        action_log,
    ));
    for path in engine.log_paths() {
        tracing::info!(path = %path.display(), "Scene log candidate");
    }
    let monitor = MonitorLoop::spawn(Arc::clone(&engine));

    let mut drain_timer = tokio::time::interval(DRAIN_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for interrupt");
                }
                break;
            }
            _ = drain_timer.tick() => {
                drain(&mut receiver, &world);
            }
        }
    }

    tracing::info!("Interrupted, cleaning up");
    let report = monitor.shutdown().await;
    drain(&mut receiver, &world);
    println!(
        "Shutdown cleanup: {} examined, {} deactivated, {} not ready, {} unresolved",
        report.examined, report.deactivated, report.not_ready, report.unresolved
    );
    Ok(())
}

pub fn classify(file: Option<&Path>, lines: &[String]) -> Result<(), String> {
    let mut input: Vec<String> = lines.to_vec();
    if let Some(path) = file {
        let text = std::fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
        input.extend(String::from_utf8_lossy(&text).lines().map(str::to_string));
    }

    let mut recognized = 0;
    for line in &input {
        let Some(event) = classify_line(line) else {
            continue;
        };
        recognized += 1;
        let detail = match &event {
            SceneLine::AnimationChanged(animation) => describe(&classify_tags(animation)),
            SceneLine::SpeedChanged(level) => speed_tag(*level).name().to_string(),
            SceneLine::Climax { animation, .. } => describe(&climax_tags(animation.as_deref())),
            SceneLine::SceneEnded | SceneLine::ThreadEnded => String::new(),
        };
        println!("{event:?}\t{detail}");
    }
    println!("{recognized} of {} lines recognized", input.len());
    Ok(())
}

pub fn replay(config: Option<&Path>, world: Option<&Path>) -> Result<(), String> {
    let loaded = load(config)?;
    let world = dry_run_world(&loaded.config, world)?;
    let action_log = Arc::new(open_action_log(&loaded.config)?);
    let (queue, mut receiver) = host_task_channel(Arc::clone(&action_log));

    let compact_over = loaded.config.action_log.compact_over_bytes;
    let mut ids = IdentifierCache::new(Arc::new(loaded.config));
    let report = replay_action_log(&action_log, compact_over, &mut ids, &world, &queue);
    let applied = drain(&mut receiver, &world);

    match action_log.path() {
        Some(path) => println!("Action log: {}", path.display()),
        None => println!("Action log disabled"),
    }
    println!(
        "{} live records, {} lifted, {} not ready, {} unresolved, {applied} host calls",
        report.examined, report.deactivated, report.not_ready, report.unresolved
    );
    Ok(())
}

pub fn check_config(config: Option<&Path>, print: bool) -> Result<(), String> {
    let loaded = load(config)?;
    println!("Configuration OK: {}", loaded.path.display());
    if print {
        let text = toml::to_string_pretty(&loaded.config).map_err(|e| e.to_string())?;
        println!("{text}");
    }
    Ok(())
}
