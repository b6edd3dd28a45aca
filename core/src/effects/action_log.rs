//! Structured effect-state log
//!
//! Every effect transition the host applies is appended as one line:
//!
//! ```text
//! EFFECT-STATE | standard | Lydia | 0x000A2C94 | outgoing | ACTIVE | 2026-10-18T21:04:11.532+02:00
//! ```
//!
//! The log survives crashes, so replaying the latest state per
//! (actor, direction, system) tells the cleanup pass which effects may still
//! be live in the host world even when in-memory tracking was lost.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use ember_types::{ActionLogConfig, EffectDirection};
use parking_lot::Mutex;
use thiserror::Error;

use crate::host::ActorId;

const MARKER: &str = "EFFECT-STATE";
const SEPARATOR: &str = " | ";

#[derive(Debug, Error)]
pub enum ActionLogError {
    #[error("action log I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectState {
    Active,
    Inactive,
}

impl EffectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// (actor, direction, system name)
pub type RecordKey = (ActorId, EffectDirection, String);

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    pub system: String,
    pub actor_name: String,
    pub actor: ActorId,
    pub direction: EffectDirection,
    pub state: EffectState,
    pub timestamp: DateTime<FixedOffset>,
}

impl ActionRecord {
    pub fn key(&self) -> RecordKey {
        (self.actor, self.direction, self.system.clone())
    }

    pub fn to_line(&self) -> String {
        // The separator must never appear inside a field
        let name = self.actor_name.replace('|', "/");
        [
            MARKER,
            &self.system,
            &name,
            &self.actor.to_string(),
            self.direction.as_str(),
            self.state.as_str(),
            &self.timestamp.to_rfc3339(),
        ]
        .join(SEPARATOR)
    }

    /// Parse a record, ignoring anything before the marker. Foreign lines
    /// yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let start = line.find(MARKER)?;
        let mut fields = line[start..].split('|').map(str::trim);
        if fields.next()? != MARKER {
            return None;
        }
        let system = fields.next()?.to_string();
        let actor_name = fields.next()?.to_string();
        let actor = ActorId::parse_hex(fields.next()?)?;
        let direction = EffectDirection::parse(fields.next()?)?;
        let state = EffectState::parse(fields.next()?)?;
        let timestamp = DateTime::parse_from_rfc3339(fields.next()?).ok()?;
        if system.is_empty() {
            return None;
        }
        Some(Self {
            system,
            actor_name,
            actor,
            direction,
            state,
            timestamp,
        })
    }
}

/// Append-only action log. A log without a path accepts writes and replays
/// as empty.
#[derive(Debug)]
pub struct ActionLog {
    path: Option<PathBuf>,
    writer: Mutex<Option<File>>,
}

impl ActionLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ActionLogError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| io_err(&path, e))?;
        }
        let file = open_append(&path)?;
        Ok(Self {
            path: Some(path),
            writer: Mutex::new(Some(file)),
        })
    }

    /// An empty configured path disables the log.
    pub fn from_config(config: &ActionLogConfig) -> Result<Self, ActionLogError> {
        if config.path.trim().is_empty() {
            tracing::info!("Action log disabled, crash replay unavailable");
            return Ok(Self::disabled());
        }
        Self::open(config.path.trim())
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, record: &ActionRecord) -> Result<(), ActionLogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut writer = self.writer.lock();
        if writer.is_none() {
            *writer = Some(open_append(path)?);
        }
        if let Some(file) = writer.as_mut() {
            writeln!(file, "{}", record.to_line()).map_err(|e| io_err(path, e))?;
            file.flush().map_err(|e| io_err(path, e))?;
        }
        tracing::debug!(
            system = %record.system,
            actor = %record.actor,
            direction = record.direction.as_str(),
            state = record.state.as_str(),
            "Effect state recorded"
        );
        Ok(())
    }

    /// Latest record per key, in file order.
    pub fn read_latest(&self) -> Result<HashMap<RecordKey, ActionRecord>, ActionLogError> {
        let Some(path) = &self.path else {
            return Ok(HashMap::new());
        };
        // Hold the writer lock so a concurrent append can't interleave a half line
        let _guard = self.writer.lock();
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(io_err(path, e)),
        };

        let mut latest = HashMap::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| io_err(path, e))?;
            if let Some(record) = ActionRecord::parse(&line) {
                latest.insert(record.key(), record);
            }
        }
        Ok(latest)
    }

    /// Rewrite the log with only the latest record per key once it exceeds
    /// `limit_bytes`. Returns whether a rewrite happened.
    pub fn compact_if_over(&self, limit_bytes: u64) -> Result<bool, ActionLogError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(false),
        };
        if size <= limit_bytes {
            return Ok(false);
        }

        let mut records: Vec<ActionRecord> = self.read_latest()?.into_values().collect();
        records.sort_by_key(|r| r.timestamp);

        let mut writer = self.writer.lock();
        // Close the append handle before replacing the file underneath it
        *writer = None;
        let tmp = path.with_extension("compact");
        {
            let mut out = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
            for record in &records {
                writeln!(out, "{}", record.to_line()).map_err(|e| io_err(&tmp, e))?;
            }
            out.flush().map_err(|e| io_err(&tmp, e))?;
        }
        fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
        *writer = Some(open_append(path)?);

        tracing::info!(
            path = %path.display(),
            before_bytes = size,
            records = records.len(),
            "Compacted action log"
        );
        Ok(true)
    }
}

fn open_append(path: &Path) -> Result<File, ActionLogError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))
}

fn io_err(path: &Path, source: std::io::Error) -> ActionLogError {
    ActionLogError::Io {
        path: path.to_path_buf(),
        source,
    }
}
