use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use encoding_rs::WINDOWS_1252;
use memchr::{memchr_iter, memrchr};

use super::dedup::LineDedup;

/// Lines produced by one poll.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollResult {
    pub lines: Vec<String>,
    /// The cursor was reset because the file shrank or the selected
    /// candidate changed
    pub rotated: bool,
}

/// Incremental reader over the first existing candidate log file.
#[derive(Debug)]
pub struct LogTailer {
    candidates: Vec<PathBuf>,
    current: Option<PathBuf>,
    offset: u64,
    last_size: u64,
    dedup: LineDedup,
    started: Instant,
    grace: Duration,
}

impl LogTailer {
    pub fn new(candidates: Vec<PathBuf>, dedup_capacity: usize, grace: Duration) -> Self {
        Self {
            candidates,
            current: None,
            offset: 0,
            last_size: 0,
            dedup: LineDedup::new(dedup_capacity),
            started: Instant::now(),
            grace,
        }
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn dedup_len(&self) -> usize {
        self.dedup.len()
    }

    /// Read every complete line appended since the previous poll.
    ///
    /// Never fails: filesystem errors are logged and yield an empty result.
    pub fn poll(&mut self, now: Instant) -> PollResult {
        let mut result = PollResult::default();
        if now.saturating_duration_since(self.started) < self.grace {
            return result;
        }

        let Some(path) = self.candidates.iter().find(|p| p.exists()).cloned() else {
            return result;
        };
        if self.current.as_ref() != Some(&path) {
            if self.current.is_some() {
                tracing::info!(path = %path.display(), "Scene log source switched");
                result.rotated = true;
            }
            self.reset_cursor();
            self.current = Some(path.clone());
        }

        let size = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Failed to stat scene log");
                return result;
            }
        };

        if size < self.last_size {
            tracing::info!(
                path = %path.display(),
                previous = self.last_size,
                size,
                "Scene log shrank, restarting from the beginning"
            );
            self.reset_cursor();
            result.rotated = true;
        } else if size == self.last_size && self.offset > 0 {
            return result;
        }

        match self.read_from_offset(&path) {
            Ok(lines) => result.lines = lines,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Failed to read scene log");
                return result;
            }
        }
        self.last_size = size;
        result
    }

    fn reset_cursor(&mut self) {
        self.offset = 0;
        self.last_size = 0;
        self.dedup.clear();
    }

    fn read_from_offset(&mut self, path: &Path) -> std::io::Result<Vec<String>> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        // Only consume through the last newline; a partial tail is re-read later
        let Some(last_newline) = memrchr(b'\n', &bytes) else {
            return Ok(Vec::new());
        };
        let complete = &bytes[..=last_newline];

        let mut lines = Vec::new();
        let mut start = 0;
        for end in memchr_iter(b'\n', complete) {
            let raw = &complete[start..end];
            start = end + 1;
            let line = decode_line(raw);
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if self.dedup.check_and_insert(line) {
                lines.push(line.to_string());
            }
        }

        self.offset += complete.len() as u64;
        Ok(lines)
    }
}

/// UTF-8 first, Windows-1252 for anything else.
fn decode_line(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = WINDOWS_1252.decode(raw);
            decoded.into_owned()
        }
    }
}
