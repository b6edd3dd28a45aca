//! Scene log tailing
//!
//! ```text
//! candidates ──► LogTailer::poll ──► LineDedup ──► new lines
//!      │
//!      └── parent dirs ──► LogWatcher (notify) ──► wake-up channel
//! ```

pub mod dedup;
pub mod tailer;
pub mod watcher;

pub use dedup::{LineDedup, line_hash};
pub use tailer::{LogTailer, PollResult};
pub use watcher::{LogWatcher, WatchError};
