use std::collections::{BTreeSet, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("none of the candidate log directories exist")]
    NoDirectories,
}

/// Change notifications for the candidate scene logs.
///
/// Watches each candidate's parent directory (the file itself may not exist
/// yet) and sends a wake-up whenever an event touches a candidate file name.
pub struct LogWatcher {
    _watcher: RecommendedWatcher,
    directories: Vec<PathBuf>,
}

impl LogWatcher {
    pub fn start(candidates: &[PathBuf], wake: mpsc::Sender<()>) -> Result<Self, WatchError> {
        let names: HashSet<OsString> = candidates
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
            .collect();
        let directories: BTreeSet<PathBuf> = candidates
            .iter()
            .filter_map(|p| p.parent())
            .filter(|d| d.is_dir())
            .map(Path::to_path_buf)
            .collect();
        if directories.is_empty() {
            return Err(WatchError::NoDirectories);
        }

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_relevant(&event, &names) {
                    // A full channel already holds a pending wake-up
                    let _ = wake.try_send(());
                }
            }
            Err(e) => tracing::debug!(error = %e, "File watcher error"),
        })?;

        for dir in &directories {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            tracing::debug!(dir = %dir.display(), "Watching scene log directory");
        }

        Ok(Self {
            _watcher: watcher,
            directories: directories.into_iter().collect(),
        })
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }
}

fn is_relevant(event: &Event, names: &HashSet<OsString>) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .filter_map(|p| p.file_name())
        .any(|name| names.contains(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    fn names(list: &[&str]) -> HashSet<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_only_candidate_names_are_relevant() {
        let names = names(&["scene.log"]);
        let hit = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("/tmp/x/scene.log".into());
        let miss = Event::new(EventKind::Create(CreateKind::File)).add_path("/tmp/x/other.log".into());
        let access = Event::new(EventKind::Access(AccessKind::Any)).add_path("/tmp/x/scene.log".into());
        assert!(is_relevant(&hit, &names));
        assert!(!is_relevant(&miss, &names));
        assert!(!is_relevant(&access, &names));
    }

    #[test]
    fn test_missing_directories_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let result = LogWatcher::start(&[PathBuf::from("/definitely/not/here/scene.log")], tx);
        assert!(matches!(result, Err(WatchError::NoDirectories)));
    }

    #[test]
    fn test_watches_existing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let watcher = LogWatcher::start(&[dir.path().join("scene.log")], tx).unwrap();
        assert_eq!(watcher.directories(), &[dir.path().to_path_buf()]);
    }
}
