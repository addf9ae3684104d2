//! Live tailing of a host event log.

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_types::event::{Event, EventKind};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::accumulator::SessionAccumulator;
use crate::events::{ReplaySummary, apply_line};

#[derive(Debug, Clone)]
pub enum WatcherEvent {
    /// The event log was created or appended to
    LogChanged,
    /// The event log was deleted
    LogRemoved,
    /// An error occurred
    Error(String),
}

pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    event_rx: Receiver<WatcherEvent>,
}

impl FileWatcher {
    /// Watch `log_path`. The parent directory is watched so that logs created
    /// or rotated after startup are still picked up.
    pub fn new(log_path: &Path) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel();
        let target = log_path.to_path_buf();
        let dir = log_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(event, &event_tx, &target),
                Err(e) => {
                    let _ = event_tx.send(WatcherEvent::Error(format!("Watch error: {e}")));
                }
            })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Could not watch directory {}", dir.display()))?;

        Ok(Self {
            _watcher: watcher,
            event_rx,
        })
    }

    pub fn try_recv(&self) -> Option<WatcherEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event. `None` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WatcherEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(WatcherEvent::Error("Watcher disconnected".to_string()))
            }
        }
    }
}

fn handle_fs_event(event: Event, tx: &Sender<WatcherEvent>, target: &Path) {
    if !event.paths.iter().any(|p| same_file_name(p, target)) {
        return;
    }

    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {
            let _ = tx.send(WatcherEvent::LogChanged);
        }
        EventKind::Remove(_) => {
            let _ = tx.send(WatcherEvent::LogRemoved);
        }
        _ => {}
    }
}

/// Watchers report absolute paths while the user may pass a relative one.
fn same_file_name(event_path: &Path, target: &Path) -> bool {
    event_path == target
        || (event_path.file_name() == target.file_name() && event_path.ends_with(target))
}

/// Reads the part of an event log appended since the last poll.
pub struct EventLogTailer {
    path: PathBuf,
    offset: u64,
    partial: String,
}

impl EventLogTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            partial: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply every complete line appended since the last call. A trailing
    /// line without its newline is held back until the writer finishes it.
    /// A log that shrank is assumed to be rotated and is read from the start.
    pub fn poll(&mut self, accumulator: &SessionAccumulator) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summary),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open {}", self.path.display()));
            }
        };

        let len = file.metadata().context("Failed to stat event log")?.len();
        if len < self.offset {
            self.reset();
        }
        if len == self.offset {
            return Ok(summary);
        }

        file.seek(SeekFrom::Start(self.offset))
            .context("Failed to seek event log")?;
        let mut chunk = Vec::new();
        file.read_to_end(&mut chunk)
            .context("Failed to read event log")?;
        self.offset += chunk.len() as u64;
        self.partial.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(newline) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=newline).collect();
            summary.merge(apply_line(&line, accumulator));
        }

        Ok(summary)
    }

    /// Forget the read position, e.g. after the log was removed.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.partial.clear();
    }
}
