//! Change source: filesystem notifications in, settled file paths out.
//!
//! ```text
//! notify callback ──WatchMessage──┐
//! Ctrl-C thread  ──Shutdown──────┤
//!                                 ▼
//!                      DirectoryWatcher::run
//!                                 │  SettleTracker
//!                                 ▼
//!                      handler(path)  once the file stopped changing
//! ```
//!
//! A creation event arrives as soon as the file's directory entry exists,
//! usually before its writer has finished. New paths are therefore held in a
//! [`SettleTracker`] until no event has touched them for `watch.settle_ms`,
//! and only then handed to the handler. Later write events for a pending
//! path restart its quiet period. Modifications of files nobody is waiting
//! for are ignored.
//!
//! The loop blocks on the channel: indefinitely while nothing is pending,
//! otherwise until the earliest settle deadline.

use crate::config::WatchSettings;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Cannot watch {}: {source}", path.display())]
    Notify {
        path: PathBuf,
        source: notify::Error,
    },
}

/// Input of the watch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    /// A path appeared (created or moved in).
    Created(PathBuf),
    /// A path was written to.
    Changed(PathBuf),
    /// A path disappeared (deleted or moved out).
    Removed(PathBuf),
    /// Stop after the current message.
    Shutdown,
}

/// Tracks newly created files until they stop changing.
#[derive(Debug)]
pub struct SettleTracker {
    pending: HashMap<PathBuf, Instant>,
    settle: Duration,
}

impl SettleTracker {
    pub fn new(settle: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            settle,
        }
    }

    /// Start (or restart) the quiet period of a new path.
    pub fn created(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now);
    }

    /// Restart the quiet period of a pending path. Unknown paths are ignored.
    pub fn changed(&mut self, path: &Path, now: Instant) {
        if let Some(last) = self.pending.get_mut(path) {
            *last = now;
        }
    }

    pub fn removed(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Remove and return every path whose quiet period has elapsed, sorted.
    pub fn take_settled(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut settled: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, last)| now.saturating_duration_since(**last) >= self.settle)
            .map(|(path, _)| path.clone())
            .collect();
        settled.sort();
        for path in &settled {
            self.pending.remove(path);
        }
        settled
    }

    /// When the next pending path settles.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().map(|last| *last + self.settle)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Translate a notify event into watch messages.
///
/// Folder creation and metadata-only changes produce nothing. A rename with
/// both ends known is a removal of the old path plus a creation of the new.
pub fn classify(event: &Event) -> Vec<WatchMessage> {
    let all = |make: fn(PathBuf) -> WatchMessage| -> Vec<WatchMessage> {
        event.paths.iter().cloned().map(make).collect()
    };

    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => all(WatchMessage::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(WatchMessage::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                WatchMessage::Removed(from.clone()),
                WatchMessage::Created(to.clone()),
            ],
            _ => Vec::new(),
        },
        // Rename halves without a known direction: decide by what is on disk now.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                if p.exists() {
                    WatchMessage::Created(p.clone())
                } else {
                    WatchMessage::Removed(p.clone())
                }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => all(WatchMessage::Changed),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => all(WatchMessage::Changed),
        EventKind::Remove(_) => all(WatchMessage::Removed),
        _ => Vec::new(),
    }
}

/// Watches one directory and feeds settled new files to a handler.
pub struct DirectoryWatcher {
    tx: Sender<WatchMessage>,
    rx: Receiver<WatchMessage>,
    settle: Duration,
    watcher: Option<RecommendedWatcher>,
}

impl DirectoryWatcher {
    /// Register a notify watcher on `dir`.
    ///
    /// Non-recursive unless `settings.recursive`.
    pub fn start(dir: &Path, settings: &WatchSettings) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel();
        let event_tx = tx.clone();
        let notify_error = |source| WatchError::Notify {
            path: dir.to_path_buf(),
            source,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for message in classify(&event) {
                        event_tx.send(message).ok();
                    }
                }
                Err(e) => tracing::warn!(error = %e, "watch error"),
            },
            Config::default(),
        )
        .map_err(notify_error)?;

        let mode = if settings.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(dir, mode).map_err(notify_error)?;
        tracing::info!(dir = %dir.display(), recursive = settings.recursive, "watching");

        Ok(Self {
            tx,
            rx,
            settle: settings.settle(),
            watcher: Some(watcher),
        })
    }

    /// A watcher with no filesystem registration; messages arrive only
    /// through [`sender`](Self::sender).
    #[cfg(test)]
    fn detached(settings: &WatchSettings) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            settle: settings.settle(),
            watcher: None,
        }
    }

    /// A handle for injecting messages, e.g. [`WatchMessage::Shutdown`].
    pub fn sender(&self) -> Sender<WatchMessage> {
        self.tx.clone()
    }

    /// Run until [`WatchMessage::Shutdown`] arrives or every sender is gone.
    ///
    /// `handler` is called on this thread, once per settled path that is
    /// still a regular file.
    pub fn run<F: FnMut(&Path)>(self, mut handler: F) {
        let Self {
            tx,
            rx,
            settle,
            watcher,
        } = self;
        drop(tx);
        let mut tracker = SettleTracker::new(settle);

        loop {
            let message = match tracker.next_deadline() {
                Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match message {
                Ok(WatchMessage::Created(path)) => {
                    tracing::debug!(path = %path.display(), "created");
                    tracker.created(path, Instant::now());
                }
                Ok(WatchMessage::Changed(path)) => tracker.changed(&path, Instant::now()),
                Ok(WatchMessage::Removed(path)) => tracker.removed(&path),
                Ok(WatchMessage::Shutdown) => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            for path in tracker.take_settled(Instant::now()) {
                if path.is_file() {
                    handler(&path);
                } else {
                    tracing::debug!(path = %path.display(), "settled path is not a file");
                }
            }
        }

        drop(watcher);
        if tracker.pending() > 0 {
            tracing::info!(
                pending = tracker.pending(),
                "stopped with unsettled files; the next scan picks them up"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, MetadataKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    fn settings(settle_ms: u64) -> WatchSettings {
        WatchSettings {
            recursive: false,
            settle_ms,
        }
    }

    // =========================================================================
    // SettleTracker
    // =========================================================================

    #[test]
    fn path_settles_after_quiet_period() {
        let t0 = Instant::now();
        let mut tracker = SettleTracker::new(Duration::from_millis(500));
        tracker.created(PathBuf::from("/a.png"), t0);

        assert!(tracker.take_settled(t0 + Duration::from_millis(499)).is_empty());
        assert_eq!(
            tracker.take_settled(t0 + Duration::from_millis(500)),
            vec![PathBuf::from("/a.png")]
        );
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn changes_restart_the_quiet_period() {
        let t0 = Instant::now();
        let mut tracker = SettleTracker::new(Duration::from_millis(500));
        tracker.created(PathBuf::from("/a.png"), t0);
        tracker.changed(Path::new("/a.png"), t0 + Duration::from_millis(400));

        assert!(tracker.take_settled(t0 + Duration::from_millis(600)).is_empty());
        assert_eq!(
            tracker.next_deadline(),
            Some(t0 + Duration::from_millis(900))
        );
        assert_eq!(tracker.take_settled(t0 + Duration::from_millis(900)).len(), 1);
    }

    #[test]
    fn changes_to_untracked_paths_are_ignored() {
        let t0 = Instant::now();
        let mut tracker = SettleTracker::new(Duration::from_millis(500));
        tracker.changed(Path::new("/old.png"), t0);

        assert_eq!(tracker.pending(), 0);
        assert_eq!(tracker.next_deadline(), None);
    }

    #[test]
    fn removed_paths_never_settle() {
        let t0 = Instant::now();
        let mut tracker = SettleTracker::new(Duration::ZERO);
        tracker.created(PathBuf::from("/a.png"), t0);
        tracker.removed(Path::new("/a.png"));

        assert!(tracker.take_settled(t0).is_empty());
    }

    #[test]
    fn settled_paths_are_sorted() {
        let t0 = Instant::now();
        let mut tracker = SettleTracker::new(Duration::ZERO);
        for name in ["/c.png", "/a.png", "/b.png"] {
            tracker.created(PathBuf::from(name), t0);
        }

        assert_eq!(
            tracker.take_settled(t0),
            vec![
                PathBuf::from("/a.png"),
                PathBuf::from("/b.png"),
                PathBuf::from("/c.png")
            ]
        );
    }

    // =========================================================================
    // Event classification
    // =========================================================================

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn file_creation_is_created() {
        let e = event(EventKind::Create(CreateKind::File), &["/a.png"]);
        assert_eq!(classify(&e), vec![WatchMessage::Created("/a.png".into())]);
    }

    #[test]
    fn folder_creation_is_ignored() {
        let e = event(EventKind::Create(CreateKind::Folder), &["/album"]);
        assert!(classify(&e).is_empty());
    }

    #[test]
    fn writes_are_changes() {
        let data = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/a.png"],
        );
        let close = event(
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            &["/a.png"],
        );
        assert_eq!(classify(&data), vec![WatchMessage::Changed("/a.png".into())]);
        assert_eq!(classify(&close), vec![WatchMessage::Changed("/a.png".into())]);
    }

    #[test]
    fn metadata_changes_are_ignored() {
        let e = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/a.png"],
        );
        assert!(classify(&e).is_empty());
    }

    #[test]
    fn rename_both_moves_the_path() {
        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/a.png.part", "/a.png"],
        );
        assert_eq!(
            classify(&e),
            vec![
                WatchMessage::Removed("/a.png.part".into()),
                WatchMessage::Created("/a.png".into()),
            ]
        );
    }

    #[test]
    fn rename_to_is_a_creation() {
        let tmp = TempDir::new().unwrap();
        let moved_in = tmp.path().join("a.png");
        fs::write(&moved_in, b"img").unwrap();
        let e = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(moved_in.clone());

        assert_eq!(classify(&e), vec![WatchMessage::Created(moved_in)]);
    }

    #[test]
    fn removal_is_removed() {
        let e = event(EventKind::Remove(RemoveKind::File), &["/a.png"]);
        assert_eq!(classify(&e), vec![WatchMessage::Removed("/a.png".into())]);
    }

    // =========================================================================
    // Watch loop
    // =========================================================================

    #[test]
    fn settled_files_reach_the_handler() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.png");
        fs::write(&file, b"img").unwrap();
        let watcher = DirectoryWatcher::detached(&settings(0));
        let tx = watcher.sender();
        tx.send(WatchMessage::Created(file.clone())).unwrap();
        tx.send(WatchMessage::Shutdown).unwrap();

        let mut seen = Vec::new();
        watcher.run(|p| seen.push(p.to_path_buf()));

        assert_eq!(seen, vec![file]);
    }

    #[test]
    fn directories_and_vanished_paths_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("album.png");
        fs::create_dir(&dir).unwrap();
        let watcher = DirectoryWatcher::detached(&settings(0));
        let tx = watcher.sender();
        tx.send(WatchMessage::Created(dir)).unwrap();
        tx.send(WatchMessage::Created(tmp.path().join("gone.png"))).unwrap();
        tx.send(WatchMessage::Shutdown).unwrap();

        let mut calls = 0;
        watcher.run(|_| calls += 1);

        assert_eq!(calls, 0);
    }

    #[test]
    fn shutdown_leaves_unsettled_files_alone() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.png");
        fs::write(&file, b"img").unwrap();
        let watcher = DirectoryWatcher::detached(&settings(60_000));
        let tx = watcher.sender();
        tx.send(WatchMessage::Created(file)).unwrap();
        tx.send(WatchMessage::Shutdown).unwrap();

        let mut calls = 0;
        watcher.run(|_| calls += 1);

        assert_eq!(calls, 0);
    }

    #[test]
    fn shutdown_queued_before_run_wins_over_later_files() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.png");
        fs::write(&file, b"img").unwrap();
        let watcher = DirectoryWatcher::detached(&settings(0));
        let tx = watcher.sender();
        // Ctrl-C during the bootstrap scan, before the loop starts.
        tx.send(WatchMessage::Shutdown).unwrap();
        tx.send(WatchMessage::Created(file)).unwrap();

        let mut calls = 0;
        watcher.run(|_| calls += 1);

        assert_eq!(calls, 0);
    }

    #[test]
    fn loop_ends_when_senders_are_gone() {
        let watcher = DirectoryWatcher::detached(&settings(0));
        let tx = watcher.sender();
        drop(tx);

        let mut calls = 0;
        watcher.run(|_| calls += 1);

        assert_eq!(calls, 0);
    }

    #[test]
    fn start_fails_for_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing");

        let result = DirectoryWatcher::start(&missing, &settings(0));

        assert!(matches!(result, Err(WatchError::Notify { path, .. }) if path == missing));
    }

    #[test]
    fn start_registers_existing_directory() {
        let tmp = TempDir::new().unwrap();
        let watcher = DirectoryWatcher::start(tmp.path(), &settings(0)).unwrap();
        watcher.sender().send(WatchMessage::Shutdown).unwrap();
        watcher.run(|_| {});
    }
}
