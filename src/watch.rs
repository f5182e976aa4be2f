//! Filesystem watching and the rebuild loop.
//!
//! Two halves joined by a channel:
//!
//! ```text
//! notify debouncer ──ChangeSet──▶ mpsc ──▶ WatchCoordinator ──▶ BuildOrchestrator
//!  (own thread)                               (caller's thread)
//! ```
//!
//! [`subscribe`] watches the content and templates roots (recursively) and
//! the site root (for `site.toml`). Each debounce window becomes at most one
//! [`ChangeSet`], with editor noise and paths outside the watched inputs
//! dropped. A window that is all noise sends nothing.
//!
//! [`WatchCoordinator::run`] consumes change sets one at a time. Sets that
//! queued up while a build was running are merged into one before the next
//! incremental build, so a burst never causes back-to-back rebuilds. The
//! loop checks its [`StopHandle`] between windows; a build in progress
//! always finishes first.

use crate::config::{SitePaths, WatchConfig};
use crate::orchestrator::{BuildError, BuildOrchestrator, BuildReport};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("cannot watch {}: {source}", path.display())]
    Subscription {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Changed paths from one debounce window. Repeated changes to a path
/// collapse into one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    paths: BTreeSet<PathBuf>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, path: PathBuf) {
        self.paths.insert(path);
    }

    /// Fold a later window into this one.
    pub fn merge(&mut self, other: ChangeSet) {
        self.paths.extend(other.paths);
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Temporary and backup files editors write around a save.
pub fn is_noise(path: &Path, ignore: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    if name.starts_with('.')
        || name.ends_with('~')
        || name == "4913"
        || [".swp", ".swx", ".tmp"].iter().any(|ext| name.ends_with(ext))
    {
        return true;
    }
    let text = path.to_string_lossy();
    ignore.iter().any(|pattern| text.contains(pattern.as_str()))
}

/// Cooperative stop signal for [`WatchCoordinator::run`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A live filesystem subscription. Dropping it stops the notifications.
pub struct Subscription {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

/// Whether a changed path is an input of the build.
fn is_watched_input(path: &Path, paths: &SitePaths) -> bool {
    if path.starts_with(&paths.output) {
        return false;
    }
    path == paths.config_file || path.starts_with(&paths.content) || path.starts_with(&paths.templates)
}

/// Start watching the site's inputs.
pub fn subscribe(
    paths: &SitePaths,
    config: &WatchConfig,
) -> Result<(Subscription, Receiver<ChangeSet>), WatchError> {
    let (tx, rx) = mpsc::channel();
    let filter_paths = paths.clone();
    let ignore = config.ignore.clone();

    let mut debouncer = new_debouncer(
        Duration::from_millis(config.debounce_ms),
        move |res: DebounceEventResult| match res {
            Ok(events) => {
                let set = ChangeSet::from_paths(
                    events
                        .into_iter()
                        .map(|event| event.path)
                        .filter(|path| is_watched_input(path, &filter_paths))
                        .filter(|path| !is_noise(path, &ignore)),
                );
                if !set.is_empty() && tx.send(set).is_err() {
                    debug!("change receiver gone");
                }
            }
            Err(e) => warn!(error = %e, "watch error"),
        },
    )
    .map_err(|source| WatchError::Subscription {
        path: paths.root.clone(),
        source,
    })?;

    let targets = [
        (&paths.content, RecursiveMode::Recursive),
        (&paths.templates, RecursiveMode::Recursive),
        (&paths.root, RecursiveMode::NonRecursive),
    ];
    for (target, mode) in targets {
        if !target.exists() {
            debug!(path = %target.display(), "not watching missing directory");
            continue;
        }
        debouncer
            .watcher()
            .watch(target, mode)
            .map_err(|source| WatchError::Subscription {
                path: target.clone(),
                source,
            })?;
        info!(path = %target.display(), "watching");
    }

    Ok((
        Subscription {
            _debouncer: debouncer,
        },
        rx,
    ))
}

/// Drives incremental builds from a stream of change sets.
pub struct WatchCoordinator {
    stop: StopHandle,
    poll: Duration,
}

impl WatchCoordinator {
    pub fn new(stop: StopHandle) -> Self {
        Self {
            stop,
            poll: Duration::from_millis(200),
        }
    }

    /// How often the loop wakes to check the stop handle while idle.
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Run until stopped or the sender side disconnects. `on_build` sees the
    /// result of each incremental build. Returns how many builds ran.
    pub fn run(
        &self,
        orchestrator: &mut BuildOrchestrator,
        changes: &Receiver<ChangeSet>,
        mut on_build: impl FnMut(&ChangeSet, &Result<BuildReport, BuildError>),
    ) -> usize {
        let mut builds = 0;
        while !self.stop.is_stopped() {
            let mut set = match changes.recv_timeout(self.poll) {
                Ok(set) => set,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            while let Ok(more) = changes.try_recv() {
                set.merge(more);
            }
            if set.is_empty() {
                continue;
            }

            debug!(paths = set.len(), "change set");
            let result = orchestrator.incremental_build(&set);
            if let Err(e) = &result {
                warn!(error = %e, "rebuild failed, keeping previous output");
            }
            on_build(&set, &result);
            builds += 1;
        }
        info!(builds, "watch stopped");
        builds
    }
}
