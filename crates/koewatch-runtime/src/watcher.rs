//! Projects watcher: registers the transcript root and every subdirectory
//! with the OS filesystem-change subsystem, starts tailers for transcript
//! writes, and folds newly created directories into the watch set.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::manager::TailerManager;

#[derive(Debug, Clone, Default)]
pub struct WatchFilters {
    /// Restrict registration to one first-level project directory.
    pub project: Option<String>,
    /// Restrict tailer creation to session stems containing this string.
    pub session: Option<String>,
}

pub struct ProjectsWatcher {
    root: PathBuf,
    filters: WatchFilters,
    manager: Arc<TailerManager>,
}

impl ProjectsWatcher {
    pub fn new(root: impl Into<PathBuf>, filters: WatchFilters, manager: Arc<TailerManager>) -> Self {
        Self {
            root: root.into(),
            filters,
            manager,
        }
    }

    /// Register the existing tree and run until cancelled.
    pub fn start(self, cancel: CancellationToken) -> Result<tokio::task::JoinHandle<()>> {
        let (tx_fs, mut rx_fs) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx_fs.send(event);
            }
        })
        .context("cannot create filesystem watcher")?;

        register_tree(&mut watcher, &self.root, &self.root, &self.filters);

        let handle = tokio::spawn(async move {
            // the watcher must stay alive for as long as we consume events
            let mut watcher = watcher;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = rx_fs.recv() => match event {
                        Some(event) => self.handle_fs_event(&mut watcher, &event),
                        None => return,
                    },
                }
            }
        });

        Ok(handle)
    }

    fn handle_fs_event(&self, watcher: &mut RecommendedWatcher, event: &Event) {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {}
            // transcript removal is idle eviction's problem
            _ => return,
        }

        for path in &event.paths {
            if path.is_dir() {
                if matches!(event.kind, EventKind::Create(_)) {
                    register_tree(watcher, &self.root, path, &self.filters);
                }
                continue;
            }

            if !is_transcript(path) {
                continue;
            }
            if !self.passes_filters(path) {
                continue;
            }
            self.manager.ensure_tailer(path);
        }
    }

    fn passes_filters(&self, path: &Path) -> bool {
        if let Some(project) = &self.filters.project {
            if !under_project(&self.root, path, project) {
                return false;
            }
        }
        if let Some(session) = &self.filters.session {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !stem.contains(session.as_str()) {
                return false;
            }
        }
        true
    }
}

fn is_transcript(path: &Path) -> bool {
    path.extension().map(|e| e == "jsonl").unwrap_or(false)
}

/// First path segment under the root matches the project filter.
fn under_project(root: &Path, path: &Path, project: &str) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    relative
        .components()
        .next()
        .map(|c| c.as_os_str() == project)
        .unwrap_or(false)
}

/// Hidden directories are pruned, `.claude` excepted; unreadable
/// subtrees are logged and skipped.
fn keep_dir(name: &str) -> bool {
    !name.starts_with('.') || name == ".claude"
}

fn register_tree(
    watcher: &mut RecommendedWatcher,
    root: &Path,
    subtree: &Path,
    filters: &WatchFilters,
) {
    let walk = WalkDir::new(subtree).follow_links(false).into_iter();
    let filtered = walk.filter_entry(|entry| {
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.depth() > 0 && !keep_dir(&name) {
            return false;
        }
        // project filter binds at the first level under the root
        if let Some(project) = &filters.project {
            if entry.path().parent() == Some(root) && name != project.as_str() {
                return false;
            }
        }
        true
    });

    for entry in filtered {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable directory");
                continue;
            }
        };
        if let Err(err) = watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
            tracing::warn!(path = %entry.path().display(), error = %err, "cannot watch directory");
        }
    }
}
