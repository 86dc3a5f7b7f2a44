//! Watch mode: rebuild on filesystem changes.
//!
//! Pipeline: notify events feed a pure debouncer that dedups per path
//! within the debounce window; once the window goes quiet the merged
//! change set becomes one incremental pass.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{RecursiveMode, Watcher};
use rustc_hash::FxHashMap;

use crate::builder::{
    BuildKind, Builder, CancelToken, ChangeKind, MarkerTable, PassthroughCompiler, ResourceDelta,
};
use crate::logger::{status_error, status_success};
use crate::project::Project;
use crate::{debug, log};

/// Floor on the debounce window so a zero config value cannot spin.
const MIN_DEBOUNCE_MS: u64 = 50;

pub fn run_watch(config_path: &Path) -> Result<()> {
    let project = Project::open(config_path)?;
    let window = Duration::from_millis(project.config.build.debounce_ms.max(MIN_DEBOUNCE_MS));
    let watch_dirs = project.watch_dirs.clone();

    let sink = Arc::new(MarkerTable::new());
    let mut builder = Builder::new(
        project.namespace,
        project.rules,
        Box::new(PassthroughCompiler),
        sink.clone(),
    );

    let cancel = CancelToken::new();
    cancel.install_ctrlc()?;

    // Watcher first: events buffer in the channel while the initial
    // pass runs, so nothing changed in between is lost.
    let (notify_tx, notify_rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })
    .context("creating filesystem watcher")?;
    for dir in &watch_dirs {
        if dir.is_dir() {
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .with_context(|| format!("watching {}", dir.display()))?;
            log!("watch"; "watching {}", dir.display());
        } else {
            log!("watch"; "skipping missing folder {}", dir.display());
        }
    }

    let report = builder.build(BuildKind::Incremental, None, &cancel)?;
    report_outcome(report.compiled, &sink);

    let mut debouncer = Debouncer::new(window);
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match notify_rx.recv_timeout(Duration::from_millis(MIN_DEBOUNCE_MS)) {
            Ok(Ok(event)) => debouncer.add_event(&event),
            Ok(Err(e)) => log!("watch"; "notify error: {e}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if let Some(changes) = debouncer.take_if_ready() {
            rebuild(&mut builder, &changes, &cancel, &sink);
        }
    }

    log!("watch"; "stopped");
    Ok(())
}

/// One rebuild cycle. A build-level failure (compiler i/o) is reported
/// and watching continues; the consumed delta was already restored, so
/// the next change retries it.
fn rebuild(
    builder: &mut Builder,
    changes: &FxHashMap<PathBuf, ChangeKind>,
    cancel: &CancelToken,
    sink: &MarkerTable,
) {
    let mut delta = ResourceDelta::new();
    for (path, kind) in changes {
        debug!("watch"; "{} {}", kind.label(), path.display());
        delta.insert(path, *kind);
    }
    match builder.build(BuildKind::Incremental, Some(&delta), cancel) {
        Ok(report) if report.errors > 0 => {
            let detail: Vec<String> = sink
                .all()
                .iter()
                .map(|d| format!("  {}:{}: {}", d.file.display(), d.line, d.message))
                .collect();
            status_error(
                &format!("build failed, {} error(s)", report.errors),
                &detail.join("\n"),
            );
        }
        Ok(report) => report_outcome(report.compiled, sink),
        Err(e) => status_error(&format!("build failed: {e:#}"), ""),
    }
}

fn report_outcome(compiled: usize, sink: &crate::builder::MarkerTable) {
    if sink.is_empty() {
        status_success(&format!("{compiled} unit(s) compiled"));
    } else {
        status_error(&format!("{} stale error(s) remain", sink.total()), "");
    }
}

// ============================================================================
// Debouncer (pure timing and deduplication)
// ============================================================================

struct Debouncer {
    /// Path to merged change kind; dedup is free via key uniqueness.
    changes: FxHashMap<PathBuf, ChangeKind>,
    last_event: Option<Instant>,
    window: Duration,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
            window,
        }
    }

    /// Add a notify event, applying dedup rules:
    /// - Removed + Created/Modified: restored, the new event wins
    /// - Modified + Removed: deleted, upgrade to Removed
    /// - Created + Removed: appeared then vanished, discard entirely
    /// - otherwise the first event wins
    fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            EventKind::Modify(modify) => {
                // Metadata-only changes (mtime/chmod noise) would loop.
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return;
                }
                ChangeKind::Modified
            }
            _ => return,
        };

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }

            if let Some(&existing) = self.changes.get(path) {
                match (existing, kind) {
                    (ChangeKind::Removed, ChangeKind::Created | ChangeKind::Modified) => {
                        self.changes.insert(path.clone(), kind);
                    }
                    (ChangeKind::Modified, ChangeKind::Removed) => {
                        self.changes.insert(path.clone(), ChangeKind::Removed);
                    }
                    (ChangeKind::Created, ChangeKind::Removed) => {
                        self.changes.remove(path);
                    }
                    _ => continue,
                }
            } else {
                self.changes.insert(path.clone(), kind);
            }
            self.last_event = Some(Instant::now());
        }
    }

    /// Take the merged change set once the window has gone quiet.
    fn take_if_ready(&mut self) -> Option<FxHashMap<PathBuf, ChangeKind>> {
        let last_event = self.last_event?;
        if last_event.elapsed() < self.window {
            return None;
        }
        self.last_event = None;
        let changes = std::mem::take(&mut self.changes);
        if changes.is_empty() { None } else { Some(changes) }
    }
}

/// Editor artifacts: backup/swap files and dotfiles.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
