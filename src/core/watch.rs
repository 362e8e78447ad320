//! Continuous declarations refresh on source changes.
//!
//! Rebuild scheduling runs a single-slot state machine instead of a queue:
//! changes arriving while a run is scheduled extend the debounce window,
//! and changes arriving during a run are dropped wholesale. The next save
//! after the run triggers a fresh one, which sees all earlier edits anyway.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{Error, Result};

/// Quiet period after the last observed change before a run starts.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Scheduling state for the rebuild loop. At most one run is ever pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    /// A change arrived; a run starts once the debounce window closes.
    Scheduled { due: Instant },
    Running,
}

impl RunState {
    /// Record a filesystem change. While running, changes are discarded;
    /// otherwise the debounce window restarts from now.
    pub fn note_change(&mut self, now: Instant) {
        match self {
            RunState::Running => {}
            _ => *self = RunState::Scheduled { due: now + DEBOUNCE },
        }
    }

    /// Whether the debounce window has closed and a run should begin.
    pub fn due(&self, now: Instant) -> bool {
        matches!(self, RunState::Scheduled { due } if now >= *due)
    }

    pub fn begin_run(&mut self) {
        *self = RunState::Running;
    }

    pub fn finish_run(&mut self) {
        *self = RunState::Idle;
    }
}

/// Watch the sources root and invoke `rebuild` after each quiet period.
///
/// The loop exits when `running` is cleared. Rebuild errors are reported
/// through `rebuild`'s own logging and do not stop the loop; only watcher
/// setup failures are returned.
pub fn watch_sources(
    sources_root: &Path,
    running: Arc<AtomicBool>,
    mut rebuild: impl FnMut() -> Result<()>,
) -> Result<()> {
    let (tx, rx) = channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            if let Ok(event) = res {
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
        },
        Config::default(),
    )
    .map_err(|e| Error::internal_io(e.to_string(), Some("create file watcher".to_string())))?;

    watcher
        .watch(sources_root, RecursiveMode::Recursive)
        .map_err(|e| {
            Error::internal_io(
                e.to_string(),
                Some(format!("watch {}", sources_root.display())),
            )
        })?;

    log_status!("watch", "Watching {} for changes", sources_root.display());

    let mut state = RunState::Idle;
    while running.load(Ordering::SeqCst) {
        if let Ok(path) = rx.recv_timeout(POLL_INTERVAL) {
            if is_relevant(&path) {
                state.note_change(Instant::now());
            }
        }

        if state.due(Instant::now()) {
            state.begin_run();
            if let Err(e) = rebuild() {
                log_status!("watch", "Rebuild failed: {}", e.message);
            }
            // Events queued during the run belong to it; drop them.
            while rx.try_recv().is_ok() {}
            state.finish_run();
        }
    }

    log_status!("watch", "Watch stopped");
    Ok(())
}

/// Only TypeScript sources and project configuration trigger a rebuild;
/// editor temp files and emitted output must not.
fn is_relevant(path: &Path) -> bool {
    if path.components().any(|c| c.as_os_str() == "generated") {
        return false;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("ts") => true,
        _ => path
            .file_name()
            .is_some_and(|n| n == "tsconfig.json" || n == "entities.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn changes_within_one_window_coalesce_into_one_run() {
        let t0 = Instant::now();
        let mut state = RunState::Idle;

        state.note_change(t0);
        state.note_change(t0 + Duration::from_millis(200));

        // The second change restarted the window.
        assert!(!state.due(t0 + DEBOUNCE));
        assert!(state.due(t0 + Duration::from_millis(200) + DEBOUNCE));

        state.begin_run();
        state.finish_run();
        assert_eq!(state, RunState::Idle);
    }

    #[test]
    fn changes_during_a_run_are_dropped() {
        let t0 = Instant::now();
        let mut state = RunState::Idle;

        state.note_change(t0);
        assert!(state.due(t0 + DEBOUNCE));
        state.begin_run();

        state.note_change(t0 + Duration::from_millis(600));
        assert_eq!(state, RunState::Running);

        state.finish_run();
        assert!(!state.due(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn idle_state_is_never_due() {
        let state = RunState::Idle;
        assert!(!state.due(Instant::now() + Duration::from_secs(60)));
    }

    #[test]
    fn source_and_marker_files_are_relevant() {
        assert!(is_relevant(&PathBuf::from("/w/src/Gateway/main.ts")));
        assert!(is_relevant(&PathBuf::from("/w/src/Gateway/tsconfig.json")));
        assert!(is_relevant(&PathBuf::from("/w/src/CoreTypes/entities.json")));
        assert!(!is_relevant(&PathBuf::from("/w/src/Gateway/main.ts~")));
        assert!(!is_relevant(&PathBuf::from(
            "/w/src/Gateway/generated/declarations.d.ts"
        )));
    }
}
