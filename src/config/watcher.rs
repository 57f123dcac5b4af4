//! Configuration file watcher for hot reload.
//!
//! # Responsibilities
//! - Watch the directory containing the config file (inotify/kqueue)
//! - React only to writes whose basename matches the config file
//! - Coalesce bursts of events so partial writes never half-reload
//! - Trigger the reload pipeline; errors keep the previous snapshot
//!
//! # Design Decisions
//! - The directory is watched rather than the file itself so
//!   rename-and-replace editors keep working
//! - A fixed 100 ms delay after the first event, followed by draining
//!   the queue, guarantees two writes inside the window produce exactly
//!   one reload

use std::ffi::OsString;
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::store::Manager;
use crate::config::ConfigError;

/// Delay between the first write event and the reload, coalescing
/// editor write bursts.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Spawn the watch task for `manager`'s backing file.
pub(crate) fn spawn(
    manager: Manager,
    shutdown: broadcast::Receiver<()>,
) -> Result<JoinHandle<()>, ConfigError> {
    let (tx, rx) = mpsc::channel::<Event>(64);

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        match res {
            // The callback runs on notify's own thread, so a blocking
            // send into the async side is fine here.
            Ok(event) => {
                let _ = tx.blocking_send(event);
            }
            Err(e) => tracing::warn!(error = %e, "config watcher error"),
        }
    })?;

    let dir = manager
        .path()
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| ".".into());
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    let basename = manager
        .path()
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();

    tracing::debug!(directory = %dir.display(), "watching config directory");

    Ok(tokio::spawn(watch_loop(manager, watcher, basename, rx, shutdown)))
}

async fn watch_loop(
    manager: Manager,
    _watcher: notify::RecommendedWatcher,
    basename: OsString,
    mut rx: mpsc::Receiver<Event>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                if !is_config_write(&event, &basename) {
                    continue;
                }

                // Let the writer finish, then fold any queued events
                // into this single reload.
                tokio::time::sleep(DEBOUNCE).await;
                while rx.try_recv().is_ok() {}

                match manager.reload() {
                    Ok(()) => tracing::info!("configuration reloaded"),
                    Err(e) => tracing::warn!(
                        error = %e,
                        "config reload failed, keeping previous snapshot"
                    ),
                }
            }
        }
    }
    tracing::debug!("config watcher stopped");
}

fn is_config_write(event: &Event, basename: &OsString) -> bool {
    let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
    relevant
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(basename.as_os_str()))
}
