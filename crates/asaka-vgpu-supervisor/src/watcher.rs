//! ---
//! asaka_section: "04-lifecycle"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Restart loop keeping the device plugin registered with the kubelet."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::path::Path;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::SupervisorError;
use crate::events::LifecycleEvent;

/// Watch `dir` (non-recursively) and forward notifications into `events`.
///
/// The returned watcher must be kept alive for as long as events are wanted.
pub fn spawn_fs_watcher(
    dir: &Path,
    events: mpsc::Sender<LifecycleEvent>,
) -> Result<RecommendedWatcher, SupervisorError> {
    let watch_error = |source| SupervisorError::Watch {
        path: dir.to_path_buf(),
        source,
    };
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        let event = match result {
            Ok(event) => LifecycleEvent::Fs(event),
            Err(err) => LifecycleEvent::WatchError(err),
        };
        if events.blocking_send(event).is_err() {
            debug!("supervisor gone; dropping filesystem event");
        }
    })
    .map_err(watch_error)?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(watch_error)?;
    info!(dir = %dir.display(), "watching device plugin directory");
    Ok(watcher)
}
