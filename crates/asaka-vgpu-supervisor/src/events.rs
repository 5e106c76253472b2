//! ---
//! asaka_section: "04-lifecycle"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Restart loop keeping the device plugin registered with the kubelet."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::fmt;
use std::path::Path;

use notify::{Event, EventKind};

/// Process signals the supervisor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Reload: rebuild and re-register the plugin.
    Hangup,
    Interrupt,
    Terminate,
    Quit,
}

impl ProcessSignal {
    pub fn is_reload(self) -> bool {
        matches!(self, ProcessSignal::Hangup)
    }
}

impl fmt::Display for ProcessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessSignal::Hangup => "SIGHUP",
            ProcessSignal::Interrupt => "SIGINT",
            ProcessSignal::Terminate => "SIGTERM",
            ProcessSignal::Quit => "SIGQUIT",
        };
        f.write_str(name)
    }
}

/// Everything the supervisor loop selects over.
#[derive(Debug)]
pub enum LifecycleEvent {
    Fs(Event),
    WatchError(notify::Error),
    Signal(ProcessSignal),
}

/// True when `event` reports the creation of exactly `socket`.
pub fn is_socket_created(event: &Event, socket: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_)) && event.paths.iter().any(|path| path == socket)
}
