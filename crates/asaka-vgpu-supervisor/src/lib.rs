//! ---
//! asaka_section: "04-lifecycle"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Restart loop keeping the device plugin registered with the kubelet."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
//! Lifecycle supervision for the device plugin.
//!
//! The [`Supervisor`] owns the current plugin instance and reacts to
//! [`LifecycleEvent`]s: a fresh kubelet socket or a hangup rebuilds and
//! re-registers the plugin, any other terminal signal stops it and ends the
//! loop. Events are produced by [`spawn_fs_watcher`] and
//! [`spawn_signal_forwarder`].

pub mod error;
pub mod events;
pub mod factory;
pub mod signals;
pub mod supervisor;
pub mod watcher;

pub use error::SupervisorError;
pub use events::{is_socket_created, LifecycleEvent, ProcessSignal};
pub use factory::PluginServerFactory;
pub use signals::spawn_signal_forwarder;
pub use supervisor::{PluginFactory, PluginLifecycle, Supervisor, SupervisorExit};
pub use watcher::spawn_fs_watcher;
