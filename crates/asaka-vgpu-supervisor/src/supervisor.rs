//! ---
//! asaka_section: "04-lifecycle"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Restart loop keeping the device plugin registered with the kubelet."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use asaka_vgpu_plugin::PluginError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{is_socket_created, LifecycleEvent, ProcessSignal};

/// A plugin instance the supervisor can bring up and tear down.
#[async_trait]
pub trait PluginLifecycle: Send {
    /// Start serving and register with the kubelet.
    async fn serve(&mut self) -> Result<(), PluginError>;
    /// Idempotent shutdown.
    async fn stop(&mut self) -> Result<(), PluginError>;
}

/// Builds a fresh plugin instance for every restart.
pub trait PluginFactory: Send + Sync {
    type Plugin: PluginLifecycle;

    fn create(&self) -> Self::Plugin;
}

/// Why the supervisor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    Signal(ProcessSignal),
    EventsClosed,
}

pub struct Supervisor<F: PluginFactory> {
    factory: F,
    kubelet_socket: PathBuf,
    retry_interval: Duration,
    current: Option<F::Plugin>,
    restarts: u64,
}

impl<F: PluginFactory> Supervisor<F> {
    pub fn new(factory: F, kubelet_socket: impl Into<PathBuf>, retry_interval: Duration) -> Self {
        Self {
            factory,
            kubelet_socket: kubelet_socket.into(),
            retry_interval,
            current: None,
            restarts: 0,
        }
    }

    /// Number of restart cycles attempted so far.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Run until a terminal signal arrives or `events` closes.
    ///
    /// The first cycle starts immediately. While a restart is pending after a
    /// failed registration, the loop also wakes every `retry_interval`.
    pub async fn run(&mut self, mut events: mpsc::Receiver<LifecycleEvent>) -> SupervisorExit {
        let mut restart = true;
        loop {
            if restart {
                restart = !self.restart_plugin().await;
            }

            let event = if restart {
                tokio::select! {
                    event = events.recv() => event,
                    _ = tokio::time::sleep(self.retry_interval) => {
                        debug!(retry = ?self.retry_interval, "retrying pending restart");
                        continue;
                    }
                }
            } else {
                events.recv().await
            };

            let Some(event) = event else {
                info!("lifecycle event channel closed; shutting down");
                self.stop_current().await;
                return SupervisorExit::EventsClosed;
            };

            match event {
                LifecycleEvent::Fs(event) => {
                    if is_socket_created(&event, &self.kubelet_socket) {
                        info!(socket = %self.kubelet_socket.display(), "kubelet socket created; restarting");
                        restart = true;
                    }
                }
                LifecycleEvent::WatchError(err) => {
                    warn!(error = %err, "filesystem watcher error");
                }
                LifecycleEvent::Signal(signal) if signal.is_reload() => {
                    info!(%signal, "reload requested; restarting");
                    restart = true;
                }
                LifecycleEvent::Signal(signal) => {
                    info!(%signal, "shutting down device plugin");
                    self.stop_current().await;
                    return SupervisorExit::Signal(signal);
                }
            }
        }
    }

    /// Replace the current instance with a fresh one; true once registered.
    async fn restart_plugin(&mut self) -> bool {
        self.restarts += 1;
        self.stop_current().await;

        let mut plugin = self.factory.create();
        let outcome = plugin.serve().await;
        self.current = Some(plugin);
        match outcome {
            Ok(()) => {
                info!(cycle = self.restarts, "device plugin registered");
                true
            }
            Err(err) => {
                warn!(cycle = self.restarts, error = %err, "device plugin restart failed; will retry");
                false
            }
        }
    }

    async fn stop_current(&mut self) {
        if let Some(mut plugin) = self.current.take() {
            if let Err(err) = plugin.stop().await {
                warn!(error = %err, "failed to stop device plugin");
            }
        }
    }
}
