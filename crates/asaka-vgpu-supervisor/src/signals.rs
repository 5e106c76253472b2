//! ---
//! asaka_section: "04-lifecycle"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Restart loop keeping the device plugin registered with the kubelet."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::SupervisorError;
use crate::events::{LifecycleEvent, ProcessSignal};

fn install(kind: SignalKind, name: &'static str) -> Result<Signal, SupervisorError> {
    signal(kind).map_err(|source| SupervisorError::Signal {
        signal: name,
        source,
    })
}

/// Forward SIGHUP, SIGINT, SIGTERM and SIGQUIT into `events`.
///
/// Handlers are installed before this returns, so no signal delivered
/// afterwards is lost.
pub fn spawn_signal_forwarder(
    events: mpsc::Sender<LifecycleEvent>,
) -> Result<JoinHandle<()>, SupervisorError> {
    let mut hangup = install(SignalKind::hangup(), "SIGHUP")?;
    let mut interrupt = install(SignalKind::interrupt(), "SIGINT")?;
    let mut terminate = install(SignalKind::terminate(), "SIGTERM")?;
    let mut quit = install(SignalKind::quit(), "SIGQUIT")?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = hangup.recv() => ProcessSignal::Hangup,
                Some(()) = interrupt.recv() => ProcessSignal::Interrupt,
                Some(()) = terminate.recv() => ProcessSignal::Terminate,
                Some(()) = quit.recv() => ProcessSignal::Quit,
                else => break,
            };
            info!(signal = %received, "signal received");
            if events.send(LifecycleEvent::Signal(received)).await.is_err() {
                break;
            }
        }
        debug!("signal forwarder stopped");
    }))
}
