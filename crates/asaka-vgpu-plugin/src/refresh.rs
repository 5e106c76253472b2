//! ---
//! asaka_section: "05-networking-external-interfaces"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Kubelet device plugin protocol surface."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tonic::Status;
use tracing::debug;

use crate::inventory::InventorySource;
use crate::proto::ListAndWatchResponse;

/// Push a full inventory snapshot immediately and then once per `period`.
///
/// Returns once `stop` turns true (or its sender is dropped) or the receiving
/// side of `sink` goes away. No snapshot is sent after stop has been observed.
pub async fn run_inventory_refresh(
    source: Arc<dyn InventorySource>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    sink: mpsc::Sender<Result<ListAndWatchResponse, Status>>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent: u64 = 0;

    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let devices = source.devices().await;
        if *stop.borrow() {
            break;
        }
        let count = devices.len();
        if sink.send(Ok(ListAndWatchResponse { devices })).await.is_err() {
            debug!("inventory stream receiver dropped");
            break;
        }
        sent += 1;
        debug!(snapshot = sent, devices = count, "inventory snapshot pushed");
    }
    debug!(snapshots = sent, "inventory refresh stopped");
}
