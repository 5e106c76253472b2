//! ---
//! asaka_section: "05-networking-external-interfaces"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Kubelet device plugin protocol surface."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use asaka_vgpu_broker::AllocationBroker;
use asaka_vgpu_common::{PluginConfig, DEVICE_PLUGIN_VERSION};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::{debug, info, warn};

use crate::error::{PluginError, Result};
use crate::inventory::InventorySource;
use crate::proto::device_plugin_server::DevicePluginServer;
use crate::proto::registration_client::RegistrationClient;
use crate::proto::{DevicePluginOptions, RegisterRequest};
use crate::service::DevicePluginService;
use crate::uds;

const STOP_GRACE: Duration = Duration::from_secs(5);

/// Static inputs for one plugin server instance.
#[derive(Debug, Clone)]
pub struct PluginSettings {
    /// Socket this plugin serves on.
    pub socket: PathBuf,
    /// Kubelet registration socket.
    pub kubelet_socket: PathBuf,
    /// Extended resource advertised to the kubelet.
    pub resource_name: String,
    /// Period between inventory snapshots on `ListAndWatch`.
    pub refresh_interval: Duration,
    /// Bound on the liveness dial and on registration.
    pub dial_timeout: Duration,
}

impl PluginSettings {
    /// Settings derived from the daemon configuration.
    pub fn from_config(config: &PluginConfig) -> Self {
        Self {
            socket: config.plugin_socket(),
            kubelet_socket: config.kubelet_socket(),
            resource_name: config.resource_name.clone(),
            refresh_interval: config.refresh_interval,
            dial_timeout: config.dial_timeout,
        }
    }

    /// Socket name relative to the plugin directory, as sent on registration.
    pub fn endpoint(&self) -> String {
        self.socket
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Lifecycle of a single server instance: Created, then Running, then Stopped.
#[derive(Debug)]
pub enum ServerState {
    Created,
    Running(RunningServer),
    Stopped,
}

/// Handles owned while the gRPC server is serving.
#[derive(Debug)]
pub struct RunningServer {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Kubelet device plugin server bound to a Unix socket.
pub struct PluginServer {
    settings: PluginSettings,
    broker: Arc<AllocationBroker>,
    inventory: Arc<dyn InventorySource>,
    state: ServerState,
}

impl PluginServer {
    pub fn new(
        settings: PluginSettings,
        broker: Arc<AllocationBroker>,
        inventory: Arc<dyn InventorySource>,
    ) -> Self {
        Self {
            settings,
            broker,
            inventory,
            state: ServerState::Created,
        }
    }

    pub fn socket(&self) -> &Path {
        &self.settings.socket
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ServerState::Running(_))
    }

    /// Bind the socket, start serving, and confirm the server accepts connections.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(PluginError::AlreadyStarted(self.settings.socket.clone()));
        }
        let socket = self.settings.socket.clone();
        remove_socket(&socket).await?;

        let listener = UnixListener::bind(&socket).map_err(|source| PluginError::Io {
            path: socket.clone(),
            source,
        })?;
        let incoming = UnixListenerStream::new(listener);

        let (stop_tx, mut shutdown_rx) = watch::channel(false);
        let service = DevicePluginService::new(
            self.broker.clone(),
            self.inventory.clone(),
            self.settings.refresh_interval,
            stop_tx.subscribe(),
        );
        let served_socket = socket.clone();
        let task = tokio::spawn(async move {
            let server = Server::builder()
                .add_service(DevicePluginServer::new(service))
                .serve_with_incoming_shutdown(incoming, async move {
                    let _ = shutdown_rx.changed().await;
                });
            if let Err(err) = server.await {
                warn!(socket = %served_socket.display(), error = %err, "device plugin server exited with error");
            }
        });
        self.state = ServerState::Running(RunningServer {
            stop: stop_tx,
            task,
        });

        if let Err(err) = uds::dial(&socket, self.settings.dial_timeout).await {
            warn!(socket = %socket.display(), error = %err, "device plugin server did not answer liveness dial");
            if let Err(stop_err) = self.stop().await {
                warn!(error = %stop_err, "cleanup after failed start");
            }
            return Err(err);
        }
        info!(socket = %socket.display(), "device plugin server started");
        Ok(())
    }

    /// Halt the server, end every inventory stream, and remove the socket.
    ///
    /// Stopping an instance that is not running does nothing.
    pub async fn stop(&mut self) -> Result<()> {
        let running = match std::mem::replace(&mut self.state, ServerState::Stopped) {
            ServerState::Running(running) => running,
            other => {
                self.state = other;
                return Ok(());
            }
        };

        let _ = running.stop.send(true);
        let mut task = running.task;
        match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "device plugin server task failed"),
            Err(_) => {
                warn!(grace = ?STOP_GRACE, "device plugin server did not drain in time; aborting");
                task.abort();
            }
        }

        remove_socket(&self.settings.socket).await?;
        info!(socket = %self.settings.socket.display(), "device plugin server stopped");
        Ok(())
    }

    /// Register this plugin's socket and resource name with the kubelet.
    pub async fn register(&self) -> Result<()> {
        let kubelet = &self.settings.kubelet_socket;
        let channel = uds::dial(kubelet, self.settings.dial_timeout).await?;
        let mut client = RegistrationClient::new(channel);
        let request = RegisterRequest {
            version: DEVICE_PLUGIN_VERSION.to_owned(),
            endpoint: self.settings.endpoint(),
            resource_name: self.settings.resource_name.clone(),
            options: Some(DevicePluginOptions::default()),
        };

        match tokio::time::timeout(self.settings.dial_timeout, client.register(request)).await {
            Ok(Ok(_)) => {
                info!(resource = %self.settings.resource_name, kubelet = %kubelet.display(), "registered device plugin with kubelet");
                Ok(())
            }
            Ok(Err(status)) => Err(PluginError::Registration {
                resource: self.settings.resource_name.clone(),
                status,
            }),
            Err(_) => Err(PluginError::DialTimeout {
                path: kubelet.clone(),
                timeout: self.settings.dial_timeout,
            }),
        }
    }

    /// Start serving and register; a failed registration stops the server again.
    pub async fn serve(&mut self) -> Result<()> {
        if let Err(err) = self.start().await {
            warn!(error = %err, "could not start device plugin");
            return Err(err);
        }
        if let Err(err) = self.register().await {
            warn!(error = %err, "could not register device plugin");
            if let Err(stop_err) = self.stop().await {
                warn!(error = %stop_err, "cleanup after failed registration");
            }
            return Err(err);
        }
        Ok(())
    }
}

async fn remove_socket(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(socket = %path.display(), "removed socket file");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PluginError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
