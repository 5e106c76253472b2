//! ---
//! asaka_section: "01-core-functionality"
//! asaka_subsection: "binary"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Binary entrypoint for the Asaka vGPU device plugin daemon."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use asaka_vgpu_broker::AllocationBroker;
use asaka_vgpu_common::{
    init_tracing, ConfigError, LogFormat, LoggingConfig, PluginConfig, DEFAULT_PLUGIN_DIR,
};
use asaka_vgpu_controller::{CapacityController, ControllerClient};
use asaka_vgpu_plugin::{ControllerInventory, PluginSettings};
use asaka_vgpu_supervisor::{
    spawn_fs_watcher, spawn_signal_forwarder, PluginServerFactory, Supervisor,
};
use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tracing::{error, info};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Parser)]
#[command(author, version, about = "Asaka vGPU kubelet device plugin", long_about = None)]
struct Cli {
    #[arg(
        long,
        env = "XAAS_CONTROLLER_URI",
        value_name = "HOST[:PORT]",
        help = "Capacity controller address"
    )]
    controller: Option<String>,

    #[arg(
        long,
        env = "ASAKA_VGPU_PLUGIN_DIR",
        value_name = "DIR",
        default_value = DEFAULT_PLUGIN_DIR,
        help = "Directory holding the kubelet and plugin sockets"
    )]
    plugin_dir: PathBuf,

    #[arg(long = "log", env = "ASAKA_VGPU_LOG", value_name = "FILTER", help = "Log filter directive")]
    log_filter: Option<String>,

    #[arg(long, env = "ASAKA_VGPU_LOG_FORMAT", value_enum, default_value_t = CliLogFormat::Pretty)]
    log_format: CliLogFormat,

    #[arg(long, env = "ASAKA_VGPU_LOG_DIR", value_name = "DIR", help = "Write a rolling daily log file here")]
    log_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "ASAKA_VGPU_HTTP_TIMEOUT_SECS",
        default_value_t = 10,
        help = "Timeout for each capacity controller request"
    )]
    http_timeout_secs: u64,

    #[arg(
        long,
        env = "ASAKA_VGPU_RETRY_SECS",
        default_value_t = 5,
        help = "Delay between registration retries"
    )]
    retry_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliLogFormat {
    Pretty,
    StructuredJson,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Pretty => LogFormat::Pretty,
            CliLogFormat::StructuredJson => LogFormat::StructuredJson,
        }
    }
}

impl Cli {
    fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            format: self.log_format.into(),
            filter: self.log_filter.clone(),
            directory: self.log_dir.clone(),
        }
    }

    fn plugin_config(&self) -> Result<PluginConfig, ConfigError> {
        let mut config = PluginConfig::from_controller_address(self.controller.as_deref())?
            .with_plugin_dir(&self.plugin_dir);
        config.http_timeout = Duration::from_secs(self.http_timeout_secs);
        config.retry_interval = Duration::from_secs(self.retry_secs);
        config.logging = self.logging();
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("asaka-vgpud", &cli.logging())?;

    let config = match cli.plugin_config() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration; aborting");
            return Err(err.into());
        }
    };
    run_daemon(config).await
}

async fn run_daemon(config: PluginConfig) -> Result<()> {
    let client = ControllerClient::new(config.controller_address.clone(), config.http_timeout)
        .context("building capacity controller client")?;
    info!(controller = %client.address(), "capacity controller configured");

    if let Err(err) = client.test().await {
        error!(controller = %client.address(), error = %err, "capacity controller unreachable; aborting");
        return Err(anyhow::Error::new(err).context("capacity controller liveness check failed"));
    }

    let controller: Arc<dyn CapacityController> = Arc::new(client);
    let broker = Arc::new(AllocationBroker::new(controller.clone()));
    let inventory = Arc::new(ControllerInventory::new(controller));
    let factory = PluginServerFactory::new(PluginSettings::from_config(&config), broker, inventory);

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let _watcher = spawn_fs_watcher(&config.plugin_dir, events_tx.clone())
        .context("watching device plugin directory")?;
    let signals = spawn_signal_forwarder(events_tx).context("installing signal handlers")?;

    let mut supervisor = Supervisor::new(factory, config.kubelet_socket(), config.retry_interval);
    info!(plugin_dir = %config.plugin_dir.display(), "asaka-vgpud running");
    let exit = supervisor.run(events_rx).await;
    signals.abort();
    info!(?exit, restarts = supervisor.restarts(), "asaka-vgpud exiting");
    Ok(())
}
