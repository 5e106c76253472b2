//! ---
//! asaka_section: "15-testing-qa-runbook"
//! asaka_subsection: "integration-tests"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "End-to-end tests for the Asaka vGPU device plugin."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use asaka_vgpu_broker::{AllocationBroker, ENV_CONTROLLER_IP, ENV_DEV};
use asaka_vgpu_controller::{CapacityController, ControllerClient};
use asaka_vgpu_plugin::proto::device_plugin_client::DevicePluginClient;
use asaka_vgpu_plugin::proto::registration_server::{Registration, RegistrationServer};
use asaka_vgpu_plugin::proto::{AllocateRequest, ContainerAllocateRequest, Empty, RegisterRequest};
use asaka_vgpu_plugin::{uds, ControllerInventory, PluginSettings};
use asaka_vgpu_supervisor::{
    spawn_fs_watcher, LifecycleEvent, PluginServerFactory, ProcessSignal, Supervisor,
    SupervisorExit,
};
use axum::extract::{Path as RoutePath, State};
use axum::routing::{get, put};
use axum::Router;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::{Request, Response, Status};

type Journal = Arc<Mutex<Vec<String>>>;

async fn spawn_controller(journal: Journal) -> SocketAddr {
    let router = Router::new()
        .route("/test", get(|| async { "ok" }))
        .route(
            "/device",
            get(|| async {
                r#"[{"device_id": "gpu-a", "device_port": 9000,
                     "extra_attributes": [{"key": "vgpu_num", "value": 2}]}]"#
            }),
        )
        .route(
            "/service/asaka_server",
            get(|| async { r#"[{"service_ip": "10.0.0.9", "allocation_id": "a1"}]"# }),
        )
        .route(
            "/device/:id",
            get(|RoutePath(id): RoutePath<String>| async move { format!("HOST=10.0.0.9;SLOT={id}") }),
        )
        .route(
            "/device/:id/allocate",
            put(|State(journal): State<Journal>, RoutePath(id): RoutePath<String>| async move {
                journal.lock().unwrap().push(format!("confirm:{id}"));
                ""
            }),
        )
        .with_state(journal);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service()).await.unwrap();
    });
    addr
}

struct FakeKubelet {
    registrations: Arc<Mutex<Vec<RegisterRequest>>>,
}

#[tonic::async_trait]
impl Registration for FakeKubelet {
    async fn register(&self, request: Request<RegisterRequest>) -> Result<Response<Empty>, Status> {
        self.registrations.lock().unwrap().push(request.into_inner());
        Ok(Response::new(Empty {}))
    }
}

fn spawn_kubelet(socket: &Path, registrations: Arc<Mutex<Vec<RegisterRequest>>>) {
    let _ = std::fs::remove_file(socket);
    let listener = UnixListener::bind(socket).unwrap();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(RegistrationServer::new(FakeKubelet { registrations }))
            .serve_with_incoming(UnixListenerStream::new(listener))
            .await
            .unwrap();
    });
}

async fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn settings(dir: &Path) -> PluginSettings {
    PluginSettings {
        socket: dir.join("asaka-vgpu.sock"),
        kubelet_socket: dir.join("kubelet.sock"),
        resource_name: "asaka/vgpu".into(),
        refresh_interval: Duration::from_secs(1),
        dial_timeout: Duration::from_secs(2),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plugin_registers_serves_and_follows_kubelet_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let kubelet_socket: PathBuf = dir.path().join("kubelet.sock");
    let plugin_socket: PathBuf = dir.path().join("asaka-vgpu.sock");

    let journal: Journal = Arc::default();
    let controller_addr = spawn_controller(journal.clone()).await;
    let registrations = Arc::new(Mutex::new(Vec::new()));
    spawn_kubelet(&kubelet_socket, registrations.clone());

    let client = ControllerClient::new(controller_addr.to_string(), Duration::from_secs(2)).unwrap();
    client.test().await.unwrap();
    let controller: Arc<dyn CapacityController> = Arc::new(client);
    let factory = PluginServerFactory::new(
        settings(dir.path()),
        Arc::new(AllocationBroker::new(controller.clone())),
        Arc::new(ControllerInventory::new(controller)),
    );

    let (events_tx, events_rx) = mpsc::channel(64);
    let _watcher = spawn_fs_watcher(dir.path(), events_tx.clone()).unwrap();
    let mut supervisor = Supervisor::new(factory, kubelet_socket.clone(), Duration::from_secs(1));
    let supervisor_task = tokio::spawn(async move {
        let exit = supervisor.run(events_rx).await;
        (exit, supervisor.restarts())
    });

    wait_for("first registration", || registrations.lock().unwrap().len() == 1).await;
    {
        let sent = registrations.lock().unwrap();
        assert_eq!(sent[0].endpoint, "asaka-vgpu.sock");
        assert_eq!(sent[0].resource_name, "asaka/vgpu");
    }

    let channel = uds::dial(&plugin_socket, Duration::from_secs(2)).await.unwrap();
    let mut plugin = DevicePluginClient::new(channel);

    let mut inventory = plugin.list_and_watch(Empty {}).await.unwrap().into_inner();
    let snapshot = inventory.message().await.unwrap().unwrap();
    let ids: Vec<String> = snapshot.devices.into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["gpu-a:0", "gpu-a:1"]);

    let response = plugin
        .allocate(AllocateRequest {
            container_requests: vec![ContainerAllocateRequest {
                devices_ids: vec!["gpu-a:1".into(), "gpu-a:0".into()],
            }],
        })
        .await
        .unwrap()
        .into_inner();
    let envs = &response.container_responses[0].envs;
    assert_eq!(envs[ENV_DEV], "HOST=10.0.0.9;SLOT=a1;ALLOCATION_ID=a1");
    assert_eq!(envs[ENV_CONTROLLER_IP], controller_addr.to_string());
    assert_eq!(journal.lock().unwrap().clone(), vec!["confirm:a1".to_string()]);

    // A restarted kubelet drops a fresh socket; the plugin re-registers.
    spawn_kubelet(&kubelet_socket, registrations.clone());
    wait_for("re-registration", || registrations.lock().unwrap().len() >= 2).await;
    wait_for("plugin socket", || plugin_socket.exists()).await;

    events_tx
        .send(LifecycleEvent::Signal(ProcessSignal::Terminate))
        .await
        .unwrap();
    let (exit, restarts) = tokio::time::timeout(Duration::from_secs(15), supervisor_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit, SupervisorExit::Signal(ProcessSignal::Terminate));
    assert!(restarts >= 2);
    assert!(!plugin_socket.exists());
}
