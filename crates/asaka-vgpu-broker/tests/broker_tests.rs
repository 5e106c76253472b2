//! ---
//! asaka_section: "02-allocation"
//! asaka_subsection: "integration-tests"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Reservation bookkeeping for controller-granted vGPU capacity."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::sync::{Arc, Mutex};

use asaka_vgpu_broker::{
    AllocationBroker, AllocationError, ENV_ASAKA_CONTROLLER_IP, ENV_ASAKA_K8S, ENV_CONTROLLER_IP,
    ENV_DEV, ENV_XAAS_CONTROLLER,
};
use asaka_vgpu_controller::{CapacityController, ControllerError, Result};
use async_trait::async_trait;
use tokio::sync::Notify;

const ADDRESS: &str = "10.0.0.1:8080";

#[derive(Default)]
struct FakeController {
    capacity_body: Mutex<String>,
    fail_detail: bool,
    fail_confirm: bool,
    fail_release: Mutex<bool>,
    release_gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<String>>,
}

impl FakeController {
    fn answering(body: &str) -> Self {
        Self {
            capacity_body: Mutex::new(body.to_owned()),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(path: &str) -> ControllerError {
        ControllerError::UnexpectedStatus {
            url: format!("http://{ADDRESS}{path}"),
            status: 500,
        }
    }
}

#[async_trait]
impl CapacityController for FakeController {
    fn address(&self) -> &str {
        ADDRESS
    }

    async fn list_devices(&self) -> Result<String> {
        Ok("[]".into())
    }

    async fn request_capacity(&self, count: usize) -> Result<String> {
        self.record(format!("capacity:{count}"));
        Ok(self.capacity_body.lock().unwrap().clone())
    }

    async fn allocation_detail(&self, allocation_id: &str) -> Result<String> {
        self.record(format!("detail:{allocation_id}"));
        if self.fail_detail {
            return Err(Self::failure("/device"));
        }
        Ok(format!("HOST=10.0.0.5;SLOT={allocation_id}"))
    }

    async fn confirm_allocation(&self, allocation_id: &str) -> Result<String> {
        self.record(format!("confirm:{allocation_id}"));
        if self.fail_confirm {
            return Err(Self::failure("/device/allocate"));
        }
        Ok(String::new())
    }

    async fn release_allocation(&self, allocation_id: &str, detail: &str) -> Result<String> {
        self.record(format!("release:{allocation_id}:{detail}"));
        if let Some(gate) = &self.release_gate {
            gate.notified().await;
        }
        if *self.fail_release.lock().unwrap() {
            return Err(Self::failure("/device/release"));
        }
        Ok(String::new())
    }

    async fn test(&self) -> Result<()> {
        Ok(())
    }
}

fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|id| id.to_string()).collect()
}

fn broker_with(controller: FakeController) -> (AllocationBroker, Arc<FakeController>) {
    let controller = Arc::new(controller);
    (AllocationBroker::new(controller.clone()), controller)
}

#[tokio::test]
async fn empty_request_is_a_no_op() {
    let (broker, controller) = broker_with(FakeController::answering(r#"[{"allocation_id": "a1"}]"#));
    let envs = broker.allocate_vgpu(&[]).await.unwrap();
    assert!(envs.is_empty());
    assert_eq!(broker.reservation_count().await, 0);
    assert!(controller.calls().is_empty());
}

#[tokio::test]
async fn null_response_is_insufficient_capacity() {
    let (broker, controller) = broker_with(FakeController::answering("null"));
    let err = broker
        .allocate_vgpu(&ids(&["gpu-a:0", "gpu-a:1"]))
        .await
        .unwrap_err();
    assert!(err.is_insufficient_capacity());
    assert_eq!(broker.reservation_count().await, 0);
    assert_eq!(controller.calls(), vec!["capacity:2".to_string()]);
}

#[tokio::test]
async fn empty_candidate_list_is_insufficient_capacity() {
    let (broker, _) = broker_with(FakeController::answering("[]"));
    let err = broker.allocate_vgpu(&ids(&["gpu-a:0"])).await.unwrap_err();
    assert!(matches!(err, AllocationError::InsufficientCapacity { requested: 1 }));
}

#[tokio::test]
async fn error_envelope_is_passed_through() {
    let (broker, _) = broker_with(FakeController::answering(r#"{"Error": "controller busy"}"#));
    let err = broker.allocate_vgpu(&ids(&["gpu-a:0"])).await.unwrap_err();
    assert_eq!(err.to_string(), "capacity controller rejected the request: controller busy");
}

#[tokio::test]
async fn granted_allocation_is_recorded_and_advertised() {
    let (broker, controller) = broker_with(FakeController::answering(
        r#"[{"allocation_id": "a1", "service_name": "asaka-1"}, {"allocation_id": "a2"}]"#,
    ));
    let request = ids(&["gpu-a:1", "gpu-a:0"]);
    let envs = broker.allocate_vgpu(&request).await.unwrap();

    assert_eq!(envs[ENV_ASAKA_K8S], "1");
    for key in [ENV_XAAS_CONTROLLER, ENV_CONTROLLER_IP, ENV_ASAKA_CONTROLLER_IP] {
        assert_eq!(envs[key], ADDRESS);
    }
    assert_eq!(envs[ENV_DEV], "HOST=10.0.0.5;SLOT=a1;ALLOCATION_ID=a1");
    assert!(envs[ENV_DEV].ends_with(";ALLOCATION_ID=a1"));

    let record = broker
        .reservation(&ids(&["gpu-a:0", "gpu-a:1"]))
        .await
        .expect("reservation recorded under the order-independent key");
    assert_eq!(record.allocation_id, "a1");
    assert_eq!(record.allocation_detail, "HOST=10.0.0.5;SLOT=a1");
    assert_eq!(
        controller.calls(),
        vec!["capacity:2", "detail:a1", "confirm:a1"]
    );
}

#[tokio::test]
async fn candidate_without_allocation_id_reserves_nothing() {
    let (broker, _) = broker_with(FakeController::answering(r#"[{"service_name": "asaka-1"}]"#));
    let envs = broker.allocate_vgpu(&ids(&["gpu-a:0"])).await.unwrap();
    assert!(!envs.contains_key(ENV_DEV));
    assert_eq!(envs[ENV_ASAKA_K8S], "1");
    assert_eq!(broker.reservation_count().await, 0);
}

#[tokio::test]
async fn confirmation_failure_does_not_fail_allocation() {
    let (broker, _) = broker_with(FakeController {
        fail_confirm: true,
        ..FakeController::answering(r#"[{"allocation_id": "a1"}]"#)
    });
    let envs = broker.allocate_vgpu(&ids(&["gpu-a:0"])).await.unwrap();
    assert!(envs[ENV_DEV].ends_with(";ALLOCATION_ID=a1"));
    assert_eq!(broker.reservation_count().await, 1);
}

#[tokio::test]
async fn detail_failure_falls_back_to_empty_detail() {
    let (broker, _) = broker_with(FakeController {
        fail_detail: true,
        ..FakeController::answering(r#"[{"allocation_id": "a1"}]"#)
    });
    let envs = broker.allocate_vgpu(&ids(&["gpu-a:0"])).await.unwrap();
    assert_eq!(envs[ENV_DEV], ";ALLOCATION_ID=a1");
}

#[tokio::test]
async fn existing_reservation_is_not_overwritten() {
    let (broker, controller) = broker_with(FakeController::answering(r#"[{"allocation_id": "a1"}]"#));
    let request = ids(&["gpu-a:0"]);
    broker.allocate_vgpu(&request).await.unwrap();

    *controller.capacity_body.lock().unwrap() = r#"[{"allocation_id": "a2"}]"#.into();
    let envs = broker.allocate_vgpu(&request).await.unwrap();
    assert!(envs[ENV_DEV].ends_with(";ALLOCATION_ID=a2"));

    let record = broker.reservation(&request).await.unwrap();
    assert_eq!(record.allocation_id, "a1");
    assert_eq!(broker.reservation_count().await, 1);
}

#[tokio::test]
async fn release_of_unknown_key_is_a_no_op() {
    let (broker, controller) = broker_with(FakeController::answering("[]"));
    broker.release_vgpu(&ids(&["gpu-z:0"])).await.unwrap();
    assert!(controller.calls().is_empty());
}

#[tokio::test]
async fn release_echoes_detail_and_is_idempotent() {
    let (broker, controller) = broker_with(FakeController::answering(r#"[{"allocation_id": "a1"}]"#));
    broker.allocate_vgpu(&ids(&["gpu-a:0", "gpu-b:0"])).await.unwrap();

    broker.release_vgpu(&ids(&["gpu-b:0", "gpu-a:0"])).await.unwrap();
    broker.release_vgpu(&ids(&["gpu-a:0", "gpu-b:0"])).await.unwrap();

    let releases: Vec<String> = controller
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("release:"))
        .collect();
    assert_eq!(releases, vec!["release:a1:HOST=10.0.0.5;SLOT=a1".to_string()]);
    assert_eq!(broker.reservation_count().await, 0);
}

#[tokio::test]
async fn failed_release_keeps_record_for_retry() {
    let (broker, controller) = broker_with(FakeController::answering(r#"[{"allocation_id": "a1"}]"#));
    let request = ids(&["gpu-a:0"]);
    broker.allocate_vgpu(&request).await.unwrap();

    *controller.fail_release.lock().unwrap() = true;
    let err = broker.release_vgpu(&request).await.unwrap_err();
    assert!(matches!(err, AllocationError::Controller(_)));
    assert!(broker.reservation(&request).await.is_some());

    *controller.fail_release.lock().unwrap() = false;
    broker.release_vgpu(&request).await.unwrap();
    assert!(broker.reservation(&request).await.is_none());
}

#[tokio::test]
async fn concurrent_allocations_share_the_map() {
    let (broker, _) = broker_with(FakeController::answering(r#"[{"allocation_id": "a1"}]"#));
    let broker = Arc::new(broker);
    let mut tasks = Vec::new();
    for idx in 0..8 {
        let broker = broker.clone();
        tasks.push(tokio::spawn(async move {
            broker
                .allocate_vgpu(&[format!("gpu-{idx}:0")])
                .await
                .map(|_| ())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(broker.reservation_count().await, 8);
}

#[tokio::test]
async fn allocation_proceeds_while_a_release_is_in_flight() {
    let gate = Arc::new(Notify::new());
    let (broker, controller) = broker_with(FakeController {
        release_gate: Some(gate.clone()),
        ..FakeController::answering(r#"[{"allocation_id": "a1"}]"#)
    });
    let broker = Arc::new(broker);
    broker.allocate_vgpu(&ids(&["gpu-a:0"])).await.unwrap();

    let releasing = {
        let broker = broker.clone();
        tokio::spawn(async move { broker.release_vgpu(&ids(&["gpu-a:0"])).await })
    };
    while !controller.calls().iter().any(|call| call.starts_with("release:")) {
        tokio::task::yield_now().await;
    }

    tokio::time::timeout(
        std::time::Duration::from_secs(1),
        broker.allocate_vgpu(&ids(&["gpu-b:0"])),
    )
    .await
    .expect("allocation must not wait for the release call")
    .unwrap();
    assert!(broker.reservation(&ids(&["gpu-a:0"])).await.is_none());
    assert_eq!(broker.reservation_count().await, 1);

    gate.notify_one();
    releasing.await.unwrap().unwrap();
    assert_eq!(broker.reservation_count().await, 1);
    assert!(broker.reservation(&ids(&["gpu-b:0"])).await.is_some());
}
