//! ---
//! asaka_section: "05-networking-external-interfaces"
//! asaka_subsection: "module"
//! asaka_type: "source"
//! asaka_scope: "code"
//! asaka_description: "Client surface for the XaaS capacity controller."
//! asaka_version: "v0.0.0-prealpha"
//! asaka_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::debug;

use crate::error::{ControllerError, Result};

/// Protocol tag the controller matches capacity requests against.
pub const SERVED_PROTOCOL: &str = "CUDA";

/// Operations the plugin needs from the capacity controller.
///
/// Every call returns the raw response body; callers decode it.
#[async_trait]
pub trait CapacityController: Send + Sync {
    /// Controller `host[:port]` as configured.
    fn address(&self) -> &str;

    /// `GET /device`: raw device descriptor list.
    async fn list_devices(&self) -> Result<String>;

    /// `GET /service/asaka_server`: candidate servers able to serve `count` vGPUs.
    async fn request_capacity(&self, count: usize) -> Result<String>;

    /// `GET /device/{id}`: opaque allocation detail string.
    async fn allocation_detail(&self, allocation_id: &str) -> Result<String>;

    /// `PUT /device/{id}/allocate` with an empty body.
    async fn confirm_allocation(&self, allocation_id: &str) -> Result<String>;

    /// `PUT /device/{id}/release` echoing the allocation detail.
    async fn release_allocation(&self, allocation_id: &str, detail: &str) -> Result<String>;

    /// `GET /test`: liveness check.
    async fn test(&self) -> Result<()>;
}

/// reqwest-backed controller client.
#[derive(Debug, Clone)]
pub struct ControllerClient {
    address: String,
    http: Client,
}

impl ControllerClient {
    /// Build a client for `address` with every request bounded by `timeout`.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ControllerError::Build)?;
        Ok(Self {
            address: address.into(),
            http,
        })
    }

    /// Absolute URL for a controller path.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    /// Issue a GET and return the body of a successful response.
    pub async fn get(&self, url: &str) -> Result<String> {
        debug!(%url, "controller GET");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ControllerError::Transport {
                url: url.to_owned(),
                source,
            })?;
        read_body(url, response).await
    }

    /// Issue a PUT with `body` and return the body of a successful response.
    pub async fn put(&self, url: &str, body: String) -> Result<String> {
        debug!(%url, bytes = body.len(), "controller PUT");
        let response = self
            .http
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|source| ControllerError::Transport {
                url: url.to_owned(),
                source,
            })?;
        read_body(url, response).await
    }
}

async fn read_body(url: &str, response: Response) -> Result<String> {
    let status = response.status().as_u16();
    if status > 299 {
        return Err(ControllerError::UnexpectedStatus {
            url: url.to_owned(),
            status,
        });
    }
    response.text().await.map_err(|source| ControllerError::Body {
        url: url.to_owned(),
        source,
    })
}

#[async_trait]
impl CapacityController for ControllerClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn list_devices(&self) -> Result<String> {
        self.get(&self.url("/device")).await
    }

    async fn request_capacity(&self, count: usize) -> Result<String> {
        let url = self.url(&format!(
            "/service/asaka_server?served_protocol={SERVED_PROTOCOL}&vgpu_request={count}"
        ));
        self.get(&url).await
    }

    async fn allocation_detail(&self, allocation_id: &str) -> Result<String> {
        self.get(&self.url(&format!("/device/{allocation_id}"))).await
    }

    async fn confirm_allocation(&self, allocation_id: &str) -> Result<String> {
        let url = self.url(&format!("/device/{allocation_id}/allocate"));
        self.put(&url, String::new()).await
    }

    async fn release_allocation(&self, allocation_id: &str, detail: &str) -> Result<String> {
        let url = self.url(&format!("/device/{allocation_id}/release"));
        self.put(&url, detail.to_owned()).await
    }

    async fn test(&self) -> Result<()> {
        self.get(&self.url("/test")).await.map(|_| ())
    }
}
