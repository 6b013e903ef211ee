use crate::endpoint::{base_url, parse_reported_version, Endpoint};
use crate::error::{CollectError, Result};
use crate::ComponentCollector;
use async_trait::async_trait;
use precheck_model::{current_unix_ms, flatten_json, Component, RuntimeSnapshot, Version};
use reqwest::Client;
use std::time::Duration;

pub(crate) const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| CollectError::Http {
            url: String::new(),
            message: format!("failed to build HTTP client: {e}"),
        })
}

pub(crate) async fn get_json(client: &Client, address: &str, path: &str) -> Result<serde_json::Value> {
    let url = format!("{}{path}", base_url(address));
    let response = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| CollectError::Http {
            url: url.clone(),
            message: e.to_string(),
        })?;
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| CollectError::InvalidResponse {
            url,
            message: e.to_string(),
        })
}

/// Version reported by a status endpoint's `version` field.
pub(crate) async fn get_version(client: &Client, address: &str, path: &str) -> Option<Version> {
    match get_json(client, address, path).await {
        Ok(status) => status
            .get("version")
            .and_then(|v| v.as_str())
            .and_then(parse_reported_version),
        Err(err) => {
            log::debug!("No version from {address}{path}: {err}");
            None
        }
    }
}

/// Collector for components that expose their effective config as JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConfigCollector {
    component: Component,
    config_path: &'static str,
    status_path: &'static str,
    client: Client,
}

impl HttpConfigCollector {
    pub fn new(component: Component, config_path: &'static str, status_path: &'static str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            component,
            config_path,
            status_path,
            client: build_client(timeout)?,
        })
    }

    pub fn pd(timeout: Duration) -> Result<Self> {
        Self::new(Component::PD, "/pd/api/v1/config", "/pd/api/v1/status", timeout)
    }

    pub fn tikv(timeout: Duration) -> Result<Self> {
        Self::new(Component::TiKV, "/config", "/status", timeout)
    }

    pub fn tiflash(timeout: Duration) -> Result<Self> {
        Self::new(Component::TiFlash, "/config", "/status", timeout)
    }

    /// Config plus version from one address.
    pub(crate) async fn collect_from(&self, address: &str) -> Result<RuntimeSnapshot> {
        let config = get_json(&self.client, address, self.config_path).await?;
        if !config.is_object() {
            return Err(CollectError::InvalidResponse {
                url: format!("{}{}", base_url(address), self.config_path),
                message: "config is not a JSON object".into(),
            });
        }
        let mut snapshot = RuntimeSnapshot::new(self.component, address, current_unix_ms());
        snapshot.config = flatten_json(&config);
        snapshot.reported_version = get_version(&self.client, address, self.status_path).await;
        Ok(snapshot)
    }
}

#[async_trait]
impl ComponentCollector for HttpConfigCollector {
    fn component(&self) -> Component {
        self.component
    }

    async fn collect(&self, endpoint: &Endpoint) -> Result<RuntimeSnapshot> {
        if endpoint.addresses.is_empty() {
            return Err(CollectError::NoAddress(self.component));
        }
        let mut last_error = String::new();
        for address in &endpoint.addresses {
            match self.collect_from(address).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) => {
                    log::debug!("{} at {address}: {err}", self.component);
                    last_error = err.to_string();
                }
            }
        }
        Err(CollectError::unreachable(self.component, &endpoint.addresses, last_error))
    }
}
