//! LetsCloud REST API client
//!
//! Implements [`Gateway`] over the LetsCloud HTTP API. Every call is a
//! single round-trip; failures are classified and returned as
//! [`CloudError`](letsflow_cloud::CloudError) without retrying.

use crate::error::{LetsCloudError, Result};
use async_trait::async_trait;
use letsflow_cloud::{CreateInstanceRequest, Gateway, Instance, Plan, SshKey};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

pub const LETSCLOUD_API_BASE: &str = "https://core.letscloud.io/api";

const TOKEN_HEADER: &str = "api-token";

/// Response envelope shared by every endpoint
#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP gateway to the LetsCloud control plane
pub struct LetsCloudGateway {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
}

impl LetsCloudGateway {
    pub fn new(api_token: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("letsflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LetsCloudError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_token: api_token.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(method = %method, path, "LetsCloud API request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(TOKEN_HEADER, &self.api_token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope = if text.trim().is_empty() {
            ApiResponse::default()
        } else {
            match serde_json::from_str::<ApiResponse>(&text) {
                Ok(envelope) => envelope,
                Err(_) if !status.is_success() => ApiResponse {
                    message: Some(text.trim().to_string()),
                    ..Default::default()
                },
                Err(e) => return Err(e.into()),
            }
        };

        tracing::debug!(method = %method, path, status = status.as_u16(), "LetsCloud API response");

        if !status.is_success() || envelope.success == Some(false) {
            let message = envelope
                .message
                .filter(|m| !m.is_empty())
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(LetsCloudError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(envelope)
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let envelope = self.request(Method::GET, path, None).await?;
        let data = envelope
            .data
            .ok_or_else(|| LetsCloudError::InvalidResponse(format!("no data in response to {}", path)))?;
        Ok(serde_json::from_value(data)?)
    }
}

/// An identifier or slug as a single URL path segment
fn path_segment(id: &str) -> Result<&str> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | '?' | '#' | '%'));
    if valid {
        Ok(id)
    } else {
        Err(LetsCloudError::InvalidIdentifier(id.to_string()))
    }
}

/// Identifier from a create acknowledgement, if the API included one
fn reported_identifier(data: Option<&Value>) -> Option<String> {
    let data = data?;
    data.get("identifier")
        .or_else(|| data.get("instance").and_then(|i| i.get("identifier")))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Gateway for LetsCloudGateway {
    fn name(&self) -> &str {
        "letscloud"
    }

    async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> letsflow_cloud::Result<Option<String>> {
        let body = serde_json::to_value(request).map_err(LetsCloudError::from)?;
        let envelope = self.request(Method::POST, "/instances", Some(body)).await?;
        let id = reported_identifier(envelope.data.as_ref());
        tracing::debug!(label = %request.label, reported_id = ?id, "Instance create acknowledged");
        Ok(id)
    }

    async fn get_instance(&self, id: &str) -> letsflow_cloud::Result<Instance> {
        let id = path_segment(id)?;
        Ok(self.fetch(&format!("/instances/{}", id)).await?)
    }

    async fn list_instances(&self) -> letsflow_cloud::Result<Vec<Instance>> {
        Ok(self.fetch("/instances").await?)
    }

    async fn delete_instance(&self, id: &str) -> letsflow_cloud::Result<()> {
        let id = path_segment(id)?;
        self.request(Method::DELETE, &format!("/instances/{}", id), None)
            .await?;
        Ok(())
    }

    async fn reset_instance_password(&self, id: &str, password: &str) -> letsflow_cloud::Result<()> {
        let id = path_segment(id)?;
        self.request(
            Method::PUT,
            &format!("/instances/{}/reset-password", id),
            Some(json!({ "password": password })),
        )
        .await?;
        Ok(())
    }

    async fn location_plans(&self, location: &str) -> letsflow_cloud::Result<Vec<Plan>> {
        let location = path_segment(location)?;
        Ok(self.fetch(&format!("/locations/{}/plans", location)).await?)
    }

    async fn get_ssh_key(&self, id: &str) -> letsflow_cloud::Result<SshKey> {
        let id = path_segment(id)?;
        Ok(self.fetch(&format!("/sshkeys/{}", id)).await?)
    }

    async fn list_ssh_keys(&self) -> letsflow_cloud::Result<Vec<SshKey>> {
        Ok(self.fetch("/sshkeys").await?)
    }

    async fn create_ssh_key(&self, title: &str, public_key: &str) -> letsflow_cloud::Result<SshKey> {
        let envelope = self
            .request(
                Method::POST,
                "/sshkeys",
                Some(json!({ "title": title, "key": public_key })),
            )
            .await?;
        let data = envelope.data.ok_or_else(|| {
            LetsCloudError::InvalidResponse("no data in SSH key create response".to_string())
        })?;
        let key: SshKey = serde_json::from_value(data).map_err(LetsCloudError::from)?;
        Ok(key)
    }

    async fn delete_ssh_key(&self, id: &str) -> letsflow_cloud::Result<()> {
        let id = path_segment(id)?;
        self.request(Method::DELETE, &format!("/sshkeys/{}", id), None)
            .await?;
        Ok(())
    }
}
