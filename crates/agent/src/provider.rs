//! Backend that actually carries out workspace actions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;
use workdesk_core::config::ProviderConfig;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProviderAction {
    Provision {
        user_id: String,
        bundle_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        team: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        project: Option<String>,
    },
    Start { workspace_id: String },
    Stop { workspace_id: String },
    Reboot { workspace_id: String },
    Terminate { workspace_id: String },
    Describe { workspace_id: String },
    List { user_id: String },
    CostSummary {
        user_id: String,
        time_period: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        team: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        project: Option<String>,
    },
    Diagnose { workspace_id: String },
    OpenTicket {
        user_id: String,
        subject: String,
        description: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        workspace_id: Option<String>,
    },
}

impl ProviderAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Provision { .. } => "provision",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Reboot { .. } => "reboot",
            Self::Terminate { .. } => "terminate",
            Self::Describe { .. } => "describe",
            Self::List { .. } => "list",
            Self::CostSummary { .. } => "cost_summary",
            Self::Diagnose { .. } => "diagnose",
            Self::OpenTicket { .. } => "open_ticket",
        }
    }

    fn route(&self) -> (Method, String) {
        match self {
            Self::Provision { .. } => (Method::POST, "/workspaces".to_string()),
            Self::Start { workspace_id } => {
                (Method::POST, format!("/workspaces/{workspace_id}/start"))
            }
            Self::Stop { workspace_id } => (Method::POST, format!("/workspaces/{workspace_id}/stop")),
            Self::Reboot { workspace_id } => {
                (Method::POST, format!("/workspaces/{workspace_id}/reboot"))
            }
            Self::Terminate { workspace_id } => {
                (Method::DELETE, format!("/workspaces/{workspace_id}"))
            }
            Self::Describe { workspace_id } => (Method::GET, format!("/workspaces/{workspace_id}")),
            Self::List { user_id } => (Method::GET, format!("/users/{user_id}/workspaces")),
            Self::CostSummary { .. } => (Method::POST, "/costs/summary".to_string()),
            Self::Diagnose { workspace_id } => {
                (Method::POST, format!("/workspaces/{workspace_id}/diagnostics"))
            }
            Self::OpenTicket { .. } => (Method::POST, "/support/tickets".to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider is not configured: {0}")]
    NotConfigured(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    async fn call(&self, action: ProviderAction) -> Result<Value, ProviderError>;
}

/// JSON-over-HTTP provider client.
pub struct HttpWorkspaceProvider {
    client: Client,
    base_url: String,
    api_token: Option<SecretString>,
}

impl HttpWorkspaceProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ProviderError::NotConfigured(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url, api_token })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("provider.base_url is not set".to_string()))?;
        Self::new(base_url, config.api_token.clone(), Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl WorkspaceProvider for HttpWorkspaceProvider {
    async fn call(&self, action: ProviderAction) -> Result<Value, ProviderError> {
        let (method, path) = action.route();
        let url = format!("{}{}", self.base_url, path);
        debug!(event_name = "provider.request", action = action.name(), %url, "calling provider");

        let mut request = self.client.request(method.clone(), &url);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }
        if method != Method::GET && method != Method::DELETE {
            request = request.json(&action);
        }

        let response = request.send().await.map_err(|error| {
            warn!(
                event_name = "provider.request_failed",
                action = action.name(),
                error = %error,
                "provider request failed"
            );
            ProviderError::Request(error.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let body = response.text().await.map_err(|error| ProviderError::Decode(error.to_string()))?;
        if body.trim().is_empty() {
            return Ok(json!({ "status": "accepted" }));
        }
        serde_json::from_str(&body).map_err(|error| ProviderError::Decode(error.to_string()))
    }
}

/// Answers every action locally with a plausible payload and remembers the calls.
#[derive(Clone, Default)]
pub struct DryRunProvider {
    calls: Arc<Mutex<Vec<ProviderAction>>>,
}

impl DryRunProvider {
    pub fn calls(&self) -> Vec<ProviderAction> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn call_count(&self, action_name: &str) -> usize {
        self.calls().iter().filter(|action| action.name() == action_name).count()
    }
}

#[async_trait]
impl WorkspaceProvider for DryRunProvider {
    async fn call(&self, action: ProviderAction) -> Result<Value, ProviderError> {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(action.clone()),
            Err(poisoned) => poisoned.into_inner().push(action.clone()),
        }

        let payload = match &action {
            ProviderAction::Provision { bundle_type, .. } => json!({
                "workspace_id": format!("ws-{}", &Uuid::new_v4().simple().to_string()[..10]),
                "bundle_type": bundle_type,
                "state": "PENDING",
            }),
            ProviderAction::Start { workspace_id } => {
                json!({ "workspace_id": workspace_id, "state": "STARTING" })
            }
            ProviderAction::Stop { workspace_id } => {
                json!({ "workspace_id": workspace_id, "state": "STOPPING" })
            }
            ProviderAction::Reboot { workspace_id } => {
                json!({ "workspace_id": workspace_id, "state": "REBOOTING" })
            }
            ProviderAction::Terminate { workspace_id } => {
                json!({ "workspace_id": workspace_id, "state": "TERMINATING" })
            }
            ProviderAction::Describe { workspace_id } => {
                json!({ "workspace_id": workspace_id, "state": "AVAILABLE" })
            }
            ProviderAction::List { .. } => json!({ "workspaces": [] }),
            ProviderAction::CostSummary { time_period, .. } => {
                json!({ "time_period": time_period, "total": 0.0, "currency": "USD" })
            }
            ProviderAction::Diagnose { workspace_id } => json!({
                "workspace_id": workspace_id,
                "checks": [
                    { "name": "instance_health", "status": "ok" },
                    { "name": "connectivity", "status": "ok" },
                ],
            }),
            ProviderAction::OpenTicket { .. } => json!({
                "ticket_id": format!("TCK-{}", &Uuid::new_v4().simple().to_string()[..8]),
                "status": "open",
            }),
        };
        Ok(payload)
    }
}
