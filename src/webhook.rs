// 🪝 Webhooks - tenant-configured HTTP notifications on status transitions
//
// Lookup key: (webhook_type, object_type, integration_status)
// - zero matches → ConfigurationMissing (the external system would never be told)
// - two or more  → AmbiguousConfiguration (no silent first-match)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::db::{from_document, Query, Repository, Table};
use crate::entities::ObjectKind;
use crate::error::{Result, SyncError};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookType {
    Update,
    Disqualify,
    Convert,
    CustomObject,
}

impl WebhookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookType::Update => "update",
            WebhookType::Disqualify => "disqualify",
            WebhookType::Convert => "convert",
            WebhookType::CustomObject => "custom_object",
        }
    }
}

impl fmt::Display for WebhookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub id: String,
    pub tenant_id: String,
    pub webhook_type: WebhookType,
    pub object_type: ObjectKind,
    /// Target status the webhook fires for
    pub integration_status: String,
    #[serde(default)]
    pub http_method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// JSON body sent to the tenant's endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub object_type: ObjectKind,
    #[serde(rename = "Id")]
    pub id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ============================================================================
// LOOKUP
// ============================================================================

/// The single webhook configured for a transition
pub async fn find_webhook(
    repo: &dyn Repository,
    tenant_id: &str,
    webhook_type: WebhookType,
    object_type: ObjectKind,
    integration_status: &str,
) -> Result<WebhookConfig> {
    let query = Query::tenant(tenant_id)
        .eq("webhook_type", webhook_type.as_str())
        .eq("object_type", object_type.as_str())
        .eq("integration_status", integration_status);

    let mut docs = repo.fetch_all(Table::Webhooks, &query).await?;
    match docs.len() {
        0 => Err(SyncError::missing(format!(
            "{} webhook for {} status '{}'",
            webhook_type, object_type, integration_status
        ))),
        1 => from_document(docs.remove(0)),
        count => Err(SyncError::AmbiguousConfiguration {
            what: format!(
                "{} webhook for {} status '{}'",
                webhook_type, object_type, integration_status
            ),
            count,
        }),
    }
}

// ============================================================================
// DELIVERY
// ============================================================================

#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, config: &WebhookConfig, payload: &WebhookPayload) -> Result<()>;
}

/// Delivers webhooks over HTTP with a bearer token
#[cfg(feature = "http")]
pub struct HttpWebhookSender {
    client: reqwest::Client,
    timeout: Duration,
}

#[cfg(feature = "http")]
impl HttpWebhookSender {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::external("webhook", e.to_string()))?;
        Ok(HttpWebhookSender { client, timeout })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, config: &WebhookConfig, payload: &WebhookPayload) -> Result<()> {
        let method = match config.http_method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut request = self.client.request(method, &config.url).json(payload);
        if let Some(token) = config.auth_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        debug!(url = %config.url, webhook_type = %config.webhook_type, "sending webhook");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout {
                    operation: format!("{} webhook", config.webhook_type),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                SyncError::external("webhook", e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            info!(url = %config.url, status = status.as_u16(), "webhook delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SyncError::external(
            "webhook",
            format!("{} returned {}: {}", config.url, status, body),
        ))
    }
}

/// Sender wrapper applying a deadline to any delivery
pub struct TimedSender {
    inner: Arc<dyn WebhookSender>,
    timeout: Duration,
}

impl TimedSender {
    pub fn new(inner: Arc<dyn WebhookSender>, timeout: Duration) -> Self {
        TimedSender { inner, timeout }
    }
}

#[async_trait]
impl WebhookSender for TimedSender {
    async fn send(&self, config: &WebhookConfig, payload: &WebhookPayload) -> Result<()> {
        tokio::time::timeout(self.timeout, self.inner.send(config, payload))
            .await
            .map_err(|_| SyncError::Timeout {
                operation: format!("{} webhook", config.webhook_type),
                timeout_ms: self.timeout.as_millis() as u64,
            })?
    }
}

// ============================================================================
// TESTS
// ============================================================================
